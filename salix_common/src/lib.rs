//! Coordinator-side plumbing: the wire protocol, the leaf registry, the
//! tree builder and store, dispatcher sessions with their invocation
//! router, and the control plane tying it all together.

pub mod builder;
pub mod control;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;

pub use control::{Coordinator, CoordinatorSettings};
pub use protocol::{ApiError, ErrorCode, Frame, InvokeReply, NodeSpec, Request, Response};
pub use registry::{LeafKind, LeafRecord, LeafRegistry};
pub use salix_core::SalixError;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session ids are represented as UUIDs, assigned at connect time.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
