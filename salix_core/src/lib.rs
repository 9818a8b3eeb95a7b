/*
    Tree execution is cooperative: a tick may suspend while a leaf waits
    for its remote reply, and every suspension point observes the run's
    cancellation token.

    Node state (resumption indexes, iteration counters) lives inside the
    node values. The call stack descends the tree and never visits the
    same node twice within one tick, so plain `&mut` access is enough.

    Leaves do not hold callables. They hold a name, and evaluation goes
    through the [`LeafInvoker`] seam. Whoever owns the wire implements
    that trait; the engine neither knows nor cares where the callable
    lives.
*/

pub mod context;
pub mod engine;
pub mod nodes;

pub mod prelude {
    pub use crate::{
        context::{Context, ContextEntry},
        FailureReason, InvokeError, LeafInvoker, Node, NodeError, Outcome, SalixError, Status,
        TickContext,
    };
    pub use async_trait::async_trait;
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use context::{Context, ContextEntry};

/// The error type.
pub type SalixError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for results from node execution.
///
/// An `Err` halts tree execution on the spot; ordinary evaluation failures
/// are propagated as [`Status::Failure`] inside the `Ok` value instead.
pub type NodeError = SalixError;

/// The result states returned by a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Status {
    Running,
    Failure,
    Success,
}

impl Status {
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
    pub fn is_failure(&self) -> bool {
        *self == Status::Failure
    }
    pub fn is_running(&self) -> bool {
        *self == Status::Running
    }
}

/// Why a leaf evaluation failed, for failures that did not come from the
/// callable itself returning false.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The owning session vanished, or the leaf was never registered.
    LeafUnavailable,
    /// The worker reported an error while evaluating the callable.
    RemoteError,
    /// The invocation deadline elapsed before a reply arrived.
    Timeout,
    /// The run was cancelled while the invocation was outstanding.
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::LeafUnavailable => "leaf_unavailable",
            FailureReason::RemoteError => "remote_error",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// The value produced by one tick of a node.
///
/// `reason` is only ever set when `status` is [`Status::Failure`]; `value`
/// carries the raw boolean of a leaf evaluation when there was one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl Outcome {
    pub fn success() -> Self {
        Outcome {
            status: Status::Success,
            value: None,
            reason: None,
        }
    }
    pub fn failure() -> Self {
        Outcome {
            status: Status::Failure,
            value: None,
            reason: None,
        }
    }
    pub fn running() -> Self {
        Outcome {
            status: Status::Running,
            value: None,
            reason: None,
        }
    }
    pub fn failure_with(reason: FailureReason) -> Self {
        Outcome {
            status: Status::Failure,
            value: None,
            reason: Some(reason),
        }
    }
    /// A leaf evaluation result; true maps to success, false to failure.
    pub fn from_bool(value: bool) -> Self {
        Outcome {
            status: if value {
                Status::Success
            } else {
                Status::Failure
            },
            value: Some(value),
            reason: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

/// Error produced by a leaf invocation before the callable even ran.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("leaf '{0}' is not available")]
    LeafUnavailable(String),
    #[error("remote evaluation failed: {0}")]
    Remote(String),
    #[error("invocation deadline elapsed")]
    Timeout,
    #[error("invocation cancelled")]
    Cancelled,
}

impl InvokeError {
    pub fn reason(&self) -> FailureReason {
        match self {
            InvokeError::LeafUnavailable(_) => FailureReason::LeafUnavailable,
            InvokeError::Remote(_) => FailureReason::RemoteError,
            InvokeError::Timeout => FailureReason::Timeout,
            InvokeError::Cancelled => FailureReason::Cancelled,
        }
    }
}

/// The seam between tree evaluation and wherever the callables live.
#[async_trait]
pub trait LeafInvoker: Send + Sync {
    /// Evaluate the named leaf and return its boolean verdict.
    async fn invoke(&self, name: &str) -> Result<bool, InvokeError>;
}

/// Everything a node may touch during one tick: the run's evaluation
/// history, the leaf invocation seam and the cancellation token.
pub struct TickContext<'a> {
    pub context: &'a mut Context,
    invoker: &'a dyn LeafInvoker,
    cancel: &'a CancellationToken,
}

impl<'a> TickContext<'a> {
    pub fn new(
        context: &'a mut Context,
        invoker: &'a dyn LeafInvoker,
        cancel: &'a CancellationToken,
    ) -> Self {
        TickContext {
            context,
            invoker,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Invoke a leaf, racing the reply against cancellation of the run.
    pub async fn invoke(&self, name: &str) -> Result<bool, InvokeError> {
        if self.cancel.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(InvokeError::Cancelled),
            res = self.invoker.invoke(name) => res,
        }
    }
}

/// Trait that nodes must implement.
#[async_trait]
pub trait Node: std::fmt::Debug + Send {
    /// One unit of evaluation. The `Err` variant is reserved for faults
    /// that invalidate the tree itself; anything recoverable is a
    /// [`Status::Failure`] in the returned [`Outcome`].
    async fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<Outcome, NodeError>;

    /// Clear resumption state so the next tick starts from scratch.
    fn reset(&mut self) {}
}
