//! One session per connected peer, plus the router that carries leaf
//! invocations to the owning session.
//!
//! All outbound traffic for a session funnels through one writer channel,
//! so frames never interleave. Inbound invocation replies are matched
//! against the pending table by request id; an id that is not pending is a
//! late reply and is dropped.

use crate::protocol::{InvokeReply, Request, Response};
use crate::registry::LeafRegistry;
use crate::SessionId;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use salix_core::{InvokeError, LeafInvoker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub struct Session {
    id: SessionId,
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<bool, InvokeError>>>>,
    next_request_id: AtomicU64,
}

impl Session {
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<String>) -> Self {
        Session {
            id,
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a frame on the session's writer. Returns whether the peer is
    /// still reachable.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    pub fn send_response(&self, response: &Response) {
        match serde_json::to_string(response) {
            Ok(text) => {
                if !self.send(text) {
                    tracing::debug!(session = %self.id, "response dropped, peer gone");
                }
            }
            Err(e) => tracing::error!(session = %self.id, "response serialization failed: {e}"),
        }
    }

    /// Perform one request/response exchange with the worker behind this
    /// session.
    pub async fn invoke(&self, name: &str, deadline: Duration) -> Result<bool, InvokeError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        let frame = Request::InvokeFunc {
            name: name.to_string(),
            request_id: Some(request_id),
        };
        let encoded = serde_json::to_string(&frame)
            .map_err(|e| InvokeError::Remote(format!("encode failed: {e}")))?;
        if !self.send(encoded) {
            self.pending.lock().remove(&request_id);
            return Err(InvokeError::LeafUnavailable(name.to_string()));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped: the session was torn down under us.
            Ok(Err(_)) => Err(InvokeError::LeafUnavailable(name.to_string())),
            Err(_elapsed) => {
                // Orphan the id; a reply that still arrives is dropped.
                self.pending.lock().remove(&request_id);
                Err(InvokeError::Timeout)
            }
        }
    }

    /// Complete the pending request matching the reply. Returns false for
    /// late or unknown ids.
    pub fn complete(&self, reply: InvokeReply) -> bool {
        let Some(tx) = self.pending.lock().remove(&reply.request_id) else {
            return false;
        };
        let _ = tx.send(reply.into_result());
        true
    }

    /// Drop every pending request; their waiters observe the session as
    /// gone.
    pub fn fail_pending(&self) {
        self.pending.lock().clear();
    }
}

#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id(), session);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Finds the session owning a leaf and performs the exchange.
pub struct Router {
    registry: Arc<LeafRegistry>,
    sessions: Arc<SessionTable>,
    invoke_timeout: Duration,
}

impl Router {
    pub fn new(
        registry: Arc<LeafRegistry>,
        sessions: Arc<SessionTable>,
        invoke_timeout: Duration,
    ) -> Self {
        Router {
            registry,
            sessions,
            invoke_timeout,
        }
    }
}

#[async_trait]
impl LeafInvoker for Router {
    async fn invoke(&self, name: &str) -> Result<bool, InvokeError> {
        let record = self
            .registry
            .resolve(name)
            .ok_or_else(|| InvokeError::LeafUnavailable(name.to_string()))?;
        let session = self
            .sessions
            .get(record.session)
            .ok_or_else(|| InvokeError::LeafUnavailable(name.to_string()))?;
        session.invoke(name, self.invoke_timeout).await
    }
}
