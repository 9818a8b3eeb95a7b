//! The control plane: dispatches inbound commands against the registry,
//! the tree store and the session table.

use crate::builder::build_node;
use crate::protocol::{ApiError, ContextEntryView, Request, Response, TreeDescription};
use crate::registry::{LeafKind, LeafRegistry};
use crate::session::{Router, Session, SessionTable};
use crate::store::TreeStore;
use salix_core::{engine, Outcome};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct CoordinatorSettings {
    /// Per-call deadline for one leaf invocation.
    pub invoke_timeout: Duration,
    /// Pause between outer ticks while the root keeps running.
    pub tick_interval: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            invoke_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(50),
        }
    }
}

pub struct Coordinator {
    registry: Arc<LeafRegistry>,
    sessions: Arc<SessionTable>,
    trees: TreeStore,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(settings: CoordinatorSettings) -> Arc<Self> {
        Arc::new(Coordinator {
            registry: Arc::new(LeafRegistry::new()),
            sessions: Arc::new(SessionTable::new()),
            trees: TreeStore::new(),
            settings,
        })
    }

    pub(crate) fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    fn router(&self) -> Router {
        Router::new(
            self.registry.clone(),
            self.sessions.clone(),
            self.settings.invoke_timeout,
        )
    }

    pub async fn handle_request(&self, session: &Arc<Session>, request: Request) -> Response {
        match self.dispatch(session, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(session = %session.id(), "request failed: {e}");
                Response::from(&e)
            }
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<Session>,
        request: Request,
    ) -> Result<Response, ApiError> {
        match request {
            Request::RegisterAction { name } => {
                self.registry
                    .register(&name, LeafKind::Action, session.id())?;
                tracing::info!(session = %session.id(), "action '{name}' registered");
                Ok(Response::ok().with_message(format!("action '{name}' registered")))
            }
            Request::RegisterCondition { name } => {
                self.registry
                    .register(&name, LeafKind::Condition, session.id())?;
                tracing::info!(session = %session.id(), "condition '{name}' registered");
                Ok(Response::ok().with_message(format!("condition '{name}' registered")))
            }
            Request::CreateTree {
                tree_id,
                tree_structure,
            } => {
                let root = build_node(&tree_structure, &self.registry)?;
                self.trees.insert(&tree_id, tree_structure, root)?;
                tracing::info!("tree '{tree_id}' created");
                Ok(Response::ok().with_message(format!("tree '{tree_id}' created")))
            }
            Request::UpdateTree {
                tree_id,
                tree_structure,
            } => {
                let entry = self.trees.get(&tree_id)?;
                let root = build_node(&tree_structure, &self.registry)?;
                entry.replace(tree_structure, root).await;
                tracing::info!("tree '{tree_id}' updated");
                Ok(Response::ok().with_message(format!("tree '{tree_id}' updated")))
            }
            Request::DeleteTree { tree_id } => {
                self.trees.remove(&tree_id)?;
                tracing::info!("tree '{tree_id}' deleted");
                Ok(Response::ok().with_message(format!("tree '{tree_id}' deleted")))
            }
            Request::DeleteAllTree => {
                let dropped = self.trees.clear();
                tracing::info!("deleted all {dropped} trees");
                Ok(Response::ok().with_message(format!("{dropped} trees deleted")))
            }
            Request::RunTree { tree_id } => self.run_tree(&tree_id).await,
            Request::StopTree { tree_id } => {
                let entry = self.trees.get(&tree_id)?;
                let message = if entry.interrupt() {
                    tracing::info!("tree '{tree_id}' run cancelled");
                    format!("tree '{tree_id}' run cancelled")
                } else {
                    format!("tree '{tree_id}' was not running")
                };
                Ok(Response::ok().with_message(message))
            }
            Request::GetActions => {
                Ok(Response::ok().with_actions(self.registry.names(LeafKind::Action)))
            }
            Request::GetConditions => {
                Ok(Response::ok().with_conditions(self.registry.names(LeafKind::Condition)))
            }
            Request::GetTree { tree_id } => {
                let entry = self.trees.get(&tree_id)?;
                let root = entry.spec();
                // The run task owns the log while a run is in flight; the
                // structure is still served, the log comes back empty.
                let context = match entry.tree.try_lock() {
                    Ok(tree) => tree.context.entries().iter().map(ContextEntryView::from).collect(),
                    Err(_) => vec![],
                };
                Ok(Response::ok().with_tree(TreeDescription { root, context }))
            }
            Request::InvokeFunc { name, .. } => {
                use salix_core::LeafInvoker;
                let value = self.router().invoke(&name).await.map_err(ApiError::Invoke)?;
                Ok(Response::ok().with_result(Outcome::from_bool(value)))
            }
        }
    }

    async fn run_tree(&self, tree_id: &str) -> Result<Response, ApiError> {
        let entry = self.trees.get(tree_id)?;
        let guard = entry.begin_run()?;
        let router = self.router();
        let mut tree = entry.tree.lock().await;
        let tree = &mut *tree;
        tracing::info!("tree '{tree_id}' run started");
        let outcome = engine::run_to_completion(
            &mut tree.root,
            &mut tree.context,
            &router,
            guard.token(),
            self.settings.tick_interval,
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
        if guard.was_cancelled() {
            // A cancelled run must not leave resumption state behind.
            tree.root.reset();
        }
        tracing::info!("tree '{tree_id}' run finished: {:?}", outcome.status);
        Ok(Response::ok().with_result(outcome))
    }

    /// Release everything a departing session owned: pending waiters see
    /// the leaf as unavailable and its registrations disappear. In-flight
    /// trees are left alone; they observe the loss on their next
    /// invocation.
    pub fn close_session(&self, session: &Arc<Session>) {
        session.fail_pending();
        let removed = self.registry.remove_session(session.id());
        self.sessions.remove(session.id());
        tracing::info!(
            session = %session.id(),
            "session closed, {} registrations removed",
            removed.len()
        );
    }

    /// Build a tree description without going over the wire. Handy for
    /// embedding the coordinator.
    pub fn tree_ids(&self) -> Vec<String> {
        self.trees.ids()
    }
}
