//! Tree storage and per-tree run bookkeeping.
//!
//! The built root and its context sit behind an async mutex that the run
//! task holds for the whole run; runs are single-entry. The run state and
//! cancellation token live outside that mutex so `stop_tree` can interrupt
//! without waiting for the run to yield.

use crate::protocol::{ApiError, NodeSpec};
use parking_lot::Mutex;
use salix_core::{Context, Node};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Cancelled,
}

#[derive(Debug)]
pub struct BuiltTree {
    pub root: Box<dyn Node>,
    pub context: Context,
}

#[derive(Debug)]
struct RunControl {
    state: RunState,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct TreeEntry {
    id: String,
    spec: Mutex<NodeSpec>,
    pub tree: tokio::sync::Mutex<BuiltTree>,
    run: Mutex<RunControl>,
}

impl TreeEntry {
    fn new(id: &str, spec: NodeSpec, root: Box<dyn Node>) -> Self {
        TreeEntry {
            id: id.to_string(),
            spec: Mutex::new(spec),
            tree: tokio::sync::Mutex::new(BuiltTree {
                root,
                context: Context::new(),
            }),
            run: Mutex::new(RunControl {
                state: RunState::Idle,
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec(&self) -> NodeSpec {
        self.spec.lock().clone()
    }

    pub fn run_state(&self) -> RunState {
        self.run.lock().state
    }

    /// Swap in a freshly built root; the context starts over.
    /// Waits for an in-flight run to finish.
    pub async fn replace(&self, spec: NodeSpec, root: Box<dyn Node>) {
        let mut tree = self.tree.lock().await;
        tree.root = root;
        tree.context = Context::new();
        *self.spec.lock() = spec;
    }

    /// Claim the tree for a run. Runs are single-entry; a second claim
    /// while one is in flight is rejected.
    pub fn begin_run(&self) -> Result<RunGuard<'_>, ApiError> {
        let mut run = self.run.lock();
        if run.state != RunState::Idle {
            return Err(ApiError::TreeBusy(self.id.clone()));
        }
        run.state = RunState::Running;
        run.token = CancellationToken::new();
        Ok(RunGuard {
            entry: self,
            token: run.token.clone(),
        })
    }

    /// Cancel an in-flight run. Returns whether there was one.
    pub fn interrupt(&self) -> bool {
        let mut run = self.run.lock();
        if run.state == RunState::Running {
            run.state = RunState::Cancelled;
            run.token.cancel();
            true
        } else {
            false
        }
    }
}

/// Holds the tree's running claim; dropping it returns the tree to idle.
#[derive(Debug)]
pub struct RunGuard<'a> {
    entry: &'a TreeEntry,
    token: CancellationToken,
}

impl RunGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn was_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.entry.run.lock().state = RunState::Idle;
    }
}

#[derive(Default)]
pub struct TreeStore {
    trees: Mutex<HashMap<String, Arc<TreeEntry>>>,
}

impl TreeStore {
    pub fn new() -> Self {
        TreeStore::default()
    }

    pub fn insert(
        &self,
        id: &str,
        spec: NodeSpec,
        root: Box<dyn Node>,
    ) -> Result<Arc<TreeEntry>, ApiError> {
        let mut trees = self.trees.lock();
        if trees.contains_key(id) {
            return Err(ApiError::DuplicateTree(id.to_string()));
        }
        let entry = Arc::new(TreeEntry::new(id, spec, root));
        trees.insert(id.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<Arc<TreeEntry>, ApiError> {
        self.trees
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::UnknownTree(id.to_string()))
    }

    /// Remove the tree, cancelling any in-flight run.
    pub fn remove(&self, id: &str) -> Result<Arc<TreeEntry>, ApiError> {
        let entry = self
            .trees
            .lock()
            .remove(id)
            .ok_or_else(|| ApiError::UnknownTree(id.to_string()))?;
        entry.interrupt();
        Ok(entry)
    }

    /// Remove every tree; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut trees = self.trees.lock();
        for entry in trees.values() {
            entry.interrupt();
        }
        let count = trees.len();
        trees.clear();
        count
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.trees.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
