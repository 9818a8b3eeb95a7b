//! Which session owns which callable name.
//!
//! The registry is authoritative and names are unique across the whole
//! coordinator. It stores no callables; those live in the workers. A tree
//! may keep referencing a name whose owning session is long gone, in which
//! case resolution fails at tick time instead of here.

use crate::protocol::ApiError;
use crate::SessionId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    Action,
    Condition,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LeafRecord {
    pub kind: LeafKind,
    pub session: SessionId,
}

#[derive(Debug, Default)]
pub struct LeafRegistry {
    records: RwLock<HashMap<String, LeafRecord>>,
}

impl LeafRegistry {
    pub fn new() -> Self {
        LeafRegistry::default()
    }

    /// Record ownership of `name` by `session`.
    pub fn register(
        &self,
        name: &str,
        kind: LeafKind,
        session: SessionId,
    ) -> Result<(), ApiError> {
        let mut records = self.records.write();
        if records.contains_key(name) {
            return Err(ApiError::DuplicateLeaf(name.to_string()));
        }
        records.insert(name.to_string(), LeafRecord { kind, session });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<LeafRecord> {
        self.records.read().get(name).copied()
    }

    /// True iff `name` is registered with the given kind.
    pub fn contains(&self, name: &str, kind: LeafKind) -> bool {
        self.resolve(name).map(|r| r.kind == kind).unwrap_or(false)
    }

    /// Registered names of one kind, sorted for stable listings.
    pub fn names(&self, kind: LeafKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .read()
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop every registration owned by the session; returns the removed
    /// names.
    pub fn remove_session(&self, session: SessionId) -> Vec<String> {
        let mut records = self.records.write();
        let removed: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.session == session)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &removed {
            records.remove(name);
        }
        removed
    }
}
