//! Per-run evaluation history.
//!
//! One entry per leaf, updated in place, with insertion order preserved so
//! the log stays auditable. `execute_once` decisions read straight from
//! [`Context::has_completed`].

use crate::Status;
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq)]
pub struct ContextEntry {
    pub leaf: String,
    pub status: Status,
    pub timestamp: SystemTime,
}

impl ContextEntry {
    /// An entry timestamped now.
    pub fn new(leaf: impl Into<String>, status: Status) -> Self {
        ContextEntry {
            leaf: leaf.into(),
            status,
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Context {
    entries: Vec<ContextEntry>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    fn position(&self, leaf: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.leaf == leaf)
    }

    /// Insert the entry if no entry for that leaf exists yet.
    /// Returns whether the entry was inserted.
    pub fn save(&mut self, entry: ContextEntry) -> bool {
        if self.position(&entry.leaf).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Replace the entry for the leaf in place, inserting it otherwise.
    pub fn update(&mut self, entry: ContextEntry) {
        match self.position(&entry.leaf) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, leaf: &str) -> Option<ContextEntry> {
        let idx = self.position(leaf)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(&self, leaf: &str) -> Option<&ContextEntry> {
        self.position(leaf).map(|idx| &self.entries[idx])
    }

    /// Entries matching the predicate, in insertion order.
    pub fn query(&self, predicate: impl Fn(&ContextEntry) -> bool) -> Vec<&ContextEntry> {
        self.entries.iter().filter(|e| predicate(e)).collect()
    }

    /// True iff the leaf has an entry with [`Status::Success`].
    pub fn has_completed(&self, leaf: &str) -> bool {
        self.get(leaf).map(|e| e.status.is_success()).unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_does_not_overwrite() {
        let mut ctx = Context::new();
        assert!(ctx.save(ContextEntry::new("a", Status::Failure)));
        assert!(!ctx.save(ContextEntry::new("a", Status::Success)));
        assert_eq!(ctx.get("a").unwrap().status, Status::Failure);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn update_replaces_in_place() {
        let mut ctx = Context::new();
        ctx.update(ContextEntry::new("a", Status::Failure));
        ctx.update(ContextEntry::new("b", Status::Success));
        ctx.update(ContextEntry::new("a", Status::Success));
        // One entry per leaf, insertion order preserved.
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.entries()[0].leaf, "a");
        assert_eq!(ctx.entries()[0].status, Status::Success);
        assert_eq!(ctx.entries()[1].leaf, "b");
    }

    #[test]
    fn has_completed_requires_success() {
        let mut ctx = Context::new();
        assert!(!ctx.has_completed("a"));
        ctx.update(ContextEntry::new("a", Status::Failure));
        assert!(!ctx.has_completed("a"));
        ctx.update(ContextEntry::new("a", Status::Success));
        assert!(ctx.has_completed("a"));
        ctx.remove("a");
        assert!(!ctx.has_completed("a"));
    }

    #[test]
    fn query_filters() {
        let mut ctx = Context::new();
        ctx.update(ContextEntry::new("a", Status::Success));
        ctx.update(ContextEntry::new("b", Status::Failure));
        ctx.update(ContextEntry::new("c", Status::Success));
        let succeeded = ctx.query(|e| e.status.is_success());
        assert_eq!(
            succeeded.iter().map(|e| e.leaf.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(ctx.query(|_| true).len(), 3);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut ctx = Context::new();
        ctx.update(ContextEntry::new("a", Status::Success));
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
