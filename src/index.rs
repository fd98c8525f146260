//! Session index of step definitions, keyed by resource.
//!
//! The coordinator is the only writer. Every write replaces a whole
//! `Arc<IndexEntry>` under the map's shard lock, so concurrent readers observe
//! either the previous entry or the new one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::{Resource, StepDefinition};

/// Definitions found by the most recent scan of one resource
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub definitions: Vec<StepDefinition>,
    /// Monotonic across the index; a larger value is a newer scan
    pub generation: u64,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct StepDefinitionIndex {
    entries: DashMap<Resource, Arc<IndexEntry>>,
    generation: AtomicU64,
}

impl StepDefinitionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `resource`, returning the new generation.
    ///
    /// An empty `definitions` still stores an entry: the resource was scanned
    /// and legitimately contains nothing.
    pub fn put(&self, resource: &Resource, definitions: Vec<StepDefinition>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Arc::new(IndexEntry {
            definitions,
            generation,
            scanned_at: Utc::now(),
        });
        self.entries.insert(resource.clone(), entry);
        generation
    }

    pub fn get(&self, resource: &Resource) -> Option<Arc<IndexEntry>> {
        self.entries.get(resource).map(|e| Arc::clone(e.value()))
    }

    pub fn definitions(&self, resource: &Resource) -> Option<Vec<StepDefinition>> {
        self.get(resource).map(|e| e.definitions.clone())
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        self.entries.contains_key(resource)
    }

    /// Drop the entry for one resource; it becomes absent
    pub fn clean_resource(&self, resource: &Resource) -> bool {
        self.entries.remove(resource).is_some()
    }

    /// Drop every entry belonging to `project`
    pub fn clean_project(&self, project: &str) {
        self.entries.retain(|resource, _| resource.project != project);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of the whole index, ordered by resource
    pub fn all(&self) -> BTreeMap<Resource, Arc<IndexEntry>> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Snapshot of one project's entries, ordered by resource
    pub fn project_entries(&self, project: &str) -> BTreeMap<Resource, Arc<IndexEntry>> {
        self.entries
            .iter()
            .filter(|e| e.key().project == project)
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Every definition of `project`, in resource order then declaration order
    pub fn project_definitions(&self, project: &str) -> Vec<StepDefinition> {
        self.project_entries(project)
            .values()
            .flat_map(|e| e.definitions.iter().cloned())
            .collect()
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
    use crate::model::CodeLocation;

    fn def(resource: &Resource, pattern: &str) -> StepDefinition {
        StepDefinition {
            pattern: pattern.to_string(),
            location: CodeLocation::new("Steps", "step"),
            resource: resource.clone(),
        }
    }

    #[test]
    fn test_put_replaces_previous_definitions() {
        let index = StepDefinitionIndex::new();
        let r = Resource::new("p", "/p/A.java");
        index.put(&r, vec![def(&r, "old one"), def(&r, "old two")]);
        index.put(&r, vec![def(&r, "new")]);
        let defs = index.definitions(&r).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].pattern, "new");
    }

    #[test]
    fn test_generations_increase() {
        let index = StepDefinitionIndex::new();
        let r = Resource::new("p", "/p/A.java");
        let g1 = index.put(&r, vec![]);
        let g2 = index.put(&r, vec![]);
        assert!(g2 > g1);
        assert_eq!(index.get(&r).unwrap().generation, g2);
    }

    #[test]
    fn test_empty_scan_is_present_clean_is_absent() {
        let index = StepDefinitionIndex::new();
        let r = Resource::new("p", "/p/A.java");
        index.put(&r, vec![]);
        assert_eq!(index.definitions(&r), Some(vec![]));
        assert!(index.clean_resource(&r));
        assert!(index.get(&r).is_none());
        assert!(!index.clean_resource(&r));
    }

    #[test]
    fn test_clean_project_leaves_other_projects() {
        let index = StepDefinitionIndex::new();
        let a = Resource::new("a", "/a/A.java");
        let b = Resource::new("b", "/b/B.java");
        index.put(&a, vec![def(&a, "x")]);
        index.put(&b, vec![def(&b, "y")]);
        index.clean_project("a");
        assert!(!index.contains(&a));
        assert!(index.contains(&b));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_project_definitions_are_ordered_by_resource() {
        let index = StepDefinitionIndex::new();
        let z = Resource::new("p", "/p/Z.java");
        let a = Resource::new("p", "/p/A.java");
        index.put(&z, vec![def(&z, "z1")]);
        index.put(&a, vec![def(&a, "a1"), def(&a, "a2")]);
        let patterns: Vec<_> = index
            .project_definitions("p")
            .into_iter()
            .map(|d| d.pattern)
            .collect();
        assert_eq!(patterns, vec!["a1", "a2", "z1"]);
    }

    #[test]
    fn test_readers_hold_their_snapshot_across_writes() {
        let index = StepDefinitionIndex::new();
        let r = Resource::new("p", "/p/A.java");
        index.put(&r, vec![def(&r, "before")]);
        let held = index.get(&r).unwrap();
        index.put(&r, vec![def(&r, "after"), def(&r, "after 2")]);
        assert_eq!(held.definitions.len(), 1);
        assert_eq!(held.definitions[0].pattern, "before");
        assert_eq!(index.get(&r).unwrap().definitions.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_entries() {
        let index = Arc::new(StepDefinitionIndex::new());
        let r = Resource::new("p", "/p/A.java");
        index.put(&r, (0..10).map(|i| def(&r, &format!("s{i}"))).collect());

        let writer = {
            let index = Arc::clone(&index);
            let r = r.clone();
            std::thread::spawn(move || {
                for round in 0..200 {
                    let n = if round % 2 == 0 { 20 } else { 10 };
                    index.put(&r, (0..n).map(|i| def(&r, &format!("s{i}"))).collect());
                }
            })
        };
        let reader = {
            let index = Arc::clone(&index);
            let r = r.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let len = index.get(&r).unwrap().definitions.len();
                    assert!(len == 10 || len == 20);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }
}
