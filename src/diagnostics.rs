//! Diagnostic sink consumed by the build coordinator.

use dashmap::DashMap;

use crate::model::{Diagnostic, Resource};

/// Where scan diagnostics go. The host renders them; the core only writes.
pub trait DiagnosticSink: Send + Sync {
    /// Remove every diagnostic previously reported for `resource`
    fn clean_markers(&self, resource: &Resource);

    /// Remove every diagnostic of `project`
    fn clean_project(&self, project: &str);

    fn report(&self, resource: &Resource, diagnostic: Diagnostic);
}

/// In-memory sink, used by the CLI and by tests
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    markers: DashMap<Resource, Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &Resource) -> Vec<Diagnostic> {
        self.markers
            .get(resource)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    /// All diagnostics of `project`, ordered by resource
    pub fn project(&self, project: &str) -> Vec<Diagnostic> {
        let mut entries: Vec<(Resource, Vec<Diagnostic>)> = self
            .markers
            .iter()
            .filter(|e| e.key().project == project)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().flat_map(|(_, d)| d).collect()
    }

    pub fn len(&self) -> usize {
        self.markers.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn clean_markers(&self, resource: &Resource) {
        self.markers.remove(resource);
    }

    fn clean_project(&self, project: &str) {
        self.markers.retain(|resource, _| resource.project != project);
    }

    fn report(&self, resource: &Resource, diagnostic: Diagnostic) {
        self.markers
            .entry(resource.clone())
            .or_default()
            .push(diagnostic);
    }
}
