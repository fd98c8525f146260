//! Build coordination: deciding what to rescan for a trigger and driving the
//! providers over it.
//!
//! The coordinator is the only writer of the index and the diagnostics sink.
//! Builds of one project must not overlap; [`queue::BuildQueue`] serializes
//! them per project.

pub mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticSink;
use crate::error::IndexError;
use crate::index::StepDefinitionIndex;
use crate::model::{BuildReport, BuildTrigger, ChangeKind, FailureEntry, Resource};
use crate::provider_registry::ProviderRegistry;
use crate::workspace::Workspace;

pub use queue::{BuildQueue, BuildTicket};

pub struct BuildCoordinator {
    workspace: Arc<Workspace>,
    registry: Arc<ProviderRegistry>,
    index: Arc<StepDefinitionIndex>,
    diagnostics: Arc<dyn DiagnosticSink>,
    enabled: AtomicBool,
}

impl BuildCoordinator {
    pub fn new(
        workspace: Arc<Workspace>,
        registry: Arc<ProviderRegistry>,
        index: Arc<StepDefinitionIndex>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            workspace,
            registry,
            index,
            diagnostics,
            enabled: AtomicBool::new(true),
        }
    }

    /// Preference gate, consulted once at the start of every build
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn index(&self) -> &StepDefinitionIndex {
        &self.index
    }

    /// Run one build of `project`.
    ///
    /// Cancellation is checked between resources only: a resource is either
    /// scanned and committed or not attempted. Resources already committed
    /// stay committed.
    pub async fn build(
        &self,
        project: &str,
        trigger: &BuildTrigger,
        cancel: &CancellationToken,
    ) -> Result<BuildReport, IndexError> {
        let mut report = BuildReport::new(project, trigger);

        if !self.is_enabled() {
            debug!(project, trigger = trigger.as_str(), "indexing disabled");
            report.skipped = true;
            return Ok(report);
        }
        let info = self
            .workspace
            .project(project)
            .ok_or_else(|| IndexError::UnknownProject(project.to_string()))?;
        if !info.open {
            debug!(project, "project closed");
            report.skipped = true;
            return Ok(report);
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        info!(project, trigger = trigger.as_str(), "build started");
        match trigger {
            BuildTrigger::Full => {
                // Enumerate before cleaning so a walk failure leaves the index intact
                let resources = self.workspace.resources(project)?;
                self.registry.clean();
                self.index.clean_project(project);
                self.diagnostics.clean_project(project);
                for resource in &resources {
                    if cancel.is_cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    self.visit(resource, &mut report).await;
                }
            }
            BuildTrigger::Incremental(deltas) => {
                for delta in deltas {
                    if cancel.is_cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    if delta.resource.project != project {
                        debug!(project, resource = %delta.resource, "delta outside project");
                        continue;
                    }
                    match delta.kind {
                        // Full builds never enumerate excluded resources
                        ChangeKind::Added | ChangeKind::Changed
                            if self.workspace.is_excluded(&delta.resource) =>
                        {
                            debug!(
                                project,
                                resource = %delta.resource,
                                "delta in excluded directory"
                            );
                            self.remove(&delta.resource, &mut report);
                        }
                        ChangeKind::Added | ChangeKind::Changed => {
                            self.visit(&delta.resource, &mut report).await;
                        }
                        ChangeKind::Removed => self.remove(&delta.resource, &mut report),
                    }
                }
            }
            BuildTrigger::Clean => {
                report.removed = self.index.project_entries(project).len();
                self.registry.clean();
                self.index.clean_project(project);
                self.diagnostics.clean_project(project);
            }
        }

        if report.cancelled {
            info!(project, visited = report.visited, "build cancelled");
        } else {
            info!(
                project,
                visited = report.visited,
                scanned = report.scanned,
                removed = report.removed,
                failures = report.failures.len(),
                "build finished"
            );
        }
        Ok(report)
    }

    /// Clean, rescan and commit one resource
    async fn visit(&self, resource: &Resource, report: &mut BuildReport) {
        report.visited += 1;
        self.diagnostics.clean_markers(resource);

        let Some(provider) = self.registry.provider_for(resource) else {
            // Not a step-definition source (any more)
            if self.index.clean_resource(resource) {
                report.removed += 1;
            }
            return;
        };

        match provider.find_step_definitions(resource).await {
            Ok(output) => {
                debug!(
                    resource = %resource,
                    provider = provider.provider_name(),
                    definitions = output.definitions.len(),
                    "scanned"
                );
                self.index.put(resource, output.definitions);
                for diagnostic in output.diagnostics {
                    self.diagnostics.report(resource, diagnostic);
                }
                report.scanned += 1;
            }
            Err(e) => {
                let err = IndexError::ScanFailure {
                    resource: resource.to_string(),
                    message: format!("{e:#}"),
                };
                warn!(error = %err, "scan failed");
                self.index.clean_resource(resource);
                report.failures.push(FailureEntry {
                    resource: resource.to_string(),
                    message: format!("{e:#}"),
                });
            }
        }
    }

    fn remove(&self, resource: &Resource, report: &mut BuildReport) {
        report.visited += 1;
        self.diagnostics.clean_markers(resource);
        if self.index.clean_resource(resource) {
            report.removed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::diagnostics::MemoryDiagnostics;
    use crate::model::{CodeLocation, Diagnostic, ResourceDelta, Severity, StepDefinition};
    use crate::provider::{pattern::PatternProvider, ScanOutput, StepDefinitionProvider};
    use crate::workspace::Project;
    use anyhow::Context;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// Reads `.steps` files: one `pattern|Type|method` per line, `FAIL` aborts the scan
    struct LineSteps {
        scans: Arc<AtomicUsize>,
        cleaned: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StepDefinitionProvider for LineSteps {
        fn provider_name(&self) -> &str {
            "lines"
        }

        fn can_handle(&self, resource: &Resource) -> bool {
            resource.extension().as_deref() == Some("steps")
        }

        fn clean(&self) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
        }

        async fn find_step_definitions(&self, resource: &Resource) -> anyhow::Result<ScanOutput> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            let text = tokio::fs::read_to_string(resource.path())
                .await
                .with_context(|| format!("reading {}", resource.path().display()))?;
            let mut out = ScanOutput::default();
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                if line == "FAIL" {
                    anyhow::bail!("scanner crashed");
                }
                if line == "WARN" {
                    out.diagnostics.push(Diagnostic::new(
                        Severity::Warning,
                        "suspicious",
                        resource.clone(),
                    ));
                    continue;
                }
                let mut parts = line.splitn(3, '|');
                let pattern = parts.next().unwrap_or_default();
                let ty = parts.next().unwrap_or_default();
                let method = parts.next().unwrap_or_default();
                out.definitions.push(StepDefinition {
                    pattern: pattern.to_string(),
                    location: CodeLocation::new(ty, method),
                    resource: resource.clone(),
                });
            }
            Ok(out)
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        coordinator: BuildCoordinator,
        registry: Arc<ProviderRegistry>,
        index: Arc<StepDefinitionIndex>,
        diagnostics: Arc<MemoryDiagnostics>,
        scans: Arc<AtomicUsize>,
        cleaned: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            Self::with_projects(files, |_| {})
        }

        fn with_projects(files: &[(&str, &str)], extra: impl FnOnce(&mut Workspace)) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for (name, content) in files {
                write(dir.path(), name, content);
            }
            let mut workspace = Workspace::new(vec!["target".to_string()]);
            workspace.add_project(Project::new("p", dir.path()));
            extra(&mut workspace);

            let scans = Arc::new(AtomicUsize::new(0));
            let cleaned = Arc::new(AtomicUsize::new(0));
            let mut registry = ProviderRegistry::new();
            registry.register(Box::new(LineSteps {
                scans: Arc::clone(&scans),
                cleaned: Arc::clone(&cleaned),
            }));
            registry.register(Box::new(
                PatternProvider::from_config(&ProviderConfig::java()).unwrap(),
            ));

            let index = Arc::new(StepDefinitionIndex::new());
            let diagnostics = Arc::new(MemoryDiagnostics::new());
            let registry = Arc::new(registry);
            let coordinator = BuildCoordinator::new(
                Arc::new(workspace),
                Arc::clone(&registry),
                Arc::clone(&index),
                diagnostics.clone(),
            );
            Self {
                dir,
                coordinator,
                registry,
                index,
                diagnostics,
                scans,
                cleaned,
            }
        }

        fn resource(&self, name: &str) -> Resource {
            Resource::new("p", self.dir.path().join(name))
        }

        fn write(&self, name: &str, content: &str) {
            write(self.dir.path(), name, content);
        }

        async fn build(&self, trigger: BuildTrigger) -> BuildReport {
            self.coordinator
                .build("p", &trigger, &CancellationToken::new())
                .await
                .unwrap()
        }

        fn snapshot(&self) -> Vec<(Resource, Vec<StepDefinition>)> {
            self.index
                .all()
                .into_iter()
                .map(|(r, e)| (r, e.definitions.clone()))
                .collect()
        }

        fn patterns(&self, name: &str) -> Option<Vec<String>> {
            self.index
                .definitions(&self.resource(name))
                .map(|defs| defs.into_iter().map(|d| d.pattern).collect())
        }
    }

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn changed(fx: &Fixture, name: &str, kind: ChangeKind) -> ResourceDelta {
        ResourceDelta::new(fx.resource(name), kind)
    }

    const F1: &str = r#"public class Steps {
    @Given("I have {int} cukes")
    public void haveCukes(int count) {}
}
"#;

    #[tokio::test]
    async fn test_full_build_then_removal() {
        let fx = Fixture::new(&[("src/Steps.java", F1)]);
        let f1 = fx.resource("src/Steps.java");

        let report = fx.build(BuildTrigger::Full).await;
        assert_eq!(report.scanned, 1);
        assert_eq!(
            fx.index.definitions(&f1).unwrap(),
            vec![StepDefinition {
                pattern: "I have {int} cukes".to_string(),
                location: CodeLocation::new("Steps", "haveCukes"),
                resource: f1.clone(),
            }]
        );

        std::fs::remove_file(f1.path()).unwrap();
        let report = fx
            .build(BuildTrigger::Incremental(vec![ResourceDelta::new(
                f1.clone(),
                ChangeKind::Removed,
            )]))
            .await;
        assert_eq!(report.removed, 1);
        assert!(fx.index.get(&f1).is_none());
    }

    #[tokio::test]
    async fn test_full_build_is_idempotent() {
        let fx = Fixture::new(&[
            ("a.steps", "one|A|a\ntwo|A|b"),
            ("b.steps", "three|B|c"),
            ("src/Steps.java", F1),
            ("README.md", "not steps"),
        ]);
        fx.build(BuildTrigger::Full).await;
        let first = fx.snapshot();
        fx.build(BuildTrigger::Full).await;
        assert_eq!(fx.snapshot(), first);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn test_incremental_touches_only_the_delta() {
        let fx = Fixture::new(&[("a.steps", "one|A|a"), ("b.steps", "two|B|b")]);
        fx.build(BuildTrigger::Full).await;
        let untouched = fx.index.get(&fx.resource("b.steps")).unwrap();

        fx.write("a.steps", "uno|A|a");
        fx.write("b.steps", "changed on disk but not in the delta|B|b");
        fx.write("c.steps", "three|C|c");
        fx.build(BuildTrigger::Incremental(vec![
            changed(&fx, "a.steps", ChangeKind::Changed),
            changed(&fx, "c.steps", ChangeKind::Added),
        ]))
        .await;

        assert_eq!(fx.patterns("a.steps").unwrap(), vec!["uno"]);
        assert_eq!(fx.patterns("c.steps").unwrap(), vec!["three"]);
        let after = fx.index.get(&fx.resource("b.steps")).unwrap();
        assert!(Arc::ptr_eq(&untouched, &after));
    }

    #[tokio::test]
    async fn test_rescan_leaves_no_stale_definitions() {
        let fx = Fixture::new(&[("a.steps", "one|A|a\ntwo|A|b")]);
        fx.build(BuildTrigger::Full).await;
        fx.write("a.steps", "three|A|c");
        fx.build(BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Changed)]))
            .await;
        assert_eq!(fx.patterns("a.steps").unwrap(), vec!["three"]);

        fx.write("a.steps", "");
        fx.build(BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Changed)]))
            .await;
        assert_eq!(fx.patterns("a.steps").unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_full_build_drops_deleted_resources() {
        let fx = Fixture::new(&[("a.steps", "one|A|a"), ("b.steps", "two|B|b")]);
        fx.build(BuildTrigger::Full).await;
        std::fs::remove_file(fx.resource("b.steps").path()).unwrap();
        fx.build(BuildTrigger::Full).await;
        assert!(fx.index.get(&fx.resource("b.steps")).is_none());
        assert!(fx.index.get(&fx.resource("a.steps")).is_some());
    }

    #[tokio::test]
    async fn test_scan_failure_does_not_stop_traversal() {
        let fx = Fixture::new(&[
            ("a.steps", "one|A|a"),
            ("b.steps", "two|B|b\nFAIL"),
            ("c.steps", "three|C|c"),
        ]);
        let report = fx.build(BuildTrigger::Full).await;
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("scanner crashed"));
        assert_eq!(report.scanned, 2);
        assert!(fx.index.get(&fx.resource("b.steps")).is_none());
        assert!(fx.index.get(&fx.resource("c.steps")).is_some());
    }

    #[tokio::test]
    async fn test_failed_rescan_removes_previous_entry() {
        let fx = Fixture::new(&[("a.steps", "one|A|a")]);
        fx.build(BuildTrigger::Full).await;
        fx.write("a.steps", "FAIL");
        let report = fx
            .build(BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Changed)]))
            .await;
        assert_eq!(report.failures.len(), 1);
        assert!(fx.index.get(&fx.resource("a.steps")).is_none());
    }

    #[tokio::test]
    async fn test_diagnostics_are_cleared_before_rescan() {
        let fx = Fixture::new(&[("a.steps", "WARN\none|A|a")]);
        fx.build(BuildTrigger::Full).await;
        let a = fx.resource("a.steps");
        assert_eq!(fx.diagnostics.get(&a).len(), 1);

        fx.write("a.steps", "FAIL");
        fx.build(BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Changed)]))
            .await;
        assert!(fx.diagnostics.get(&a).is_empty());
    }

    #[tokio::test]
    async fn test_provider_diagnostics_reach_the_sink() {
        let java = r#"public class Steps {
    @Given("I have {int cukes")
    public void broken() {}
}
"#;
        let fx = Fixture::new(&[("Steps.java", java)]);
        fx.build(BuildTrigger::Full).await;
        let diags = fx.diagnostics.get(&fx.resource("Steps.java"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_clean_build_empties_project_without_scanning() {
        let fx = Fixture::new(&[("a.steps", "WARN\none|A|a")]);
        fx.build(BuildTrigger::Full).await;
        let scans = fx.scans.load(Ordering::SeqCst);
        let cleaned = fx.cleaned.load(Ordering::SeqCst);
        assert!(fx.registry.matcher().is_match("one", "one"));
        assert!(!fx.registry.matcher().is_empty());

        let report = fx.build(BuildTrigger::Clean).await;
        assert_eq!(report.removed, 1);
        assert!(fx.index.is_empty());
        assert!(fx.diagnostics.is_empty());
        assert_eq!(fx.scans.load(Ordering::SeqCst), scans);
        assert!(fx.registry.matcher().is_empty());
        assert_eq!(fx.cleaned.load(Ordering::SeqCst), cleaned + 1);
    }

    #[tokio::test]
    async fn test_excluded_deltas_match_full_build_scope() {
        let fx = Fixture::new(&[("src/Steps.java", F1), ("target/Gen.java", F1)]);
        let generated = fx.resource("target/Gen.java");
        fx.build(BuildTrigger::Full).await;
        assert!(fx.index.get(&generated).is_none());

        let delta = changed(&fx, "target/Gen.java", ChangeKind::Added);
        let report = fx.build(BuildTrigger::Incremental(vec![delta])).await;
        assert_eq!(report.scanned, 0);
        assert!(fx.index.get(&generated).is_none());

        fx.build(BuildTrigger::Full).await;
        assert!(fx.index.get(&generated).is_none());
        assert!(fx.index.get(&fx.resource("src/Steps.java")).is_some());
    }

    #[tokio::test]
    async fn test_disabled_gate_touches_nothing() {
        let fx = Fixture::new(&[("a.steps", "WARN\none|A|a")]);
        fx.build(BuildTrigger::Full).await;
        let before = fx.snapshot();

        fx.coordinator.set_enabled(false);
        for trigger in [
            BuildTrigger::Full,
            BuildTrigger::Clean,
            BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Removed)]),
        ] {
            let report = fx.build(trigger).await;
            assert!(report.skipped);
        }
        assert_eq!(fx.snapshot(), before);
        assert_eq!(fx.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_project_is_skipped() {
        let fx = Fixture::with_projects(&[], |ws| {
            let mut closed = Project::new("closed", "/nowhere");
            closed.open = false;
            ws.add_project(closed);
        });
        let report = fx
            .coordinator
            .build("closed", &BuildTrigger::Full, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.skipped);
    }

    #[tokio::test]
    async fn test_unknown_project_is_an_error() {
        let fx = Fixture::new(&[]);
        let result = fx
            .coordinator
            .build("ghost", &BuildTrigger::Full, &CancellationToken::new())
            .await;
        assert_eq!(result.unwrap_err(), IndexError::UnknownProject("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_deltas_of_other_projects_are_ignored() {
        let fx = Fixture::new(&[("a.steps", "one|A|a")]);
        let foreign = Resource::new("other", fx.dir.path().join("a.steps"));
        let report = fx
            .build(BuildTrigger::Incremental(vec![ResourceDelta::new(
                foreign,
                ChangeKind::Added,
            )]))
            .await;
        assert_eq!(report.visited, 0);
        assert!(fx.index.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_resources() {
        let fx = Fixture::new(&[("a.steps", "one|A|a"), ("b.steps", "two|B|b")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fx
            .coordinator
            .build(
                "p",
                &BuildTrigger::Incremental(vec![changed(&fx, "a.steps", ChangeKind::Added)]),
                &cancel,
            )
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.visited, 0);
        assert_eq!(fx.scans.load(Ordering::SeqCst), 0);
    }

    /// Cancels its token after the first scan
    struct CancelAfterFirst {
        token: CancellationToken,
    }

    #[async_trait]
    impl StepDefinitionProvider for CancelAfterFirst {
        fn provider_name(&self) -> &str {
            "cancel"
        }

        fn can_handle(&self, _resource: &Resource) -> bool {
            true
        }

        async fn find_step_definitions(&self, resource: &Resource) -> anyhow::Result<ScanOutput> {
            self.token.cancel();
            Ok(ScanOutput {
                definitions: vec![StepDefinition {
                    pattern: "x".to_string(),
                    location: CodeLocation::default(),
                    resource: resource.clone(),
                }],
                diagnostics: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_cancelled_build_keeps_committed_resources() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            write(dir.path(), name, "");
        }
        let mut workspace = Workspace::default();
        workspace.add_project(Project::new("p", dir.path()));
        let token = CancellationToken::new();
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(CancelAfterFirst {
            token: token.clone(),
        }));
        let index = Arc::new(StepDefinitionIndex::new());
        let coordinator = BuildCoordinator::new(
            Arc::new(workspace),
            Arc::new(registry),
            Arc::clone(&index),
            Arc::new(MemoryDiagnostics::new()),
        );

        let report = coordinator.build("p", &BuildTrigger::Full, &token).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.visited, 1);
        assert_eq!(index.len(), 1);
        assert!(index.contains(&Resource::new("p", dir.path().join("a.txt"))));
    }
}
