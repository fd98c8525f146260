//! stepdef-index: incremental step-definition indexing and code-location resolution
//!
//! The index is session-scoped. An [`IndexContext`] is built once per host
//! session from a [`config::Config`] and threaded through builds and queries;
//! nothing in this crate is a process-wide singleton.

pub mod build;
pub mod config;
pub mod diagnostics;
pub mod docs;
pub mod error;
pub mod format;
pub mod index;
pub mod loading;
pub mod matcher;
pub mod model;
pub mod provider;
pub mod provider_registry;
pub mod resolve;
pub mod workspace;

use std::sync::Arc;

use anyhow::{Context, Result};

use build::{BuildCoordinator, BuildQueue};
use config::Config;
use diagnostics::MemoryDiagnostics;
use error::IndexError;
use index::StepDefinitionIndex;
use loading::{EmptyHost, HostLoader, IsolatedLoadingContext, SchemeFilter};
use model::{BuildTrigger, CodeLocation, Diagnostic};
use provider_registry::ProviderRegistry;
use resolve::{JsonTypeModel, Resolution, SymbolResolver};
use workspace::Workspace;

/// Everything one host session shares between builds and queries
pub struct IndexContext {
    workspace: Arc<Workspace>,
    registry: Arc<ProviderRegistry>,
    index: Arc<StepDefinitionIndex>,
    diagnostics: Arc<MemoryDiagnostics>,
    resolver: SymbolResolver,
    queue: BuildQueue,
    loading: IsolatedLoadingContext,
}

impl IndexContext {
    /// Build a context whose host contributes no resources of its own
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_host(config, Arc::new(EmptyHost))
    }

    pub fn with_host(config: &Config, host: Arc<dyn HostLoader>) -> Result<Self> {
        let workspace = Arc::new(Workspace::from_config(config));
        let registry = Arc::new(ProviderRegistry::from_config(&config.providers)?);
        let index = Arc::new(StepDefinitionIndex::new());
        let diagnostics = Arc::new(MemoryDiagnostics::new());

        let resolver = SymbolResolver::new(config.documentation.clone());
        for project in &config.projects {
            if let Some(path) = &project.type_model {
                let model = JsonTypeModel::load(path)
                    .with_context(|| format!("loading type model of project {}", project.name))?;
                resolver.set_model(&project.name, Arc::new(model));
            }
        }

        let coordinator = BuildCoordinator::new(
            Arc::clone(&workspace),
            Arc::clone(&registry),
            Arc::clone(&index),
            diagnostics.clone(),
        );
        coordinator.set_enabled(config.indexing.enabled);

        let filter = SchemeFilter::new(&config.loading.blocked_schemes);
        Ok(Self {
            workspace,
            registry,
            index,
            diagnostics,
            resolver,
            queue: BuildQueue::new(Arc::new(coordinator)),
            loading: IsolatedLoadingContext::new(host, Arc::new(filter)),
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn index(&self) -> &StepDefinitionIndex {
        &self.index
    }

    pub fn diagnostics(&self) -> &MemoryDiagnostics {
        &self.diagnostics
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    pub fn queue(&self) -> &BuildQueue {
        &self.queue
    }

    pub fn loading(&self) -> &IsolatedLoadingContext {
        &self.loading
    }

    fn require_project(&self, project: &str) -> Result<(), IndexError> {
        match self.workspace.project(project) {
            Some(_) => Ok(()),
            None => Err(IndexError::UnknownProject(project.to_string())),
        }
    }

    fn project_names(&self, project: Option<&str>) -> Result<Vec<String>, IndexError> {
        match project {
            Some(name) => {
                self.require_project(name)?;
                Ok(vec![name.to_string()])
            }
            None => Ok(self.workspace.projects().map(|p| p.name.clone()).collect()),
        }
    }
}

/// Run a build of one project, or of every project in parallel
///
/// # Arguments
/// * `project` - Project name (builds all projects if None)
/// * `trigger` - Full, incremental or clean
///
/// # Returns
/// One `BuildReport` per project, in project name order
pub async fn build_projects(
    ctx: &IndexContext,
    project: Option<&str>,
    trigger: BuildTrigger,
) -> Result<Vec<model::BuildReport>> {
    let tickets: Vec<_> = ctx
        .project_names(project)?
        .into_iter()
        .map(|name| ctx.queue.submit(&name, trigger.clone()))
        .collect();

    let mut reports = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        reports.push(ticket.wait().await?);
    }
    Ok(reports)
}

/// List indexed step definitions per resource
///
/// # Arguments
/// * `project` - Optional project name to limit the listing
///
/// # Returns
/// Vector of `ResourceEntry`, ordered by resource
pub fn list_definitions(
    ctx: &IndexContext,
    project: Option<&str>,
) -> Result<Vec<model::ResourceEntry>> {
    let entries = match project {
        Some(name) => {
            ctx.require_project(name)?;
            ctx.index.project_entries(name)
        }
        None => ctx.index.all(),
    };

    Ok(entries
        .into_iter()
        .map(|(resource, entry)| model::ResourceEntry {
            resource: resource.to_string(),
            generation: entry.generation,
            scanned_at: entry.scanned_at.to_rfc3339(),
            definitions: entry.definitions.iter().map(model::DefinitionEntry::from).collect(),
        })
        .collect())
}

/// Find the step definitions matching a line of step text
///
/// A leading Gherkin keyword (`Given`, `When`, ...) is ignored. Every match is
/// resolved against the project's type model.
///
/// # Arguments
/// * `text` - Step text, e.g. "Given I have 3 cukes"
/// * `project` - Project whose definitions are searched
///
/// # Returns
/// `FindResult` with every matching definition and its symbol candidates
pub fn find_steps(ctx: &IndexContext, text: &str, project: &str) -> Result<model::FindResult> {
    ctx.require_project(project)?;
    let definitions = ctx.index.project_definitions(project);

    let matches = ctx
        .registry
        .matcher()
        .find_matches(&definitions, text)
        .into_iter()
        .map(|definition| {
            let resolution = ctx.resolver.resolve(project, &definition.location);
            model::MatchEntry {
                pattern: definition.pattern.clone(),
                resource: definition.resource.to_string(),
                hover: docs::hover_content(&definition, &resolution),
                symbol: symbol_entry(&definition.location, &resolution),
            }
        })
        .collect();

    Ok(model::FindResult {
        text: text.to_string(),
        project: project.to_string(),
        matches,
    })
}

/// Resolve a code location to member candidates
///
/// # Arguments
/// * `project` - Project whose type model is consulted
/// * `location` - Declaring type and member name
///
/// # Returns
/// `SymbolEntry`; "not found" outcomes are statuses, not errors
pub fn resolve_symbol(
    ctx: &IndexContext,
    project: &str,
    location: &CodeLocation,
) -> Result<model::SymbolEntry> {
    ctx.require_project(project)?;
    let resolution = ctx.resolver.resolve(project, location);
    Ok(symbol_entry(location, &resolution))
}

fn symbol_entry(location: &CodeLocation, resolution: &Resolution) -> model::SymbolEntry {
    model::SymbolEntry {
        location: location.to_string(),
        status: resolution.status().to_string(),
        candidates: resolution
            .candidates()
            .iter()
            .map(|m| m.canonical_name())
            .collect(),
        documentation: resolution.documentation_html().map(docs::to_markdown),
    }
}

/// Show the isolated runtime search path of a project
///
/// # Arguments
/// * `project` - Project name
/// * `resource` - Optional `/`-separated resource name to look up
///
/// # Returns
/// `ClasspathResult` with the search path and, if asked, every location of the resource
pub fn classpath(
    ctx: &IndexContext,
    project: &str,
    resource: Option<&str>,
) -> Result<model::ClasspathResult> {
    let loading = ctx.loading.build(&ctx.workspace, project)?;
    let found = resource.map(|name| {
        loading
            .find_resources(name)
            .into_iter()
            .map(|url| url.to_string())
            .collect()
    });

    Ok(model::ClasspathResult {
        project: project.to_string(),
        entries: loading
            .entries()
            .iter()
            .map(|e| e.path().display().to_string())
            .collect(),
        resource: resource.map(str::to_string),
        found,
    })
}

/// List registered providers in dispatch order
pub fn list_providers(ctx: &IndexContext) -> Vec<model::ProviderEntry> {
    ctx.registry
        .providers()
        .map(|p| model::ProviderEntry {
            name: p.provider_name().to_string(),
            extensions: p.extensions(),
        })
        .collect()
}

/// Diagnostics reported by the most recent builds
///
/// # Arguments
/// * `project` - Optional project name to limit the listing
pub fn list_diagnostics(ctx: &IndexContext, project: Option<&str>) -> Result<Vec<Diagnostic>> {
    let mut all = Vec::new();
    for name in ctx.project_names(project)? {
        all.extend(ctx.diagnostics.project(&name));
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use std::path::Path;

    const STEPS: &str = r#"package com.example;

public class Steps {
    @Given("I have {int} cukes")
    public void haveCukes(int count) {}

    @When("I eat {int} cukes")
    public void eat(int count) {}

    @When("I eat {word}")
    public void eat(String what) {}
}
"#;

    const TYPES: &str = r#"[
        {"name": "com.example.Steps", "members": [
            {"name": "haveCukes", "parameters": ["int"], "doc": "<p>Adds cukes</p>"},
            {"name": "eat", "parameters": ["int"]},
            {"name": "eat", "parameters": ["java.lang.String"]}
        ]}
    ]"#;

    fn project(name: &str, root: &Path) -> ProjectConfig {
        ProjectConfig {
            name: name.to_string(),
            root: root.to_path_buf(),
            open: true,
            output: vec!["classes".to_string()],
            libraries: Vec::new(),
            depends_on: Vec::new(),
            type_model: None,
        }
    }

    fn session() -> (tempfile::TempDir, IndexContext) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("shop");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("classes")).unwrap();
        std::fs::write(root.join("src/Steps.java"), STEPS).unwrap();
        std::fs::write(root.join("classes/cucumber.properties"), "").unwrap();
        let types = dir.path().join("types.json");
        std::fs::write(&types, TYPES).unwrap();

        let mut shop = project("shop", &root);
        shop.type_model = Some(types);
        let config = Config {
            projects: vec![shop],
            ..Config::default()
        };
        let ctx = IndexContext::new(&config).unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_build_then_list() {
        let (_dir, ctx) = session();
        let reports = build_projects(&ctx, None, BuildTrigger::Full).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].scanned, 1);

        let listed = list_definitions(&ctx, Some("shop")).unwrap();
        assert_eq!(listed.len(), 1);
        let patterns: Vec<_> = listed[0].definitions.iter().map(|d| d.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["I have {int} cukes", "I eat {int} cukes", "I eat {word}"]);
        assert_eq!(listed[0].definitions[0].location, "com.example.Steps.haveCukes");
        assert!(chrono::DateTime::parse_from_rfc3339(&listed[0].scanned_at).is_ok());
    }

    #[tokio::test]
    async fn test_find_resolves_single_candidate_with_docs() {
        let (_dir, ctx) = session();
        build_projects(&ctx, Some("shop"), BuildTrigger::Full).await.unwrap();

        let found = find_steps(&ctx, "Given I have 3 cukes", "shop").unwrap();
        assert_eq!(found.matches.len(), 1);
        let symbol = &found.matches[0].symbol;
        assert_eq!(symbol.status, "found");
        assert_eq!(symbol.candidates, vec!["Steps.haveCukes(int)"]);
        assert!(symbol.documentation.as_deref().unwrap().contains("Adds cukes"));
        assert!(found.matches[0].hover.contains("## I have {int} cukes"));
    }

    #[tokio::test]
    async fn test_find_strips_only_the_leading_keyword() {
        let (dir, ctx) = session();
        std::fs::write(
            dir.path().join("shop/src/Works.java"),
            "public class Works {\n    @Then(\"And it works\")\n    public void andWorks() {}\n\n    @Then(\"it works\")\n    public void works() {}\n}\n",
        )
        .unwrap();
        build_projects(&ctx, None, BuildTrigger::Full).await.unwrap();

        let found = find_steps(&ctx, "Given And it works", "shop").unwrap();
        let patterns: Vec<_> = found.matches.iter().map(|m| m.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["And it works"]);
        assert_eq!(found.text, "Given And it works");
    }

    #[tokio::test]
    async fn test_find_reports_every_matching_definition() {
        let (_dir, ctx) = session();
        build_projects(&ctx, None, BuildTrigger::Full).await.unwrap();

        // {word} stops at whitespace, so each text matches one pattern;
        // both bind to `eat`, which has two overloads
        let found = find_steps(&ctx, "When I eat 5 cukes", "shop").unwrap();
        assert_eq!(found.matches.len(), 1);
        let found = find_steps(&ctx, "When I eat apples", "shop").unwrap();
        assert_eq!(found.matches.len(), 1);
        assert_eq!(found.matches[0].symbol.candidates.len(), 2);
        assert!(found.matches[0].symbol.documentation.is_none());
    }

    #[test]
    fn test_resolve_reports_status() {
        let (_dir, ctx) = session();
        let missing =
            resolve_symbol(&ctx, "shop", &CodeLocation::new("com.example.Gone", "x")).unwrap();
        assert_eq!(missing.status, "type_not_found");
        let blank =
            resolve_symbol(&ctx, "shop", &CodeLocation::new("com.example.Steps", "")).unwrap();
        assert_eq!(blank.status, "member_not_found");
        assert!(resolve_symbol(&ctx, "ghost", &CodeLocation::default()).is_err());
    }

    #[test]
    fn test_classpath_lists_outputs_and_finds_resources() {
        let (dir, ctx) = session();
        let result = classpath(&ctx, "shop", Some("cucumber.properties")).unwrap();
        assert_eq!(
            result.entries,
            vec![dir.path().join("shop/classes").display().to_string()]
        );
        assert_eq!(result.found.unwrap().len(), 1);
    }

    #[test]
    fn test_providers_in_registration_order() {
        let (_dir, ctx) = session();
        let providers = list_providers(&ctx);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "java");
        assert_eq!(providers[0].extensions, vec!["java"]);
    }

    #[tokio::test]
    async fn test_disabled_indexing_builds_nothing() {
        let (dir, _ctx) = session();
        let mut config = Config {
            projects: vec![project("shop", &dir.path().join("shop"))],
            ..Config::default()
        };
        config.indexing.enabled = false;
        let ctx = IndexContext::new(&config).unwrap();
        let reports = build_projects(&ctx, None, BuildTrigger::Full).await.unwrap();
        assert!(reports[0].skipped);
        assert!(ctx.index().is_empty());
    }

    #[tokio::test]
    async fn test_diagnostics_are_listed_per_project() {
        let (dir, ctx) = session();
        std::fs::write(
            dir.path().join("shop/src/Broken.java"),
            "public class Broken {\n    @Given(\"I have {int cukes\")\n    public void broken() {}\n}\n",
        )
        .unwrap();
        build_projects(&ctx, None, BuildTrigger::Full).await.unwrap();
        let diags = list_diagnostics(&ctx, Some("shop")).unwrap();
        assert_eq!(diags.len(), 1);
        assert!(list_diagnostics(&ctx, Some("ghost")).is_err());
    }

    #[test]
    fn test_missing_type_model_fails_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut shop = project("shop", dir.path());
        shop.type_model = Some(dir.path().join("missing.json"));
        let config = Config {
            projects: vec![shop],
            ..Config::default()
        };
        assert!(IndexContext::new(&config).is_err());
    }
}
