pub mod pattern;

use crate::model::{Diagnostic, Resource, StepDefinition};
use anyhow::Result;
use async_trait::async_trait;

/// What one scan of one resource produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub definitions: Vec<StepDefinition>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Trait for step definition providers (one per implementation language)
#[async_trait]
pub trait StepDefinitionProvider {
    /// Short name for this provider: "java", "kotlin", ...
    fn provider_name(&self) -> &str;

    /// File extensions this provider scans, for display
    fn extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this provider scans `resource`
    fn can_handle(&self, resource: &Resource) -> bool;

    /// Scan one resource for step definitions
    async fn find_step_definitions(&self, resource: &Resource) -> Result<ScanOutput>;

    /// Release caches kept across resources
    fn clean(&self) {}
}
