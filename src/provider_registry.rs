use crate::config::ProviderConfig;
use crate::error::ConfigError;
use crate::matcher::StepMatcher;
use crate::model::Resource;
use crate::provider::{pattern::PatternProvider, StepDefinitionProvider};

/// Top-level registry that routes resources to the provider scanning them
pub struct ProviderRegistry {
    providers: Vec<Box<dyn StepDefinitionProvider + Send + Sync>>,
    matcher: StepMatcher,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            matcher: StepMatcher::new(),
        }
    }

    /// Build the registry from the configured registration list, in order
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Box::new(PatternProvider::from_config(config)?));
        }
        Ok(registry)
    }

    /// Append a provider; earlier registrations take precedence
    pub fn register(&mut self, provider: Box<dyn StepDefinitionProvider + Send + Sync>) {
        self.providers.push(provider);
    }

    /// Get the first registered provider that handles `resource`
    pub fn provider_for(
        &self,
        resource: &Resource,
    ) -> Option<&(dyn StepDefinitionProvider + Send + Sync)> {
        self.providers
            .iter()
            .find(|p| p.can_handle(resource))
            .map(|p| p.as_ref())
    }

    /// List all registered providers
    pub fn providers(&self) -> impl Iterator<Item = &(dyn StepDefinitionProvider + Send + Sync)> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// Compiled step-pattern cache shared by every query
    pub fn matcher(&self) -> &StepMatcher {
        &self.matcher
    }

    /// Release every cross-resource cache
    pub fn clean(&self) {
        for provider in &self.providers {
            provider.clean();
        }
        self.matcher.clear();
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
