//! TOML configuration: preference gate, provider registration list, projects.
//!
//! ```toml
//! [indexing]
//! enabled = true
//!
//! [[providers]]
//! name = "java"
//! extensions = ["java"]
//! step = '@(?:Given|When|Then)\("(?P<pattern>[^"]*)"'
//! type = 'class\s+(?P<name>\w+)'
//! method = 'void\s+(?P<name>\w+)\s*\('
//!
//! [[projects]]
//! name = "shop"
//! root = "shop"
//! output = ["target/classes"]
//! libraries = ["lib/cucumber-java.jar"]
//! type_model = "shop/types.json"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "stepdefs.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indexing: IndexingConfig,
    /// Registration list, in dispatch priority order
    pub providers: Vec<ProviderConfig>,
    pub projects: Vec<ProjectConfig>,
    pub documentation: DocumentationStyle,
    pub loading: LoadingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indexing: IndexingConfig::default(),
            providers: vec![ProviderConfig::java()],
            projects: Vec::new(),
            documentation: DocumentationStyle::default(),
            loading: LoadingConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration file; relative paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    /// `explicit` if given, else `stepdefs.toml` in `dir`, else a single
    /// project rooted at `dir`
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_file = dir.join(DEFAULT_CONFIG_FILE);
        if default_file.is_file() {
            Self::load(&default_file)
        } else {
            Ok(Self::for_directory(dir))
        }
    }

    /// Default configuration with one project rooted at `dir`
    pub fn for_directory(dir: &Path) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());
        Self {
            projects: vec![ProjectConfig {
                name,
                root: dir.to_path_buf(),
                open: true,
                output: Vec::new(),
                libraries: Vec::new(),
                depends_on: Vec::new(),
                type_model: None,
            }],
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Make project roots and type model paths absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for project in &mut self.projects {
            if project.root.is_relative() {
                project.root = base.join(&project.root);
            }
            if let Some(model) = &project.type_model {
                if model.is_relative() {
                    project.type_model = Some(base.join(model));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Preference gate: when false every build trigger is a no-op
    pub enabled: bool,
    /// Directory names skipped when walking a project
    pub exclude: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: vec![
                ".git".to_string(),
                "target".to_string(),
                "node_modules".to_string(),
            ],
        }
    }
}

/// A line-pattern provider: which files it scans and how it recognizes
/// step annotations, type declarations and method declarations.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub extensions: Vec<String>,
    /// Must define the named group `pattern`
    pub step: String,
    /// Must define the named group `name`
    #[serde(rename = "type")]
    pub type_decl: String,
    /// Must define the named group `name`
    pub method: String,
    /// Must define the named group `name`
    #[serde(default)]
    pub package: Option<String>,
}

impl ProviderConfig {
    /// Annotation-based Java step definitions
    pub fn java() -> Self {
        Self {
            name: "java".to_string(),
            extensions: vec!["java".to_string()],
            step: r#"@(?:Given|When|Then|And|But)\s*\(\s*"(?P<pattern>(?:[^"\\]|\\.)*)""#.to_string(),
            type_decl: r"^\s*(?:(?:public|protected|private|abstract|final|static)\s+)*(?:class|interface|enum|record)\s+(?P<name>\w+)".to_string(),
            method: r"^\s*(?:(?:public|protected|private|static|final|synchronized|default)\s+)*[\w<>\[\],.?]+(?:\s+[\w<>\[\],.?]+)*?\s+(?P<name>\w+)\s*\(".to_string(),
            package: Some(r"^\s*package\s+(?P<name>[\w.]+)\s*;".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub root: PathBuf,
    #[serde(default = "default_open")]
    pub open: bool,
    /// Runtime output directories, relative to the project root
    #[serde(default)]
    pub output: Vec<String>,
    /// Raw dependency path entries: paths or `file:` URLs
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub type_model: Option<PathBuf>,
}

fn default_open() -> bool {
    true
}

/// Colours of the documentation page prolog
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentationStyle {
    pub foreground: String,
    pub background: String,
}

impl Default for DocumentationStyle {
    fn default() -> Self {
        Self {
            foreground: "#000000".to_string(),
            background: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    /// URL schemes the host fallback never exposes to a project
    pub blocked_schemes: Vec<String>,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            blocked_schemes: vec!["bundleresource".to_string()],
        }
    }
}
