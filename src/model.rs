use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a workspace file: owning project plus absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub project: String,
    pub path: PathBuf,
}

impl Resource {
    pub fn new(project: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased file extension, if any
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.path.display())
    }
}

/// "The method `method_name` declared in `type_name`", without parameter types.
///
/// Either part may be blank, which marks the location as unresolvable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeLocation {
    pub type_name: String,
    pub method_name: String,
}

impl CodeLocation {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.type_name.trim().is_empty()
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.method_name.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}.{}", self.type_name, self.method_name)
        }
    }
}

impl FromStr for CodeLocation {
    type Err = std::convert::Infallible;

    /// Parse `pkg.Type.method(A,B)` or `pkg.Type#method`. The parameter list is dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = match s.find('(') {
            Some(idx) => &s[..idx],
            None => s,
        };
        if let Some((ty, method)) = s.rsplit_once('#') {
            return Ok(CodeLocation::new(ty.trim(), method.trim()));
        }
        match s.rsplit_once('.') {
            Some((ty, method)) => Ok(CodeLocation::new(ty.trim(), method.trim())),
            None => Ok(CodeLocation::new(s, "")),
        }
    }
}

/// A step pattern bound to the code implementing it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepDefinition {
    pub pattern: String,
    pub location: CodeLocation,
    pub resource: Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A problem found while scanning a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub resource: Resource,
    /// 0-based line, when the problem has one
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, resource: Resource) -> Self {
        Self {
            severity,
            message: message.into(),
            resource,
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One record of a change delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDelta {
    pub resource: Resource,
    pub kind: ChangeKind,
}

impl ResourceDelta {
    pub fn new(resource: Resource, kind: ChangeKind) -> Self {
        Self { resource, kind }
    }
}

/// What the host asks the coordinator to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTrigger {
    Full,
    Incremental(Vec<ResourceDelta>),
    Clean,
}

impl BuildTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTrigger::Full => "full",
            BuildTrigger::Incremental(_) => "incremental",
            BuildTrigger::Clean => "clean",
        }
    }

    /// Full and clean triggers make any earlier queued trigger pointless
    pub fn supersedes_queue(&self) -> bool {
        matches!(self, BuildTrigger::Full | BuildTrigger::Clean)
    }
}

/// JSON output for a failed resource scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub resource: String,
    pub message: String,
}

/// JSON output for one build
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub project: String,
    pub trigger: String,
    /// Indexing disabled or project closed; nothing was touched
    pub skipped: bool,
    pub cancelled: bool,
    pub visited: usize,
    pub scanned: usize,
    pub removed: usize,
    pub failures: Vec<FailureEntry>,
}

impl BuildReport {
    pub fn new(project: &str, trigger: &BuildTrigger) -> Self {
        Self {
            project: project.to_string(),
            trigger: trigger.as_str().to_string(),
            ..Default::default()
        }
    }
}

/// JSON output for the list command
#[derive(Debug, Serialize)]
pub struct ResourceEntry {
    pub resource: String,
    pub generation: u64,
    /// RFC 3339 time of the scan that produced this entry
    pub scanned_at: String,
    pub definitions: Vec<DefinitionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionEntry {
    pub pattern: String,
    pub location: String,
}

impl From<&StepDefinition> for DefinitionEntry {
    fn from(def: &StepDefinition) -> Self {
        Self {
            pattern: def.pattern.clone(),
            location: def.location.to_string(),
        }
    }
}

/// JSON output for find and resolve commands
#[derive(Debug, Serialize)]
pub struct SymbolEntry {
    pub location: String,
    /// "found", "type_not_found", "member_not_found" or "unresolved"
    pub status: String,
    pub candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchEntry {
    pub pattern: String,
    pub resource: String,
    pub symbol: SymbolEntry,
    /// Markdown hover text
    pub hover: String,
}

/// JSON output for find command
#[derive(Debug, Serialize)]
pub struct FindResult {
    pub text: String,
    pub project: String,
    pub matches: Vec<MatchEntry>,
}

/// JSON output for classpath command
#[derive(Debug, Serialize)]
pub struct ClasspathResult {
    pub project: String,
    pub entries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<Vec<String>>,
}

/// JSON output for providers command
#[derive(Debug, Serialize)]
pub struct ProviderEntry {
    pub name: String,
    pub extensions: Vec<String>,
}
