//! Isolated per-project resource lookup for runtime introspection.
//!
//! A [`LoadingContext`] searches the project's own runtime dependency path
//! first and falls back to the host's context only through a
//! [`ResourceFilter`]. Anything the filter rejects is simply absent.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::error::IndexError;
use crate::workspace::Workspace;

/// One location on the runtime dependency path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEntry {
    Directory(PathBuf),
    Archive(PathBuf),
}

impl PathEntry {
    pub fn path(&self) -> &Path {
        match self {
            PathEntry::Directory(p) | PathEntry::Archive(p) => p,
        }
    }

    /// URL of resource `name` (`/`-separated) inside this entry, if present
    pub fn find(&self, name: &str) -> Option<Url> {
        let name = name.trim_start_matches('/');
        if name.is_empty() || name.split('/').any(|c| c == "..") {
            return None;
        }
        match self {
            PathEntry::Directory(dir) => {
                let candidate = dir.join(name);
                if candidate.exists() {
                    Url::from_file_path(&candidate).ok()
                } else {
                    None
                }
            }
            PathEntry::Archive(archive) => find_in_archive(archive, name),
        }
    }
}

fn find_in_archive(path: &Path, name: &str) -> Option<Url> {
    let file = File::open(path).ok()?;
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(a) => a,
        Err(e) => {
            debug!(archive = %path.display(), error = %e, "unreadable archive");
            return None;
        }
    };
    if archive.by_name(name).is_err() {
        return None;
    }
    let base = Url::from_file_path(path).ok()?;
    Url::parse(&format!("jar:{base}!/{name}")).ok()
}

/// Turn a raw dependency path entry into a location on disk
pub fn parse_entry(project: &str, raw: &str) -> Result<PathEntry, IndexError> {
    let invalid = |reason: &str| IndexError::DependencyPathEntryInvalid {
        project: project.to_string(),
        entry: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty entry"));
    }
    let path = if trimmed.starts_with("file:") {
        let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
        url.to_file_path()
            .map_err(|()| invalid("not a local file URL"))?
    } else if trimmed.contains("://") {
        return Err(invalid("unsupported URL scheme"));
    } else {
        PathBuf::from(trimmed)
    };
    if path.is_relative() {
        return Err(invalid("relative path"));
    }

    Ok(if path.is_file() {
        PathEntry::Archive(path)
    } else {
        PathEntry::Directory(path)
    })
}

/// The host's own resource lookup
pub trait HostLoader: Send + Sync {
    fn find_resources(&self, name: &str) -> Vec<Url>;
}

/// A host that contributes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHost;

impl HostLoader for EmptyHost {
    fn find_resources(&self, _name: &str) -> Vec<Url> {
        Vec::new()
    }
}

/// A host with a fixed resource table
#[derive(Debug, Default, Clone)]
pub struct StaticHost {
    resources: HashMap<String, Vec<Url>>,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, url: Url) -> Self {
        self.resources.entry(name.to_string()).or_default().push(url);
        self
    }
}

impl HostLoader for StaticHost {
    fn find_resources(&self, name: &str) -> Vec<Url> {
        self.resources.get(name).cloned().unwrap_or_default()
    }
}

/// Decides which host resources a project may see
pub trait ResourceFilter: Send + Sync {
    fn admit(&self, url: &Url) -> bool;
}

impl<F> ResourceFilter for F
where
    F: Fn(&Url) -> bool + Send + Sync,
{
    fn admit(&self, url: &Url) -> bool {
        self(url)
    }
}

/// Rejects host resources reached through the listed URL schemes
#[derive(Debug, Clone)]
pub struct SchemeFilter {
    blocked: Vec<String>,
}

impl SchemeFilter {
    pub fn new(blocked: &[String]) -> Self {
        Self {
            blocked: blocked.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }
}

impl ResourceFilter for SchemeFilter {
    fn admit(&self, url: &Url) -> bool {
        !self.blocked.iter().any(|s| s == url.scheme())
    }
}

/// Resource lookup confined to one project's runtime dependency path
pub struct LoadingContext {
    project: String,
    entries: Vec<PathEntry>,
    skipped: Vec<IndexError>,
    host: Arc<dyn HostLoader>,
    filter: Arc<dyn ResourceFilter>,
}

impl LoadingContext {
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Search path, in resolution order
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Entries dropped while building the context
    pub fn skipped(&self) -> &[IndexError] {
        &self.skipped
    }

    /// First location of `name`: the search path, then the filtered host
    pub fn find_resource(&self, name: &str) -> Option<Url> {
        self.entries
            .iter()
            .find_map(|e| e.find(name))
            .or_else(|| self.host_resources(name).into_iter().next())
    }

    /// Every location of `name`, search path first
    pub fn find_resources(&self, name: &str) -> Vec<Url> {
        let mut found: Vec<Url> = self.entries.iter().filter_map(|e| e.find(name)).collect();
        found.extend(self.host_resources(name));
        found
    }

    fn host_resources(&self, name: &str) -> Vec<Url> {
        self.host
            .find_resources(name)
            .into_iter()
            .filter(|url| {
                let admitted = self.filter.admit(url);
                if !admitted {
                    debug!(project = %self.project, %url, "filtered host resource");
                }
                admitted
            })
            .collect()
    }
}

/// Builds a [`LoadingContext`] per project over a shared host
pub struct IsolatedLoadingContext {
    host: Arc<dyn HostLoader>,
    filter: Arc<dyn ResourceFilter>,
}

impl IsolatedLoadingContext {
    pub fn new(host: Arc<dyn HostLoader>, filter: Arc<dyn ResourceFilter>) -> Self {
        Self { host, filter }
    }

    /// Malformed entries are logged and skipped
    pub fn build(
        &self,
        workspace: &Workspace,
        project: &str,
    ) -> Result<LoadingContext, IndexError> {
        let raw_entries = workspace.runtime_path(project)?;
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for raw in raw_entries {
            match parse_entry(project, &raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(error = %e, "skipping dependency path entry");
                    skipped.push(e);
                }
            }
        }
        Ok(LoadingContext {
            project: project.to_string(),
            entries,
            skipped,
            host: Arc::clone(&self.host),
            filter: Arc::clone(&self.filter),
        })
    }
}
