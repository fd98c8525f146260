//! Projects of the workspace and the resources inside them.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{Config, ProjectConfig};
use crate::error::IndexError;
use crate::model::Resource;

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub open: bool,
    pub output: Vec<String>,
    pub libraries: Vec<String>,
    pub depends_on: Vec<String>,
    pub type_model: Option<PathBuf>,
}

impl From<&ProjectConfig> for Project {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            name: config.name.clone(),
            root: config.root.clone(),
            open: config.open,
            output: config.output.clone(),
            libraries: config.libraries.clone(),
            depends_on: config.depends_on.clone(),
            type_model: config.type_model.clone(),
        }
    }
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            open: true,
            output: Vec::new(),
            libraries: Vec::new(),
            depends_on: Vec::new(),
            type_model: None,
        }
    }

    pub fn resource(&self, path: impl AsRef<Path>) -> Resource {
        let path = path.as_ref();
        let path = if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        };
        Resource::new(self.name.clone(), path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    projects: BTreeMap<String, Project>,
    exclude: Vec<String>,
}

impl Workspace {
    pub fn new(exclude: Vec<String>) -> Self {
        Self {
            projects: BTreeMap::new(),
            exclude,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut workspace = Self::new(config.indexing.exclude.clone());
        for project in &config.projects {
            workspace.add_project(Project::from(project));
        }
        workspace
    }

    pub fn add_project(&mut self, project: Project) {
        self.projects.insert(project.name.clone(), project);
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Every file of the project subtree, sorted by path
    pub fn resources(&self, project: &str) -> Result<Vec<Resource>, IndexError> {
        let project = self
            .project(project)
            .ok_or_else(|| IndexError::UnknownProject(project.to_string()))?;

        let walker = WalkDir::new(&project.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && self.is_excluded_name(&e.file_name().to_string_lossy()))
            });

        let mut resources = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| IndexError::Walk {
                project: project.name.clone(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                resources.push(Resource::new(project.name.clone(), entry.into_path()));
            }
        }
        Ok(resources)
    }

    /// Whether `resource` lies under an excluded directory of its project,
    /// i.e. whether [`Workspace::resources`] would never enumerate it
    pub fn is_excluded(&self, resource: &Resource) -> bool {
        let Some(project) = self.project(&resource.project) else {
            return false;
        };
        let Ok(relative) = resource.path.strip_prefix(&project.root) else {
            return false;
        };
        let mut dirs = relative.components().collect::<Vec<_>>();
        dirs.pop();
        dirs.iter().any(|c| self.is_excluded_name(&c.as_os_str().to_string_lossy()))
    }

    fn is_excluded_name(&self, name: &str) -> bool {
        self.exclude.iter().any(|x| x == name)
    }

    /// Map an absolute path to a resource of the project containing it.
    /// Nested project roots win over their parents.
    pub fn resource_for_path(&self, path: &Path) -> Option<Resource> {
        self.projects
            .values()
            .filter(|p| path.starts_with(&p.root))
            .max_by_key(|p| p.root.components().count())
            .map(|p| Resource::new(p.name.clone(), path))
    }

    /// Raw runtime dependency path: own outputs and libraries, then those of
    /// every project it depends on, transitively. Output directories are
    /// joined onto their project root; library entries are kept verbatim
    /// unless they are relative paths.
    pub fn runtime_path(&self, project: &str) -> Result<Vec<String>, IndexError> {
        if self.project(project).is_none() {
            return Err(IndexError::UnknownProject(project.to_string()));
        }
        let mut entries = Vec::new();
        let mut seen_entries = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_runtime_path(project, &mut visited, &mut seen_entries, &mut entries);
        Ok(entries)
    }

    fn collect_runtime_path(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        seen_entries: &mut HashSet<String>,
        entries: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(project) = self.project(name) else {
            tracing::warn!(project = name, "dependency on unknown project ignored");
            return;
        };
        let own = project
            .output
            .iter()
            .map(|o| project.root.join(o).display().to_string())
            .chain(project.libraries.iter().map(|l| absolutize(&project.root, l)));
        for entry in own {
            if seen_entries.insert(entry.clone()) {
                entries.push(entry);
            }
        }
        for dependency in &project.depends_on {
            self.collect_runtime_path(dependency, visited, seen_entries, entries);
        }
    }
}

fn absolutize(root: &Path, entry: &str) -> String {
    if entry.is_empty() || entry.contains(':') || Path::new(entry).is_absolute() {
        entry.to_string()
    } else {
        root.join(entry).display().to_string()
    }
}
