//! Resolution of code locations to member candidates.
//!
//! Overloads are not disambiguated: every member whose simple name equals the
//! location's method name is a candidate, in declaration order, and choosing
//! among several is left to the caller (a picker in the UI, for instance).
//! Parameter types of the location are unknown, so any choice made here
//! would be a guess.

pub mod model;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::DocumentationStyle;
use crate::docs::render_page;
use crate::model::CodeLocation;

pub use model::{format_parameter_type, JsonTypeModel, MemberHandle, TypeHandle, TypeModel};

/// Candidates for one code location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub candidates: Vec<MemberHandle>,
    /// Rendered documentation page, only for a single candidate
    pub documentation_html: Option<String>,
}

/// Outcome of resolving a code location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The location has no type name; nothing was looked up
    Unresolved,
    TypeNotFound,
    /// The type exists but has no member of that name (or the name is blank)
    MemberNotFound(TypeHandle),
    Found(ResolvedSymbol),
}

impl Resolution {
    pub fn candidates(&self) -> &[MemberHandle] {
        match self {
            Resolution::Found(symbol) => &symbol.candidates,
            _ => &[],
        }
    }

    pub fn documentation_html(&self) -> Option<&str> {
        match self {
            Resolution::Found(symbol) => symbol.documentation_html.as_deref(),
            _ => None,
        }
    }

    /// More than one candidate remains; the caller must choose
    pub fn is_ambiguous(&self) -> bool {
        self.candidates().len() > 1
    }

    pub fn status(&self) -> &'static str {
        match self {
            Resolution::Unresolved => "unresolved",
            Resolution::TypeNotFound => "type_not_found",
            Resolution::MemberNotFound(_) => "member_not_found",
            Resolution::Found(_) => "found",
        }
    }
}

/// Resolves code locations against the type model of each project
pub struct SymbolResolver {
    models: DashMap<String, Arc<dyn TypeModel>>,
    style: DocumentationStyle,
}

impl SymbolResolver {
    pub fn new(style: DocumentationStyle) -> Self {
        Self {
            models: DashMap::new(),
            style,
        }
    }

    /// Install or replace the type model of `project`
    pub fn set_model(&self, project: &str, model: Arc<dyn TypeModel>) {
        self.models.insert(project.to_string(), model);
    }

    pub fn model(&self, project: &str) -> Option<Arc<dyn TypeModel>> {
        self.models.get(project).map(|m| Arc::clone(m.value()))
    }

    /// Resolve `location` in `project`. A project without a type model
    /// knows no types.
    pub fn resolve(&self, project: &str, location: &CodeLocation) -> Resolution {
        if location.type_name.trim().is_empty() {
            return Resolution::Unresolved;
        }
        let Some(model) = self.model(project) else {
            debug!(project, "no type model");
            return Resolution::TypeNotFound;
        };
        resolve_in(model.as_ref(), location, &self.style)
    }
}

/// Resolve `location` against one type model
pub fn resolve_in(
    model: &dyn TypeModel,
    location: &CodeLocation,
    style: &DocumentationStyle,
) -> Resolution {
    let type_name = location.type_name.trim();
    if type_name.is_empty() {
        return Resolution::Unresolved;
    }
    let Some(ty) = model.find_type(type_name) else {
        return Resolution::TypeNotFound;
    };
    let method_name = location.method_name.trim();
    if method_name.is_empty() {
        return Resolution::MemberNotFound(ty);
    }

    let candidates: Vec<MemberHandle> = model
        .members(&ty)
        .into_iter()
        .filter(|m| m.name == method_name)
        .collect();
    if candidates.is_empty() {
        return Resolution::MemberNotFound(ty);
    }

    let documentation_html = match candidates.as_slice() {
        [single] => documentation(model, single, style),
        _ => None,
    };
    Resolution::Found(ResolvedSymbol {
        candidates,
        documentation_html,
    })
}

/// Rendered documentation of one member; any failure means none
pub fn documentation(
    model: &dyn TypeModel,
    member: &MemberHandle,
    style: &DocumentationStyle,
) -> Option<String> {
    match model.documentation(member) {
        Ok(Some(html)) => Some(render_page(&html, style)),
        Ok(None) => None,
        Err(e) => {
            debug!(member = %member.canonical_name(), error = %e, "documentation unavailable");
            None
        }
    }
}
