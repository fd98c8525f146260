//! Project type models the resolver looks types and members up in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeHandle {
    /// Fully-qualified name, `.`-separated
    pub name: String,
}

impl TypeHandle {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// Opaque reference to one member of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemberHandle {
    pub declaring_type: TypeHandle,
    pub name: String,
    /// Parameter types as declared, possibly qualified
    pub parameter_types: Vec<String>,
    /// Position in the declaring type's member list
    pub index: usize,
}

impl MemberHandle {
    /// `Type.member(A,B)`, for display only
    pub fn canonical_name(&self) -> String {
        let params: Vec<String> = self
            .parameter_types
            .iter()
            .map(|p| format_parameter_type(p))
            .collect();
        format!(
            "{}.{}({})",
            self.declaring_type.simple_name(),
            self.name,
            params.join(",")
        )
    }
}

/// Drop package qualifiers from every name in a type signature:
/// `java.util.Map<java.lang.String, int[]>` becomes `Map<String, int[]>`.
pub fn format_parameter_type(signature: &str) -> String {
    fn qualified_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"(?:[A-Za-z_$][\w$]*\.)+([A-Za-z_$][\w$]*)")
                .expect("invalid qualified name pattern")
        })
    }
    qualified_re().replace_all(signature.trim(), "$1").into_owned()
}

/// Type information of one project
pub trait TypeModel: Send + Sync {
    fn find_type(&self, name: &str) -> Option<TypeHandle>;

    /// Members in declaration order
    fn members(&self, ty: &TypeHandle) -> Vec<MemberHandle>;

    /// Raw documentation HTML of a member, if it has any
    fn documentation(&self, member: &MemberHandle) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Deserialize)]
struct TypeDecl {
    name: String,
    #[serde(default)]
    members: Vec<MemberDecl>,
}

#[derive(Debug, Clone, Deserialize)]
struct MemberDecl {
    name: String,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default)]
    doc: Option<String>,
}

/// Type model read from a JSON dump:
/// `[{"name": "pkg.Steps", "members": [{"name": "m", "parameters": ["int"], "doc": "<p>..</p>"}]}]`
#[derive(Debug, Clone, Default)]
pub struct JsonTypeModel {
    types: HashMap<String, TypeDecl>,
}

impl JsonTypeModel {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let decls: Vec<TypeDecl> = serde_json::from_str(text)?;
        let mut types = HashMap::new();
        for mut decl in decls {
            decl.name = normalize_type_name(&decl.name);
            types.insert(decl.name.clone(), decl);
        }
        Ok(Self { types })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidTypeModel {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&text).map_err(|e| ConfigError::InvalidTypeModel {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Add an empty type, replacing any type of the same name
    pub fn with_type(mut self, name: &str) -> Self {
        let name = normalize_type_name(name);
        self.types.insert(
            name.clone(),
            TypeDecl {
                name,
                members: Vec::new(),
            },
        );
        self
    }

    /// Append a member to `type_name`, declaring the type if needed
    pub fn with_member(mut self, type_name: &str, member: &str, parameters: &[&str]) -> Self {
        let name = normalize_type_name(type_name);
        let decl = self.types.entry(name.clone()).or_insert_with(|| TypeDecl {
            name,
            members: Vec::new(),
        });
        decl.members.push(MemberDecl {
            name: member.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            doc: None,
        });
        self
    }

    /// Attach documentation HTML to every member called `member` of `type_name`
    pub fn with_doc(mut self, type_name: &str, member: &str, html: &str) -> Self {
        if let Some(decl) = self.types.get_mut(&normalize_type_name(type_name)) {
            for m in decl.members.iter_mut().filter(|m| m.name == member) {
                m.doc = Some(html.to_string());
            }
        }
        self
    }
}

/// Binary names use `$` for nested types; the model stores `.`
fn normalize_type_name(name: &str) -> String {
    name.trim().replace('$', ".")
}

impl TypeModel for JsonTypeModel {
    fn find_type(&self, name: &str) -> Option<TypeHandle> {
        let name = normalize_type_name(name);
        self.types.get(&name).map(|decl| TypeHandle {
            name: decl.name.clone(),
        })
    }

    fn members(&self, ty: &TypeHandle) -> Vec<MemberHandle> {
        let Some(decl) = self.types.get(&ty.name) else {
            return Vec::new();
        };
        decl.members
            .iter()
            .enumerate()
            .map(|(index, m)| MemberHandle {
                declaring_type: ty.clone(),
                name: m.name.clone(),
                parameter_types: m.parameters.clone(),
                index,
            })
            .collect()
    }

    fn documentation(&self, member: &MemberHandle) -> Result<Option<String>> {
        let decl = self
            .types
            .get(&member.declaring_type.name)
            .ok_or_else(|| anyhow::anyhow!("type {} is gone", member.declaring_type.name))?;
        let m = decl
            .members
            .get(member.index)
            .filter(|m| m.name == member.name)
            .ok_or_else(|| anyhow::anyhow!("member {} is gone", member.name))?;
        Ok(m.doc.clone())
    }
}
