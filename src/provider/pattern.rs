//! Configuration-driven line scanner for annotation-style step definitions.
//!
//! Recognizes step annotations, type declarations and method declarations
//! with the regexes of a [`ProviderConfig`]. Annotations queue up until the
//! next method declaration, which they are bound to. Type nesting follows
//! braces outside string and char literals.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use super::{ScanOutput, StepDefinitionProvider};
use crate::config::ProviderConfig;
use crate::error::ConfigError;
use crate::matcher::compile_expression;
use crate::model::{CodeLocation, Diagnostic, Resource, Severity, StepDefinition};

#[derive(Debug)]
pub struct PatternProvider {
    name: String,
    extensions: Vec<String>,
    step: Regex,
    type_decl: Regex,
    method: Regex,
    package: Option<Regex>,
}

impl PatternProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let compile = |source: &str, group: &str| -> Result<Regex, ConfigError> {
            let re = Regex::new(source).map_err(|e| ConfigError::InvalidProvider {
                name: config.name.clone(),
                message: e.to_string(),
            })?;
            if !re.capture_names().any(|n| n == Some(group)) {
                return Err(ConfigError::InvalidProvider {
                    name: config.name.clone(),
                    message: format!("regex '{source}' has no named group '{group}'"),
                });
            }
            Ok(re)
        };

        Ok(Self {
            name: config.name.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            step: compile(&config.step, "pattern")?,
            type_decl: compile(&config.type_decl, "name")?,
            method: compile(&config.method, "name")?,
            package: config
                .package
                .as_deref()
                .map(|p| compile(p, "name"))
                .transpose()?,
        })
    }

    /// Scan source text already read from `resource`
    pub fn scan_source(&self, resource: &Resource, text: &str) -> ScanOutput {
        let mut output = ScanOutput::default();
        let mut package: Option<String> = None;
        let mut types = TypeStack::default();
        let mut pending: Vec<(String, u32)> = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no as u32;

            if package.is_none() {
                if let Some(caps) = self.package.as_ref().and_then(|re| re.captures(line)) {
                    package = caps.name("name").map(|m| m.as_str().to_string());
                    continue;
                }
            }

            let mut rest_start = 0;
            for caps in self.step.captures_iter(line) {
                if let Some(m) = caps.name("pattern") {
                    pending.push((unescape(m.as_str()), line_no));
                }
                if let Some(whole) = caps.get(0) {
                    rest_start = whole.end();
                }
            }
            let rest = &line[rest_start..];

            if let Some(caps) = self.type_decl.captures(rest) {
                if let Some(m) = caps.name("name") {
                    types.declare(m.as_str());
                }
            } else if !pending.is_empty() {
                if let Some(caps) = self.method.captures(rest) {
                    let method = caps.name("name").map_or("", |m| m.as_str());
                    let location = CodeLocation::new(types.qualified(package.as_deref()), method);
                    for (pattern, at) in pending.drain(..) {
                        self.emit(resource, pattern, location.clone(), at, &mut output);
                    }
                }
            }

            types.track_braces(line);
        }

        for (pattern, at) in pending {
            output.diagnostics.push(
                Diagnostic::new(
                    Severity::Warning,
                    format!("step '{pattern}' is not followed by a method"),
                    resource.clone(),
                )
                .at_line(at),
            );
            let location = CodeLocation::new(types.qualified(package.as_deref()), "");
            self.emit(resource, pattern, location, at, &mut output);
        }

        output
    }

    fn emit(
        &self,
        resource: &Resource,
        pattern: String,
        location: CodeLocation,
        line: u32,
        output: &mut ScanOutput,
    ) {
        if let Err(e) = compile_expression(&pattern) {
            output.diagnostics.push(
                Diagnostic::new(
                    Severity::Error,
                    format!("invalid step pattern '{pattern}': {e}"),
                    resource.clone(),
                )
                .at_line(line),
            );
        }
        output.definitions.push(StepDefinition {
            pattern,
            location,
            resource: resource.clone(),
        });
    }
}

#[async_trait]
impl StepDefinitionProvider for PatternProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn can_handle(&self, resource: &Resource) -> bool {
        resource
            .extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    async fn find_step_definitions(&self, resource: &Resource) -> Result<ScanOutput> {
        let text = tokio::fs::read_to_string(resource.path())
            .await
            .with_context(|| format!("reading {}", resource.path().display()))?;
        Ok(self.scan_source(resource, &text))
    }
}

/// Declared types enclosing the current line
#[derive(Debug, Default)]
struct TypeStack {
    depth: i32,
    /// (simple name, depth at declaration, body opened)
    stack: Vec<(String, i32, bool)>,
}

impl TypeStack {
    fn declare(&mut self, name: &str) {
        self.stack.push((name.to_string(), self.depth, false));
    }

    fn qualified(&self, package: Option<&str>) -> String {
        let names: Vec<&str> = self.stack.iter().map(|(n, _, _)| n.as_str()).collect();
        if names.is_empty() {
            return String::new();
        }
        match package {
            Some(p) if !p.is_empty() => format!("{p}.{}", names.join(".")),
            _ => names.join("."),
        }
    }

    fn track_braces(&mut self, line: &str) {
        let mut quote: Option<char> = None;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    _ if c == q => quote = None,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '/' if chars.peek() == Some(&'/') => break,
                '{' => {
                    self.depth += 1;
                    if let Some(top) = self.stack.last_mut() {
                        if !top.2 && self.depth == top.1 + 1 {
                            top.2 = true;
                        }
                    }
                }
                '}' => {
                    self.depth -= 1;
                    if let Some(top) = self.stack.last() {
                        if top.2 && self.depth == top.1 {
                            self.stack.pop();
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Undo string-literal escaping of quotes and backslashes
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n @ ('"' | '\\')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
