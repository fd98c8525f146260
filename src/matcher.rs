//! Step text matching against indexed step patterns.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use regex::Regex;
use tracing::debug;

use crate::model::StepDefinition;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("unterminated '{0}' in step expression")]
    Unterminated(char),
}

/// Compile a step pattern into a regex matching the whole step text.
///
/// Patterns starting with `^` or ending with `$` are regular expressions;
/// everything else is a Cucumber expression.
pub fn compile_expression(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.starts_with('^') || pattern.ends_with('$') {
        let body = pattern.strip_prefix('^').unwrap_or(pattern);
        let body = match body.strip_suffix('$') {
            Some(b) if !b.ends_with('\\') => b,
            _ => body,
        };
        return Ok(Regex::new(&format!("^(?:{body})$"))?);
    }
    let translated = translate_expression(pattern)?;
    Ok(Regex::new(&translated)?)
}

fn translate_expression(expr: &str) -> Result<String, PatternError> {
    let mut out = String::from("^");
    for token in split_tokens(expr) {
        if token.chars().all(char::is_whitespace) {
            out.push_str(&regex::escape(&token));
            continue;
        }
        let alternatives = split_unescaped(&token, '/');
        if alternatives.len() > 1 {
            let parts = alternatives
                .iter()
                .map(|a| translate_token(a))
                .collect::<Result<Vec<_>, _>>()?;
            out.push_str(&format!("(?:{})", parts.join("|")));
        } else {
            out.push_str(&translate_token(&token)?);
        }
    }
    out.push('$');
    Ok(out)
}

/// Split into alternating whitespace runs and words; groups keep their spaces.
fn split_tokens(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut escaped = false;
    for c in expr.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
                continue;
            }
            '{' | '(' => depth += 1,
            '}' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        let is_space = c.is_whitespace() && depth == 0;
        let current_is_space = current.chars().next().is_some_and(char::is_whitespace);
        if !current.is_empty() && is_space != current_is_space {
            tokens.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn split_unescaped(token: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut escaped = false;
    for c in token.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' | '(' => depth += 1,
            '}' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c == sep && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn translate_token(token: &str) -> Result<String, PatternError> {
    let mut out = String::new();
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '{' => {
                let name = read_until(&mut chars, '}').ok_or(PatternError::Unterminated('{'))?;
                out.push_str(parameter_regex(&name));
            }
            '(' => {
                let text = read_until(&mut chars, ')').ok_or(PatternError::Unterminated('('))?;
                out.push_str(&format!("(?:{})?", regex::escape(&text)));
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    Ok(out)
}

fn read_until(chars: &mut std::str::Chars<'_>, end: char) -> Option<String> {
    let mut buf = String::new();
    for c in chars.by_ref() {
        if c == end {
            return Some(buf);
        }
        buf.push(c);
    }
    None
}

fn parameter_regex(name: &str) -> &'static str {
    match name.trim() {
        "int" | "byte" | "short" | "long" | "biginteger" => r"(-?\d+)",
        "float" | "double" | "bigdecimal" => r"(-?\d*[.,]?\d+)",
        "word" => r"([^\s]+)",
        "string" => r#"("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
        _ => r"(.*)",
    }
}

/// Drop a leading Gherkin keyword from a feature step line
pub fn strip_keyword(text: &str) -> &str {
    fn keyword_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"^\s*(?:Given|When|Then|And|But|\*)\s+").expect("invalid keyword pattern")
        })
    }
    match keyword_re().find(text) {
        Some(m) => text[m.end()..].trim_end(),
        None => text.trim(),
    }
}

/// Cross-resource cache of compiled step patterns
#[derive(Debug, Default)]
pub struct StepMatcher {
    cache: DashMap<String, Arc<Regex>>,
}

impl StepMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled(&self, pattern: &str) -> Result<Arc<Regex>, PatternError> {
        if let Some(re) = self.cache.get(pattern) {
            return Ok(Arc::clone(re.value()));
        }
        let re = Arc::new(compile_expression(pattern)?);
        self.cache.insert(pattern.to_string(), Arc::clone(&re));
        Ok(re)
    }

    pub fn is_match(&self, pattern: &str, text: &str) -> bool {
        match self.compiled(pattern) {
            Ok(re) => re.is_match(text),
            Err(e) => {
                debug!(pattern, error = %e, "skipping uncompilable step pattern");
                false
            }
        }
    }

    /// Definitions whose pattern matches the whole step text, input order kept
    pub fn find_matches(&self, definitions: &[StepDefinition], text: &str) -> Vec<StepDefinition> {
        let text = strip_keyword(text);
        definitions
            .iter()
            .filter(|d| self.is_match(&d.pattern, text))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
