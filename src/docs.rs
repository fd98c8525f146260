//! Documentation pages and hover content for step definitions.

use htmd::HtmlToMarkdown;

use crate::config::DocumentationStyle;
use crate::model::StepDefinition;
use crate::resolve::Resolution;

/// Wrap raw documentation HTML in a styled page
pub fn render_page(body: &str, style: &DocumentationStyle) -> String {
    format!(
        "<html><head><style>body {{ color: {}; background-color: {}; }}</style></head><body>{}</body></html>",
        style.foreground, style.background, body
    )
}

/// Converter that drops the page prolog's head and style
fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .skip_tags(vec!["head", "style", "script"])
        .build()
}

/// Convert a rendered page to markdown; the original HTML is kept on failure
pub fn to_markdown(html: &str) -> String {
    match converter().convert(html) {
        Ok(md) => md.trim().to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "html to markdown conversion failed");
            html.to_string()
        }
    }
}

/// Format a step definition and its resolution as markdown for a hover tooltip.
pub fn hover_content(definition: &StepDefinition, resolution: &Resolution) -> String {
    let mut parts = vec![format!("## {}", definition.pattern)];

    if !definition.location.is_blank() {
        parts.push(format!("*{}*", definition.location));
    }

    match resolution {
        Resolution::Found(symbol) => {
            let names: Vec<String> = symbol
                .candidates
                .iter()
                .map(|m| format!("- `{}`", m.canonical_name()))
                .collect();
            if symbol.candidates.len() > 1 {
                parts.push(format!(
                    "{} candidates, choose one:\n{}",
                    symbol.candidates.len(),
                    names.join("\n")
                ));
            } else {
                parts.push(names.join("\n"));
            }
            if let Some(html) = &symbol.documentation_html {
                let md = to_markdown(html);
                if !md.is_empty() {
                    parts.push(md);
                }
            }
        }
        Resolution::TypeNotFound => parts.push("Type not found".to_string()),
        Resolution::MemberNotFound(ty) => parts.push(format!("No such method in `{}`", ty.name)),
        Resolution::Unresolved => {}
    }

    parts.join("\n\n")
}
