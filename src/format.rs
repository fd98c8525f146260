//! Markdown output formatters for CLI commands

use crate::model::{
    BuildReport, ClasspathResult, Diagnostic, FindResult, ProviderEntry, ResourceEntry, SymbolEntry,
};

/// Format build reports as markdown
pub fn build(reports: &[BuildReport]) -> String {
    let mut md = String::new();

    for report in reports {
        md.push_str(&format!("# {} ({})\n\n", report.project, report.trigger));

        if report.skipped {
            md.push_str("Skipped: indexing disabled or project closed.\n\n");
            continue;
        }

        md.push_str(&format!(
            "- Visited: {}\n- Scanned: {}\n- Removed: {}\n",
            report.visited, report.scanned, report.removed
        ));
        if report.cancelled {
            md.push_str("- **Cancelled**\n");
        }

        if !report.failures.is_empty() {
            md.push_str(&format!("\n## Failures ({})\n\n", report.failures.len()));
            for failure in &report.failures {
                md.push_str(&format!("- `{}`: {}\n", failure.resource, failure.message));
            }
        }
        md.push('\n');
    }

    md
}

/// Format indexed definitions as markdown, one section per resource
pub fn list(entries: &[ResourceEntry]) -> String {
    let mut md = String::new();

    if entries.is_empty() {
        md.push_str("No step definitions.\n");
        return md;
    }

    for entry in entries {
        md.push_str(&format!(
            "### {}\n\n*Scanned {}*\n\n",
            entry.resource, entry.scanned_at
        ));
        if entry.definitions.is_empty() {
            md.push_str("(none)\n\n");
            continue;
        }
        for def in &entry.definitions {
            let location = if def.location.is_empty() {
                String::new()
            } else {
                format!(" → `{}`", def.location)
            };
            md.push_str(&format!("- \"{}\"{}\n", def.pattern, location));
        }
        md.push('\n');
    }

    md
}

/// Format a FindResult as markdown using each match's hover text
pub fn find(result: &FindResult) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Find: \"{}\" in {}\n\n", result.text, result.project));

    if result.matches.is_empty() {
        md.push_str("No matching step definition.\n");
    } else {
        for entry in &result.matches {
            md.push_str(&entry.hover);
            md.push_str(&format!("\n\n*{}*\n\n", entry.resource));
        }
    }

    md
}

/// Format a SymbolEntry as markdown
pub fn symbol(entry: &SymbolEntry) -> String {
    let mut md = String::new();

    md.push_str(&format!("# `{}`\n\n", entry.location));

    match entry.status.as_str() {
        "found" => {
            if entry.candidates.len() > 1 {
                md.push_str(&format!(
                    "{} candidates, choose one:\n\n",
                    entry.candidates.len()
                ));
            }
            for candidate in &entry.candidates {
                md.push_str(&format!("- `{}`\n", candidate));
            }
            if let Some(doc) = &entry.documentation {
                md.push_str(&format!("\n{}\n", doc));
            }
        }
        "type_not_found" => md.push_str("Type not found.\n"),
        "member_not_found" => md.push_str("No such method.\n"),
        _ => md.push_str("Unresolved location.\n"),
    }

    md
}

/// Format a ClasspathResult as markdown
pub fn classpath(result: &ClasspathResult) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Search path of {}\n\n", result.project));
    if result.entries.is_empty() {
        md.push_str("(empty)\n");
    }
    for (i, entry) in result.entries.iter().enumerate() {
        md.push_str(&format!("{}. {}\n", i + 1, entry));
    }

    if let (Some(name), Some(found)) = (&result.resource, &result.found) {
        md.push_str(&format!("\n## `{}`\n\n", name));
        if found.is_empty() {
            md.push_str("Not found.\n");
        }
        for url in found {
            md.push_str(&format!("- {}\n", url));
        }
    }

    md
}

/// Format registered providers as markdown
pub fn providers(entries: &[ProviderEntry]) -> String {
    let mut md = String::new();

    for entry in entries {
        md.push_str(&format!(
            "- **{}**: {}\n",
            entry.name,
            entry
                .extensions
                .iter()
                .map(|e| format!("`.{}`", e))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    md
}

/// Format diagnostics as markdown
pub fn diagnostics(entries: &[Diagnostic]) -> String {
    let mut md = String::new();

    if entries.is_empty() {
        md.push_str("No diagnostics.\n");
        return md;
    }

    for d in entries {
        let line = d.line.map_or(String::new(), |l| format!(":{}", l + 1));
        md.push_str(&format!(
            "- **{}** `{}{}`: {}\n",
            d.severity.as_str(),
            d.resource.path.display(),
            line,
            d.message
        ));
    }

    md
}
