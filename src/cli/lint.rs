//! CLI `lint` command: check a local markdown file for anchor problems.

use anyhow::{Context, Result};
use std::path::Path;

use mdmemory::markdown::{content_hash, lint_markdown, list_sections};

/// Lint a file and print its sections and warnings. Returns the warning count.
pub fn lint(path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let report = lint_markdown(&text);
    let sections = list_sections(&text);

    println!("{}", path.display());
    println!("  hash:     {}", content_hash(&text));
    println!("  sections: {}", sections.len());
    for section in &sections {
        println!("    - {} ({})", section.anchor, section.heading);
    }

    if report.warnings.is_empty() {
        println!("  no warnings");
    } else {
        println!("  warnings:");
        for warning in &report.warnings {
            println!("    - {warning}");
        }
    }

    Ok(report.warnings.len())
}
