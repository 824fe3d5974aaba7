//! Anchored H2 sections: listing, patching, and linting. Pure, no I/O.
//!
//! A section starts at a `## ` heading whose next non-blank line is an anchor
//! marker, either `<!-- @anchor: <id> -->` or `[//]: # (anchor: <id>)`, and
//! runs until the next `## ` heading or end of text.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::canonical::{canonicalize_text, content_hash};
use super::MarkdownError;

/// Evidence-style lists above this many bullets produce a lint warning.
pub const EVIDENCE_SOFT_CAP: usize = 7;

static ANCHOR_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"^<!--\s*@anchor:\s*(.+?)\s*-->\s*$").expect("valid anchor regex"),
        Regex::new(r"^\[//\]:\s*#\s*\(anchor:\s*(.+?)\s*\)\s*$").expect("valid anchor regex"),
    ]
});

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+").expect("valid bullet regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    pub anchor: String,
    pub heading: String,
    /// Heading line index (inclusive).
    pub start: usize,
    /// One past the last line of the section.
    pub end: usize,
    /// Index of the anchor marker line.
    pub marker_line: usize,
}

/// A section patch. Being an enum, a change is always exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionChange {
    /// Swap the section body, keeping heading and marker lines verbatim.
    Replace(String),
    /// Add lines after the existing body content.
    Append(String),
}

impl SectionChange {
    pub fn text(&self) -> &str {
        match self {
            Self::Replace(t) | Self::Append(t) => t,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Replace(_) => "replace",
            Self::Append(_) => "append",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub text: String,
    pub before_hash: String,
    pub after_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub warnings: Vec<String>,
    /// No rule sets this yet; callers may still honor it.
    pub blocked: bool,
    pub blocked_reasons: Vec<String>,
}

/// Heading text and trimmed body of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionText {
    pub heading: String,
    pub text: String,
}

pub type SectionMap = BTreeMap<String, SectionText>;

fn is_heading(line: &str) -> bool {
    line.starts_with("## ")
}

/// Extract the anchor id from a marker line, if it is one.
pub fn parse_anchor_marker(line: &str) -> Option<String> {
    ANCHOR_PATTERNS
        .iter()
        .find_map(|rx| rx.captures(line))
        .map(|caps| caps[1].trim().to_string())
}

fn next_non_blank(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| !lines[i].trim().is_empty())
}

/// All anchored sections in document order. Headings without a marker are skipped.
pub fn list_sections(text: &str) -> Vec<SectionInfo> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_heading(line) {
            continue;
        }
        let heading = line[3..].trim().to_string();

        let marker = next_non_blank(&lines, i + 1)
            .filter(|&j| !is_heading(lines[j]))
            .and_then(|j| parse_anchor_marker(lines[j]).map(|anchor| (j, anchor)));

        let end = (i + 1..lines.len())
            .find(|&k| is_heading(lines[k]))
            .unwrap_or(lines.len());

        if let Some((marker_line, anchor)) = marker {
            sections.push(SectionInfo {
                anchor,
                heading,
                start: i,
                end,
                marker_line,
            });
        }
    }

    sections
}

/// Canonical lines contributed by a change; empty text contributes none.
fn change_lines(text: &str) -> Vec<String> {
    let canonical = canonicalize_text(text);
    let body = canonical.strip_suffix('\n').unwrap_or(&canonical);
    if body.is_empty() {
        Vec::new()
    } else {
        body.split('\n').map(str::to_string).collect()
    }
}

/// Apply `change` to the section identified by `anchor`.
///
/// The body between the marker and the section end is treated as a leading
/// blank run, content, and a trailing blank run. Append inserts after the
/// content; replace swaps the content. Blank runs are kept so section
/// spacing survives repeated patches.
pub fn patch_section_by_anchor(
    input: &str,
    anchor: &str,
    change: &SectionChange,
) -> Result<PatchResult, MarkdownError> {
    let canonical = canonicalize_text(input);
    let before_hash = content_hash(&canonical);
    let lines: Vec<&str> = canonical.lines().collect();

    let target = list_sections(&canonical)
        .into_iter()
        .find(|s| s.anchor == anchor)
        .ok_or_else(|| MarkdownError::AnchorNotFound(anchor.to_string()))?;

    let body_start = target.marker_line + 1;
    let non_blank = |i: &usize| !lines[*i].trim().is_empty();
    let content_start = (body_start..target.end).find(non_blank).unwrap_or(body_start);
    let content_end = (content_start..target.end)
        .rev()
        .find(non_blank)
        .map(|i| i + 1)
        .unwrap_or(content_start);

    let (keep_until, resume_at) = match change {
        SectionChange::Append(_) => (content_end, content_end),
        SectionChange::Replace(_) => (content_start, content_end),
    };

    let inserted = change_lines(change.text());
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + inserted.len());
    out.extend_from_slice(&lines[..keep_until]);
    out.extend(inserted.iter().map(String::as_str));
    out.extend_from_slice(&lines[resume_at..]);

    let text = canonicalize_text(&out.join("\n"));
    let after_hash = content_hash(&text);

    Ok(PatchResult {
        text,
        before_hash,
        after_hash,
    })
}

/// Structural checks. Never mutates and never fails.
pub fn lint_markdown(text: &str) -> LintReport {
    let lines: Vec<&str> = text.lines().collect();
    let mut warnings = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_heading(line) {
            continue;
        }
        let has_marker = next_non_blank(&lines, i + 1)
            .map(|j| !is_heading(lines[j]) && parse_anchor_marker(lines[j]).is_some())
            .unwrap_or(false);
        if !has_marker {
            warnings.push(format!("Missing anchor marker after H2 at line {}", i + 1));
        }
    }

    for section in list_sections(text) {
        if !section.anchor.to_lowercase().contains("evidence") {
            continue;
        }
        let bullets = lines[section.start..section.end]
            .iter()
            .filter(|l| BULLET.is_match(l))
            .count();
        if bullets > EVIDENCE_SOFT_CAP {
            warnings.push(format!(
                "Evidence items exceed soft cap (found {bullets} > {EVIDENCE_SOFT_CAP})"
            ));
        }
    }

    LintReport {
        warnings,
        blocked: false,
        blocked_reasons: Vec::new(),
    }
}

/// Anchor → heading and trimmed body (heading and marker lines excluded).
pub fn read_section_map(text: &str) -> SectionMap {
    let lines: Vec<&str> = text.lines().collect();
    list_sections(text)
        .into_iter()
        .map(|s| {
            let body = lines[s.marker_line + 1..s.end].join("\n").trim().to_string();
            (
                s.anchor,
                SectionText {
                    heading: s.heading,
                    text: body,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Overview\n\
\n\
## Identity\n\
[//]: # (anchor: identity)\n\
\n\
- User ID: u1\n\
\n\
## Change Log\n\
<!-- @anchor: change_log -->\n\
\n\
- 2026-01-01T00:00:00Z: initialized overview\n";

    #[test]
    fn lists_sections_with_both_marker_syntaxes() {
        let sections = list_sections(DOC);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].anchor, "identity");
        assert_eq!(sections[0].heading, "Identity");
        assert_eq!((sections[0].start, sections[0].end), (2, 7));
        assert_eq!(sections[1].anchor, "change_log");
        assert_eq!(sections[1].marker_line, 8);
        assert_eq!(sections[1].end, 11);
    }

    #[test]
    fn marker_may_follow_blank_lines() {
        let doc = "## Focus\n\n\n<!-- @anchor: current_focus -->\nbody\n";
        let sections = list_sections(doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].marker_line, 3);
    }

    #[test]
    fn heading_without_marker_is_not_listed() {
        let doc = "## Loose\nno marker here\n## Anchored\n[//]: # (anchor: a)\n";
        let sections = list_sections(doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].anchor, "a");
    }

    #[test]
    fn parse_marker_trims_id() {
        assert_eq!(parse_anchor_marker("<!--   @anchor:  x y  -->").as_deref(), Some("x y"));
        assert_eq!(parse_anchor_marker("[//]: # (anchor: role v1)").as_deref(), Some("role v1"));
        assert!(parse_anchor_marker("<!-- anchor: nope -->").is_none());
    }

    #[test]
    fn append_grows_section_by_appended_lines() {
        let before = list_sections(DOC);
        let patched = patch_section_by_anchor(
            DOC,
            "identity",
            &SectionChange::Append("- Pronouns: they/them\n- Timezone: UTC".into()),
        )
        .unwrap();

        let after = list_sections(&patched.text);
        let old = &before[0];
        let new = after.iter().find(|s| s.anchor == "identity").unwrap();
        assert_eq!((new.end - new.start) - (old.end - old.start), 2);
        assert!(patched.text.contains("- User ID: u1\n- Pronouns: they/them\n- Timezone: UTC\n\n## Change Log"));
    }

    #[test]
    fn append_to_last_section_lands_at_end() {
        let patched = patch_section_by_anchor(
            DOC,
            "change_log",
            &SectionChange::Append("- 2026-01-02T00:00:00Z: second".into()),
        )
        .unwrap();
        assert!(patched
            .text
            .ends_with("initialized overview\n- 2026-01-02T00:00:00Z: second\n"));
    }

    #[test]
    fn replace_keeps_heading_and_marker() {
        let patched =
            patch_section_by_anchor(DOC, "identity", &SectionChange::Replace("- new".into()))
                .unwrap();
        assert!(patched
            .text
            .contains("## Identity\n[//]: # (anchor: identity)\n\n- new\n\n## Change Log"));
        assert!(!patched.text.contains("User ID"));
    }

    #[test]
    fn replace_after_append_discards_appended_content() {
        let appended =
            patch_section_by_anchor(DOC, "identity", &SectionChange::Append("- extra".into()))
                .unwrap();
        let replaced = patch_section_by_anchor(
            &appended.text,
            "identity",
            &SectionChange::Replace("- only this".into()),
        )
        .unwrap();

        let map = read_section_map(&replaced.text);
        assert_eq!(map["identity"].text, "- only this");
        assert!(!replaced.text.contains("- extra"));
    }

    #[test]
    fn patch_reports_hashes() {
        let patched =
            patch_section_by_anchor(DOC, "identity", &SectionChange::Append("- x".into())).unwrap();
        assert_eq!(patched.before_hash, content_hash(DOC));
        assert_eq!(patched.after_hash, content_hash(&patched.text));
        assert_ne!(patched.before_hash, patched.after_hash);
    }

    #[test]
    fn missing_anchor_is_an_error() {
        let err = patch_section_by_anchor(DOC, "nope", &SectionChange::Append("x".into()))
            .unwrap_err();
        assert!(matches!(err, MarkdownError::AnchorNotFound(ref a) if a == "nope"));
    }

    #[test]
    fn append_into_empty_body() {
        let doc = "## Empty\n[//]: # (anchor: empty)\n## Next\n[//]: # (anchor: next)\n";
        let patched =
            patch_section_by_anchor(doc, "empty", &SectionChange::Append("- first".into()))
                .unwrap();
        assert_eq!(
            patched.text,
            "## Empty\n[//]: # (anchor: empty)\n- first\n## Next\n[//]: # (anchor: next)\n"
        );
    }

    #[test]
    fn empty_append_changes_nothing() {
        let patched =
            patch_section_by_anchor(DOC, "identity", &SectionChange::Append(String::new())).unwrap();
        assert_eq!(patched.before_hash, patched.after_hash);
    }

    #[test]
    fn lint_flags_missing_marker_once() {
        let doc = "## Has\n[//]: # (anchor: has)\n\n## Lacks\nplain text\n";
        let report = lint_markdown(doc);
        assert_eq!(report.warnings, vec!["Missing anchor marker after H2 at line 4"]);
        assert!(!report.blocked);
    }

    #[test]
    fn lint_soft_caps_evidence() {
        let mut doc = String::from("## Evidence\n[//]: # (anchor: evidence)\n\n");
        for i in 0..8 {
            doc.push_str(&format!("- item {i}\n"));
        }
        let report = lint_markdown(&doc);
        assert_eq!(report.warnings, vec!["Evidence items exceed soft cap (found 8 > 7)"]);
        assert!(!report.blocked);

        let seven: String = doc.lines().take(10).collect::<Vec<_>>().join("\n");
        assert!(lint_markdown(&seven).warnings.is_empty());
    }

    #[test]
    fn section_map_excludes_heading_and_marker() {
        let map = read_section_map(DOC);
        assert_eq!(map["identity"].heading, "Identity");
        assert_eq!(map["identity"].text, "- User ID: u1");
        assert_eq!(
            map["change_log"].text,
            "- 2026-01-01T00:00:00Z: initialized overview"
        );
    }
}
