//! Reference extraction from specification text.
//!
//! Three shapes are recognised, never overlapping:
//! - `![alt](target)` → image
//! - `[text](target)` → markdown link
//! - `spec.<alias>#<section>` or `spec[<alias>#<section>]` → inline reference,
//!   normalized to `spec.<alias>#<section>`
//!
//! All shapes are matched by one scanner in that priority order, so an image
//! is never also reported as a link and a link text containing an inline
//! reference is reported once, as a link.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const ALIAS_PATTERN: &str = r"[A-Za-z0-9][A-Za-z0-9_-]*";
const SECTION_PATTERN: &str = r"[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*";

/// Kind of reference found in a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// `[text](target)`.
    Markdown,

    /// `![alt](target)`.
    Image,

    /// `spec.<alias>#<section>`.
    Inline,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Image => write!(f, "image"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// Location of a reference in its source text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourcePosition {
    /// Byte offset of the first character.
    pub offset: usize,

    /// 1-based line.
    pub line: usize,

    /// 1-based column, in characters.
    pub column: usize,
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A reference found in specification text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    /// Reference shape.
    pub kind: ReferenceKind,

    /// Link target, or the normalized `spec.<alias>#<section>` form.
    pub url: String,

    /// Where the reference starts.
    pub position: SourcePosition,
}

impl Reference {
    /// Alias of an inline reference.
    pub fn alias(&self) -> Option<&str> {
        self.inline_parts().map(|(alias, _)| alias)
    }

    /// Section of an inline reference.
    pub fn section(&self) -> Option<&str> {
        self.inline_parts().map(|(_, section)| section)
    }

    fn inline_parts(&self) -> Option<(&str, &str)> {
        if self.kind != ReferenceKind::Inline {
            return None;
        }
        self.url.strip_prefix("spec.")?.split_once('#')
    }
}

/// Normalized form of an inline reference.
pub fn inline_reference(alias: &str, section: &str) -> String {
    format!("spec.{}#{}", alias, section)
}

/// Whether `alias` can be addressed by inline references.
pub fn is_valid_alias(alias: &str) -> bool {
    static ALIAS: OnceLock<Regex> = OnceLock::new();
    ALIAS
        .get_or_init(|| {
            Regex::new(&format!("^{}$", ALIAS_PATTERN)).expect("alias pattern is valid")
        })
        .is_match(alias)
}

fn scanner() -> &'static Regex {
    static SCANNER: OnceLock<Regex> = OnceLock::new();
    SCANNER.get_or_init(|| {
        let target = r#"[^)\s]+(?:\s+"[^"\n]*")?"#;
        let pattern = format!(
            concat!(
                r"!\[[^\]\n]*\]\((?P<image>{target})\)",
                r"|\[[^\]\n]*\]\((?P<link>{target})\)",
                r"|\bspec\.(?P<dot_alias>{alias})#(?P<dot_section>{section})",
                r"|\bspec\[(?P<bracket_alias>{alias})#(?P<bracket_section>{section})\]",
            ),
            target = target,
            alias = ALIAS_PATTERN,
            section = SECTION_PATTERN,
        );
        Regex::new(&pattern).expect("reference scanner pattern is valid")
    })
}

/// Strip an optional `"title"` from a link target.
fn link_target(raw: &str) -> String {
    raw.split_whitespace().next().unwrap_or(raw).to_string()
}

struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn position(&self, offset: usize) -> SourcePosition {
        let line = self.starts.partition_point(|&start| start <= offset);
        let line_start = self.starts[line - 1];
        SourcePosition {
            offset,
            line,
            column: self.text[line_start..offset].chars().count() + 1,
        }
    }
}

/// Extract every reference from `text`, in order of first character.
pub fn parse_references(text: &str) -> Vec<Reference> {
    let index = LineIndex::new(text);

    scanner()
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let (kind, url) = if let Some(m) = caps.name("image") {
                (ReferenceKind::Image, link_target(m.as_str()))
            } else if let Some(m) = caps.name("link") {
                (ReferenceKind::Markdown, link_target(m.as_str()))
            } else if let (Some(alias), Some(section)) =
                (caps.name("dot_alias"), caps.name("dot_section"))
            {
                (
                    ReferenceKind::Inline,
                    inline_reference(alias.as_str(), section.as_str()),
                )
            } else {
                let alias = caps.name("bracket_alias")?;
                let section = caps.name("bracket_section")?;
                (
                    ReferenceKind::Inline,
                    inline_reference(alias.as_str(), section.as_str()),
                )
            };

            Some(Reference {
                kind,
                url,
                position: index.position(start),
            })
        })
        .collect()
}
