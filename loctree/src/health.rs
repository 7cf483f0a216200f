//! Structural and encoding checks for language files.
//!
//! Unlike the locator, which only needs to know that a file is unusable,
//! this reports every problem it can find so translators can fix files the
//! game would reject or misread.

use std::{fmt, path::Path};

use lazy_static::lazy_static;
use quick_xml::{Reader, errors::IllFormedError, events::Event};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    formats::{LineIndex, element_name, language_data::ROOT},
    fsutil, locator,
    run::RunContext,
    versions::VersionSelector,
};

lazy_static! {
    static ref XML_DECL_ENCODING: Regex =
        Regex::new(r#"(?i)<\?xml[^>]*encoding\s*=\s*['"]([^'"]+)['"][^>]*\?>"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthCategory {
    Encoding,
    EncodingDeclared,
    UnexpectedDoctype,
    InvalidChar,
    TagMismatch,
    InvalidEntity,
    UnexpectedRoot,
    Parse,
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthCategory::Encoding => "encoding",
            HealthCategory::EncodingDeclared => "encoding-declared",
            HealthCategory::UnexpectedDoctype => "unexpected-doctype",
            HealthCategory::InvalidChar => "invalid-char",
            HealthCategory::TagMismatch => "tag-mismatch",
            HealthCategory::InvalidEntity => "invalid-entity",
            HealthCategory::UnexpectedRoot => "unexpected-root",
            HealthCategory::Parse => "parse",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub category: HealthCategory,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked: usize,
    pub issues: Vec<HealthIssue>,
}

struct Issues<'a> {
    path: &'a str,
    out: Vec<HealthIssue>,
}

impl Issues<'_> {
    fn push(&mut self, category: HealthCategory, line: Option<usize>, message: impl Into<String>) {
        self.out.push(HealthIssue {
            path: self.path.to_string(),
            line,
            category,
            message: message.into(),
        });
    }
}

/// Decodes `bytes`, reporting anything that is not plain UTF-8.
fn decode(bytes: &[u8], issues: &mut Issues<'_>) -> String {
    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(bytes)
        && encoding != encoding_rs::UTF_8
    {
        issues.push(
            HealthCategory::Encoding,
            None,
            format!("file is {} encoded; expected UTF-8", encoding.name()),
        );
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }
    if let Err(e) = std::str::from_utf8(bytes) {
        let valid = &bytes[..e.valid_up_to()];
        let line = valid.iter().filter(|b| **b == b'\n').count() + 1;
        issues.push(
            HealthCategory::Encoding,
            Some(line),
            format!("invalid UTF-8 at byte {}", e.valid_up_to()),
        );
    }
    let (text, _) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
    text.into_owned()
}

fn classify(error: &quick_xml::Error) -> HealthCategory {
    match error {
        quick_xml::Error::IllFormed(
            IllFormedError::MismatchedEndTag { .. }
            | IllFormedError::UnmatchedEndTag(_)
            | IllFormedError::MissingEndTag(_),
        ) => HealthCategory::TagMismatch,
        quick_xml::Error::Escape(_) => HealthCategory::InvalidEntity,
        _ => HealthCategory::Parse,
    }
}

/// Checks one file's bytes. `path` is only used for reporting.
pub fn check_bytes(path: &str, bytes: &[u8]) -> Vec<HealthIssue> {
    let mut issues = Issues {
        path,
        out: Vec::new(),
    };
    let content = decode(bytes, &mut issues);
    let lines = LineIndex::new(&content);

    if let Some(caps) = XML_DECL_ENCODING.captures(&content) {
        let declared = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let normalized = declared.to_ascii_lowercase().replace('_', "-");
        if normalized != "utf-8" && normalized != "utf8" {
            issues.push(
                HealthCategory::EncodingDeclared,
                Some(lines.line_of(caps.get(0).map(|m| m.start()).unwrap_or(0))),
                format!("declares encoding={declared}; expected UTF-8"),
            );
        }
    }

    if let Some((offset, ch)) = content
        .char_indices()
        .find(|(_, c)| (*c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r'))
    {
        issues.push(
            HealthCategory::InvalidChar,
            Some(lines.line_of(offset)),
            format!("control character U+{:04X}", ch as u32),
        );
    }

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(false);
    let mut depth = 0usize;
    let mut open: Vec<(String, usize)> = Vec::new();
    let mut root_seen = false;
    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => issues.push(
                HealthCategory::UnexpectedDoctype,
                Some(lines.line_of(start)),
                "DOCTYPE is not expected in LanguageData",
            ),
            Ok(Event::Start(e)) => {
                let name = element_name(e.name());
                if !root_seen {
                    root_seen = true;
                    if name != ROOT {
                        issues.push(
                            HealthCategory::UnexpectedRoot,
                            Some(lines.line_of(start)),
                            format!("root element is <{name}>, expected <{ROOT}>"),
                        );
                    }
                }
                open.push((name, lines.line_of(start)));
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                if !root_seen {
                    root_seen = true;
                    let name = element_name(e.name());
                    if name != ROOT {
                        issues.push(
                            HealthCategory::UnexpectedRoot,
                            Some(lines.line_of(start)),
                            format!("root element is <{name}>, expected <{ROOT}>"),
                        );
                    }
                }
            }
            Ok(Event::End(_)) => {
                open.pop();
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                if let Err(e) = t.unescape() {
                    issues.push(
                        HealthCategory::InvalidEntity,
                        Some(lines.line_of(start)),
                        e.to_string(),
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                let at = reader.error_position() as usize;
                issues.push(classify(&e), Some(lines.line_of(at)), e.to_string());
                return issues.out;
            }
        }
    }

    if depth > 0
        && let Some((name, line)) = open.last()
    {
        issues.push(HealthCategory::TagMismatch, Some(*line), format!("unclosed element <{name}>"));
    }
    if !root_seen {
        issues.push(HealthCategory::Parse, None, "document has no root element");
    }
    issues.out
}

/// Checks every XML file of the `language` directories under `root`.
pub fn xml_health(
    root: &Path,
    language: &str,
    versions: &VersionSelector,
    ctx: &RunContext,
) -> Result<HealthReport, Error> {
    if !root.is_dir() {
        return Err(Error::not_found(root, "xml health"));
    }
    let files: Vec<_> = locator::language_dirs(root, language, versions)
        .iter()
        .flat_map(|dir| fsutil::xml_files(dir))
        .collect();

    let results = ctx.map_files(&files, |file| {
        let rel = fsutil::rel_path(root, file);
        match std::fs::read(file) {
            Ok(bytes) => check_bytes(&rel, &bytes),
            Err(e) => vec![HealthIssue {
                path: rel,
                line: None,
                category: HealthCategory::Encoding,
                message: format!("unreadable: {e}"),
            }],
        }
    })?;

    let report = HealthReport {
        checked: files.len(),
        issues: results.into_iter().flatten().collect(),
    };
    tracing::info!("checked {} file(s): {} issue(s)", report.checked, report.issues.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn categories(path: &str, content: &[u8]) -> Vec<HealthCategory> {
        check_bytes(path, content).iter().map(|i| i.category).collect()
    }

    #[test]
    fn test_clean_file() {
        let xml = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<LanguageData>\n  <A>ok &amp; fine</A>\n</LanguageData>\n";
        assert!(check_bytes("A.xml", xml).is_empty());
    }

    #[test]
    fn test_declared_encoding_and_doctype() {
        let xml = b"<?xml version=\"1.0\" encoding=\"windows-1251\"?>\n<!DOCTYPE x>\n<LanguageData/>\n";
        let issues = check_bytes("A.xml", xml);
        assert_eq!(issues[0].category, HealthCategory::EncodingDeclared);
        assert_eq!(issues[1].category, HealthCategory::UnexpectedDoctype);
        assert_eq!(issues[1].line, Some(2));
    }

    #[test]
    fn test_tag_mismatch_and_root() {
        assert_eq!(
            categories("A.xml", b"<LanguageData>\n  <A>x</B>\n</LanguageData>"),
            vec![HealthCategory::TagMismatch]
        );
        assert_eq!(
            categories("A.xml", b"<Defs>\n</Defs>"),
            vec![HealthCategory::UnexpectedRoot]
        );
        assert_eq!(
            categories("A.xml", b"<LanguageData>\n  <A>x</A>\n"),
            vec![HealthCategory::TagMismatch]
        );
    }

    #[test]
    fn test_invalid_entity_and_control_char() {
        assert_eq!(
            categories("A.xml", b"<LanguageData><A>Tom &jerry; x</A></LanguageData>"),
            vec![HealthCategory::InvalidEntity]
        );
        let issues = check_bytes("A.xml", b"<LanguageData>\n<A>bell\x07</A></LanguageData>");
        assert_eq!(issues[0].category, HealthCategory::InvalidChar);
        assert_eq!(issues[0].line, Some(2));
    }

    #[test]
    fn test_encoding_problems() {
        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "<LanguageData/>".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(categories("A.xml", &utf16), vec![HealthCategory::Encoding]);

        let latin1 = b"<LanguageData>\n<A>caf\xE9</A>\n</LanguageData>";
        let issues = check_bytes("A.xml", latin1);
        assert_eq!(issues[0].category, HealthCategory::Encoding);
        assert_eq!(issues[0].line, Some(2));
    }

    #[test]
    fn test_scan_language_directory() {
        let dir = TempDir::new().unwrap();
        let keyed = dir.path().join("Languages/Russian/Keyed");
        fs::create_dir_all(&keyed).unwrap();
        fs::write(keyed.join("Good.xml"), "<LanguageData><A>a</A></LanguageData>").unwrap();
        fs::write(keyed.join("Bad.xml"), "<LanguageData><A>a</B></LanguageData>").unwrap();
        fs::write(keyed.join("notes.txt"), "<<<").unwrap();

        let report =
            xml_health(dir.path(), "Russian", &VersionSelector::All, &RunContext::default()).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].path, "Languages/Russian/Keyed/Bad.xml");
    }
}
