//! gettext PO catalogs.
//!
//! Every entry is addressed by its `msgctxt`, which holds the unit key; the
//! `msgid` is the original-language text and `msgstr` the translation.
//!
//! ```text
//! # translator note
//! #. inherited from BaseGun
//! #: Defs/Guns.xml:7
//! #, fuzzy
//! msgctxt "ThingDef/Gun.description"
//! msgid "A gun."
//! msgstr "Оружие."
//! ```
//!
//! Entries no longer present in the source are kept with the `#~` prefix.
//! Entries without `msgctxt` are keyed by their `msgid`.

use std::{
    collections::{HashMap, HashSet},
    io::{BufRead, Write},
};

use serde::{Deserialize, Serialize};

use super::SyntaxError;
use crate::{
    error::{Diagnostic, DiagnosticKind, Error},
    traits::Parser,
};

pub const HEADER_LANGUAGE: &str = "Language";
pub const HEADER_SOURCE: &str = "X-Loctree-Source";
pub const HEADER_RESOLVER: &str = "X-Loctree-Resolver";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    pub fuzzy: bool,
    pub obsolete: bool,
    /// Flags other than `fuzzy`, kept in their original order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub source_text: String,
    pub target_text: String,
    pub flags: EntryFlags,
    /// Translator comment, lines joined with `\n`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Tool-generated notes (`#.`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// `path[:line]` references (`#:`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl CatalogEntry {
    pub fn new(key: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source_text: source_text.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_text = target.into();
        self
    }

    pub fn is_translated(&self) -> bool {
        !self.target_text.trim().is_empty()
    }

    /// The file part of the first reference.
    pub fn reference_path(&self) -> Option<&str> {
        let reference = self.references.first()?;
        Some(match reference.rsplit_once(':') {
            Some((path, line)) if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) => path,
            _ => reference.as_str(),
        })
    }
}

/// Header fields, kept in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl CatalogHeader {
    pub fn new(language: Option<&str>) -> Self {
        let mut header = Self::default();
        header.set("Project-Id-Version", "loctree");
        if let Some(language) = language {
            header.set(HEADER_LANGUAGE, language);
        }
        header.set("MIME-Version", "1.0");
        header.set("Content-Type", "text/plain; charset=UTF-8");
        header.set("Content-Transfer-Encoding", "8bit");
        header
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn resolver(&self) -> Option<&str> {
        self.get(HEADER_RESOLVER)
    }

    fn to_msgstr(&self) -> String {
        self.fields
            .iter()
            .map(|(n, v)| format!("{n}: {v}\n"))
            .collect()
    }

    fn from_msgstr(comment: Option<String>, msgstr: &str) -> Self {
        let fields = msgstr
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { comment, fields }
    }
}

/// A decoded catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub header: CatalogHeader,
    pub entries: Vec<CatalogEntry>,
    /// Problems found while decoding; never written back.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl Catalog {
    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn index(&self) -> HashMap<&str, &CatalogEntry> {
        let mut map = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            map.entry(entry.key.as_str()).or_insert(entry);
        }
        map
    }

    /// Entries that are not obsolete.
    pub fn active(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| !e.flags.obsolete)
    }

    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        CatalogReader::default().read(text)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(comment) = &self.header.comment {
            write_comment(&mut out, comment);
        }
        out.push_str("msgid \"\"\n");
        write_string(&mut out, "", "msgstr", &self.header.to_msgstr());

        for entry in &self.entries {
            out.push('\n');
            write_entry(&mut out, entry);
        }
        out
    }
}

impl Parser for Catalog {
    fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, Error> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Catalog::parse(text).map_err(|e| e.into_error("<catalog>"))
    }

    fn read_from<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::not_found(path, "read catalog"));
        }
        let text = crate::fsutil::read_text(path)?;
        Catalog::parse(&text).map_err(|e| e.into_error(path))
    }

    fn to_writer<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        writer.write_all(self.to_text().as_bytes())?;
        Ok(())
    }
}

fn write_comment(out: &mut String, comment: &str) {
    for line in comment.split('\n') {
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn write_entry(out: &mut String, entry: &CatalogEntry) {
    if let Some(comment) = &entry.comment {
        write_comment(out, comment);
    }
    for note in &entry.notes {
        out.push_str("#. ");
        out.push_str(note);
        out.push('\n');
    }
    for reference in &entry.references {
        out.push_str("#: ");
        out.push_str(reference);
        out.push('\n');
    }
    let mut flags: Vec<&str> = Vec::new();
    if entry.flags.fuzzy {
        flags.push("fuzzy");
    }
    flags.extend(entry.flags.other.iter().map(String::as_str));
    if !flags.is_empty() {
        out.push_str("#, ");
        out.push_str(&flags.join(", "));
        out.push('\n');
    }

    let prefix = if entry.flags.obsolete { "#~ " } else { "" };
    write_string(out, prefix, "msgctxt", &entry.key);
    write_string(out, prefix, "msgid", &entry.source_text);
    write_string(out, prefix, "msgstr", &entry.target_text);
}

fn write_string(out: &mut String, prefix: &str, keyword: &str, value: &str) {
    let pieces: Vec<&str> = value.split_inclusive('\n').collect();
    if value.contains('\n') {
        out.push_str(&format!("{prefix}{keyword} \"\"\n"));
        for piece in pieces {
            out.push_str(&format!("{prefix}\"{}\"\n", escape(piece)));
        }
    } else {
        out.push_str(&format!("{prefix}{keyword} \"{}\"\n", escape(value)));
    }
}

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('a') => out.push('\u{07}'),
            Some('b') => out.push('\u{08}'),
            Some('f') => out.push('\u{0c}'),
            Some('v') => out.push('\u{0b}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Context,
    Id,
    Str,
    Ignored,
}

#[derive(Default)]
struct Pending {
    comment: Vec<String>,
    notes: Vec<String>,
    references: Vec<String>,
    flags: EntryFlags,
    context: Option<String>,
    id: Option<String>,
    msgstr: Option<String>,
    line: usize,
}

impl Pending {
    fn is_blank(&self) -> bool {
        self.comment.is_empty()
            && self.notes.is_empty()
            && self.references.is_empty()
            && self.context.is_none()
            && self.id.is_none()
            && self.msgstr.is_none()
            && !self.flags.fuzzy
            && self.flags.other.is_empty()
    }
}

#[derive(Default)]
struct CatalogReader {
    catalog: Catalog,
    header_seen: bool,
    seen: HashSet<String>,
}

impl CatalogReader {
    fn read(mut self, text: &str) -> Result<Catalog, SyntaxError> {
        let mut pending = Pending::default();
        let mut field = Field::Ignored;

        for (index, raw) in text.split('\n').enumerate() {
            let line_no = index + 1;
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let mut line = raw.trim_start();

            if line.trim().is_empty() {
                self.finish(std::mem::take(&mut pending))?;
                field = Field::Ignored;
                continue;
            }

            let mut obsolete = false;
            if let Some(rest) = line.strip_prefix("#~") {
                obsolete = true;
                line = rest.trim_start();
                if line.is_empty() {
                    continue;
                }
            }

            if line.starts_with('#') {
                // A comment after msgstr opens the next entry.
                if pending.msgstr.is_some() {
                    self.finish(std::mem::take(&mut pending))?;
                }
                field = Field::Ignored;
                if let Some(rest) = line.strip_prefix("#,") {
                    for flag in rest.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                        if flag == "fuzzy" {
                            pending.flags.fuzzy = true;
                        } else {
                            pending.flags.other.push(flag.to_string());
                        }
                    }
                } else if let Some(rest) = line.strip_prefix("#:") {
                    pending
                        .references
                        .extend(rest.split_whitespace().map(str::to_string));
                } else if let Some(rest) = line.strip_prefix("#.") {
                    pending.notes.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
                } else if line == "#" {
                    pending.comment.push(String::new());
                } else if let Some(rest) = raw.trim_start().strip_prefix("# ") {
                    pending.comment.push(rest.to_string());
                }
                continue;
            }

            if pending.line == 0 {
                pending.line = line_no;
            }
            pending.flags.obsolete |= obsolete;

            if line.starts_with('"') {
                let value = quoted(line, line_no)?;
                match field {
                    Field::Context => append(&mut pending.context, &value),
                    Field::Id => append(&mut pending.id, &value),
                    Field::Str => append(&mut pending.msgstr, &value),
                    Field::Ignored => {}
                }
                continue;
            }

            let (keyword, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| SyntaxError::new(Some(line_no), format!("unexpected line `{line}`")))?;
            match keyword {
                "msgctxt" => {
                    if pending.id.is_some() {
                        self.finish(std::mem::take(&mut pending))?;
                        pending.line = line_no;
                        pending.flags.obsolete = obsolete;
                    }
                    pending.context = Some(quoted(rest, line_no)?);
                    field = Field::Context;
                }
                "msgid" => {
                    if pending.id.is_some() {
                        self.finish(std::mem::take(&mut pending))?;
                        pending.line = line_no;
                        pending.flags.obsolete = obsolete;
                    }
                    pending.id = Some(quoted(rest, line_no)?);
                    field = Field::Id;
                }
                "msgstr" | "msgstr[0]" => {
                    pending.msgstr = Some(quoted(rest, line_no)?);
                    field = Field::Str;
                }
                "msgid_plural" => field = Field::Ignored,
                k if k.starts_with("msgstr[") => field = Field::Ignored,
                _ => {
                    return Err(SyntaxError::new(
                        Some(line_no),
                        format!("unknown keyword `{keyword}`"),
                    ));
                }
            }
        }
        self.finish(pending)?;
        Ok(self.catalog)
    }

    fn finish(&mut self, pending: Pending) -> Result<(), SyntaxError> {
        if pending.is_blank() {
            return Ok(());
        }
        let comment = (!pending.comment.is_empty()).then(|| pending.comment.join("\n"));
        let Some(id) = pending.id else {
            if pending.context.is_some() || pending.msgstr.is_some() {
                return Err(SyntaxError::new(Some(pending.line), "entry without msgid"));
            }
            // Comments with no entry: a file-level comment before the header.
            if !self.header_seen && self.catalog.entries.is_empty() && self.catalog.header.comment.is_none() {
                self.catalog.header.comment = comment;
            }
            return Ok(());
        };

        if id.is_empty() && pending.context.is_none() && !self.header_seen {
            self.header_seen = true;
            self.catalog.header = CatalogHeader::from_msgstr(
                comment.or(self.catalog.header.comment.take()),
                pending.msgstr.as_deref().unwrap_or_default(),
            );
            return Ok(());
        }

        let key = pending.context.unwrap_or_else(|| id.clone());
        if !self.seen.insert(key.clone()) {
            self.catalog.diagnostics.push(
                Diagnostic::warning(DiagnosticKind::DuplicateKey, format!("duplicate catalog entry `{key}` ignored"))
                    .with_line(Some(pending.line))
                    .with_key(key),
            );
            return Ok(());
        }
        self.catalog.entries.push(CatalogEntry {
            key,
            source_text: id,
            target_text: pending.msgstr.unwrap_or_default(),
            flags: pending.flags,
            comment,
            notes: pending.notes,
            references: pending.references,
        });
        Ok(())
    }
}

fn append(slot: &mut Option<String>, value: &str) {
    slot.get_or_insert_with(String::new).push_str(value);
}

fn quoted(text: &str, line: usize) -> Result<String, SyntaxError> {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        Ok(unescape(&text[1..text.len() - 1]))
    } else {
        Err(SyntaxError::new(Some(line), format!("expected quoted string, found `{text}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn sample() -> Catalog {
        let mut header = CatalogHeader::new(Some("ru"));
        header.set(HEADER_RESOLVER, "inherit=synthesize;fields=default");
        Catalog {
            header,
            entries: vec![
                CatalogEntry {
                    references: vec!["Languages/English/Keyed/UI.xml:3".into()],
                    flags: EntryFlags {
                        fuzzy: true,
                        ..Default::default()
                    },
                    ..CatalogEntry::new("ButtonLabel", "Start").with_target("Начать")
                },
                CatalogEntry {
                    comment: Some("check \"quotes\"\n\n  indented".into()),
                    ..CatalogEntry::new("Multi", "line one\nline two\n").with_target("x\ty")
                },
                CatalogEntry {
                    flags: EntryFlags {
                        obsolete: true,
                        ..Default::default()
                    },
                    ..CatalogEntry::new("Old", "gone").with_target("ушло")
                },
            ],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_write_layout() {
        let text = sample().to_text();
        let expected = indoc! {r#"
            msgid ""
            msgstr ""
            "Project-Id-Version: loctree\n"
            "Language: ru\n"
            "MIME-Version: 1.0\n"
            "Content-Type: text/plain; charset=UTF-8\n"
            "Content-Transfer-Encoding: 8bit\n"
            "X-Loctree-Resolver: inherit=synthesize;fields=default\n"

            #: Languages/English/Keyed/UI.xml:3
            #, fuzzy
            msgctxt "ButtonLabel"
            msgid "Start"
            msgstr "Начать"

            # check "quotes"
            #
            #   indented
            msgctxt "Multi"
            msgid ""
            "line one\n"
            "line two\n"
            msgstr "x\ty"

            #~ msgctxt "Old"
            #~ msgid "gone"
            #~ msgstr "ушло"
        "#};
        assert_eq!(text, expected);
    }

    #[test]
    fn test_round_trip() {
        let catalog = sample();
        let decoded = Catalog::parse(&catalog.to_text()).unwrap();
        assert_eq!(decoded, catalog);
    }

    #[test]
    fn test_parse_external_po_without_context() {
        let text = indoc! {r#"
            # Some translator
            msgid ""
            msgstr "Language: de\n"

            #, c-format, fuzzy
            msgid "Hello %s"
            msgstr "Hallo %s"
            msgid "Bye"
            msgstr "Tschüss"
        "#};
        let catalog = Catalog::parse(text).unwrap();
        assert_eq!(catalog.header.get("language"), Some("de"));
        assert_eq!(catalog.header.comment.as_deref(), Some("Some translator"));
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.entries[0].key, "Hello %s");
        assert!(catalog.entries[0].flags.fuzzy);
        assert_eq!(catalog.entries[0].flags.other, vec!["c-format"]);
        assert_eq!(catalog.entries[1].target_text, "Tschüss");
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let text = indoc! {r#"
            msgctxt "A"
            msgid "one"
            msgstr "1"

            msgctxt "A"
            msgid "two"
            msgstr "2"
        "#};
        let catalog = Catalog::parse(text).unwrap();
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.entries[0].source_text, "one");
        assert_eq!(catalog.diagnostics.len(), 1);
        assert_eq!(catalog.diagnostics[0].kind, DiagnosticKind::DuplicateKey);
    }

    #[test]
    fn test_crlf_input() {
        let text = "msgctxt \"A\"\r\nmsgid \"a\"\r\nmsgstr \"b\"\r\n";
        let catalog = Catalog::parse(text).unwrap();
        assert_eq!(catalog.entries[0].target_text, "b");
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let err = Catalog::parse("msgid \"a\"\nmsgstr b\n").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_reference_path() {
        let mut entry = CatalogEntry::new("A", "a");
        entry.references = vec!["Defs/Guns.xml:12".into()];
        assert_eq!(entry.reference_path(), Some("Defs/Guns.xml"));
        entry.references = vec!["Defs/Guns.xml".into()];
        assert_eq!(entry.reference_path(), Some("Defs/Guns.xml"));
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = "a\\b \"c\"\n\t\r";
        assert_eq!(unescape(&escape(raw)), raw);
    }
}
