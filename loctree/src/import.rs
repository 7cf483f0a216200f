//! Catalog to language tree import.
//!
//! Importing is split in two steps. [`plan_import`] reads the target tree
//! and computes every file operation, including the final file content,
//! without writing anything. [`apply_import`] performs exactly the writes of
//! a plan.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Diagnostic, DiagnosticKind, Error, Severity},
    formats::{
        language_data::{self, Document, Item, is_element_name},
        po::{Catalog, CatalogEntry},
    },
    fsutil::{self, TextEncoding},
    lang,
    resolver::split_def_injected_key,
    run::RunContext,
    types::{TreeSnapshot, same_text},
    versions,
};

/// File name used when an entry has no usable reference, and for
/// single-file imports.
pub const IMPORTED_FILE: &str = "_Imported.xml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportOptions {
    /// Target language folder, e.g. `Russian`.
    pub language: String,
    /// Write empty elements for untranslated keys that are missing from the
    /// destination. Existing values are never blanked.
    pub keep_empty: bool,
    /// Write everything into `Languages/<lang>/Keyed/_Imported.xml`.
    pub single_file: bool,
    /// Skip files whose values already match. Without it every targeted file
    /// is rewritten.
    pub incremental: bool,
    /// Skip entries whose source text equals the current source tree, even
    /// when their translation changed. Only entries with new or changed
    /// source text are imported.
    pub only_diff: bool,
    /// Copy every touched language directory aside before writing.
    pub backup: bool,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every value already matches.
    Identical,
    /// The existing file cannot be parsed and is left alone.
    Unreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Create,
    Update,
    Skip { reason: SkipReason },
}

impl PlannedAction {
    pub fn is_write(&self) -> bool {
        !matches!(self, PlannedAction::Skip { .. })
    }
}

/// One file of an import or build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    /// Path relative to the plan root, `/`-separated.
    pub path: String,
    #[serde(flatten)]
    pub action: PlannedAction,
    /// Number of catalog entries routed to this file.
    pub keys: usize,
    /// Full file content after the write. `None` for skips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Encoding `content` is written in; that of the existing file for
    /// updates.
    #[serde(default, skip_serializing_if = "TextEncoding::is_utf8")]
    pub encoding: TextEncoding,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCounts {
    pub total: usize,
    pub imported: usize,
    pub obsolete: usize,
    pub empty: usize,
    /// Entries dropped by `only_diff`.
    pub unchanged_source: usize,
    /// Entries whose key cannot be written as an element name.
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPlan {
    pub root: PathBuf,
    pub language: String,
    pub files: Vec<FileOp>,
    pub entries: EntryCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ImportPlan {
    pub fn writes(&self) -> impl Iterator<Item = &FileOp> {
        self.files.iter().filter(|op| op.action.is_write())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Written,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: String,
    #[serde(flatten)]
    pub action: PlannedAction,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub cancelled: bool,
}

impl ImportReport {
    pub fn written(&self) -> impl Iterator<Item = &FileResult> {
        self.files.iter().filter(|f| f.status == FileStatus::Written)
    }
}

/// Where an entry lands inside a language directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Destination {
    /// Version directory prefix taken from the reference, `""` or `"1.5/"`.
    pub prefix: String,
    /// Path below `Languages/<lang>/`.
    pub rel: String,
    /// Element name inside the file.
    pub tag: String,
    pub def_type: Option<String>,
    /// Set when the reference was unusable and a fallback file was chosen.
    pub note: Option<Diagnostic>,
}

/// `<rel>` of a `Languages/<Lang>/<rel>` path.
fn language_rel(path: &str) -> Option<&str> {
    path.strip_prefix("Languages/")?.split_once('/').map(|(_, rel)| rel)
}

/// Element name and def type of a catalog key, or why the key cannot be
/// written into a language file.
fn key_parts(key: &str) -> Result<(String, Option<String>), String> {
    match split_def_injected_key(key) {
        Some((def_type, path)) => {
            if !is_element_name(def_type) || def_type.contains('.') {
                Err(format!("`{def_type}` is not a def type"))
            } else if !is_element_name(path) || path.split('.').any(str::is_empty) {
                Err(format!("`{path}` is not a def field path"))
            } else {
                Ok((path.to_string(), Some(def_type.to_string())))
            }
        }
        None if is_element_name(key) => Ok((key.to_string(), None)),
        None => Err(format!("`{key}` is not a valid element name")),
    }
}

/// Checks a language folder name taken from a request.
pub(crate) fn check_language(language: &str, operation: &str) -> Result<(), Error> {
    if language.trim().is_empty() {
        return Err(Error::invalid_request(format!("{operation} needs a target language")));
    }
    if fsutil::safe_rel(language).as_deref() != Some(language) || language.contains('/') {
        return Err(Error::invalid_request(format!(
            "`{language}` is not a language folder name"
        )));
    }
    Ok(())
}

/// Routes `entry` to a file below `Languages/<lang>/`. Keys that cannot be
/// element names are rejected with an `InvalidKey` diagnostic. A reference
/// that climbs out of its language folder is ignored in favor of the
/// fallback file and reported as `UnsafePath`.
pub(crate) fn destination(entry: &CatalogEntry, single_file: bool) -> Result<Destination, Diagnostic> {
    let (tag, def_type) = key_parts(&entry.key).map_err(|why| {
        Diagnostic::warning(DiagnosticKind::InvalidKey, format!("not imported: {why}"))
            .with_key(entry.key.clone())
    })?;

    if single_file {
        return Ok(Destination {
            prefix: String::new(),
            rel: format!("Keyed/{IMPORTED_FILE}"),
            tag,
            def_type,
            note: None,
        });
    }

    let reference = entry
        .reference_path()
        .filter(|p| fsutil::is_xml_file(Path::new(p)));
    let (prefix, rest) = reference.map(versions::split_prefix).unwrap_or(("", ""));
    let mut note = None;
    let in_language = match language_rel(rest) {
        Some(rel) => {
            let safe = fsutil::safe_rel(rel);
            if safe.is_none() {
                note = Some(
                    Diagnostic::warning(
                        DiagnosticKind::UnsafePath,
                        "reference leaves the language folder, using a fallback file",
                    )
                    .with_key(entry.key.clone())
                    .with_path(reference.unwrap_or_default()),
                );
            }
            safe
        }
        None => None,
    };

    let rel = match &def_type {
        None => match in_language {
            Some(rel) if rel.starts_with("Keyed/") => rel,
            _ => format!("Keyed/{IMPORTED_FILE}"),
        },
        Some(def_type) => {
            let folder = format!("DefInjected/{def_type}/");
            match in_language {
                Some(rel) if rel.starts_with(&folder) => rel,
                _ => {
                    let file = reference
                        .filter(|_| note.is_none())
                        .and_then(|r| r.rsplit('/').next())
                        .and_then(fsutil::safe_rel)
                        .unwrap_or_else(|| IMPORTED_FILE.to_string());
                    format!("{folder}{file}")
                }
            }
        }
    };
    Ok(Destination {
        prefix: prefix.to_string(),
        rel,
        tag,
        def_type,
        note,
    })
}

/// A value routed to one file.
#[derive(Debug, Clone)]
pub(crate) struct Routed {
    pub tag: String,
    pub value: String,
    pub def_type: Option<String>,
    /// Empty value kept only because of `keep_empty`.
    pub placeholder: bool,
}

/// Items for a fresh or appended file section. Def-injected values in a
/// consolidated file are grouped under a comment naming their def type.
pub(crate) fn items_for(values: &[&Routed], grouped: bool) -> Vec<Item> {
    if !grouped {
        return values
            .iter()
            .map(|v| Item::entry(v.tag.clone(), v.value.clone()))
            .collect();
    }
    let mut items: Vec<Item> = values
        .iter()
        .filter(|v| v.def_type.is_none())
        .map(|v| Item::entry(v.tag.clone(), v.value.clone()))
        .collect();
    let mut def_types: Vec<&str> = Vec::new();
    for value in values {
        if let Some(def_type) = value.def_type.as_deref()
            && !def_types.contains(&def_type)
        {
            def_types.push(def_type);
        }
    }
    for def_type in def_types {
        items.push(Item::Comment(def_type.to_string()));
        items.extend(
            values
                .iter()
                .filter(|v| v.def_type.as_deref() == Some(def_type))
                .map(|v| Item::entry(v.tag.clone(), v.value.clone())),
        );
    }
    items
}

/// Resolves the on-disk folder name of `language` for one version prefix,
/// honoring folders with a native-name suffix.
fn language_folder(root: &Path, prefix: &str, language: &str, cache: &mut HashMap<String, String>) -> String {
    cache
        .entry(prefix.to_string())
        .or_insert_with(|| {
            lang::find_language_dir(&root.join(prefix).join("Languages"), language)
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| language.to_string())
        })
        .clone()
}

fn plan_file(
    root: &Path,
    path: String,
    values: &[Routed],
    options: &ImportOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<FileOp, Error> {
    let abs = root.join(&path);
    let keys = values.len();
    let all: Vec<&Routed> = values.iter().collect();

    if !abs.exists() {
        let content = language_data::render(&items_for(&all, options.single_file))?;
        return Ok(FileOp {
            path,
            action: PlannedAction::Create,
            keys,
            content: Some(content),
            encoding: TextEncoding::Utf8,
        });
    }

    let parsed = fsutil::read_text_file(&abs)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            Document::parse(file.text)
                .map(|doc| (doc, file.encoding))
                .map_err(|e| e.to_string())
        });
    let (doc, encoding) = match parsed {
        Ok(parsed) => parsed,
        Err(message) => {
            tracing::warn!("{path}: existing file is unreadable, not touching it: {message}");
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::Malformed, format!("not imported: {message}"))
                    .with_severity(Severity::Error)
                    .with_path(path.clone()),
            );
            return Ok(FileOp {
                path,
                action: PlannedAction::Skip {
                    reason: SkipReason::Unreadable,
                },
                keys,
                content: None,
                encoding: TextEncoding::Utf8,
            });
        }
    };

    let mut replacements = Vec::new();
    let mut appended = Vec::new();
    let mut unchanged = Vec::new();
    for value in values {
        match doc.value(&value.tag) {
            Some(_) if value.placeholder => {}
            Some(current) if same_text(current, &value.value) => {
                unchanged.push((value.tag.clone(), current.to_string()))
            }
            Some(_) => replacements.push((value.tag.clone(), value.value.clone())),
            None => appended.push(value),
        }
    }

    if replacements.is_empty() && appended.is_empty() {
        if options.incremental {
            return Ok(FileOp {
                path,
                action: PlannedAction::Skip {
                    reason: SkipReason::Identical,
                },
                keys,
                content: None,
                encoding,
            });
        }
        replacements = unchanged;
    }

    let content = doc.patch(&replacements, &items_for(&appended, options.single_file));
    Ok(FileOp {
        path,
        action: PlannedAction::Update,
        keys,
        content: Some(content),
        encoding,
    })
}

/// Computes the import of `catalog` into the `options.language` tree under
/// `root`. Nothing is written.
///
/// `source` is the current source-language snapshot and is required when
/// `only_diff` is set.
pub fn plan_import(
    catalog: &Catalog,
    root: &Path,
    source: Option<&TreeSnapshot>,
    options: &ImportOptions,
) -> Result<ImportPlan, Error> {
    if !root.is_dir() {
        return Err(Error::not_found(root, "import"));
    }
    check_language(&options.language, "import")?;
    let source_index = match (options.only_diff, source) {
        (true, None) => {
            return Err(Error::invalid_request(
                "only_diff needs the current source tree",
            ));
        }
        (true, Some(snapshot)) => Some(snapshot.index()),
        (false, _) => None,
    };

    let mut counts = EntryCounts {
        total: catalog.entries.len(),
        ..Default::default()
    };
    let mut folders = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut routed: HashMap<String, Vec<Routed>> = HashMap::new();
    let mut seen_tags: HashSet<(String, String)> = HashSet::new();
    let mut diagnostics = Vec::new();

    for entry in &catalog.entries {
        if entry.flags.obsolete {
            counts.obsolete += 1;
            continue;
        }
        if let Some(index) = &source_index
            && let Some(unit) = index.get(entry.key.as_str())
            && same_text(&unit.source_text, &entry.source_text)
        {
            counts.unchanged_source += 1;
            continue;
        }
        let placeholder = !entry.is_translated();
        if placeholder && !options.keep_empty {
            counts.empty += 1;
            continue;
        }

        let dest = match destination(entry, options.single_file) {
            Ok(dest) => dest,
            Err(diagnostic) => {
                tracing::warn!("{}", diagnostic.message);
                diagnostics.push(diagnostic);
                counts.invalid += 1;
                continue;
            }
        };
        if let Some(note) = &dest.note {
            tracing::warn!("{}: {}", entry.key, note.message);
            diagnostics.push(note.clone());
        }
        let folder = language_folder(root, &dest.prefix, &options.language, &mut folders);
        let path = format!("{}Languages/{folder}/{}", dest.prefix, dest.rel);
        if !seen_tags.insert((path.clone(), dest.tag.clone())) {
            tracing::warn!("{path}: `{}` routed twice, keeping the first", dest.tag);
            continue;
        }
        if !routed.contains_key(&path) {
            order.push(path.clone());
        }
        routed.entry(path).or_default().push(Routed {
            tag: dest.tag,
            value: if placeholder { String::new() } else { entry.target_text.clone() },
            def_type: dest.def_type,
            placeholder,
        });
        counts.imported += 1;
    }

    let mut files = Vec::with_capacity(order.len());
    for path in order {
        let values = routed.remove(&path).unwrap_or_default();
        files.push(plan_file(root, path, &values, options, &mut diagnostics)?);
    }

    let backup_dir = options
        .backup
        .then(|| backup_dir_or_default(root, &options.language, options.backup_dir.as_deref()));

    tracing::info!(
        "import plan for {}: {} file(s), {} entries routed",
        options.language,
        files.len(),
        counts.imported
    );

    Ok(ImportPlan {
        root: root.to_path_buf(),
        language: options.language.clone(),
        files,
        entries: counts,
        backup_dir,
        diagnostics,
    })
}

/// Starts every source key off in the `language` tree: missing files are
/// created and missing keys appended as empty elements. Existing values
/// are never touched.
pub fn plan_init(source: &TreeSnapshot, root: &Path, language: &str) -> Result<ImportPlan, Error> {
    let scaffold = Catalog {
        entries: source
            .units
            .iter()
            .map(|unit| {
                let mut entry = CatalogEntry::new(&unit.key, &unit.source_text);
                entry.references.push(unit.reference());
                entry
            })
            .collect(),
        ..Default::default()
    };
    let options = ImportOptions {
        language: language.to_string(),
        keep_empty: true,
        incremental: true,
        ..Default::default()
    };
    plan_import(&scaffold, root, None, &options)
}

/// `<root>/.loctree-backup/<lang>-<unix seconds>` unless `explicit` is set.
pub(crate) fn backup_dir_or_default(root: &Path, language: &str, explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        root.join(".loctree-backup").join(format!("{language}-{secs}"))
    })
}

/// `[<version>/]Languages/<lang>` part of a planned path.
fn language_root(path: &str) -> Option<String> {
    let (prefix, rest) = versions::split_prefix(path);
    let folder = rest.strip_prefix("Languages/")?.split('/').next()?;
    Some(format!("{prefix}Languages/{folder}"))
}

/// Copies every language directory `files` writes into aside, below `dir`.
pub(crate) fn backup(root: &Path, files: &[FileOp], dir: &Path) -> Result<(), Error> {
    let mut roots: Vec<String> = files
        .iter()
        .filter(|op| op.action.is_write())
        .filter_map(|op| language_root(&op.path))
        .collect();
    roots.sort();
    roots.dedup();

    for rel in roots {
        let existing = root.join(&rel);
        if !existing.is_dir() {
            continue;
        }
        let copied = fsutil::copy_tree(&existing, &dir.join(&rel)).map_err(|e| Error::BackupFailed {
            path: dir.to_path_buf(),
            message: format!("copying {rel}: {e}"),
        })?;
        tracing::info!("backed up {copied} file(s) of {rel} to {}", dir.display());
    }
    Ok(())
}

/// Performs the writes of `plan`.
///
/// A requested backup runs first; if it fails nothing is written. After
/// that, each write either succeeds or is recorded as failed, and the
/// remaining files are still attempted. Cancellation is checked between
/// files.
pub fn apply_import(plan: &ImportPlan, ctx: &RunContext) -> Result<ImportReport, Error> {
    if let Some(dir) = &plan.backup_dir {
        backup(&plan.root, &plan.files, dir)?;
    }
    let mut report = write_files(&plan.root, &plan.files, ctx);
    report.backup_dir = plan.backup_dir.clone();
    tracing::info!(
        "import finished: {} created, {} updated, {} skipped, {} failed",
        report.created,
        report.updated,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// Writes every non-skipped file of `files` below `root`, each in its
/// planned encoding.
pub(crate) fn write_files(root: &Path, files: &[FileOp], ctx: &RunContext) -> ImportReport {
    let mut report = ImportReport::default();
    let total = files.len();
    for (index, op) in files.iter().enumerate() {
        if ctx.is_cancelled() {
            tracing::warn!("cancelled after {index} of {total} file(s)");
            report.cancelled = true;
            break;
        }

        let mut result = FileResult {
            path: op.path.clone(),
            action: op.action,
            status: FileStatus::Skipped,
            error: None,
        };
        match (&op.action, &op.content) {
            (PlannedAction::Skip { .. }, _) | (_, None) => report.skipped += 1,
            (action, Some(content)) => {
                let path = root.join(&op.path);
                match fsutil::write_atomic(&path, &op.encoding.encode(content)) {
                    Ok(()) => {
                        tracing::debug!("wrote {}", op.path);
                        result.status = FileStatus::Written;
                        match action {
                            PlannedAction::Create => report.created += 1,
                            _ => report.updated += 1,
                        }
                    }
                    Err(e) => {
                        let err = Error::WriteFailure { path, source: e };
                        tracing::warn!("{err}");
                        result.status = FileStatus::Failed;
                        result.error = Some(err.to_string());
                        report.failed += 1;
                    }
                }
            }
        }
        report.files.push(result);
        ctx.report(index + 1, total);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TranslationUnit;
    use std::fs;
    use tempfile::TempDir;

    fn entry(key: &str, source: &str, target: &str, reference: Option<&str>) -> CatalogEntry {
        let mut entry = CatalogEntry::new(key, source).with_target(target);
        entry.references.extend(reference.map(str::to_string));
        entry
    }

    fn catalog(entries: Vec<CatalogEntry>) -> Catalog {
        Catalog {
            entries,
            ..Default::default()
        }
    }

    fn options() -> ImportOptions {
        ImportOptions {
            language: "Russian".into(),
            incremental: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_destination_conventions() {
        let keyed = entry("A", "a", "", Some("1.5/Languages/English/Keyed/Sub/UI.xml:3"));
        let dest = destination(&keyed, false).unwrap();
        assert_eq!(dest.prefix, "1.5/");
        assert_eq!(dest.rel, "Keyed/Sub/UI.xml");
        assert_eq!(dest.tag, "A");

        let def = entry("ThingDef/Gun.label", "rifle", "", Some("Defs/Weapons/Guns.xml:7"));
        let dest = destination(&def, false).unwrap();
        assert_eq!(dest.rel, "DefInjected/ThingDef/Guns.xml");
        assert_eq!(dest.tag, "Gun.label");
        assert_eq!(dest.def_type.as_deref(), Some("ThingDef"));

        let injected = entry(
            "ThingDef/Gun.label",
            "rifle",
            "",
            Some("Languages/English/DefInjected/ThingDef/Extra/Guns.xml:2"),
        );
        assert_eq!(
            destination(&injected, false).unwrap().rel,
            "DefInjected/ThingDef/Extra/Guns.xml"
        );

        let bare = entry("B", "b", "", None);
        assert_eq!(destination(&bare, false).unwrap().rel, "Keyed/_Imported.xml");
        assert_eq!(destination(&def, true).unwrap().rel, "Keyed/_Imported.xml");
    }

    #[test]
    fn test_destination_rejects_bad_keys() {
        for key in ["Hello world", "1st", "", "ThingDef/", "/label", "Thing.Def/Gun.label", "ThingDef/Gun..label", "ThingDef/a/b"] {
            let err = destination(&entry(key, "s", "", None), false).unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::InvalidKey, "{key}");
            assert_eq!(err.key.as_deref(), Some(key));
        }
        assert!(destination(&entry("Тест_1", "s", "", None), false).is_ok());
    }

    #[test]
    fn test_destination_stays_in_language_folder() {
        let keyed = entry(
            "Hello",
            "h",
            "",
            Some("Languages/English/Keyed/../../../../escaped.xml:1"),
        );
        let dest = destination(&keyed, false).unwrap();
        assert_eq!(dest.rel, "Keyed/_Imported.xml");
        assert_eq!(dest.note.map(|n| n.kind), Some(DiagnosticKind::UnsafePath));

        let def = entry(
            "ThingDef/Gun.label",
            "rifle",
            "",
            Some("Languages/English/DefInjected/ThingDef/../../../../x.xml:1"),
        );
        let dest = destination(&def, false).unwrap();
        assert_eq!(dest.rel, "DefInjected/ThingDef/_Imported.xml");
        assert!(dest.note.is_some());

        let def = entry("ThingDef/Gun.label", "rifle", "", Some("../../Defs/Guns.xml:1"));
        assert_eq!(destination(&def, false).unwrap().rel, "DefInjected/ThingDef/Guns.xml");

        let dotted = entry("A", "a", "", Some("Languages/English/Keyed/./UI.xml:1"));
        let dest = destination(&dotted, false).unwrap();
        assert_eq!(dest.rel, "Keyed/UI.xml");
        assert!(dest.note.is_none());
    }

    #[test]
    fn test_import_never_writes_outside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("mod");
        fs::create_dir_all(&root).unwrap();
        let cat = catalog(vec![
            entry(
                "Hello",
                "Hello",
                "Привет",
                Some("Languages/English/Keyed/../../../../escaped.xml:1"),
            ),
            entry("Hello world", "Hello world", "Привет мир", None),
        ]);
        let plan = plan_import(&cat, &root, None, &options()).unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "Languages/Russian/Keyed/_Imported.xml");
        assert_eq!(plan.entries.imported, 1);
        assert_eq!(plan.entries.invalid, 1);
        let kinds: Vec<DiagnosticKind> = plan.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::UnsafePath, DiagnosticKind::InvalidKey]);

        apply_import(&plan, &RunContext::default()).unwrap();
        assert!(!dir.path().join("escaped.xml").exists());
        let written = root.join("Languages/Russian/Keyed/_Imported.xml");
        let doc = Document::parse(fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(doc.value("Hello"), Some("Привет"));
        assert_eq!(doc.slots().len(), 1);
    }

    #[test]
    fn test_language_must_be_a_folder_name() {
        let dir = TempDir::new().unwrap();
        for language in ["../Russian", "Russian/Keyed", "/tmp"] {
            let opts = ImportOptions {
                language: language.into(),
                ..options()
            };
            let err = plan_import(&catalog(Vec::new()), dir.path(), None, &opts).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "{language}");
        }
    }

    #[test]
    fn test_update_keeps_file_encoding() {
        let dir = TempDir::new().unwrap();
        let keyed = dir.path().join("Languages/Russian/Keyed");
        fs::create_dir_all(&keyed).unwrap();
        let before = "<?xml version=\"1.0\" encoding=\"{enc}\"?>\r\n<LanguageData>\r\n  <A>старое</A>\r\n</LanguageData>\r\n";
        let after = "<?xml version=\"1.0\" encoding=\"{enc}\"?>\r\n<LanguageData>\r\n  <A>новое</A>\r\n</LanguageData>\r\n";
        let cases = [
            ("Utf16.xml", TextEncoding::Utf16Le, "utf-16"),
            ("Utf16Be.xml", TextEncoding::Utf16Be, "utf-16"),
            ("Bom.xml", TextEncoding::Utf8Bom, "utf-8"),
        ];
        let mut entries = Vec::new();
        for (file, encoding, name) in cases {
            fs::write(keyed.join(file), encoding.encode(&before.replace("{enc}", name))).unwrap();
            entries.push(entry(
                "A",
                "a",
                "новое",
                Some(&format!("Languages/English/Keyed/{file}")),
            ));
        }
        let plan = plan_import(&catalog(entries), dir.path(), None, &options()).unwrap();
        assert!(plan.diagnostics.is_empty());
        let report = apply_import(&plan, &RunContext::default()).unwrap();
        assert_eq!(report.updated, 3);

        for (file, encoding, name) in cases {
            let op = plan.files.iter().find(|op| op.path.ends_with(file)).unwrap();
            assert_eq!(op.encoding, encoding);
            let bytes = fs::read(keyed.join(file)).unwrap();
            assert_eq!(bytes, encoding.encode(&after.replace("{enc}", name)), "{file}");
        }

        // A second run finds every file identical.
        let cat = catalog(
            cases
                .iter()
                .map(|(file, ..)| entry("A", "a", "новое", Some(&format!("Languages/English/Keyed/{file}"))))
                .collect(),
        );
        let again = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert_eq!(again.writes().count(), 0);
    }

    #[test]
    fn test_create_then_identical_skip() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(vec![entry(
            "ButtonLabel",
            "Start",
            "Начать",
            Some("Languages/English/Keyed/UI.xml:2"),
        )]);

        let plan = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "Languages/Russian/Keyed/UI.xml");
        assert_eq!(plan.files[0].action, PlannedAction::Create);
        assert!(!dir.path().join("Languages").exists());

        let report = apply_import(&plan, &RunContext::default()).unwrap();
        assert_eq!((report.created, report.updated, report.skipped), (1, 0, 0));
        let written = fs::read_to_string(dir.path().join("Languages/Russian/Keyed/UI.xml")).unwrap();
        assert!(written.contains("<ButtonLabel>Начать</ButtonLabel>"));

        let again = plan_import(&cat, dir.path(), None, &options()).unwrap();
        let report = apply_import(&again, &RunContext::default()).unwrap();
        assert_eq!((report.created, report.updated, report.skipped), (0, 0, 1));
    }

    #[test]
    fn test_update_preserves_other_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let original = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<LanguageData>\r\n    <!-- menu -->\r\n    <A attr=\"1\">старое</A>\r\n    <B>бэ</B>\r\n</LanguageData>\r\n";
        fs::write(&path, original).unwrap();

        let cat = catalog(vec![
            entry("A", "a", "новое", Some("Languages/English/Keyed/UI.xml:2")),
            entry("C", "c", "цэ", Some("Languages/English/Keyed/UI.xml:4")),
        ]);
        let plan = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert_eq!(plan.files[0].action, PlannedAction::Update);
        apply_import(&plan, &RunContext::default()).unwrap();

        let updated = fs::read_to_string(&path).unwrap();
        assert_eq!(
            updated,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<LanguageData>\r\n    <!-- menu -->\r\n    <A attr=\"1\">новое</A>\r\n    <B>бэ</B>\r\n    <C>цэ</C>\r\n</LanguageData>\r\n"
        );
    }

    #[test]
    fn test_non_incremental_rewrites_identical_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<LanguageData>\n  <A>а</A>\n</LanguageData>\n").unwrap();

        let cat = catalog(vec![entry("A", "a", "а", Some("Languages/English/Keyed/UI.xml"))]);
        let opts = ImportOptions {
            incremental: false,
            ..options()
        };
        let plan = plan_import(&cat, dir.path(), None, &opts).unwrap();
        assert_eq!(plan.files[0].action, PlannedAction::Update);
        assert_eq!(
            plan.files[0].content.as_deref(),
            Some("<LanguageData>\n  <A>а</A>\n</LanguageData>\n")
        );
    }

    #[test]
    fn test_keep_empty_never_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<LanguageData>\n  <A>а</A>\n</LanguageData>\n").unwrap();

        let cat = catalog(vec![
            entry("A", "a", "", Some("Languages/English/Keyed/UI.xml")),
            entry("B", "b", "", Some("Languages/English/Keyed/UI.xml")),
        ]);
        let skipped = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert!(skipped.files.is_empty());
        assert_eq!(skipped.entries.empty, 2);

        let opts = ImportOptions {
            keep_empty: true,
            ..options()
        };
        let plan = plan_import(&cat, dir.path(), None, &opts).unwrap();
        assert_eq!(
            plan.files[0].content.as_deref(),
            Some("<LanguageData>\n  <A>а</A>\n  <B></B>\n</LanguageData>\n")
        );
    }

    #[test]
    fn test_obsolete_and_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<LanguageData><A>а</B>").unwrap();

        let mut old = entry("Old", "o", "о", Some("Languages/English/Keyed/UI.xml"));
        old.flags.obsolete = true;
        let cat = catalog(vec![old, entry("A", "a", "а", Some("Languages/English/Keyed/UI.xml"))]);
        let plan = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert_eq!(plan.entries.obsolete, 1);
        assert_eq!(
            plan.files[0].action,
            PlannedAction::Skip {
                reason: SkipReason::Unreadable
            }
        );
        assert_eq!(plan.diagnostics.len(), 1);

        apply_import(&plan, &RunContext::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<LanguageData><A>а</B>");
    }

    #[test]
    fn test_single_file_groups_def_types() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(vec![
            entry("ThingDef/Gun.label", "rifle", "винтовка", Some("Defs/Guns.xml:4")),
            entry("Hello", "Hello", "Привет", Some("Languages/English/Keyed/UI.xml:2")),
        ]);
        let opts = ImportOptions {
            single_file: true,
            ..options()
        };
        let plan = plan_import(&cat, dir.path(), None, &opts).unwrap();
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].path, "Languages/Russian/Keyed/_Imported.xml");
        let content = plan.files[0].content.as_deref().unwrap();
        let hello = content.find("<Hello>").unwrap();
        let comment = content.find("<!-- ThingDef -->").unwrap();
        let gun = content.find("<Gun.label>винтовка</Gun.label>").unwrap();
        assert!(hello < comment && comment < gun);
    }

    #[test]
    fn test_existing_folder_with_native_suffix() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Languages/Russian (Русский)/Keyed")).unwrap();
        let cat = catalog(vec![entry("A", "a", "а", Some("Languages/English/Keyed/UI.xml"))]);
        let plan = plan_import(&cat, dir.path(), None, &options()).unwrap();
        assert_eq!(plan.files[0].path, "Languages/Russian (Русский)/Keyed/UI.xml");
    }

    #[test]
    fn test_init_fills_gaps_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<LanguageData>\n  <A>а</A>\n</LanguageData>\n").unwrap();

        let mut gun = TranslationUnit::keyed("ThingDef/Gun.label", "gun", "Defs/Guns.xml");
        gun.kind = crate::types::UnitKind::DefInjected {
            field_path: "label".into(),
        };
        let source = TreeSnapshot {
            units: vec![
                TranslationUnit::keyed("A", "a", "Languages/English/Keyed/UI.xml"),
                TranslationUnit::keyed("B", "b", "Languages/English/Keyed/UI.xml"),
                gun,
            ],
            ..TreeSnapshot::empty(dir.path(), "English", Default::default())
        };
        let plan = plan_init(&source, dir.path(), "Russian").unwrap();
        let paths: Vec<&str> = plan.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Languages/Russian/Keyed/UI.xml",
                "Languages/Russian/DefInjected/ThingDef/Guns.xml"
            ]
        );
        assert_eq!(
            plan.files[0].content.as_deref(),
            Some("<LanguageData>\n  <A>а</A>\n  <B></B>\n</LanguageData>\n")
        );
        assert_eq!(plan.files[1].action, PlannedAction::Create);

        apply_import(&plan, &RunContext::default()).unwrap();
        let again = plan_init(&source, dir.path(), "Russian").unwrap();
        assert_eq!(again.writes().count(), 0);
    }

    #[test]
    fn test_only_diff_requires_source() {
        let dir = TempDir::new().unwrap();
        let opts = ImportOptions {
            only_diff: true,
            ..options()
        };
        let err = plan_import(&catalog(Vec::new()), dir.path(), None, &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_write_failure_is_per_file() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(vec![
            entry("A", "a", "а", Some("Languages/English/Keyed/A.xml")),
            entry("B", "b", "б", Some("Languages/English/Keyed/B.xml")),
        ]);
        let plan = plan_import(&cat, dir.path(), None, &options()).unwrap();
        // A directory now sits where the first file should go.
        fs::create_dir_all(dir.path().join("Languages/Russian/Keyed/A.xml")).unwrap();

        let report = apply_import(&plan, &RunContext::default()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.files[0].status, FileStatus::Failed);
        assert!(dir.path().join("Languages/Russian/Keyed/B.xml").is_file());
    }
}
