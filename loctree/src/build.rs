//! Standalone translation package generation.
//!
//! A package is `About/About.xml` plus `Languages/<lang>/...` files laid out
//! after the original source files. Like import, building is a pure
//! [`plan_build`] followed by [`apply_build`].

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Diagnostic, DiagnosticKind, Error},
    formats::{
        about::{self, PackageMetadata},
        language_data::{self, Document},
        po::Catalog,
    },
    fsutil::{self, TextEncoding},
    import::{FileOp, FileResult, FileStatus, PlannedAction, Routed, check_language, destination, items_for},
    locator,
    run::RunContext,
    versions::VersionSelector,
};

pub const ABOUT_FILE: &str = "About/About.xml";

/// Where package content comes from.
#[derive(Debug, Clone, Copy)]
pub enum BuildInput<'a> {
    /// Translated, non-obsolete catalog entries.
    Catalog(&'a Catalog),
    /// The existing `Languages/<lang>` tree of a mod root.
    SourceRoot(&'a Path),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildOptions {
    pub output: PathBuf,
    pub metadata: PackageMetadata,
    /// Language folder written into the package.
    pub language: String,
    /// Keep only the first of several values for one element of one file.
    #[serde(default)]
    pub dedupe: bool,
    /// Version directories read from a source root.
    #[serde(default)]
    pub versions: VersionSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub output: PathBuf,
    pub files: Vec<FileOp>,
    /// Values placed into language files.
    pub entries: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub output: PathBuf,
    pub written: usize,
    pub failed: usize,
    pub files: Vec<FileResult>,
    pub cancelled: bool,
}

#[derive(Default)]
struct Layout {
    order: Vec<String>,
    files: HashMap<String, Vec<Routed>>,
    seen: HashSet<(String, String)>,
    entries: usize,
}

impl Layout {
    fn add(&mut self, path: String, value: Routed, dedupe: bool, diagnostics: &mut Vec<Diagnostic>) {
        if !self.seen.insert((path.clone(), value.tag.clone())) {
            let message = format!("`{}` appears more than once in {path}", value.tag);
            tracing::warn!("{message}");
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::DuplicateKey, message)
                    .with_path(path.clone())
                    .with_key(value.tag.clone()),
            );
            if dedupe {
                return;
            }
        }
        if !self.files.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.files.entry(path).or_default().push(value);
        self.entries += 1;
    }
}

fn layout_from_catalog(catalog: &Catalog, options: &BuildOptions, diagnostics: &mut Vec<Diagnostic>) -> Layout {
    let mut layout = Layout::default();
    for entry in catalog.active().filter(|e| e.is_translated()) {
        let dest = match destination(entry, false) {
            Ok(dest) => dest,
            Err(diagnostic) => {
                tracing::warn!("{}", diagnostic.message);
                diagnostics.push(diagnostic);
                continue;
            }
        };
        if let Some(note) = &dest.note {
            tracing::warn!("{}: {}", entry.key, note.message);
            diagnostics.push(note.clone());
        }
        let path = format!("Languages/{}/{}", options.language, dest.rel);
        let value = Routed {
            tag: dest.tag,
            value: entry.target_text.clone(),
            def_type: dest.def_type,
            placeholder: false,
        };
        layout.add(path, value, options.dedupe, diagnostics);
    }
    layout
}

fn layout_from_tree(root: &Path, options: &BuildOptions, diagnostics: &mut Vec<Diagnostic>) -> Result<Layout, Error> {
    if !root.is_dir() {
        return Err(Error::not_found(root, "build"));
    }
    let mut layout = Layout::default();
    for lang_dir in locator::language_dirs(root, &options.language, &options.versions) {
        for file in fsutil::xml_files(&lang_dir) {
            let rel = fsutil::rel_path(&lang_dir, &file);
            let shown = fsutil::rel_path(root, &file);
            let doc = fsutil::read_text(&file)
                .map_err(|e| Error::malformed(&shown, None, e.to_string()))
                .and_then(|text| Document::parse(text).map_err(|e| e.into_error(&shown)));
            let doc = match doc {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!("{e}");
                    diagnostics.extend(e.to_diagnostic());
                    continue;
                }
            };
            let path = format!("Languages/{}/{rel}", options.language);
            for slot in doc.slots() {
                let value = Routed {
                    tag: slot.key.clone(),
                    value: slot.value.clone(),
                    def_type: None,
                    placeholder: false,
                };
                layout.add(path.clone(), value, options.dedupe, diagnostics);
            }
        }
    }
    Ok(layout)
}

fn action_for(output: &Path, rel: &str) -> PlannedAction {
    if output.join(rel).exists() {
        PlannedAction::Update
    } else {
        PlannedAction::Create
    }
}

/// Computes every file of the package. Nothing is written.
pub fn plan_build(input: BuildInput<'_>, options: &BuildOptions) -> Result<BuildPlan, Error> {
    options.metadata.validate()?;
    check_language(&options.language, "build")?;

    let mut diagnostics = Vec::new();
    let layout = match input {
        BuildInput::Catalog(catalog) => layout_from_catalog(catalog, options, &mut diagnostics),
        BuildInput::SourceRoot(root) => layout_from_tree(root, options, &mut diagnostics)?,
    };

    let mut files = vec![FileOp {
        path: ABOUT_FILE.to_string(),
        action: action_for(&options.output, ABOUT_FILE),
        keys: 0,
        content: Some(about::render(&options.metadata)?),
        encoding: TextEncoding::Utf8,
    }];
    for path in &layout.order {
        let values: Vec<&Routed> = layout.files.get(path).map(|v| v.iter().collect()).unwrap_or_default();
        files.push(FileOp {
            path: path.clone(),
            action: action_for(&options.output, path),
            keys: values.len(),
            content: Some(language_data::render(&items_for(&values, false))?),
            encoding: TextEncoding::Utf8,
        });
    }

    tracing::info!(
        "build plan for {}: {} file(s), {} entries",
        options.metadata.package_id,
        files.len(),
        layout.entries
    );
    Ok(BuildPlan {
        output: options.output.clone(),
        files,
        entries: layout.entries,
        diagnostics,
    })
}

/// Writes the files of `plan` below its output directory.
pub fn apply_build(plan: &BuildPlan, ctx: &RunContext) -> Result<BuildReport, Error> {
    let mut report = BuildReport {
        output: plan.output.clone(),
        ..Default::default()
    };
    let total = plan.files.len();
    for (index, op) in plan.files.iter().enumerate() {
        if ctx.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let Some(content) = &op.content else {
            continue;
        };
        let path = plan.output.join(&op.path);
        let mut result = FileResult {
            path: op.path.clone(),
            action: op.action,
            status: FileStatus::Written,
            error: None,
        };
        if let Err(e) = fsutil::write_atomic(&path, &op.encoding.encode(content)) {
            let err = Error::WriteFailure { path, source: e };
            tracing::warn!("{err}");
            result.status = FileStatus::Failed;
            result.error = Some(err.to_string());
            report.failed += 1;
        } else {
            report.written += 1;
        }
        report.files.push(result);
        ctx.report(index + 1, total);
    }
    tracing::info!(
        "package written to {}: {} file(s), {} failed",
        plan.output.display(),
        report.written,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::po::CatalogEntry;
    use std::fs;
    use tempfile::TempDir;

    fn options(output: &Path, dedupe: bool) -> BuildOptions {
        BuildOptions {
            output: output.to_path_buf(),
            metadata: PackageMetadata {
                name: "Guns (RU)".into(),
                package_id: "me.guns.ru".into(),
                supported_version: "1.5".into(),
                author: None,
                description: None,
            },
            language: "Russian".into(),
            dedupe,
            versions: VersionSelector::All,
        }
    }

    fn entry(key: &str, target: &str, reference: &str) -> CatalogEntry {
        let mut entry = CatalogEntry::new(key, "src").with_target(target);
        entry.references.push(reference.into());
        entry
    }

    #[test]
    fn test_plan_from_catalog() {
        let out = TempDir::new().unwrap();
        let mut untranslated = entry("Empty", "", "Languages/English/Keyed/UI.xml:5");
        untranslated.target_text.clear();
        let mut gone = entry("Gone", "ушло", "Languages/English/Keyed/UI.xml:6");
        gone.flags.obsolete = true;
        let catalog = Catalog {
            entries: vec![
                entry("ThingDef/Gun.label", "винтовка", "1.5/Defs/Guns.xml:4"),
                entry("Hello", "Привет", "1.5/Languages/English/Keyed/UI.xml:2"),
                untranslated,
                gone,
            ],
            ..Default::default()
        };
        let plan = plan_build(BuildInput::Catalog(&catalog), &options(out.path(), false)).unwrap();
        let paths: Vec<&str> = plan.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "About/About.xml",
                "Languages/Russian/DefInjected/ThingDef/Guns.xml",
                "Languages/Russian/Keyed/UI.xml",
            ]
        );
        assert_eq!(plan.entries, 2);
        assert!(plan.files.iter().all(|f| f.action == PlannedAction::Create));
        assert!(fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let out = TempDir::new().unwrap();
        let catalog = Catalog {
            entries: vec![
                entry("ThingDef/Gun.label", "первый", "Defs/Guns.xml:4"),
                entry("ThingDef/Gun.label", "второй", "1.5/Defs/Guns.xml:4"),
            ],
            ..Default::default()
        };
        let plan = plan_build(BuildInput::Catalog(&catalog), &options(out.path(), true)).unwrap();
        let content = plan.files[1].content.as_deref().unwrap();
        assert!(content.contains("первый"));
        assert!(!content.contains("второй"));
        assert_eq!(plan.diagnostics.len(), 1);

        let plan = plan_build(BuildInput::Catalog(&catalog), &options(out.path(), false)).unwrap();
        let content = plan.files[1].content.as_deref().unwrap();
        assert!(content.contains("второй"));
        assert_eq!(plan.diagnostics.len(), 1);
    }

    #[test]
    fn test_apply_writes_exactly_the_plan() {
        let src = TempDir::new().unwrap();
        let keyed = src.path().join("Languages/Russian/Keyed/UI.xml");
        fs::create_dir_all(keyed.parent().unwrap()).unwrap();
        fs::write(&keyed, "<LanguageData>\n  <Hello>Привет</Hello>\n</LanguageData>\n").unwrap();

        let out = TempDir::new().unwrap();
        let package = out.path().join("pkg");
        let plan = plan_build(BuildInput::SourceRoot(src.path()), &options(&package, false)).unwrap();
        let report = apply_build(&plan, &RunContext::default()).unwrap();
        assert_eq!(report.written, plan.files.len());

        for op in &plan.files {
            let on_disk = fs::read_to_string(package.join(&op.path)).unwrap();
            assert_eq!(Some(on_disk.as_str()), op.content.as_deref());
        }
        let about = fs::read_to_string(package.join(ABOUT_FILE)).unwrap();
        assert!(about.contains("<packageId>me.guns.ru</packageId>"));
    }

    #[test]
    fn test_unsafe_references_and_keys() {
        let out = TempDir::new().unwrap();
        let package = out.path().join("pkg");
        let catalog = Catalog {
            entries: vec![
                entry("Hello", "Привет", "Languages/English/Keyed/../../../../escaped.xml:1"),
                entry("Hello world", "Привет мир", "Languages/English/Keyed/UI.xml:2"),
                entry("ThingDef/Gun..label", "винтовка", "Defs/Guns.xml:4"),
            ],
            ..Default::default()
        };
        let plan = plan_build(BuildInput::Catalog(&catalog), &options(&package, false)).unwrap();
        let paths: Vec<&str> = plan.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["About/About.xml", "Languages/Russian/Keyed/_Imported.xml"]);
        assert_eq!(plan.entries, 1);
        let kinds: Vec<DiagnosticKind> = plan.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::UnsafePath, DiagnosticKind::InvalidKey, DiagnosticKind::InvalidKey]
        );

        apply_build(&plan, &RunContext::default()).unwrap();
        assert!(!out.path().join("escaped.xml").exists());
        assert!(package.join("Languages/Russian/Keyed/_Imported.xml").exists());
    }

    #[test]
    fn test_language_must_be_a_folder_name() {
        let out = TempDir::new().unwrap();
        let mut opts = options(out.path(), false);
        opts.language = "../Russian".into();
        let err = plan_build(BuildInput::Catalog(&Catalog::default()), &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_invalid_metadata() {
        let out = TempDir::new().unwrap();
        let mut opts = options(out.path(), false);
        opts.metadata.package_id = "has space".into();
        let err = plan_build(BuildInput::Catalog(&Catalog::default()), &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
