//! Source-text comments in translated Keyed files.
//!
//! Annotating puts `<!-- EN: <source text> -->` above every Keyed element
//! of a translation whose key exists in the source language, so
//! translators editing XML by hand see what they are translating.
//! Stripping removes those comments again. Only comments that start with
//! the configured prefix are ever removed; other comments are left alone.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Diagnostic, Error},
    formats::language_data::{Document, Item, Node},
    fsutil::{self, TextEncoding},
    import::{
        self, FileOp, ImportReport, PlannedAction, SkipReason, backup_dir_or_default, check_language,
    },
    locator,
    run::RunContext,
    types::TreeSnapshot,
    versions::VersionSelector,
};

pub const DEFAULT_PREFIX: &str = "EN:";

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnotateOptions {
    /// Translated language folder whose files get the comments.
    pub language: String,
    pub prefix: String,
    /// Remove annotations instead of adding them.
    pub strip: bool,
    pub versions: VersionSelector,
    pub backup: bool,
    pub backup_dir: Option<PathBuf>,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            language: String::new(),
            prefix: default_prefix(),
            strip: false,
            versions: VersionSelector::default(),
            backup: false,
            backup_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatePlan {
    pub root: PathBuf,
    pub language: String,
    pub files: Vec<FileOp>,
    /// Comments the plan adds.
    pub added: usize,
    /// Comments the plan removes.
    pub stripped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Comment text for `source`, on one line.
fn note(prefix: &str, source: &str) -> String {
    let flat: Vec<&str> = source.split_whitespace().collect();
    format!("{prefix} {}", flat.join(" "))
}

fn is_annotation(text: &str, prefix: &str) -> bool {
    text.trim_start().starts_with(prefix)
}

/// Rewrites `doc` with fresh annotations from `sources`, or with none when
/// `strip` is set. Returns the new text and the added and removed counts.
fn annotate_document(
    doc: &Document,
    sources: &HashMap<&str, &str>,
    prefix: &str,
    strip: bool,
) -> (String, usize, usize) {
    let mut edits = Vec::new();
    let (mut added, mut stripped) = (0, 0);
    for node in doc.nodes() {
        match node {
            Node::Comment { text, span } if is_annotation(text, prefix) => {
                edits.push((doc.line_of(span), String::new()));
                stripped += 1;
            }
            Node::Element { tag, span } if !strip => {
                let Some(source) = sources.get(tag.as_str()) else {
                    continue;
                };
                let comment = Item::Comment(note(prefix, source)).render();
                let content = doc.content();
                let line_start = content[..span.start].rfind('\n').map_or(0, |i| i + 1);
                let lead = &content[line_start..span.start];
                if lead.chars().all(|c| c == ' ' || c == '\t') {
                    let text = format!("{lead}{comment}{}", doc.newline());
                    edits.push((line_start..line_start, text));
                } else {
                    edits.push((span.start..span.start, format!("{comment} ")));
                }
                added += 1;
            }
            _ => {}
        }
    }
    (doc.splice(edits), added, stripped)
}

/// Computes the annotation of every Keyed file of `options.language`
/// under `root` from the Keyed units of `source`. Nothing is written.
///
/// Re-running annotate on an annotated tree plans no writes: existing
/// annotations are replaced, not stacked.
pub fn plan_annotate(source: &TreeSnapshot, root: &Path, options: &AnnotateOptions) -> Result<AnnotatePlan, Error> {
    if !root.is_dir() {
        return Err(Error::not_found(root, "annotate"));
    }
    check_language(&options.language, "annotate")?;
    if options.prefix.trim().is_empty() {
        return Err(Error::invalid_request("annotate needs a comment prefix"));
    }

    let mut sources: HashMap<&str, &str> = HashMap::new();
    for unit in source.units.iter().filter(|u| u.kind.is_keyed()) {
        sources.entry(unit.key.as_str()).or_insert(unit.source_text.as_str());
    }

    let mut plan = AnnotatePlan {
        root: root.to_path_buf(),
        language: options.language.clone(),
        files: Vec::new(),
        added: 0,
        stripped: 0,
        backup_dir: options
            .backup
            .then(|| backup_dir_or_default(root, &options.language, options.backup_dir.as_deref())),
        diagnostics: Vec::new(),
    };

    for lang_dir in locator::language_dirs(root, &options.language, &options.versions) {
        for file in fsutil::xml_files(&lang_dir.join("Keyed")) {
            let path = fsutil::rel_path(root, &file);
            let parsed = fsutil::read_text_file(&file)
                .map_err(|e| Error::malformed(&path, None, e.to_string()))
                .and_then(|read| {
                    Document::parse(read.text)
                        .map(|doc| (doc, read.encoding))
                        .map_err(|e| e.into_error(&path))
                });
            let (doc, encoding) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("{e}");
                    plan.diagnostics.extend(e.to_diagnostic());
                    plan.files.push(FileOp {
                        path,
                        action: PlannedAction::Skip {
                            reason: SkipReason::Unreadable,
                        },
                        keys: 0,
                        content: None,
                        encoding: TextEncoding::Utf8,
                    });
                    continue;
                }
            };

            let (content, added, stripped) = annotate_document(&doc, &sources, &options.prefix, options.strip);
            plan.added += added;
            plan.stripped += stripped;
            let unchanged = content == doc.content();
            plan.files.push(FileOp {
                path,
                action: if unchanged {
                    PlannedAction::Skip {
                        reason: SkipReason::Identical,
                    }
                } else {
                    PlannedAction::Update
                },
                keys: added,
                content: (!unchanged).then_some(content),
                encoding,
            });
        }
    }

    tracing::info!(
        "annotate plan for {}: {} file(s), {} added, {} stripped",
        options.language,
        plan.files.len(),
        plan.added,
        plan.stripped
    );
    Ok(plan)
}

/// Performs the writes of `plan`, after the requested backup.
pub fn apply_annotate(plan: &AnnotatePlan, ctx: &RunContext) -> Result<ImportReport, Error> {
    if let Some(dir) = &plan.backup_dir {
        import::backup(&plan.root, &plan.files, dir)?;
    }
    let mut report = import::write_files(&plan.root, &plan.files, ctx);
    report.backup_dir = plan.backup_dir.clone();
    tracing::info!("annotate finished: {} updated, {} failed", report.updated, report.failed);
    Ok(report)
}
