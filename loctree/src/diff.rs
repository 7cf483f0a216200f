//! Key-level differences between trees and catalogs.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    formats::po::Catalog,
    fsutil,
    types::{TreeSnapshot, same_text},
};

/// The left-hand operand of a diff.
#[derive(Debug, Clone, Copy)]
pub enum Baseline<'a> {
    Tree(&'a TreeSnapshot),
    Catalog(&'a Catalog),
}

/// Which text is compared for keys present on both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareAxis {
    /// Source texts of both operands.
    #[default]
    SourceText,
    /// The baseline catalog's translations against the tree's texts.
    TargetText,
    /// Key presence only; nothing is ever reported as changed.
    KeysOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedKey {
    pub key: String,
    pub old_text: String,
    pub new_text: String,
}

/// Disjoint key sets, each sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub changed: Vec<ChangedKey>,
    /// Keys present on both sides with equal text.
    pub unchanged: usize,
    /// Keys present on both sides that the baseline catalog has not
    /// translated yet. Only counted when comparing target texts.
    #[serde(default)]
    pub untranslated: usize,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.changed.is_empty()
    }
}

fn check_compatible(a: &Baseline<'_>, b: &TreeSnapshot) -> Result<(), Error> {
    match a {
        Baseline::Tree(tree) => b.config.ensure_compatible(&tree.config.fingerprint()),
        Baseline::Catalog(catalog) => match catalog.header.resolver() {
            Some(recorded) => b.config.ensure_compatible(recorded),
            None => Ok(()),
        },
    }
}

/// Every key of the baseline with its compared text. The text is `None`
/// for untranslated catalog entries on the target axis: the key exists but
/// has nothing to compare.
fn baseline_texts<'a>(a: &Baseline<'a>, axis: CompareAxis) -> BTreeMap<&'a str, Option<&'a str>> {
    match *a {
        Baseline::Tree(tree) => tree
            .units
            .iter()
            .map(|u| (u.key.as_str(), Some(u.source_text.as_str())))
            .collect(),
        Baseline::Catalog(catalog) => catalog
            .active()
            .map(|e| {
                let text = match axis {
                    CompareAxis::TargetText => e.is_translated().then_some(e.target_text.as_str()),
                    _ => Some(e.source_text.as_str()),
                };
                (e.key.as_str(), text)
            })
            .collect(),
    }
}

/// Compares `a` against `b` along `axis`.
///
/// Both operands must come from the same resolver configuration. A tree
/// baseline has no translations, so [`CompareAxis::TargetText`] requires a
/// catalog baseline. Obsolete catalog entries are ignored. Untranslated
/// entries still count for key presence when comparing target texts, but
/// are never reported as changed.
pub fn diff(a: Baseline<'_>, b: &TreeSnapshot, axis: CompareAxis) -> Result<DiffResult, Error> {
    if matches!(a, Baseline::Tree(_)) && axis == CompareAxis::TargetText {
        return Err(Error::invalid_request(
            "target text comparison needs a catalog baseline",
        ));
    }
    check_compatible(&a, b)?;

    let left = baseline_texts(&a, axis);
    let right: BTreeMap<&str, &str> = b
        .units
        .iter()
        .map(|u| (u.key.as_str(), u.source_text.as_str()))
        .collect();

    let mut keys = BTreeSet::new();
    keys.extend(left.keys().copied());
    keys.extend(right.keys().copied());

    let mut result = DiffResult::default();
    for key in keys {
        match (left.get(key), right.get(key)) {
            (Some(_), None) => result.only_in_a.push(key.to_string()),
            (None, Some(_)) => result.only_in_b.push(key.to_string()),
            (Some(None), Some(_)) => result.untranslated += 1,
            (Some(Some(old)), Some(new)) if axis != CompareAxis::KeysOnly && !same_text(old, new) => {
                result.changed.push(ChangedKey {
                    key: key.to_string(),
                    old_text: old.to_string(),
                    new_text: new.to_string(),
                })
            }
            (Some(_), Some(_)) => result.unchanged += 1,
            (None, None) => {}
        }
    }

    tracing::debug!(
        "diff: {} only in a, {} only in b, {} changed, {} unchanged, {} untranslated",
        result.only_in_a.len(),
        result.only_in_b.len(),
        result.changed.len(),
        result.unchanged,
        result.untranslated
    );
    Ok(result)
}

/// Compares a mod's source tree with its translation.
///
/// `only_in_a` lists untranslated keys, `only_in_b` stale translations.
/// With a `baseline` catalog, keys present in both trees whose source text
/// moved since that export are reported as changed.
pub fn diff_translation(
    source: &TreeSnapshot,
    target: &TreeSnapshot,
    baseline: Option<&Catalog>,
) -> Result<DiffResult, Error> {
    let mut result = diff(Baseline::Tree(source), target, CompareAxis::KeysOnly)?;
    let Some(baseline) = baseline else {
        return Ok(result);
    };

    let moved = diff(Baseline::Catalog(baseline), source, CompareAxis::SourceText)?;
    let in_both: BTreeSet<&str> = {
        let translated: BTreeSet<&str> = target.units.iter().map(|u| u.key.as_str()).collect();
        source
            .units
            .iter()
            .map(|u| u.key.as_str())
            .filter(|k| translated.contains(k))
            .collect()
    };
    result.changed = moved
        .changed
        .into_iter()
        .filter(|c| in_both.contains(c.key.as_str()))
        .collect();
    result.unchanged -= result.changed.len();
    Ok(result)
}

pub const CHANGED_REPORT: &str = "ChangedData.txt";
pub const ONLY_IN_MOD_REPORT: &str = "OnlyInMod.txt";
pub const ONLY_IN_TRANSLATION_REPORT: &str = "OnlyInTranslation.txt";

/// Writes the plain-text reports of a translation diff into `dir`.
///
/// `ChangedData.txt` holds `key<TAB>new text` lines; the other two files
/// list one key per line.
pub fn write_reports(dir: &Path, result: &DiffResult) -> Result<Vec<PathBuf>, Error> {
    fs::create_dir_all(dir).map_err(|source| Error::WriteFailure {
        path: dir.to_path_buf(),
        source,
    })?;

    let changed: String = result
        .changed
        .iter()
        .map(|c| format!("{}\t{}\n", c.key, c.new_text.replace('\n', "\\n")))
        .collect();
    let only_in_mod: String = result.only_in_a.iter().map(|k| format!("{k}\n")).collect();
    let only_in_translation: String = result.only_in_b.iter().map(|k| format!("{k}\n")).collect();

    let mut written = Vec::new();
    for (name, body) in [
        (CHANGED_REPORT, changed),
        (ONLY_IN_MOD_REPORT, only_in_mod),
        (ONLY_IN_TRANSLATION_REPORT, only_in_translation),
    ] {
        let path = dir.join(name);
        fsutil::write_atomic(&path, body.as_bytes()).map_err(|source| Error::WriteFailure {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}
