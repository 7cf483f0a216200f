//! Translation memory built from already-translated reference trees.
//!
//! Matching is exact only. References are consulted in the order the caller
//! gives them and the first hit wins.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Diagnostic, DiagnosticKind, Error},
    locator::{LocatorOptions, discover_def_roots, locate},
    resolver::ResolverConfig,
    run::{Deadline, RunContext},
    types::{TreeSnapshot, normalize_text},
    versions::VersionSelector,
};

/// Anything that can suggest a target text for a unit.
pub trait TmLookup {
    fn lookup(&self, key: &str, source_text: &str) -> Option<&str>;
}

/// A lookup that never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl TmLookup for NoMemory {
    fn lookup(&self, _key: &str, _source_text: &str) -> Option<&str> {
        None
    }
}

/// One translated string of a reference tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPair {
    pub key: String,
    /// Original-language text, when the reference ships it.
    pub source_text: Option<String>,
    pub target_text: String,
}

/// The pairs of one reference root.
#[derive(Debug, Clone, Default)]
pub struct Reference {
    pub name: String,
    pairs: Vec<MemoryPair>,
    by_source: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

impl Reference {
    pub fn new(name: impl Into<String>, pairs: Vec<MemoryPair>) -> Self {
        let mut reference = Reference {
            name: name.into(),
            ..Default::default()
        };
        for pair in pairs {
            if pair.target_text.trim().is_empty() {
                continue;
            }
            let index = reference.pairs.len();
            if let Some(source) = &pair.source_text {
                reference
                    .by_source
                    .entry(normalize_text(source).to_string())
                    .or_insert(index);
            }
            reference.by_key.entry(pair.key.clone()).or_insert(index);
            reference.pairs.push(pair);
        }
        reference
    }

    /// Joins a translated tree with its original-language tree by key.
    pub fn from_snapshots(name: impl Into<String>, source: Option<&TreeSnapshot>, target: &TreeSnapshot) -> Self {
        let sources = source.map(TreeSnapshot::index).unwrap_or_default();
        let pairs = target
            .units
            .iter()
            .map(|unit| MemoryPair {
                key: unit.key.clone(),
                source_text: sources.get(unit.key.as_str()).map(|u| u.source_text.clone()),
                target_text: unit.source_text.clone(),
            })
            .collect();
        Reference::new(name, pairs)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn find(&self, key: &str, source_text: &str) -> Option<&str> {
        if let Some(&index) = self.by_source.get(normalize_text(source_text)) {
            return Some(&self.pairs[index].target_text);
        }
        let pair = &self.pairs[*self.by_key.get(key)?];
        match &pair.source_text {
            Some(recorded) if normalize_text(recorded) != normalize_text(source_text) => None,
            _ => Some(&pair.target_text),
        }
    }
}

/// References in priority order.
#[derive(Debug, Clone, Default)]
pub struct TranslationMemory {
    references: Vec<Reference>,
}

impl TmLookup for TranslationMemory {
    fn lookup(&self, key: &str, source_text: &str) -> Option<&str> {
        self.references.iter().find_map(|r| r.find(key, source_text))
    }
}

/// Settings for loading reference roots from disk.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    pub source_language: String,
    pub target_language: String,
    pub resolver: ResolverConfig,
    pub versions: VersionSelector,
}

/// A loaded memory plus what went wrong while loading it.
#[derive(Debug, Clone, Default)]
pub struct LoadedMemory {
    pub memory: TranslationMemory,
    pub diagnostics: Vec<Diagnostic>,
    /// True when the deadline expired before every root was read.
    pub timed_out: bool,
}

impl TranslationMemory {
    pub fn new(references: Vec<Reference>) -> Self {
        Self { references }
    }

    pub fn push(&mut self, reference: Reference) {
        self.references.push(reference);
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn is_empty(&self) -> bool {
        self.references.iter().all(Reference::is_empty)
    }

    /// Reads every reference root in order.
    ///
    /// A missing root is fatal. Once `deadline` expires, the roots not yet
    /// read are skipped and a timeout diagnostic is recorded instead.
    pub fn load(
        roots: &[PathBuf],
        options: &MemoryOptions,
        ctx: &RunContext,
        deadline: Deadline,
    ) -> Result<LoadedMemory, Error> {
        if let Some(missing) = roots.iter().find(|r| !r.is_dir()) {
            return Err(Error::not_found(missing, "load translation memory"));
        }

        let mut loaded = LoadedMemory::default();
        for (index, root) in roots.iter().enumerate() {
            let reference = if deadline.expired() {
                Err(Error::Timeout {
                    operation: format!("translation memory {}", root.display()),
                })
            } else {
                load_reference(root, options, ctx, deadline)
            };
            match reference {
                Ok(reference) => {
                    tracing::debug!("loaded {} memory pairs from {}", reference.len(), root.display());
                    loaded.memory.push(reference);
                }
                Err(Error::Timeout { .. }) => {
                    let skipped = roots.len() - index;
                    tracing::warn!(
                        "translation memory lookup timed out, {skipped} reference root(s) skipped"
                    );
                    loaded.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::Timeout,
                            format!("timed out, {skipped} reference root(s) skipped"),
                        )
                        .with_path(root.display().to_string()),
                    );
                    loaded.timed_out = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }
}

fn load_reference(
    root: &Path,
    options: &MemoryOptions,
    ctx: &RunContext,
    deadline: Deadline,
) -> Result<Reference, Error> {
    let source_options = LocatorOptions::new(&options.source_language)
        .with_def_roots(discover_def_roots(root, &options.versions))
        .with_resolver(options.resolver.clone())
        .with_versions(options.versions.clone())
        .with_deadline(deadline);
    let target_options = LocatorOptions::new(&options.target_language)
        .with_resolver(options.resolver.clone())
        .with_versions(options.versions.clone())
        .with_deadline(deadline);

    let source = locate(root, &source_options, ctx)?;
    let target = locate(root, &target_options, ctx)?;
    Ok(Reference::from_snapshots(
        root.display().to_string(),
        Some(&source),
        &target,
    ))
}
