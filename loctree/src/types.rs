use std::{
    collections::HashMap,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{error::Diagnostic, resolver::ResolverConfig};

/// Where a unit lives and how its key was built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitKind {
    /// An entry of a flat string table.
    Keyed,
    /// A field inside a def, addressed by its dot path below the def name.
    DefInjected { field_path: String },
}

impl UnitKind {
    pub fn is_keyed(&self) -> bool {
        matches!(self, UnitKind::Keyed)
    }
}

/// One translatable string occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub key: String,
    pub kind: UnitKind,
    pub source_text: String,
    /// Path relative to the scanned root, with `/` separators.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Name of the parent def the text was inherited from, if synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

impl TranslationUnit {
    pub fn keyed(key: impl Into<String>, text: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: UnitKind::Keyed,
            source_text: text.into(),
            path: path.into(),
            line: None,
            inherited_from: None,
        }
    }

    pub fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    /// `path:line` as used in catalog references.
    pub fn reference(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.path, line),
            None => self.path.clone(),
        }
    }
}

/// A key seen more than once during one scan. The first occurrence stays in
/// the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub key: String,
    pub first: String,
    pub second: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub keyed: usize,
    pub def_injected: usize,
    pub total: usize,
}

/// Units produced by one locator run over one language directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root: PathBuf,
    pub language: String,
    pub config: ResolverConfig,
    pub units: Vec<TranslationUnit>,
    #[serde(default)]
    pub duplicates: Vec<DuplicateKey>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl TreeSnapshot {
    pub fn empty(root: impl Into<PathBuf>, language: impl Into<String>, config: ResolverConfig) -> Self {
        Self {
            root: root.into(),
            language: language.into(),
            config,
            units: Vec::new(),
            duplicates: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&TranslationUnit> {
        self.units.iter().find(|u| u.key == key)
    }

    /// Key lookup table. Keys are unique inside a snapshot.
    pub fn index(&self) -> HashMap<&str, &TranslationUnit> {
        let mut map = HashMap::with_capacity(self.units.len());
        for unit in &self.units {
            map.entry(unit.key.as_str()).or_insert(unit);
        }
        map
    }

    pub fn counts(&self) -> KindCounts {
        let keyed = self.units.iter().filter(|u| u.kind.is_keyed()).count();
        KindCounts {
            keyed,
            def_injected: self.units.len() - keyed,
            total: self.units.len(),
        }
    }
}

/// Text comparison used by diffing, merging and import: leading and trailing
/// whitespace is ignored, everything else is compared byte for byte. No
/// Unicode normalization is applied.
pub fn normalize_text(text: &str) -> &str {
    text.trim()
}

pub fn same_text(a: &str, b: &str) -> bool {
    normalize_text(a) == normalize_text(b)
}
