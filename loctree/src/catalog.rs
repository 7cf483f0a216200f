//! Snapshot to catalog merge.
//!
//! [`encode`] turns a fresh scan into a catalog, carrying translator work
//! over from the previous catalog and filling gaps from translation memory.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    formats::po::{Catalog, CatalogEntry, CatalogHeader, HEADER_LANGUAGE, HEADER_RESOLVER, HEADER_SOURCE},
    lang,
    memory::TmLookup,
    types::{TreeSnapshot, same_text},
};

/// Counters reported by an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total: usize,
    /// Entries whose translation came from the previous catalog.
    pub carried: usize,
    pub tm_filled: usize,
    /// Carried entries whose source text changed since the previous export.
    pub source_changed: usize,
    pub untranslated: usize,
    pub obsolete: usize,
    /// `tm_filled / total` as a percentage.
    pub coverage_percent: f64,
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub catalog: Catalog,
    pub stats: CoverageStats,
}

impl Encoded {
    pub fn to_text(&self) -> String {
        self.catalog.to_text()
    }
}

/// Builds the catalog for `snapshot`.
///
/// Entry order follows the snapshot; keys only found in `existing` follow
/// as obsolete entries in their previous order. Fails with
/// [`Error::ConfigurationMismatch`] when `existing` was produced with a
/// different resolver configuration.
pub fn encode(
    snapshot: &TreeSnapshot,
    existing: Option<&Catalog>,
    tm: &dyn TmLookup,
    target_language: Option<&str>,
) -> Result<Encoded, Error> {
    let fingerprint = snapshot.config.fingerprint();
    if let Some(recorded) = existing.and_then(|c| c.header.resolver()) {
        snapshot.config.ensure_compatible(recorded)?;
    }

    let mut header = match existing {
        Some(catalog) => catalog.header.clone(),
        None => CatalogHeader::new(target_language.and_then(lang::language_code)),
    };
    if let Some(code) = target_language.and_then(lang::language_code) {
        header.set(HEADER_LANGUAGE, code);
    }
    header.set(HEADER_SOURCE, snapshot.language.as_str());
    header.set(HEADER_RESOLVER, fingerprint);

    let previous = existing.map(Catalog::index).unwrap_or_default();
    let mut stats = CoverageStats::default();
    let mut entries = Vec::with_capacity(snapshot.units.len());

    for unit in &snapshot.units {
        let mut entry = CatalogEntry::new(&unit.key, &unit.source_text);
        entry.references.push(unit.reference());
        if let Some(parent) = &unit.inherited_from {
            entry.notes.push(format!("inherited from {parent}"));
        }

        match previous.get(unit.key.as_str()) {
            Some(old) if old.is_translated() => {
                entry.target_text = old.target_text.clone();
                entry.comment = old.comment.clone();
                entry.flags.other = old.flags.other.clone();
                if same_text(&old.source_text, &unit.source_text) {
                    entry.flags.fuzzy = old.flags.fuzzy;
                } else {
                    entry.flags.fuzzy = true;
                    stats.source_changed += 1;
                }
                stats.carried += 1;
            }
            other => {
                if let Some(old) = other {
                    entry.comment = old.comment.clone();
                    entry.flags.other = old.flags.other.clone();
                }
                match tm.lookup(&unit.key, &unit.source_text) {
                    Some(hit) => {
                        entry.target_text = hit.to_string();
                        entry.flags.fuzzy = true;
                        stats.tm_filled += 1;
                    }
                    None => stats.untranslated += 1,
                }
            }
        }
        entries.push(entry);
    }

    if let Some(existing) = existing {
        let current: HashSet<&str> = snapshot.units.iter().map(|u| u.key.as_str()).collect();
        for old in &existing.entries {
            if current.contains(old.key.as_str()) {
                continue;
            }
            let mut retired = old.clone();
            retired.flags.obsolete = true;
            entries.push(retired);
            stats.obsolete += 1;
        }
    }

    stats.total = snapshot.units.len();
    stats.coverage_percent = if stats.total == 0 {
        0.0
    } else {
        stats.tm_filled as f64 * 100.0 / stats.total as f64
    };

    tracing::info!(
        "encoded {} entries: {} carried, {} from memory, {} untranslated, {} obsolete",
        stats.total,
        stats.carried,
        stats.tm_filled,
        stats.untranslated,
        stats.obsolete
    );

    Ok(Encoded {
        catalog: Catalog {
            header,
            entries,
            diagnostics: Vec::new(),
        },
        stats,
    })
}

/// Parses catalog text. Entries keep their file order.
pub fn decode(text: &str) -> Result<Catalog, Error> {
    Catalog::parse(text).map_err(|e| e.into_error("<catalog>"))
}
