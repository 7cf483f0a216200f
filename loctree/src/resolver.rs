//! Canonical keys for translation units.
//!
//! - Keyed: the string-table entry name, as-is.
//! - DefInjected: `<DefType>/<DefName>.<dot.path>`, list items as indices.
//!
//! Inherited fields (`ParentName`) are either synthesized as units of the
//! child def or omitted, depending on [`InheritancePolicy`].

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    formats::{
        defs::{DefNode, Node},
        language_data::Document,
    },
    types::{TranslationUnit, UnitKind},
};

/// Field names whose text is translatable when found in a def.
pub const DEFAULT_FIELDS: &[&str] = &[
    "label",
    "labelShort",
    "labelPlural",
    "labelMale",
    "labelFemale",
    "labelNoun",
    "labelNounPretty",
    "description",
    "descriptionShort",
    "jobString",
    "reportString",
    "verb",
    "gerund",
    "deathMessage",
    "pawnLabel",
    "pawnsPlural",
    "leaderTitle",
    "title",
    "titleShort",
    "titleFemale",
    "text",
    "letterLabel",
    "letterText",
    "letterLabelEnemy",
    "arrivalTextEnemy",
    "arrivalTextFriendly",
    "successfulText",
    "failedText",
    "beginLetter",
    "beginLetterLabel",
    "recoveryMessage",
    "inspectLine",
    "baseInspectLine",
    "rulesStrings",
    "ingestCommandString",
    "ingestReportString",
    "useLabel",
    "helpText",
    "fixedName",
    "customLabel",
    "headerTip",
    "skillLabel",
    "flavorText",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritancePolicy {
    /// Emit a unit for every field the def inherits and does not override.
    #[default]
    Synthesize,
    /// Only fields written on the def itself produce units.
    Omit,
}

impl FromStr for InheritancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthesize" => Ok(InheritancePolicy::Synthesize),
            "omit" => Ok(InheritancePolicy::Omit),
            other => Err(format!("unknown inheritance policy `{other}` (expected synthesize|omit)")),
        }
    }
}

impl fmt::Display for InheritancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InheritancePolicy::Synthesize => "synthesize",
            InheritancePolicy::Omit => "omit",
        })
    }
}

/// Settings that change which units a scan produces and how they are keyed.
/// Snapshots taken with different settings are not comparable.
///
/// Omitted fields default to [`InheritancePolicy::Synthesize`] and no extra
/// fields. Scan and export responses echo the settings actually used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub inheritance: InheritancePolicy,
    pub extra_fields: Vec<String>,
}

impl ResolverConfig {
    pub fn with_inheritance(mut self, policy: InheritancePolicy) -> Self {
        self.inheritance = policy;
        self
    }

    pub fn with_extra_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_fields.extend(fields.into_iter().map(Into::into));
        self.extra_fields.retain(|f| !f.trim().is_empty());
        self.extra_fields.sort();
        self.extra_fields.dedup();
        self
    }

    pub fn is_translatable(&self, field: &str) -> bool {
        DEFAULT_FIELDS.contains(&field) || self.extra_fields.iter().any(|f| f == field)
    }

    /// Stable description of these settings, stored in catalog headers.
    pub fn fingerprint(&self) -> String {
        let mut extra: Vec<&str> = self
            .extra_fields
            .iter()
            .map(String::as_str)
            .filter(|f| !DEFAULT_FIELDS.contains(f))
            .collect();
        extra.sort_unstable();
        extra.dedup();
        if extra.is_empty() {
            format!("inherit={};fields=default", self.inheritance)
        } else {
            format!("inherit={};fields=default+{}", self.inheritance, extra.join(","))
        }
    }

    /// Fails with `ConfigurationMismatch` when `other` was produced under
    /// different settings.
    pub fn ensure_compatible(&self, other: &str) -> Result<(), Error> {
        let mine = self.fingerprint();
        if mine == other {
            Ok(())
        } else {
            Err(Error::ConfigurationMismatch(format!(
                "resolver settings differ: `{other}` vs `{mine}`"
            )))
        }
    }
}

pub fn def_injected_key(def_type: &str, path: &str) -> String {
    format!("{def_type}/{path}")
}

/// Splits a DefInjected key into its def type and the in-file tag path.
pub fn split_def_injected_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

/// Which part of a language tree a file belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageFileClass {
    Keyed,
    DefInjected { def_type: String },
}

/// Units of one `LanguageData` document.
pub fn language_units(class: &LanguageFileClass, doc: &Document, path: &str) -> Vec<TranslationUnit> {
    doc.slots()
        .iter()
        .map(|slot| {
            let (key, kind) = match class {
                LanguageFileClass::Keyed => (slot.key.clone(), UnitKind::Keyed),
                LanguageFileClass::DefInjected { def_type } => {
                    let field_path = slot
                        .key
                        .split_once('.')
                        .map(|(_, rest)| rest.to_string())
                        .unwrap_or_default();
                    (
                        def_injected_key(def_type, &slot.key),
                        UnitKind::DefInjected { field_path },
                    )
                }
            };
            TranslationUnit {
                key,
                kind,
                source_text: slot.value.clone(),
                path: path.to_string(),
                line: Some(slot.line),
                inherited_from: None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    path: String,
    text: String,
    line: usize,
    inherited_from: Option<String>,
}

/// Resolves the units of defs, following `ParentName` links across every
/// def file of a scan.
pub struct DefResolver<'a> {
    config: &'a ResolverConfig,
    by_name: HashMap<&'a str, &'a DefNode>,
}

impl<'a> DefResolver<'a> {
    pub fn new<I>(config: &'a ResolverConfig, defs: I) -> Self
    where
        I: IntoIterator<Item = &'a DefNode>,
    {
        let mut by_name = HashMap::new();
        for def in defs {
            if let Some(name) = def.name.as_deref() {
                by_name.entry(name).or_insert(def);
            }
        }
        Self { config, by_name }
    }

    /// Units of `def`, read from `path`. Abstract defs and defs without a
    /// `defName` produce none.
    pub fn units(&self, def: &DefNode, path: &str) -> Result<Vec<TranslationUnit>, Error> {
        if def.is_abstract {
            return Ok(Vec::new());
        }
        let Some(def_name) = def.def_name.as_deref() else {
            return Ok(Vec::new());
        };

        let mut visited = vec![def.name.clone().unwrap_or_else(|| def.label().to_string())];
        let fields = self.fields(def, &mut visited)?;

        Ok(fields
            .into_iter()
            .map(|f| TranslationUnit {
                key: def_injected_key(&def.def_type, &format!("{def_name}.{}", f.path)),
                kind: UnitKind::DefInjected {
                    field_path: f.path,
                },
                source_text: f.text,
                path: path.to_string(),
                line: Some(f.line),
                inherited_from: f.inherited_from,
            })
            .collect())
    }

    fn fields(&self, def: &DefNode, visited: &mut Vec<String>) -> Result<Vec<Field>, Error> {
        let mut own = Vec::new();
        flatten(self.config, &def.fields, "", false, &mut own);

        if self.config.inheritance == InheritancePolicy::Omit {
            return Ok(own);
        }
        let Some(parent_name) = def.parent.as_deref() else {
            return Ok(own);
        };
        if visited.iter().any(|v| v == parent_name) {
            let mut chain = visited.clone();
            chain.push(parent_name.to_string());
            return Err(Error::InheritanceCycle { chain });
        }
        let Some(parent) = self.by_name.get(parent_name) else {
            // Parents outside the scanned tree (the base game) are expected.
            tracing::debug!("parent `{parent_name}` of `{}` not found", def.label());
            return Ok(own);
        };

        visited.push(parent_name.to_string());
        let inherited = self.fields(parent, visited)?;
        visited.pop();

        for field in inherited {
            if own.iter().any(|f| f.path == field.path) {
                continue;
            }
            own.push(Field {
                inherited_from: field.inherited_from.or_else(|| Some(parent_name.to_string())),
                ..field
            });
        }
        Ok(own)
    }
}

fn flatten(config: &ResolverConfig, nodes: &[Node], prefix: &str, in_list_field: bool, out: &mut Vec<Field>) {
    let mut li_index = 0;
    for node in nodes {
        if prefix.is_empty() && node.name == "defName" {
            continue;
        }
        let segment = if node.name == "li" {
            let index = li_index;
            li_index += 1;
            index.to_string()
        } else {
            node.name.clone()
        };
        let path = if prefix.is_empty() {
            segment
        } else {
            format!("{prefix}.{segment}")
        };

        let translatable = if node.name == "li" {
            in_list_field
        } else {
            config.is_translatable(&node.name)
        };

        if node.is_leaf() {
            if translatable && !node.text.trim().is_empty() {
                out.push(Field {
                    path,
                    text: node.text.clone(),
                    line: node.line,
                    inherited_from: None,
                });
            }
        } else {
            // A translatable list field makes its items translatable.
            let list_items = node.name != "li" && translatable;
            flatten(config, &node.children, &path, list_items, out);
        }
    }
}
