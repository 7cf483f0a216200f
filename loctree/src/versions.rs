//! Game-version directories (`1.4/`, `v1.5/`) at the top of a mod.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref VERSION_DIR: Regex = Regex::new(r"^[vV]?(\d+)\.(\d+)$").unwrap();
}

/// Parses a version directory name into `(major, minor)`.
pub fn parse_version(name: &str) -> Option<(u32, u32)> {
    let caps = VERSION_DIR.captures(name)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Which version directories a scan reads. Unversioned content is always read.
///
/// The default is the highest version directory present, so a mod that
/// carries `1.4/` and `1.5/` side by side is read once. `All` reads every
/// version directory and reports keys shared between them as duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionSelector {
    All,
    #[default]
    Latest,
    Exact(String),
}

impl FromStr for VersionSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(VersionSelector::All),
            "" | "latest" => Ok(VersionSelector::Latest),
            _ if parse_version(s).is_some() => Ok(VersionSelector::Exact(s.to_string())),
            _ => Err(format!("invalid game version `{s}` (expected all, latest or e.g. 1.5)")),
        }
    }
}

impl TryFrom<String> for VersionSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionSelector> for String {
    fn from(value: VersionSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::All => f.write_str("all"),
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Exact(v) => f.write_str(v),
        }
    }
}

/// A directory content is read from: the mod root or one version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    /// `""` for the root, `"1.5/"` for a version directory.
    pub prefix: String,
    pub path: PathBuf,
}

/// Bases selected under `root`, root first, then versions in ascending order.
pub fn bases(root: &Path, selector: &VersionSelector) -> Vec<Base> {
    let mut versions: Vec<((u32, u32), String)> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    parse_version(&name).map(|v| (v, name))
                })
                .collect()
        })
        .unwrap_or_default();
    versions.sort();

    let selected: Vec<String> = match selector {
        VersionSelector::All => versions.into_iter().map(|(_, name)| name).collect(),
        VersionSelector::Latest => versions.pop().map(|(_, name)| name).into_iter().collect(),
        VersionSelector::Exact(wanted) => {
            let wanted = parse_version(wanted);
            versions
                .into_iter()
                .filter(|(v, _)| Some(*v) == wanted)
                .map(|(_, name)| name)
                .collect()
        }
    };

    let mut out = vec![Base {
        prefix: String::new(),
        path: root.to_path_buf(),
    }];
    out.extend(selected.into_iter().map(|name| Base {
        prefix: format!("{name}/"),
        path: root.join(&name),
    }));
    out
}

/// Splits a leading version directory off a relative path.
pub fn split_prefix(rel: &str) -> (&str, &str) {
    match rel.split_once('/') {
        Some((first, rest)) if parse_version(first).is_some() => (&rel[..first.len() + 1], rest),
        _ => ("", rel),
    }
}

/// Whether a relative path survives `selector`.
pub fn selects(selector: &VersionSelector, rel: &str) -> bool {
    let (prefix, _) = split_prefix(rel);
    if prefix.is_empty() {
        return true;
    }
    match selector {
        VersionSelector::All | VersionSelector::Latest => true,
        VersionSelector::Exact(wanted) => {
            parse_version(prefix.trim_end_matches('/')) == parse_version(wanted)
        }
    }
}
