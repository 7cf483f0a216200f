//! `loctree.toml` project settings. Command-line flags win over file values.

use std::path::{Path, PathBuf};

use loctree::{InheritancePolicy, ResolverConfig, VersionSelector};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "loctree.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    pub inheritance: Option<InheritancePolicy>,
    pub extra_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    pub tm_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSection {
    pub keep_empty: bool,
    pub single_file: bool,
    pub incremental: bool,
    pub backup: bool,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub name: Option<String>,
    pub package_id: Option<String>,
    pub supported_version: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub dedupe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub game_version: Option<VersionSelector>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub strict: bool,
    pub resolver: ResolverSection,
    pub export: ExportSection,
    pub import: ImportSection,
    pub build: BuildSection,
}

impl Config {
    /// Loads `explicit`, or `loctree.toml` from the working directory when it
    /// exists. An explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(format!("Config file does not exist: {}", path.display()));
                }
                path.to_path_buf()
            }
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Config::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
        Self::parse(&text).map_err(|e| format!("Invalid config {}: {e}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolver settings with `extra` fields from the command line added.
    pub fn resolver(&self, inheritance: Option<InheritancePolicy>, extra: &[String]) -> ResolverConfig {
        ResolverConfig::default()
            .with_inheritance(inheritance.or(self.resolver.inheritance).unwrap_or_default())
            .with_extra_fields(self.resolver.extra_fields.iter().chain(extra).cloned())
    }

    pub fn versions(&self, flag: Option<VersionSelector>) -> VersionSelector {
        flag.or_else(|| self.game_version.clone()).unwrap_or_default()
    }

    pub fn source_lang(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.source_lang.clone())
            .unwrap_or_else(|| "English".to_string())
    }

    pub fn target_lang(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.target_lang.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
source_lang = "English"
target_lang = "Russian"
game_version = "1.5"
concurrency = 4
timeout_secs = 30

[resolver]
inheritance = "omit"
extra_fields = ["customNote"]

[export]
tm_roots = ["../Reference"]

[import]
incremental = true
backup = true

[build]
package_id = "me.mod.ru"
dedupe = true
"#,
        )
        .unwrap();
        assert_eq!(config.game_version, Some(VersionSelector::Exact("1.5".into())));
        assert_eq!(config.timeout_secs, Some(30));
        assert!(config.import.incremental);
        assert!(config.build.dedupe);

        let resolver = config.resolver(None, &["flavorNote".to_string()]);
        assert_eq!(resolver.inheritance, InheritancePolicy::Omit);
        assert_eq!(resolver.extra_fields, vec!["customNote", "flavorNote"]);
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::parse("source_lang = \"German\"\ngame_version = \"latest\"\n").unwrap();
        assert_eq!(config.source_lang(None), "German");
        assert_eq!(config.source_lang(Some("French".into())), "French");
        assert_eq!(config.versions(None), VersionSelector::Latest);
        assert_eq!(config.versions(Some(VersionSelector::All)), VersionSelector::All);
        assert_eq!(Config::default().source_lang(None), "English");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(Config::parse("sorce_lang = \"English\"").is_err());
        assert!(Config::parse("[import]\nforce = true").is_err());
    }
}
