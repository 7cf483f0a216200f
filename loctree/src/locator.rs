//! Walks a mod tree and produces a [`TreeSnapshot`] for one language.
//!
//! Files are read from `[<version>/]Languages/<Lang>/Keyed`,
//! `[<version>/]Languages/<Lang>/DefInjected/<DefType>` and the configured
//! def roots. Units are ordered by relative path, then by position in file.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use crate::{
    error::{Diagnostic, DiagnosticKind, Error},
    formats::{
        defs::{DefNode, parse_defs},
        language_data::Document,
    },
    fsutil,
    lang,
    resolver::{DefResolver, LanguageFileClass, ResolverConfig, language_units},
    run::{Deadline, RunContext},
    types::{DuplicateKey, TranslationUnit, TreeSnapshot},
    versions::{self, VersionSelector},
};

/// Options for one locator run.
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    pub language: String,
    pub def_roots: Vec<PathBuf>,
    pub resolver: ResolverConfig,
    pub versions: VersionSelector,
    /// Abort on the first malformed file instead of reporting it.
    pub strict: bool,
    pub deadline: Deadline,
}

impl LocatorOptions {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            def_roots: Vec::new(),
            resolver: ResolverConfig::default(),
            versions: VersionSelector::default(),
            strict: false,
            deadline: Deadline::none(),
        }
    }

    pub fn with_def_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.def_roots = roots;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_versions(mut self, versions: VersionSelector) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }
}

/// `Defs` directories at the root and in the selected version directories.
pub fn discover_def_roots(root: &Path, selector: &VersionSelector) -> Vec<PathBuf> {
    versions::bases(root, selector)
        .into_iter()
        .map(|base| base.path.join("Defs"))
        .filter(|p| p.is_dir())
        .collect()
}

/// Language directories named `language` below every selected base.
pub fn language_dirs(root: &Path, language: &str, selector: &VersionSelector) -> Vec<PathBuf> {
    versions::bases(root, selector)
        .into_iter()
        .filter_map(|base| lang::find_language_dir(&base.path.join("Languages"), language))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileClass {
    Language(LanguageFileClass),
    Defs,
}

#[derive(Debug, Clone)]
struct SourceFile {
    abs: PathBuf,
    rel: String,
    class: FileClass,
}

enum Parsed {
    Language(Result<Vec<TranslationUnit>, Error>),
    Defs(Result<Vec<DefNode>, Error>),
    Expired,
}

fn collect_files(root: &Path, options: &LocatorOptions) -> (Vec<SourceFile>, Vec<Diagnostic>) {
    let mut files = Vec::new();
    let mut diagnostics = Vec::new();

    for lang_dir in language_dirs(root, &options.language, &options.versions) {
        for abs in fsutil::xml_files(&lang_dir.join("Keyed")) {
            let rel = fsutil::rel_path(root, &abs);
            files.push(SourceFile {
                abs,
                rel,
                class: FileClass::Language(LanguageFileClass::Keyed),
            });
        }

        let injected = lang_dir.join("DefInjected");
        for abs in fsutil::xml_files(&injected) {
            let rel = fsutil::rel_path(root, &abs);
            let inner = fsutil::rel_path(&injected, &abs);
            match inner.split_once('/') {
                Some((def_type, _)) => files.push(SourceFile {
                    class: FileClass::Language(LanguageFileClass::DefInjected {
                        def_type: def_type.to_string(),
                    }),
                    abs,
                    rel,
                }),
                None => {
                    tracing::warn!("{rel}: DefInjected file outside a def type folder, skipped");
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::Malformed,
                            "DefInjected file must live in a <DefType> folder",
                        )
                        .with_path(rel),
                    );
                }
            }
        }
    }

    for def_root in &options.def_roots {
        let def_root = if def_root.is_absolute() {
            def_root.clone()
        } else {
            root.join(def_root)
        };
        for abs in fsutil::xml_files(&def_root) {
            let rel = fsutil::rel_path(root, &abs);
            if !versions::selects(&options.versions, &rel) {
                continue;
            }
            files.push(SourceFile {
                abs,
                rel,
                class: FileClass::Defs,
            });
        }
    }

    let mut seen = HashSet::new();
    files.retain(|f| seen.insert(f.abs.clone()));
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    (files, diagnostics)
}

fn parse_file(file: &SourceFile, deadline: Deadline) -> Parsed {
    if deadline.expired() {
        return Parsed::Expired;
    }
    tracing::debug!("reading {}", file.rel);
    let content = match fsutil::read_text(&file.abs) {
        Ok(content) => content,
        Err(e) => {
            let err = Error::malformed(&file.rel, None, format!("unreadable: {e}"));
            return match file.class {
                FileClass::Defs => Parsed::Defs(Err(err)),
                FileClass::Language(_) => Parsed::Language(Err(err)),
            };
        }
    };
    match &file.class {
        FileClass::Language(class) => Parsed::Language(
            Document::parse(content)
                .map(|doc| language_units(class, &doc, &file.rel))
                .map_err(|e| e.into_error(&file.rel)),
        ),
        FileClass::Defs => Parsed::Defs(parse_defs(&content).map_err(|e| e.into_error(&file.rel))),
    }
}

/// Scans `root` for the units of `options.language`.
///
/// A missing root fails with [`Error::NotFound`]; missing language or def
/// directories yield an empty snapshot. Malformed files become diagnostics
/// unless `strict` is set.
pub fn locate(root: &Path, options: &LocatorOptions, ctx: &RunContext) -> Result<TreeSnapshot, Error> {
    if !root.is_dir() {
        return Err(Error::not_found(root, "scan"));
    }
    let (files, mut diagnostics) = collect_files(root, options);
    let parsed = ctx.map_files(&files, |f| parse_file(f, options.deadline))?;

    let report = |err: Error, diagnostics: &mut Vec<Diagnostic>| -> Result<(), Error> {
        if options.strict {
            return Err(err);
        }
        tracing::warn!("{err}");
        if let Some(diag) = err.to_diagnostic() {
            diagnostics.push(diag);
        }
        Ok(())
    };

    let mut per_file: Vec<Vec<TranslationUnit>> = vec![Vec::new(); files.len()];
    let mut def_files: Vec<(usize, Vec<DefNode>)> = Vec::new();
    for (index, result) in parsed.into_iter().enumerate() {
        match result {
            Parsed::Expired => {
                return Err(Error::Timeout {
                    operation: format!("scan of {}", root.display()),
                });
            }
            Parsed::Language(Ok(units)) => per_file[index] = units,
            Parsed::Defs(Ok(defs)) => def_files.push((index, defs)),
            Parsed::Language(Err(e)) | Parsed::Defs(Err(e)) => report(e, &mut diagnostics)?,
        }
    }

    let resolver = DefResolver::new(&options.resolver, def_files.iter().flat_map(|(_, defs)| defs));
    for (index, defs) in &def_files {
        let rel = &files[*index].rel;
        for def in defs {
            match resolver.units(def, rel) {
                Ok(units) => per_file[*index].extend(units),
                Err(e) => {
                    let line = Some(def.line);
                    match e.to_diagnostic() {
                        Some(diag) if !options.strict => {
                            tracing::warn!("{rel}: {e}");
                            diagnostics.push(diag.with_path(rel.clone()).with_line(line));
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    let language_keys: HashSet<&str> = files
        .iter()
        .zip(&per_file)
        .filter(|(f, _)| matches!(f.class, FileClass::Language(_)))
        .flat_map(|(_, units)| units.iter().map(|u| u.key.as_str()))
        .collect();

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut units = Vec::new();
    let mut duplicates = Vec::new();
    for (file, file_units) in files.iter().zip(&per_file) {
        for unit in file_units {
            if file.class == FileClass::Defs && language_keys.contains(unit.key.as_str()) {
                tracing::debug!("{} overridden by language file", unit.key);
                continue;
            }
            if let Some(first) = seen.get(&unit.key) {
                let dup = DuplicateKey {
                    key: unit.key.clone(),
                    first: first.clone(),
                    second: unit.reference(),
                    line: unit.line,
                };
                tracing::warn!("duplicate key `{}` in {} and {}", dup.key, dup.first, dup.second);
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::DuplicateKey,
                        format!("duplicate key `{}`, first defined at {}", dup.key, dup.first),
                    )
                    .with_path(unit.path.clone())
                    .with_line(unit.line)
                    .with_key(unit.key.clone()),
                );
                duplicates.push(dup);
                continue;
            }
            seen.insert(unit.key.clone(), unit.reference());
            units.push(unit.clone());
        }
    }

    tracing::info!(
        "scanned {} files under {} ({}): {} units",
        files.len(),
        root.display(),
        options.language,
        units.len()
    );

    Ok(TreeSnapshot {
        root: root.to_path_buf(),
        language: options.language.clone(),
        config: options.resolver.clone(),
        units,
        duplicates,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::CancelFlag;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn keys(snapshot: &TreeSnapshot) -> Vec<&str> {
        snapshot.units.iter().map(|u| u.key.as_str()).collect()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            root,
            "Languages/English/Keyed/UI.xml",
            "<LanguageData>\n  <ButtonLabel>Start</ButtonLabel>\n  <Quit>Quit</Quit>\n</LanguageData>\n",
        );
        write(
            root,
            "Languages/English/Keyed/Alerts.xml",
            "<LanguageData>\n  <Alert>Danger</Alert>\n</LanguageData>\n",
        );
        write(
            root,
            "Defs/Guns.xml",
            "<Defs>\n  <ThingDef>\n    <defName>Gun</defName>\n    <label>rifle</label>\n  </ThingDef>\n</Defs>\n",
        );
        write(root, "Languages/English/Keyed/readme.txt", "not data");
        dir
    }

    #[test]
    fn test_locate_orders_by_path_then_position() {
        let dir = fixture();
        let options = LocatorOptions::new("English").with_def_roots(vec![PathBuf::from("Defs")]);
        let snapshot = locate(dir.path(), &options, &RunContext::default()).unwrap();
        assert_eq!(
            keys(&snapshot),
            vec!["ThingDef/Gun.label", "Alert", "ButtonLabel", "Quit"]
        );
        let gun = snapshot.get("ThingDef/Gun.label").unwrap();
        assert_eq!(gun.path, "Defs/Guns.xml");
        assert_eq!(gun.line, Some(4));
        assert!(snapshot.diagnostics.is_empty());
    }

    #[test]
    fn test_locate_is_deterministic() {
        let dir = fixture();
        let options = LocatorOptions::new("English").with_def_roots(vec![PathBuf::from("Defs")]);
        let a = locate(dir.path(), &options, &RunContext::default().with_concurrency(1)).unwrap();
        let b = locate(dir.path(), &options, &RunContext::default().with_concurrency(8)).unwrap();
        assert_eq!(a.units, b.units);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = locate(&missing, &LocatorOptions::new("English"), &RunContext::default()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_missing_language_is_empty() {
        let dir = fixture();
        let snapshot = locate(dir.path(), &LocatorOptions::new("German"), &RunContext::default()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_malformed_file_is_reported_not_fatal() {
        let dir = fixture();
        write(dir.path(), "Languages/English/Keyed/Broken.xml", "<LanguageData>\n<A>x</B>\n");
        let snapshot = locate(dir.path(), &LocatorOptions::new("English"), &RunContext::default()).unwrap();
        assert_eq!(keys(&snapshot), vec!["Alert", "ButtonLabel", "Quit"]);
        assert_eq!(snapshot.diagnostics.len(), 1);
        assert_eq!(snapshot.diagnostics[0].kind, DiagnosticKind::Malformed);
        assert_eq!(
            snapshot.diagnostics[0].path.as_deref(),
            Some("Languages/English/Keyed/Broken.xml")
        );

        let strict = LocatorOptions::new("English").with_strict(true);
        let err = locate(dir.path(), &strict, &RunContext::default()).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn test_duplicate_keys_across_files() {
        let dir = fixture();
        write(
            dir.path(),
            "Languages/English/Keyed/ZMore.xml",
            "<LanguageData>\n  <ButtonLabel>Begin</ButtonLabel>\n</LanguageData>\n",
        );
        let snapshot = locate(dir.path(), &LocatorOptions::new("English"), &RunContext::default()).unwrap();
        assert_eq!(snapshot.get("ButtonLabel").unwrap().source_text, "Start");
        assert_eq!(snapshot.duplicates.len(), 1);
        assert_eq!(snapshot.duplicates[0].first, "Languages/English/Keyed/UI.xml:2");
        assert_eq!(snapshot.duplicates[0].second, "Languages/English/Keyed/ZMore.xml:2");
        assert!(snapshot
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DuplicateKey));
    }

    #[test]
    fn test_language_file_shadows_def_field() {
        let dir = fixture();
        write(
            dir.path(),
            "Languages/English/DefInjected/ThingDef/Guns.xml",
            "<LanguageData>\n  <Gun.label>carbine</Gun.label>\n</LanguageData>\n",
        );
        let options = LocatorOptions::new("English").with_def_roots(vec![PathBuf::from("Defs")]);
        let snapshot = locate(dir.path(), &options, &RunContext::default()).unwrap();
        assert_eq!(snapshot.get("ThingDef/Gun.label").unwrap().source_text, "carbine");
        assert!(snapshot.duplicates.is_empty());
    }

    #[test]
    fn test_version_directories() {
        let dir = fixture();
        write(
            dir.path(),
            "1.4/Languages/English/Keyed/Old.xml",
            "<LanguageData><OldOnly>x</OldOnly></LanguageData>",
        );
        write(
            dir.path(),
            "1.5/Languages/English/Keyed/New.xml",
            "<LanguageData><NewOnly>y</NewOnly></LanguageData>",
        );
        let exact = LocatorOptions::new("English").with_versions(VersionSelector::Exact("1.5".into()));
        let snapshot = locate(dir.path(), &exact, &RunContext::default()).unwrap();
        assert!(snapshot.get("NewOnly").is_some());
        assert!(snapshot.get("OldOnly").is_none());
        assert_eq!(snapshot.get("NewOnly").unwrap().path, "1.5/Languages/English/Keyed/New.xml");

        let latest = locate(dir.path(), &LocatorOptions::new("English"), &RunContext::default()).unwrap();
        assert!(latest.get("NewOnly").is_some());
        assert!(latest.get("OldOnly").is_none());

        let all = LocatorOptions::new("English").with_versions(VersionSelector::All);
        let all = locate(dir.path(), &all, &RunContext::default()).unwrap();
        assert!(all.get("OldOnly").is_some());
    }

    #[test]
    fn test_shared_keys_across_versions() {
        let dir = TempDir::new().unwrap();
        for version in ["1.4", "1.5"] {
            write(
                dir.path(),
                &format!("{version}/Languages/English/Keyed/UI.xml"),
                &format!("<LanguageData>\n  <Hello>Hello {version}</Hello>\n</LanguageData>\n"),
            );
        }

        let latest = locate(dir.path(), &LocatorOptions::new("English"), &RunContext::default()).unwrap();
        assert_eq!(latest.units.len(), 1);
        assert_eq!(latest.get("Hello").unwrap().source_text, "Hello 1.5");
        assert!(latest.duplicates.is_empty());
        assert!(latest.diagnostics.is_empty());

        let all = LocatorOptions::new("English").with_versions(VersionSelector::All);
        let all = locate(dir.path(), &all, &RunContext::default()).unwrap();
        assert_eq!(all.units.len(), 1);
        assert_eq!(all.duplicates.len(), 1);
    }

    #[test]
    fn test_cancelled_scan() {
        let dir = fixture();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let ctx = RunContext::default().with_cancel(cancel);
        let err = locate(dir.path(), &LocatorOptions::new("English"), &ctx).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let dir = fixture();
        let ctx = RunContext::default().with_timeout(std::time::Duration::ZERO);
        let options = LocatorOptions::new("English").with_deadline(ctx.deadline());
        let err = locate(dir.path(), &options, &ctx).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_inheritance_cycle_becomes_diagnostic() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Defs/Cycle.xml",
            "<Defs>\n<ThingDef Name=\"A\" ParentName=\"B\"><defName>A</defName></ThingDef>\n<ThingDef Name=\"B\" ParentName=\"A\"><defName>B</defName></ThingDef>\n</Defs>",
        );
        let options = LocatorOptions::new("English").with_def_roots(vec![PathBuf::from("Defs")]);
        let snapshot = locate(dir.path(), &options, &RunContext::default()).unwrap();
        assert_eq!(
            snapshot
                .diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::InheritanceCycle)
                .count(),
            2
        );
        let strict = options.with_strict(true);
        assert!(matches!(
            locate(dir.path(), &strict, &RunContext::default()),
            Err(Error::InheritanceCycle { .. })
        ));
    }
}
