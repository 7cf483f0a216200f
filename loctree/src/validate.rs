//! Content checks over a scanned tree or a catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Diagnostic, DiagnosticKind, Error, Severity},
    formats::po::Catalog,
    locator::{LocatorOptions, discover_def_roots, locate},
    placeholder,
    resolver::ResolverConfig,
    run::RunContext,
    traits::Parser,
    types::{TranslationUnit, TreeSnapshot},
    versions::VersionSelector,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidateOptions {
    pub language: String,
    /// Def roots relative to the mod root. Discovered when empty.
    pub def_roots: Vec<PathBuf>,
    pub resolver: ResolverConfig,
    pub versions: VersionSelector,
    /// A translated language whose placeholders must match the scanned one.
    pub compare_language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub units: usize,
    pub errors: usize,
    pub warnings: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    fn new(units: usize, diagnostics: Vec<Diagnostic>) -> Self {
        let count = |s: Severity| diagnostics.iter().filter(|d| d.severity == s).count();
        Self {
            units,
            errors: count(Severity::Error),
            warnings: count(Severity::Warning),
            diagnostics,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

fn unit_diagnostic(unit: &TranslationUnit, kind: DiagnosticKind, message: String) -> Diagnostic {
    Diagnostic::warning(kind, message)
        .with_path(unit.path.clone())
        .with_line(unit.line)
        .with_key(unit.key.clone())
}

/// Checks every unit of `snapshot`. Scan diagnostics (malformed files,
/// duplicate keys, inheritance cycles) are included first.
pub fn validate_snapshot(snapshot: &TreeSnapshot, compare: Option<&TreeSnapshot>) -> Vec<Diagnostic> {
    let mut out = snapshot.diagnostics.clone();
    let other = compare.map(TreeSnapshot::index).unwrap_or_default();

    for unit in &snapshot.units {
        if unit.source_text.trim().is_empty() {
            out.push(unit_diagnostic(unit, DiagnosticKind::EmptyValue, "empty value".into()));
            continue;
        }
        for problem in placeholder::check(&unit.source_text) {
            out.push(unit_diagnostic(unit, DiagnosticKind::Placeholder, problem.to_string()));
        }
        if let Some(translated) = other.get(unit.key.as_str()) {
            let expected = placeholder::signature(&unit.source_text);
            let found = placeholder::signature(&translated.source_text);
            if expected != found {
                out.push(
                    unit_diagnostic(
                        translated,
                        DiagnosticKind::PlaceholderMismatch,
                        format!(
                            "placeholders differ: expected [{}], found [{}]",
                            expected.join(", "),
                            found.join(", ")
                        ),
                    )
                    .with_severity(Severity::Error),
                );
            }
        }
    }
    out
}

/// Checks translated catalog entries against their source text.
pub fn validate_catalog(catalog: &Catalog) -> Vec<Diagnostic> {
    let mut out = catalog.diagnostics.clone();
    for entry in catalog.active().filter(|e| e.is_translated()) {
        let expected = placeholder::signature(&entry.source_text);
        let found = placeholder::signature(&entry.target_text);
        let mut push = |kind, severity, message: String| {
            let mut diag = Diagnostic::warning(kind, message)
                .with_key(entry.key.clone())
                .with_severity(severity);
            if let Some(path) = entry.reference_path() {
                diag = diag.with_path(path);
            }
            out.push(diag);
        };
        if expected != found {
            push(
                DiagnosticKind::PlaceholderMismatch,
                Severity::Error,
                format!(
                    "placeholders differ: expected [{}], found [{}]",
                    expected.join(", "),
                    found.join(", ")
                ),
            );
        }
        for problem in placeholder::check(&entry.target_text) {
            push(DiagnosticKind::Placeholder, Severity::Warning, problem.to_string());
        }
    }
    out
}

/// Reads the catalog at `path` and validates its translated entries.
pub fn validate_po(path: &Path) -> Result<ValidationReport, Error> {
    let catalog = Catalog::read_from(path)?;
    let report = ValidationReport::new(catalog.active().count(), validate_catalog(&catalog));
    tracing::info!(
        "validated {} catalog entries: {} error(s), {} warning(s)",
        report.units,
        report.errors,
        report.warnings
    );
    Ok(report)
}

/// Scans `root` and validates the result.
pub fn validate(root: &Path, options: &ValidateOptions, ctx: &RunContext) -> Result<ValidationReport, Error> {
    let def_roots = if options.def_roots.is_empty() {
        discover_def_roots(root, &options.versions)
    } else {
        options.def_roots.clone()
    };
    let locator = LocatorOptions::new(&options.language)
        .with_def_roots(def_roots)
        .with_resolver(options.resolver.clone())
        .with_versions(options.versions.clone());
    let snapshot = locate(root, &locator, ctx)?;

    let compare = match &options.compare_language {
        Some(language) => {
            let compare_options = LocatorOptions::new(language)
                .with_resolver(options.resolver.clone())
                .with_versions(options.versions.clone());
            Some(locate(root, &compare_options, ctx)?)
        }
        None => None,
    };

    let report = ValidationReport::new(snapshot.len(), validate_snapshot(&snapshot, compare.as_ref()));
    tracing::info!(
        "validated {} units: {} error(s), {} warning(s)",
        report.units,
        report.errors,
        report.warnings
    );
    Ok(report)
}
