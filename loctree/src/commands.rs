//! Request/response boundary over the pipeline.
//!
//! Every operation takes one serializable request and returns one
//! serializable response, so front-ends (the CLI, a GUI backend, scripts)
//! can drive the library with plain JSON:
//!
//! ```json
//! {"command": "scan", "root": "Mods/Guns", "language": "English"}
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    annotate::{self, AnnotateOptions, AnnotatePlan},
    build::{self, BuildInput, BuildOptions, BuildPlan, BuildReport},
    catalog::{self, CoverageStats},
    diff::{self, DiffResult},
    error::{Diagnostic, Error},
    formats::{about::PackageMetadata, po::Catalog},
    health::{self, HealthReport},
    import::{self, ImportOptions, ImportPlan, ImportReport},
    locator::{self, LocatorOptions},
    memory::{MemoryOptions, NoMemory, TranslationMemory},
    resolver::ResolverConfig,
    run::RunContext,
    traits::Parser,
    types::{KindCounts, TranslationUnit, TreeSnapshot},
    validate::{self, ValidateOptions, ValidationReport},
    versions::VersionSelector,
};

fn default_source_language() -> String {
    "English".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanRequest {
    pub root: PathBuf,
    #[serde(default = "default_source_language")]
    pub language: String,
    /// Def roots relative to `root`. Discovered when empty.
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportRequest {
    pub root: PathBuf,
    /// Catalog file. An existing catalog is merged, not replaced.
    pub output: PathBuf,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default)]
    pub target_language: Option<String>,
    /// Previously translated mods, highest priority first.
    #[serde(default)]
    pub tm_roots: Vec<PathBuf>,
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
    /// Write a POT template: every target empty, no merge with an existing
    /// catalog and no translation memory.
    #[serde(default)]
    pub template: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateRequest {
    pub root: PathBuf,
    #[serde(default = "default_source_language")]
    pub language: String,
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
    #[serde(default)]
    pub compare_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateCatalogRequest {
    pub catalog: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthRequest {
    pub root: PathBuf,
    pub language: String,
    #[serde(default)]
    pub versions: VersionSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffRequest {
    pub root: PathBuf,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    pub target_language: String,
    /// Catalog from an earlier export, used to find changed source text.
    #[serde(default)]
    pub baseline: Option<PathBuf>,
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
    /// Directory for the plain-text reports.
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportRequest {
    pub catalog: PathBuf,
    pub root: PathBuf,
    pub language: String,
    #[serde(default)]
    pub keep_empty: bool,
    #[serde(default)]
    pub single_file: bool,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub only_diff: bool,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Source tree settings, read only for `only_diff`.
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
}

/// Creates the `language` tree for every source key, without touching
/// existing values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitRequest {
    pub root: PathBuf,
    pub language: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default)]
    pub def_roots: Vec<PathBuf>,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub versions: VersionSelector,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotateRequest {
    pub root: PathBuf,
    pub language: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_annotate_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub strip: bool,
    #[serde(default)]
    pub versions: VersionSelector,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

fn default_annotate_prefix() -> String {
    annotate::DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    /// Build from a catalog...
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// ...or from the existing language tree of a mod.
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    pub output: PathBuf,
    pub metadata: PackageMetadata,
    pub language: String,
    #[serde(default)]
    pub dedupe: bool,
    #[serde(default)]
    pub versions: VersionSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Scan(ScanRequest),
    ExportCatalog(ExportRequest),
    Validate(ValidateRequest),
    ValidateCatalog(ValidateCatalogRequest),
    XmlHealth(HealthRequest),
    Diff(DiffRequest),
    ImportDry(ImportRequest),
    ImportApply(ImportRequest),
    InitDry(InitRequest),
    InitApply(InitRequest),
    AnnotateDry(AnnotateRequest),
    AnnotateApply(AnnotateRequest),
    BuildDry(BuildRequest),
    BuildApply(BuildRequest),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Scan(_) => "scan",
            Command::ExportCatalog(_) => "export_catalog",
            Command::Validate(_) => "validate",
            Command::ValidateCatalog(_) => "validate_catalog",
            Command::XmlHealth(_) => "xml_health",
            Command::Diff(_) => "diff",
            Command::ImportDry(_) => "import_dry",
            Command::ImportApply(_) => "import_apply",
            Command::InitDry(_) => "init_dry",
            Command::InitApply(_) => "init_apply",
            Command::AnnotateDry(_) => "annotate_dry",
            Command::AnnotateApply(_) => "annotate_apply",
            Command::BuildDry(_) => "build_dry",
            Command::BuildApply(_) => "build_apply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub units: Vec<TranslationUnit>,
    pub counts: KindCounts,
    /// Resolver settings the scan ran with, defaults filled in.
    pub resolver: ResolverConfig,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub output: PathBuf,
    pub stats: CoverageStats,
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub template: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    #[serde(flatten)]
    pub result: DiffResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Response {
    Scan(ScanResponse),
    ExportCatalog(ExportResponse),
    Validate(ValidationReport),
    ValidateCatalog(ValidationReport),
    XmlHealth(HealthReport),
    Diff(DiffResponse),
    ImportDry(ImportPlan),
    ImportApply(ImportReport),
    InitDry(ImportPlan),
    InitApply(ImportReport),
    AnnotateDry(AnnotatePlan),
    AnnotateApply(ImportReport),
    BuildDry(BuildPlan),
    BuildApply(BuildReport),
}

fn def_roots_or_discover(root: &Path, explicit: &[PathBuf], versions: &VersionSelector) -> Vec<PathBuf> {
    if explicit.is_empty() {
        locator::discover_def_roots(root, versions)
    } else {
        explicit.to_vec()
    }
}

/// Scans the source language of `root`, Defs included.
fn scan_source(
    root: &Path,
    language: &str,
    def_roots: &[PathBuf],
    resolver: &ResolverConfig,
    versions: &VersionSelector,
    ctx: &RunContext,
) -> Result<TreeSnapshot, Error> {
    let options = LocatorOptions::new(language)
        .with_def_roots(def_roots_or_discover(root, def_roots, versions))
        .with_resolver(resolver.clone())
        .with_versions(versions.clone());
    locator::locate(root, &options, ctx)
}

/// Scans only the language files of `language`, as written by translators.
fn scan_translation(
    root: &Path,
    language: &str,
    resolver: &ResolverConfig,
    versions: &VersionSelector,
    ctx: &RunContext,
) -> Result<TreeSnapshot, Error> {
    let options = LocatorOptions::new(language)
        .with_resolver(resolver.clone())
        .with_versions(versions.clone());
    locator::locate(root, &options, ctx)
}

fn scan(req: ScanRequest, ctx: &RunContext) -> Result<ScanResponse, Error> {
    let options = LocatorOptions::new(&req.language)
        .with_def_roots(def_roots_or_discover(&req.root, &req.def_roots, &req.versions))
        .with_resolver(req.resolver)
        .with_versions(req.versions)
        .with_strict(req.strict);
    let snapshot = locator::locate(&req.root, &options, ctx)?;
    Ok(ScanResponse {
        counts: snapshot.counts(),
        resolver: snapshot.config,
        units: snapshot.units,
        diagnostics: snapshot.diagnostics,
    })
}

fn export_catalog(req: ExportRequest, ctx: &RunContext) -> Result<ExportResponse, Error> {
    let snapshot = scan_source(
        &req.root,
        &req.source_language,
        &req.def_roots,
        &req.resolver,
        &req.versions,
        ctx,
    )?;
    if req.template && !req.tm_roots.is_empty() {
        return Err(Error::invalid_request(
            "a template export takes no translation memory",
        ));
    }
    let existing = if req.output.is_file() && !req.template {
        Some(Catalog::read_from(&req.output)?)
    } else {
        None
    };

    let mut diagnostics = snapshot.diagnostics.clone();
    let mut timed_out = false;
    let encoded = if req.template {
        catalog::encode(&snapshot, None, &NoMemory, None)?
    } else if req.tm_roots.is_empty() {
        catalog::encode(&snapshot, existing.as_ref(), &NoMemory, req.target_language.as_deref())?
    } else {
        let Some(target_language) = req.target_language.clone() else {
            return Err(Error::invalid_request(
                "translation memory needs a target language",
            ));
        };
        let options = MemoryOptions {
            source_language: req.source_language.clone(),
            target_language,
            resolver: req.resolver.clone(),
            versions: req.versions.clone(),
        };
        let loaded = TranslationMemory::load(&req.tm_roots, &options, ctx, ctx.deadline())?;
        diagnostics.extend(loaded.diagnostics);
        timed_out = loaded.timed_out;
        catalog::encode(
            &snapshot,
            existing.as_ref(),
            &loaded.memory,
            req.target_language.as_deref(),
        )?
    };

    let mut stats = encoded.stats.clone();
    stats.timed_out = timed_out;
    encoded.catalog.write_to(&req.output)?;
    tracing::info!(
        "exported {} entries to {} ({:.1}% filled from memory)",
        stats.total,
        req.output.display(),
        stats.coverage_percent
    );
    Ok(ExportResponse {
        output: req.output,
        stats,
        resolver: snapshot.config,
        template: req.template,
        diagnostics,
    })
}

fn validate_tree(req: ValidateRequest, ctx: &RunContext) -> Result<ValidationReport, Error> {
    let options = ValidateOptions {
        language: req.language,
        def_roots: req.def_roots,
        resolver: req.resolver,
        versions: req.versions,
        compare_language: req.compare_language,
    };
    validate::validate(&req.root, &options, ctx)
}

fn diff_trees(req: DiffRequest, ctx: &RunContext) -> Result<DiffResponse, Error> {
    let source = scan_source(
        &req.root,
        &req.source_language,
        &req.def_roots,
        &req.resolver,
        &req.versions,
        ctx,
    )?;
    let target = scan_translation(&req.root, &req.target_language, &req.resolver, &req.versions, ctx)?;
    let baseline = req.baseline.as_ref().map(Catalog::read_from).transpose()?;
    let result = diff::diff_translation(&source, &target, baseline.as_ref())?;
    let reports = match &req.report_dir {
        Some(dir) => diff::write_reports(dir, &result)?,
        None => Vec::new(),
    };
    tracing::info!(
        "diff {} -> {}: {} untranslated, {} stale, {} changed",
        req.source_language,
        req.target_language,
        result.only_in_a.len(),
        result.only_in_b.len(),
        result.changed.len()
    );
    Ok(DiffResponse { result, reports })
}

fn plan_import(req: &ImportRequest, ctx: &RunContext) -> Result<ImportPlan, Error> {
    let catalog = Catalog::read_from(&req.catalog)?;
    let source = if req.only_diff {
        Some(scan_source(
            &req.root,
            &req.source_language,
            &req.def_roots,
            &req.resolver,
            &req.versions,
            ctx,
        )?)
    } else {
        None
    };
    let options = ImportOptions {
        language: req.language.clone(),
        keep_empty: req.keep_empty,
        single_file: req.single_file,
        incremental: req.incremental,
        only_diff: req.only_diff,
        backup: req.backup,
        backup_dir: req.backup_dir.clone(),
    };
    import::plan_import(&catalog, &req.root, source.as_ref(), &options)
}

fn plan_init(req: &InitRequest, ctx: &RunContext) -> Result<ImportPlan, Error> {
    let source = scan_source(
        &req.root,
        &req.source_language,
        &req.def_roots,
        &req.resolver,
        &req.versions,
        ctx,
    )?;
    let mut plan = import::plan_init(&source, &req.root, &req.language)?;
    plan.backup_dir = req
        .backup
        .then(|| import::backup_dir_or_default(&req.root, &req.language, req.backup_dir.as_deref()));
    Ok(plan)
}

fn plan_annotate(req: &AnnotateRequest, ctx: &RunContext) -> Result<AnnotatePlan, Error> {
    let source = scan_translation(
        &req.root,
        &req.source_language,
        &ResolverConfig::default(),
        &req.versions,
        ctx,
    )?;
    let options = AnnotateOptions {
        language: req.language.clone(),
        prefix: req.prefix.clone(),
        strip: req.strip,
        versions: req.versions.clone(),
        backup: req.backup,
        backup_dir: req.backup_dir.clone(),
    };
    annotate::plan_annotate(&source, &req.root, &options)
}

fn plan_build(req: &BuildRequest) -> Result<BuildPlan, Error> {
    let options = BuildOptions {
        output: req.output.clone(),
        metadata: req.metadata.clone(),
        language: req.language.clone(),
        dedupe: req.dedupe,
        versions: req.versions.clone(),
    };
    match (&req.catalog, &req.source_root) {
        (Some(path), None) => {
            let catalog = Catalog::read_from(path)?;
            build::plan_build(BuildInput::Catalog(&catalog), &options)
        }
        (None, Some(root)) => build::plan_build(BuildInput::SourceRoot(root), &options),
        _ => Err(Error::invalid_request(
            "build needs exactly one of `catalog` and `source_root`",
        )),
    }
}

/// Runs one command.
pub fn execute(command: Command, ctx: &RunContext) -> Result<Response, Error> {
    tracing::debug!("executing {}", command.name());
    Ok(match command {
        Command::Scan(req) => Response::Scan(scan(req, ctx)?),
        Command::ExportCatalog(req) => Response::ExportCatalog(export_catalog(req, ctx)?),
        Command::Validate(req) => Response::Validate(validate_tree(req, ctx)?),
        Command::ValidateCatalog(req) => Response::ValidateCatalog(validate::validate_po(&req.catalog)?),
        Command::XmlHealth(req) => {
            Response::XmlHealth(health::xml_health(&req.root, &req.language, &req.versions, ctx)?)
        }
        Command::Diff(req) => Response::Diff(diff_trees(req, ctx)?),
        Command::ImportDry(req) => Response::ImportDry(plan_import(&req, ctx)?),
        Command::ImportApply(req) => {
            let plan = plan_import(&req, ctx)?;
            Response::ImportApply(import::apply_import(&plan, ctx)?)
        }
        Command::InitDry(req) => Response::InitDry(plan_init(&req, ctx)?),
        Command::InitApply(req) => {
            let plan = plan_init(&req, ctx)?;
            Response::InitApply(import::apply_import(&plan, ctx)?)
        }
        Command::AnnotateDry(req) => Response::AnnotateDry(plan_annotate(&req, ctx)?),
        Command::AnnotateApply(req) => {
            let plan = plan_annotate(&req, ctx)?;
            Response::AnnotateApply(annotate::apply_annotate(&plan, ctx)?)
        }
        Command::BuildDry(req) => Response::BuildDry(plan_build(&req)?),
        Command::BuildApply(req) => {
            let plan = plan_build(&req)?;
            Response::BuildApply(build::apply_build(&plan, ctx)?)
        }
    })
}

/// Parses a JSON request and runs it.
pub fn execute_json(request: &str, ctx: &RunContext) -> Result<Response, Error> {
    let command: Command = serde_json::from_str(request)?;
    execute(command, ctx)
}
