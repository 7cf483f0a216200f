#![forbid(unsafe_code)]
//! Localization pipeline for game mod trees.
//!
//! Scans `Languages/<lang>/{Keyed,DefInjected}` trees and `Defs` files into
//! keyed translation units, exchanges them with translators as gettext PO
//! catalogs, diffs trees against each other or against an earlier export,
//! and imports finished translations back without disturbing anything the
//! import does not touch.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use loctree::{LocatorOptions, NoMemory, RunContext, catalog, locate, traits::Parser};
//!
//! let root = Path::new("Mods/Guns");
//! let ctx = RunContext::default();
//! let options = LocatorOptions::new("English")
//!     .with_def_roots(loctree::locator::discover_def_roots(root, &Default::default()));
//! let snapshot = locate(root, &options, &ctx)?;
//!
//! let encoded = catalog::encode(&snapshot, None, &NoMemory, Some("Russian"))?;
//! encoded.catalog.write_to("ru.po")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Pipeline
//!
//! - [`locator`] + [`resolver`]: tree → [`TreeSnapshot`]
//! - [`catalog`] + [`memory`]: snapshot → PO catalog, prefilled from earlier translations
//! - [`diff`]: snapshot/catalog comparisons
//! - [`import`] / [`build`]: catalog → language tree or standalone package, as
//!   a previewable plan followed by an apply step
//! - [`annotate`]: source-text comments in translated files
//! - [`validate`] / [`health`]: content and file checks
//! - [`commands`]: the same operations behind serializable requests

pub mod annotate;
pub mod build;
pub mod catalog;
pub mod commands;
pub mod diff;
pub mod error;
pub mod formats;
pub mod fsutil;
pub mod health;
pub mod import;
pub mod lang;
pub mod locator;
pub mod memory;
pub mod placeholder;
pub mod resolver;
pub mod run;
pub mod traits;
pub mod types;
pub mod validate;
pub mod versions;

// Re-export most used types for easy consumption
pub use crate::{
    annotate::{AnnotateOptions, AnnotatePlan, apply_annotate, plan_annotate},
    build::{BuildInput, BuildOptions, BuildPlan, BuildReport, apply_build, plan_build},
    catalog::{CoverageStats, Encoded, decode, encode},
    commands::{Command, Response, execute},
    diff::{Baseline, CompareAxis, DiffResult, diff, diff_translation},
    error::{Diagnostic, DiagnosticKind, Error, Severity},
    formats::{about::PackageMetadata, po::Catalog},
    health::{HealthCategory, HealthReport, xml_health},
    import::{ImportOptions, ImportPlan, ImportReport, apply_import, plan_import, plan_init},
    locator::{LocatorOptions, locate},
    memory::{NoMemory, TmLookup, TranslationMemory},
    resolver::{InheritancePolicy, ResolverConfig},
    run::{CancelFlag, Progress, RunContext},
    types::{TranslationUnit, TreeSnapshot, UnitKind},
    validate::{ValidateOptions, ValidationReport, validate_po},
    versions::VersionSelector,
};
