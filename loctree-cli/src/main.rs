mod config;
mod progress;
mod render;
mod validation;

use std::{
    io::{self, Read},
    path::PathBuf,
    time::Duration,
};

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use loctree::{
    Command, InheritancePolicy, PackageMetadata, Response, RunContext, VersionSelector,
    commands::{
        AnnotateRequest, BuildRequest, DiffRequest, ExportRequest, HealthRequest, ImportRequest,
        InitRequest, ScanRequest, ValidateCatalogRequest, ValidateRequest,
    },
    formats::csv::{UnitRecord, UnitTable},
    traits::Parser as _,
};
use tracing::Level;

use crate::{
    config::Config,
    validation::{ValidationContext, language_folder, validate_context},
};

/// Exit code for `--fail-on-issues` findings.
const EXIT_ISSUES: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,

    /// Config file (defaults to ./loctree.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Worker threads for per-file work
    #[arg(short = 'j', long, global = true)]
    jobs: Option<usize>,

    /// Timeout in seconds for loading translation memory; expired references are skipped
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Options shared by every command that scans a mod tree.
#[derive(clap::Args, Debug)]
struct TreeArgs {
    /// Mod root directory
    #[arg(short, long)]
    root: PathBuf,

    /// Game versions to read: all, latest or a version like 1.5
    #[arg(long)]
    game_version: Option<VersionSelector>,

    /// Defs directory relative to the root (repeatable; discovered when omitted)
    #[arg(long = "def-root")]
    def_roots: Vec<PathBuf>,

    /// Additional translatable def field (repeatable)
    #[arg(long = "extra-field")]
    extra_fields: Vec<String>,

    /// How inherited def fields are treated: synthesize or omit (default: synthesize)
    #[arg(long)]
    inheritance: Option<InheritancePolicy>,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List the translation units of a language tree.
    Scan {
        #[command(flatten)]
        tree: TreeArgs,

        /// Language folder or code (default: English)
        #[arg(short, long)]
        lang: Option<String>,

        /// Fail on malformed files instead of reporting them
        #[arg(long)]
        strict: bool,

        /// Print units as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Write or update a PO catalog for a mod.
    Export {
        #[command(flatten)]
        tree: TreeArgs,

        /// Catalog file to write
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        source_lang: Option<String>,

        #[arg(long)]
        target_lang: Option<String>,

        /// Translated mod used as translation memory (repeatable, in priority order)
        #[arg(long = "tm-root")]
        tm_roots: Vec<PathBuf>,

        /// Write a POT template with empty translations, replacing the output
        #[arg(long, conflicts_with_all = ["target_lang", "tm_roots"])]
        pot: bool,
    },

    /// Check texts for empty values and placeholder problems.
    Validate {
        #[command(flatten)]
        tree: TreeArgs,

        #[arg(short, long)]
        lang: Option<String>,

        /// Translated language whose placeholders must match
        #[arg(long)]
        compare_lang: Option<String>,

        /// Exit with code 2 when anything is reported
        #[arg(long)]
        fail_on_issues: bool,
    },

    /// Check the translations of a PO catalog for placeholder problems.
    ValidatePo {
        /// Catalog to check
        #[arg(short, long)]
        catalog: PathBuf,

        /// Exit with code 2 when anything is reported
        #[arg(long)]
        fail_on_issues: bool,
    },

    /// Check language files for encoding and XML structure problems.
    Health {
        /// Mod root directory
        #[arg(short, long)]
        root: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        game_version: Option<VersionSelector>,

        /// Exit with code 2 when anything is reported
        #[arg(long)]
        fail_on_issues: bool,
    },

    /// Compare a mod's source texts with its translation.
    Diff {
        #[command(flatten)]
        tree: TreeArgs,

        #[arg(long)]
        source_lang: Option<String>,

        #[arg(long)]
        target_lang: Option<String>,

        /// Catalog from an earlier export, to detect changed source texts
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Write ChangedData.txt, OnlyInMod.txt and OnlyInTranslation.txt here
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Import a translated catalog into the mod's language tree.
    Import {
        #[command(flatten)]
        tree: TreeArgs,

        /// Catalog to import
        #[arg(short, long)]
        catalog: PathBuf,

        /// Target language folder or code
        #[arg(short, long)]
        lang: Option<String>,

        /// Write empty elements for untranslated keys
        #[arg(long)]
        keep_empty: bool,

        /// Put everything into Keyed/_Imported.xml
        #[arg(long)]
        single_file: bool,

        /// Leave files whose values already match untouched
        #[arg(long)]
        incremental: bool,

        /// Only import entries whose source text changed
        #[arg(long)]
        only_diff: bool,

        /// Back up touched language folders first
        #[arg(long)]
        backup: bool,

        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Source language, read for --only-diff
        #[arg(long)]
        source_lang: Option<String>,

        /// Show the plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a translation tree with an empty element for every source key.
    Init {
        #[command(flatten)]
        tree: TreeArgs,

        /// Target language folder or code
        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        source_lang: Option<String>,

        /// Back up the target language folder first
        #[arg(long)]
        backup: bool,

        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Show the plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Add or strip source-text comments in translated Keyed files.
    Annotate {
        /// Mod root directory
        #[arg(short, long)]
        root: PathBuf,

        /// Translated language folder or code
        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        source_lang: Option<String>,

        /// Comment prefix (default: EN:)
        #[arg(long)]
        prefix: Option<String>,

        /// Remove comments that start with the prefix instead of adding them
        #[arg(long)]
        strip: bool,

        #[arg(long)]
        game_version: Option<VersionSelector>,

        #[arg(long)]
        backup: bool,

        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Show the plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Build a standalone translation package.
    Build {
        /// Catalog to build from
        #[arg(short, long, conflicts_with = "from_root", required_unless_present = "from_root")]
        catalog: Option<PathBuf>,

        /// Mod root whose language folder is packaged as is
        #[arg(long)]
        from_root: Option<PathBuf>,

        /// Package directory
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        lang: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        package_id: Option<String>,

        #[arg(long)]
        supported_version: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Keep only the first value of repeated keys
        #[arg(long)]
        dedupe: bool,

        #[arg(long)]
        game_version: Option<VersionSelector>,

        /// Show the plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a JSON request from a file or `-` for stdin; prints a JSON response.
    Exec {
        request: String,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run_context(args: &Args, config: &Config) -> RunContext {
    let mut ctx = RunContext::default();
    if let Some(jobs) = args.jobs.or(config.concurrency) {
        ctx = ctx.with_concurrency(jobs);
    }
    if let Some(secs) = args.timeout.or(config.timeout_secs) {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    ctx
}

fn required(value: Option<String>, what: &str) -> Result<String, String> {
    value.ok_or_else(|| format!("missing {what}: pass it as a flag or set it in loctree.toml"))
}

fn read_request(source: &str) -> Result<String, String> {
    if source == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("Cannot read request from stdin: {e}"))?;
        Ok(text)
    } else {
        validation::validate_file_path(source)?;
        std::fs::read_to_string(source).map_err(|e| format!("Cannot read {source}: {e}"))
    }
}

/// What to run and how to report it.
struct Plan {
    command: Command,
    fail_on_issues: bool,
    csv: bool,
}

fn plan(commands: Commands, config: &Config) -> Result<Plan, String> {
    let mut fail_on_issues = false;
    let mut csv = false;
    let command = match commands {
        Commands::Scan {
            tree,
            lang,
            strict,
            csv: as_csv,
        } => {
            let language = language_folder(&config.source_lang(lang));
            validate_context(
                &ValidationContext::new()
                    .with_root_dir(&tree.root)
                    .with_language(&language),
            )?;
            csv = as_csv;
            Command::Scan(ScanRequest {
                language,
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                strict: strict || config.strict,
                root: tree.root,
            })
        }
        Commands::Export {
            tree,
            output,
            source_lang,
            target_lang,
            tm_roots,
            pot,
        } => {
            let source_language = language_folder(&config.source_lang(source_lang));
            let (target_language, tm_roots) = if pot {
                (None, Vec::new())
            } else if tm_roots.is_empty() {
                (
                    config.target_lang(target_lang).map(|l| language_folder(&l)),
                    config.export.tm_roots.clone(),
                )
            } else {
                (config.target_lang(target_lang).map(|l| language_folder(&l)), tm_roots)
            };
            let mut ctx = ValidationContext::new()
                .with_root_dir(&tree.root)
                .with_output_path(&output)
                .with_language(&source_language);
            for root in &tm_roots {
                ctx = ctx.with_root_dir(root);
            }
            validate_context(&ctx)?;
            Command::ExportCatalog(ExportRequest {
                output,
                source_language,
                target_language,
                tm_roots,
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                template: pot,
                root: tree.root,
            })
        }
        Commands::Validate {
            tree,
            lang,
            compare_lang,
            fail_on_issues: fail,
        } => {
            validate_context(&ValidationContext::new().with_root_dir(&tree.root))?;
            fail_on_issues = fail;
            Command::Validate(ValidateRequest {
                language: language_folder(&config.source_lang(lang)),
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                compare_language: compare_lang.map(|l| language_folder(&l)),
                root: tree.root,
            })
        }
        Commands::ValidatePo {
            catalog,
            fail_on_issues: fail,
        } => {
            validate_context(&ValidationContext::new().with_input_file(&catalog))?;
            fail_on_issues = fail;
            Command::ValidateCatalog(ValidateCatalogRequest { catalog })
        }
        Commands::Health {
            root,
            lang,
            game_version,
            fail_on_issues: fail,
        } => {
            let language = language_folder(&required(config.target_lang(lang), "--lang")?);
            validate_context(
                &ValidationContext::new()
                    .with_root_dir(&root)
                    .with_language(&language),
            )?;
            fail_on_issues = fail;
            Command::XmlHealth(HealthRequest {
                root,
                language,
                versions: config.versions(game_version),
            })
        }
        Commands::Diff {
            tree,
            source_lang,
            target_lang,
            baseline,
            out_dir,
        } => {
            let target_language = language_folder(&required(config.target_lang(target_lang), "--target-lang")?);
            let mut ctx = ValidationContext::new().with_root_dir(&tree.root);
            if let Some(baseline) = &baseline {
                ctx = ctx.with_input_file(baseline);
            }
            validate_context(&ctx)?;
            Command::Diff(DiffRequest {
                source_language: language_folder(&config.source_lang(source_lang)),
                target_language,
                baseline,
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                report_dir: out_dir,
                root: tree.root,
            })
        }
        Commands::Import {
            tree,
            catalog,
            lang,
            keep_empty,
            single_file,
            incremental,
            only_diff,
            backup,
            backup_dir,
            source_lang,
            dry_run,
        } => {
            let language = language_folder(&required(config.target_lang(lang), "--lang")?);
            validate_context(
                &ValidationContext::new()
                    .with_root_dir(&tree.root)
                    .with_input_file(&catalog)
                    .with_language(&language),
            )?;
            let request = ImportRequest {
                catalog,
                language,
                keep_empty: keep_empty || config.import.keep_empty,
                single_file: single_file || config.import.single_file,
                incremental: incremental || config.import.incremental,
                only_diff,
                backup: backup || config.import.backup,
                backup_dir: backup_dir.or_else(|| config.import.backup_dir.clone()),
                source_language: language_folder(&config.source_lang(source_lang)),
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                root: tree.root,
            };
            if dry_run {
                Command::ImportDry(request)
            } else {
                Command::ImportApply(request)
            }
        }
        Commands::Init {
            tree,
            lang,
            source_lang,
            backup,
            backup_dir,
            dry_run,
        } => {
            let language = language_folder(&required(config.target_lang(lang), "--lang")?);
            validate_context(
                &ValidationContext::new()
                    .with_root_dir(&tree.root)
                    .with_language(&language),
            )?;
            let request = InitRequest {
                language,
                source_language: language_folder(&config.source_lang(source_lang)),
                def_roots: tree.def_roots,
                resolver: config.resolver(tree.inheritance, &tree.extra_fields),
                versions: config.versions(tree.game_version),
                backup: backup || config.import.backup,
                backup_dir: backup_dir.or_else(|| config.import.backup_dir.clone()),
                root: tree.root,
            };
            if dry_run {
                Command::InitDry(request)
            } else {
                Command::InitApply(request)
            }
        }
        Commands::Annotate {
            root,
            lang,
            source_lang,
            prefix,
            strip,
            game_version,
            backup,
            backup_dir,
            dry_run,
        } => {
            let language = language_folder(&required(config.target_lang(lang), "--lang")?);
            validate_context(
                &ValidationContext::new()
                    .with_root_dir(&root)
                    .with_language(&language),
            )?;
            let request = AnnotateRequest {
                root,
                language,
                source_language: language_folder(&config.source_lang(source_lang)),
                prefix: prefix.unwrap_or_else(|| loctree::annotate::DEFAULT_PREFIX.to_string()),
                strip,
                versions: config.versions(game_version),
                backup: backup || config.import.backup,
                backup_dir: backup_dir.or_else(|| config.import.backup_dir.clone()),
            };
            if dry_run {
                Command::AnnotateDry(request)
            } else {
                Command::AnnotateApply(request)
            }
        }
        Commands::Build {
            catalog,
            from_root,
            output,
            lang,
            name,
            package_id,
            supported_version,
            author,
            description,
            dedupe,
            game_version,
            dry_run,
        } => {
            let language = language_folder(&required(config.target_lang(lang), "--lang")?);
            let mut ctx = ValidationContext::new()
                .with_output_path(output.join("About"))
                .with_language(&language);
            if let Some(catalog) = &catalog {
                ctx = ctx.with_input_file(catalog);
            }
            if let Some(root) = &from_root {
                ctx = ctx.with_root_dir(root);
            }
            validate_context(&ctx)?;
            let build = &config.build;
            let metadata = PackageMetadata {
                name: required(name.or_else(|| build.name.clone()), "--name")?,
                package_id: required(package_id.or_else(|| build.package_id.clone()), "--package-id")?,
                supported_version: required(
                    supported_version.or_else(|| build.supported_version.clone()),
                    "--supported-version",
                )?,
                author: author.or_else(|| build.author.clone()),
                description: description.or_else(|| build.description.clone()),
            };
            let request = BuildRequest {
                catalog,
                source_root: from_root,
                output,
                metadata,
                language,
                dedupe: dedupe || build.dedupe,
                versions: config.versions(game_version),
            };
            if dry_run {
                Command::BuildDry(request)
            } else {
                Command::BuildApply(request)
            }
        }
        Commands::Exec { .. } | Commands::Completions { .. } => {
            return Err("not a pipeline command".to_string());
        }
    };
    Ok(Plan {
        command,
        fail_on_issues,
        csv,
    })
}

fn print_csv(response: &Response) -> Result<(), String> {
    let Response::Scan(scan) = response else {
        return Err("--csv only applies to scan".to_string());
    };
    let table = UnitTable(scan.units.iter().map(UnitRecord::from).collect());
    table.to_writer(io::stdout()).map_err(|e| e.to_string())
}

fn run(args: Args) -> Result<i32, String> {
    let config = Config::load(args.config.as_deref())?;
    let ctx = run_context(&args, &config);

    match &args.commands {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Args::command(), "loctree", &mut io::stdout());
            return Ok(0);
        }
        Commands::Exec { request } => {
            let text = read_request(request)?;
            let command: Command =
                serde_json::from_str(&text).map_err(|e| format!("Invalid request: {e}"))?;
            let response = loctree::execute(command, &ctx).map_err(|e| e.to_string())?;
            let body = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
            println!("{body}");
            return Ok(0);
        }
        _ => {}
    }

    let format = args.format;
    let plan = plan(args.commands, &config)?;
    let bar = progress::progress_bar(format == OutputFormat::Text && !args.quiet && !plan.csv);
    let ctx = progress::attach(ctx, &bar);
    let result = loctree::execute(plan.command, &ctx);
    bar.finish_and_clear();
    let response = result.map_err(|e| e.to_string())?;

    if plan.csv {
        print_csv(&response)?;
    } else {
        match format {
            OutputFormat::Json => {
                let body = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
                println!("{body}");
            }
            OutputFormat::Text => print!("{}", render::text(&response)),
        }
    }

    if plan.fail_on_issues && render::has_issues(&response) {
        return Ok(EXIT_ISSUES);
    }
    Ok(0)
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}
