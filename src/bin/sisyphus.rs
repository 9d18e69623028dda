//! Sisyphus scenario runner CLI -- API test execution tool.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use sisyphus::config_file::ProfileFile;
use sisyphus::db_executor::{DbAdapter, SqliteAdapter};
use sisyphus::http_executor::HttpExecutor;
use sisyphus::model::{Case, CaseResult};
use sisyphus::{CaseLoader, Clock, EngineError, Scheduler, SystemClock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use sisyphus::log_capture::CaseLogLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Sisyphus -- YAML-driven API test orchestration engine.
#[derive(Parser, Debug)]
#[command(name = "sisyphus", version, about)]
struct Cli {
    /// Run a single scenario file.
    #[arg(long = "case")]
    case: Option<PathBuf>,

    /// Run multiple scenario files; directories are walked recursively for `*.yaml`/`*.yml`.
    #[arg(long = "cases", num_args = 1..)]
    cases: Vec<PathBuf>,

    /// Reporter to use.
    #[arg(short = 'O', long = "output", default_value = "text")]
    output: OutputFormat,

    /// Output directory for the `allure` reporter.
    #[arg(long = "allure-dir")]
    allure_dir: Option<PathBuf>,

    /// Output directory for the `html` reporter.
    #[arg(long = "html-dir")]
    html_dir: Option<PathBuf>,

    /// Include DEBUG-level logs.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Override `.sisyphus/config.yaml`'s `active_profile`.
    #[arg(long = "profile")]
    profile: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Allure,
    Html,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .with(CaseLogLayer)
        .try_init();
}

/// Resolve `--case`/`--cases` into a flat, deduplicated list of
/// scenario files, walking directories recursively for `*.yaml`/`*.yml`.
fn collect_case_paths(case: Option<PathBuf>, cases: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(c) = case {
        roots.push(c);
    }
    roots.extend(cases);

    if roots.is_empty() {
        return Err(anyhow!("no scenario path given; pass --case or --cases"));
    }

    let mut out = Vec::new();
    for root in roots {
        if !root.exists() {
            return Err(anyhow!("path does not exist: {}", root.display()));
        }
        if root.is_file() {
            out.push(root);
        } else {
            walk_yaml_files(&root, &mut out)?;
        }
    }
    Ok(out)
}

fn walk_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

/// Merge the active `.sisyphus/config.yaml` profile into a case that
/// omits its own environment (§6).
fn apply_profile(case: &mut Case, profile: Option<&sisyphus::config_file::Profile>) {
    let Some(profile) = profile else { return };
    if case.config.active_environment.is_some() {
        return;
    }
    if case.config.base_url.is_none() {
        case.config.base_url = profile.base_url.clone();
    }
    for (k, v) in &profile.headers {
        case.config
            .headers
            .entry(k.clone())
            .or_insert_with(|| v.clone());
    }
    for (k, v) in &profile.variables {
        case.config
            .variables
            .entry(k.clone())
            .or_insert_with(|| v.clone());
    }
}

/// Build the datasource adapter map for one case; a datasource with
/// an unsupported `kind` is silently omitted so a `db` step against
/// it surfaces `DB_DATASOURCE_NOT_FOUND` at run time rather than
/// aborting the whole CLI invocation.
fn build_datasources(case: &Case) -> HashMap<String, Box<dyn DbAdapter>> {
    let mut dbs: HashMap<String, Box<dyn DbAdapter>> = HashMap::new();
    for (name, ds) in &case.config.datasources {
        match ds.kind.as_str() {
            "sqlite" => match SqliteAdapter::open(&ds.connection) {
                Ok(adapter) => {
                    dbs.insert(name.clone(), Box::new(adapter));
                }
                Err(e) => warn!("failed to open datasource {name}: {e}"),
            },
            other => warn!("unsupported datasource kind {other:?} for {name}; db steps against it will fail"),
        }
    }
    dbs
}

async fn run_one_case(path: &Path, profile: Option<&sisyphus::config_file::Profile>) -> CaseResult {
    let loader = CaseLoader::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut case = match loader.load_case(path) {
        Ok(case) => case,
        Err(e) => return error_document(path, &clock, &e),
    };

    apply_profile(&mut case, profile);

    let timeout = case.config.timeout.max(1);
    let http = match HttpExecutor::new(timeout) {
        Ok(http) => Arc::new(http),
        Err(e) => return error_document(path, &clock, &e),
    };
    let dbs = Arc::new(build_datasources(&case));

    let case_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scheduler = Scheduler::new(http, dbs, clock);
    scheduler.run_case(&case, case_dir).await
}

/// A case that never made it past loading still produces a
/// well-formed document with `status = "error"` (§6).
fn error_document(path: &Path, clock: &Arc<dyn Clock>, e: &EngineError) -> CaseResult {
    let mut aggregator = sisyphus::Aggregator::start(path.display().to_string(), clock.as_ref());
    aggregator.fail_case(sisyphus::model::ErrorInfo {
        code: e.code().to_string(),
        message: e.to_string(),
        detail: None,
    });
    aggregator.finish(clock.as_ref(), HashMap::new(), Vec::new(), None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    if matches!(args.output, OutputFormat::Allure | OutputFormat::Html) {
        error!(
            "reporter {:?} is not part of the core engine; run the dedicated reporter against -O json output instead",
            args.output
        );
        exit(1);
    }

    let case_paths = match collect_case_paths(args.case, args.cases) {
        Ok(paths) => paths,
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    };

    let config_path = Path::new(".sisyphus/config.yaml");
    let profile_file = if config_path.exists() {
        match ProfileFile::load(config_path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("failed to load {}: {e}", config_path.display());
                None
            }
        }
    } else {
        None
    };
    let profile = profile_file
        .as_ref()
        .and_then(|f| f.resolve(args.profile.as_deref()));

    let mut results = Vec::with_capacity(case_paths.len());
    let mut any_engine_error = false;
    for path in &case_paths {
        info!("running {}", path.display());
        let result = run_one_case(path, profile).await;
        if result.status == "error" {
            any_engine_error = true;
        }
        results.push(result);
    }

    match args.output {
        OutputFormat::Text => {
            for result in &results {
                sisyphus::reporters::text::print(result, args.verbose);
            }
        }
        OutputFormat::Json => {
            println!("{}", sisyphus::reporters::json::render(&results)?);
        }
        OutputFormat::Allure | OutputFormat::Html => unreachable!("handled above"),
    }

    if any_engine_error {
        exit(1);
    }
    Ok(())
}
