//! tvart - artwork pipeline for art-mode televisions
//!
//! Loads manifests of artwork URLs, brings every artwork up to a
//! display-ready image and synchronizes the result with the device.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tvart_common::config::{resolve_root_folder, ConfigSource, TomlConfig};
use tvart_common::FolderLayout;
use tvart_ingest::device::{ArtStore, FolderArtStore};
use tvart_ingest::models::{parse_url_list, ArtSet, ResizePolicy};
use tvart_ingest::services::reconciler::{delete_all, list_uploaded};
use tvart_ingest::services::Reconciler;
use tvart_ingest::workflow::{load_sets, Pipeline, ProcessOptions, ProcessReport};

/// Command-line arguments for tvart
#[derive(Parser, Debug)]
#[command(name = "tvart")]
#[command(about = "Prepare artwork for an art-mode television and keep it in sync")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root folder holding raw, ready and cache folders
    #[arg(long, value_name = "DIR")]
    root_folder: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process sets and synchronize the device
    Run(RunArgs),

    /// List content currently uploaded to the device category
    ShowUploaded,

    /// Delete every uploaded item and forget the ids in the given sets
    DeleteAll {
        #[arg(long = "setfile", value_name = "FILE")]
        setfiles: Vec<PathBuf>,
    },

    /// Create a manifest from a list of URLs, one per line
    Init {
        urls: PathBuf,
        /// Output manifest (defaults to the URL list with a .json extension)
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long = "setfile", value_name = "FILE", required = true)]
    setfiles: Vec<PathBuf>,

    #[arg(long)]
    always_download: bool,

    #[arg(long)]
    always_generate: bool,

    #[arg(long)]
    always_mat: bool,

    #[arg(long)]
    always_metadata: bool,

    #[arg(long)]
    always_labels: bool,

    /// Process sets without touching the device
    #[arg(long)]
    skip_sync: bool,

    /// Do not connect to the device at all
    #[arg(long)]
    no_tv: bool,

    /// Repeat every `loop_interval_secs` until interrupted
    #[arg(long)]
    stay: bool,
}

impl RunArgs {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            always_download: self.always_download,
            always_generate: self.always_generate,
            always_mat: self.always_mat,
            always_metadata: self.always_metadata,
            always_labels: self.always_labels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Complete,
    Partial,
}

impl RunStatus {
    fn exit_code(self) -> ExitCode {
        match self {
            RunStatus::Complete => ExitCode::SUCCESS,
            RunStatus::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(status) => status.exit_code(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunStatus> {
    let (config, source) =
        TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(cli.verbose, &config);
    info!(
        "Starting tvart {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    match &source {
        ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
        ConfigSource::Defaults => warn!("No config file found, using compiled defaults"),
    }

    if let Command::Init { urls, out } = &cli.command {
        return init_manifest(urls, out.as_deref());
    }

    let root = resolve_root_folder(cli.root_folder.as_deref(), &config);
    info!("Root folder: {}", root.display());
    let layout = FolderLayout::new(root);
    layout
        .ensure_exists()
        .context("Failed to prepare root folder")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    match cli.command {
        Command::Run(args) => run_sets(&config, layout, &args, &cancel).await,
        Command::ShowUploaded => {
            let store = require_store(&config)?;
            let ids = list_uploaded(store.as_ref(), &config.display.category).await?;
            for id in &ids {
                info!(content_id = %id, "Uploaded");
                println!("{}", id);
            }
            info!(count = ids.len(), category = %config.display.category, "Listed device content");
            Ok(RunStatus::Complete)
        }
        Command::DeleteAll { setfiles } => {
            let store = require_store(&config)?;
            let (mut sets, errors) = load_sets(&setfiles);
            let deleted = delete_all(store.as_ref(), &config.display.category, &mut sets).await?;
            info!(deleted = deleted.len(), "Device category cleared");
            Ok(if errors.is_empty() {
                RunStatus::Complete
            } else {
                RunStatus::Partial
            })
        }
        Command::Init { .. } => Ok(RunStatus::Complete),
    }
}

/// `RUST_LOG` > `--verbose` > TOML `logging.level`
fn init_tracing(verbose: bool, config: &TomlConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, finishing the current item");
            cancel.cancel();
        }
    });
}

fn configured_store(config: &TomlConfig) -> Option<Arc<dyn ArtStore>> {
    config.device.folder.as_ref().map(|dir| {
        Arc::new(FolderArtStore::new(dir.clone(), config.display.category.clone()))
            as Arc<dyn ArtStore>
    })
}

fn require_store(config: &TomlConfig) -> Result<Arc<dyn ArtStore>> {
    match configured_store(config) {
        Some(store) => Ok(store),
        None => bail!("No device configured (set device.folder)"),
    }
}

async fn run_sets(
    config: &TomlConfig,
    layout: FolderLayout,
    args: &RunArgs,
    cancel: &CancellationToken,
) -> Result<RunStatus> {
    let pipeline = Pipeline::from_config(config, layout.clone())
        .context("Failed to initialize pipeline")?;
    let store = if args.skip_sync || args.no_tv {
        None
    } else {
        let store = configured_store(config);
        if store.is_none() {
            warn!("No device configured (device.folder), skipping synchronization");
        }
        store
    };
    let interval = Duration::from_secs(config.loop_interval_secs());

    loop {
        let pass = run_once(config, &layout, &pipeline, store.clone(), args, cancel).await;

        if !args.stay {
            return pass;
        }
        match pass {
            Ok(status) => info!(?status, "Pass finished"),
            Err(e) => error!("Pass failed: {:#}", e),
        }
        if cancel.is_cancelled() {
            return Ok(RunStatus::Partial);
        }

        info!(seconds = interval.as_secs(), "Waiting for next pass");
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Stopping persistent loop");
                return Ok(RunStatus::Complete);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn run_once(
    config: &TomlConfig,
    layout: &FolderLayout,
    pipeline: &Pipeline,
    store: Option<Arc<dyn ArtStore>>,
    args: &RunArgs,
    cancel: &CancellationToken,
) -> Result<RunStatus> {
    let (mut sets, manifest_errors) = load_sets(&args.setfiles);
    let options = args.options();

    let mut report = ProcessReport::default();
    for set in sets.iter_mut() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let set_report = pipeline
            .process_set(set, &options, cancel)
            .await
            .with_context(|| format!("Failed to save {}", set.path().display()))?;
        report.absorb(set_report);
    }

    for failure in &report.failed {
        warn!(url = %failure.url, cause = %failure.cause, "Not processed");
    }
    for url in &report.color_fallbacks {
        warn!(url = %url, "Mat color fell back to the default");
    }

    let mut complete = report.is_complete() && manifest_errors.is_empty();

    if let Some(store) = store {
        if !cancel.is_cancelled() {
            let reconciler = Reconciler::new(
                store,
                layout.clone(),
                config.display.category.clone(),
                config.sync.match_threshold,
                config.sync.upload_attempts,
            );
            let sync = reconciler
                .sync(&mut sets, cancel)
                .await
                .context("Device synchronization failed")?;
            for (url, cause) in &sync.failed {
                warn!(url = %url, cause = %cause, "Not uploaded");
            }
            complete &= sync.is_complete();
        }
    }

    info!(
        sets = sets.len(),
        unreadable = manifest_errors.len(),
        processed = report.processed,
        failed = report.failed.len(),
        "Run finished"
    );
    Ok(if complete {
        RunStatus::Complete
    } else {
        RunStatus::Partial
    })
}

fn init_manifest(urls: &Path, out: Option<&Path>) -> Result<RunStatus> {
    let text = std::fs::read_to_string(urls)
        .with_context(|| format!("Failed to read {}", urls.display()))?;
    let list = parse_url_list(&text);
    if list.is_empty() {
        bail!("No URLs found in {}", urls.display());
    }

    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| urls.with_extension("json"));
    if out.exists() {
        bail!("Refusing to overwrite {}", out.display());
    }

    let name = urls
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let set = ArtSet::from_urls(&out, name, ResizePolicy::Crop, list);
    set.save()
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(path = %out.display(), artworks = set.len(), "Manifest created");
    Ok(RunStatus::Complete)
}
