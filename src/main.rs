//! Application entry point: one command against the job service.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run) and apply
//!    environment and command line overrides.
//! 3. Open the artifact, job and history stores (jobs interrupted by a
//!    previous run are marked failed).
//! 4. Run the startup cleanup if enabled.
//! 5. Build the provider set and the model tracker.
//! 6. Start the synthesis service and its worker pool.
//! 7. Run the requested command and print its result as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use speech_jobs::{
    config::{AppConfig, ProviderMode},
    maintenance::MaintenanceService,
    models::{HfDownloader, ModelPaths, ModelTracker},
    pipeline::{ServiceOptions, SubmitMode, SynthesisRequest, SynthesisService},
    provider::{ProviderSet, DEFAULT_VOICE_ID, VOICES},
    store::{ArtifactStore, HistoryStore, JobStore},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "speech-jobs", version, about = "Text-to-speech job service")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for outputs and models.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Provider mode: auto, local, inference or stub.
    #[arg(long, global = true)]
    provider: Option<ProviderMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synthesize text.
    Synth {
        text: String,
        #[arg(long, default_value = DEFAULT_VOICE_ID)]
        voice: String,
        #[arg(long, default_value_t = 1.0)]
        speed: f32,
        #[arg(long)]
        style: Option<String>,
        /// Queue the job and return immediately with its id.
        #[arg(long = "async")]
        queue: bool,
    },
    /// Provider, model and store overview.
    Status {
        #[arg(long, default_value_t = 5)]
        recent: usize,
    },
    /// List voice presets.
    Voices,
    /// List jobs, newest first.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one job.
    Job { job_id: String },
    /// List history entries, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Download models (all missing required models by default).
    Download {
        models: Vec<String>,
        /// Return without waiting for the downloads to finish.
        #[arg(long)]
        no_wait: bool,
    },
    /// Remove aged artifacts and cap history.
    Cleanup {
        #[arg(long)]
        max_age_hours: Option<u64>,
        #[arg(long)]
        max_history: Option<usize>,
    },
    /// Bundle the audio of jobs or history entries into a zip file.
    Export {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Delete jobs.
    DeleteJobs {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete history entries.
    DeleteHistory {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Keep the audio files.
        #[arg(long)]
        keep_audio: bool,
    },
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // 2. Configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    config.apply_env();
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if let Some(mode) = cli.provider {
        config.provider.mode = mode;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config, cli.command))
}

async fn run(config: AppConfig, command: Command) -> anyhow::Result<()> {
    // 3. Stores
    let paths = config.paths();
    paths.ensure_dirs().context("cannot create data directories")?;

    let artifacts = Arc::new(ArtifactStore::open(&paths.audio_dir)?);
    let jobs = Arc::new(JobStore::open(&paths.jobs_file, config.jobs.max_jobs)?);
    let history = Arc::new(HistoryStore::open(
        &paths.history_file,
        config.history.max_items,
        artifacts,
    )?);
    let maintenance = MaintenanceService::new(Arc::clone(&jobs), Arc::clone(&history));

    // 4. Startup cleanup
    if config.cleanup.on_startup {
        let cleanup = &config.cleanup;
        if let Err(e) = maintenance.cleanup(cleanup.max_age_hours, cleanup.max_history) {
            log::warn!("Startup cleanup failed: {e}");
        }
    }

    // 5. Providers and models
    let model_paths = ModelPaths::from_app_paths(&paths);
    let providers = ProviderSet::from_config(&config, model_paths.clone());
    let tracker = Arc::new(ModelTracker::new(
        model_paths,
        providers.has_local(),
        Arc::new(HfDownloader::from_config(&config.provider)),
    ));

    // 6. Service
    let service = SynthesisService::start(
        ServiceOptions::from_config(&config),
        jobs,
        history,
        tracker,
        providers,
    );

    // 7. Command
    let result = execute(&service, &maintenance, &config, command).await;
    service.shutdown().await;
    result
}

async fn execute(
    service: &SynthesisService,
    maintenance: &MaintenanceService,
    config: &AppConfig,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Synth {
            text,
            voice,
            speed,
            style,
            queue,
        } => {
            let mut request = SynthesisRequest::new(text).with_voice(voice).with_speed(speed);
            if let Some(style) = style {
                request = request.with_style(style);
            }
            let mode = if queue { SubmitMode::Async } else { SubmitMode::Sync };
            let job = service.submit(request, mode).await?;
            print_json(&job)
        }
        Command::Status { recent } => print_json(&service.status(recent)),
        Command::Voices => print_json(&VOICES),
        Command::Jobs { limit } => print_json(&service.list_jobs(limit)),
        Command::Job { job_id } => print_json(&service.get_job(&job_id)?),
        Command::History { limit } => print_json(&service.list_history(limit)),
        Command::Download { models, no_wait } => {
            let names = (!models.is_empty()).then_some(models.as_slice());
            let outcome = service.tracker().ensure(names);
            if !no_wait {
                service.tracker().wait_for_downloads().await;
            }
            print_json(&serde_json::json!({
                "ensure": outcome,
                "models": service.tracker().status(),
            }))
        }
        Command::Cleanup {
            max_age_hours,
            max_history,
        } => {
            let report = maintenance.cleanup(
                max_age_hours.unwrap_or(config.cleanup.max_age_hours),
                max_history.unwrap_or(config.cleanup.max_history),
            )?;
            print_json(&report)
        }
        Command::Export { ids, out } => {
            let archive = maintenance.export(&ids)?;
            if archive.included.is_empty() {
                anyhow::bail!("no audio found for the given ids");
            }
            std::fs::write(&out, &archive.bytes)
                .with_context(|| format!("cannot write {}", out.display()))?;
            print_json(&serde_json::json!({
                "path": out,
                "included": archive.included,
                "skipped": archive.skipped,
                "files": archive.file_count,
            }))
        }
        Command::DeleteJobs { ids } => print_json(&maintenance.batch_delete_jobs(&ids)?),
        Command::DeleteHistory { ids, keep_audio } => {
            print_json(&maintenance.batch_delete_history(&ids, !keep_audio)?)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
