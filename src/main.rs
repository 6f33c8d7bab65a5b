// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use case_pipeline::pipeline::STAGE_NAMES;
use case_pipeline::utils::logging::{
    format_case_status, format_error, format_info, format_job_status, format_stage_status,
    format_step, format_success, format_warning,
};
use case_pipeline::{
    CaseBundle, CaseStore, CaseTrigger, Config, JobQueue, JobStatus, JsonExporter,
    PipelineJobHandler, PipelineOrchestrator, PipelineServices, SqliteStore, StageTracker,
    import_bundle,
};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "case_pipeline")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Staged case-analysis pipeline with a retrying job queue", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a pipeline run for a case and wait for it to finish
    Process {
        case_id: String,

        /// Enqueue even when the case is already queued or processing
        #[arg(long)]
        force: bool,
    },

    /// Show per-stage progress for a case
    Progress { case_id: String },

    /// Show job counts for the pipeline queue
    QueueStatus {
        #[arg(short, long)]
        queue: Option<String>,
    },

    /// Seed a case with its documents, parties and evidence from a JSON file
    Import {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Export cases with their stages, analyses and prediction as JSON
    Export {
        #[arg(required = true)]
        case_ids: Vec<String>,

        #[arg(short, long, default_value = "./exports")]
        output: PathBuf,

        #[arg(short, long)]
        pretty: bool,
    },

    /// Remove completed jobs from the queue, and failed ones with --failed
    Purge {
        #[arg(long)]
        failed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    case_pipeline::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Case Pipeline");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::default_config()
    };

    match cli.command {
        Commands::Process { case_id, force } => {
            cmd_process(&config, &case_id, force).await?;
        }
        Commands::Progress { case_id } => {
            cmd_progress(&config, &case_id).await?;
        }
        Commands::QueueStatus { queue } => {
            cmd_queue_status(&config, queue).await?;
        }
        Commands::Import { path } => {
            cmd_import(&config, path).await?;
        }
        Commands::Export {
            case_ids,
            output,
            pretty,
        } => {
            cmd_export(&config, &case_ids, output, pretty).await?;
        }
        Commands::Purge { failed } => {
            cmd_purge(&config, failed).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(config.storage.data_path.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to open case store at {}",
                config.storage.data_path.display()
            )
        })?;
    Ok(Arc::new(store))
}

fn stage_tracker(store: Arc<SqliteStore>) -> StageTracker {
    StageTracker::new(store, STAGE_NAMES.iter().map(ToString::to_string).collect())
}

async fn cmd_process(config: &Config, case_id: &str, force: bool) -> Result<()> {
    let start_time = Instant::now();
    let store = open_store(config).await?;

    let services =
        PipelineServices::from_config(&config.services).context("Failed to build service clients")?;
    let orchestrator = Arc::new(
        PipelineOrchestrator::new(store.clone(), services, config.pipeline.clone())
            .context("Failed to assemble pipeline")?,
    );

    let queue = Arc::new(JobQueue::new(config.queue.clone()).with_store(store.clone()));
    queue
        .register_processor(
            &config.queue.pipeline_queue,
            Arc::new(PipelineJobHandler::new(orchestrator.clone())),
        )
        .await;

    if config.queue.rehydrate_on_start {
        let restored = queue.rehydrate().await.context("Failed to rehydrate jobs")?;
        if restored > 0 {
            info!("Resumed {} unfinished jobs", restored);
        }
    }

    let trigger = CaseTrigger::new(
        store.clone(),
        queue.clone(),
        &config.queue,
        config.pipeline.stale_after_hours,
    );

    let Some(job) = trigger
        .trigger_manual(case_id, force)
        .await
        .with_context(|| format!("Failed to enqueue case {}", case_id))?
    else {
        println!(
            "{}",
            format_warning(&format!(
                "Case {} is already queued or processing (use --force to enqueue anyway)",
                case_id
            ))
        );
        return Ok(());
    };

    println!(
        "{}",
        format_info(&format!("Enqueued job {} for case {}", job.id, case_id))
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Failed to create spinner template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let finished = loop {
        let Some(current) = queue.get_job(&job.id).await else {
            anyhow::bail!("Job {} disappeared from the queue", job.id);
        };

        if current.status.is_terminal() {
            break current;
        }

        let progress = orchestrator.tracker().get_progress(case_id).await?;
        spinner.set_message(format!(
            "{:>5.1}% {} (attempt {}/{})",
            progress.percentage, progress.current_stage, current.attempts, current.max_attempts
        ));
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    spinner.finish_and_clear();

    let elapsed = start_time.elapsed();
    match finished.status {
        JobStatus::Completed => println!(
            "{}",
            format_success(&format!(
                "Case {} processed in {:.2}s after {} attempt(s)",
                case_id,
                elapsed.as_secs_f64(),
                finished.attempts
            ))
        ),
        _ => println!(
            "{}",
            format_error(&format!(
                "Case {} failed after {} attempt(s): {}",
                case_id,
                finished.attempts,
                finished.error.as_deref().unwrap_or("unknown error")
            ))
        ),
    }

    print_progress(store.as_ref(), orchestrator.tracker(), case_id).await
}

async fn cmd_progress(config: &Config, case_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let tracker = stage_tracker(store.clone());
    print_progress(store.as_ref(), &tracker, case_id).await
}

async fn print_progress(store: &dyn CaseStore, tracker: &StageTracker, case_id: &str) -> Result<()> {
    let case = store
        .get_case(case_id)
        .await?
        .with_context(|| format!("Case {} not found", case_id))?;
    let progress = tracker.get_progress(case_id).await?;

    println!(
        "{} [{}] {:.1}% (current: {})",
        case.title,
        format_case_status(case.processing_status),
        progress.percentage,
        progress.current_stage
    );

    let total = progress.stages.len();
    for (index, stage) in progress.stages.iter().enumerate() {
        println!(
            "  {} {}",
            format_step(index + 1, total, &stage.name),
            format_stage_status(stage.status)
        );
    }

    for stage_error in &progress.errors {
        println!(
            "{}",
            format_error(&format!("{}: {}", stage_error.stage, stage_error.message))
        );
    }

    if let Some(message) = &case.error_message {
        println!("{}", format_error(message));
    }

    Ok(())
}

async fn cmd_queue_status(config: &Config, queue_name: Option<String>) -> Result<()> {
    let store = open_store(config).await?;
    let queue = JobQueue::new(config.queue.clone()).with_store(store);

    let queue_name = queue_name.unwrap_or_else(|| config.queue.pipeline_queue.clone());
    let status = queue.get_queue_status(&queue_name).await;

    println!("Queue '{}' ({} jobs)", status.queue_name, status.total());
    for job_status in JobStatus::ALL {
        println!(
            "  {:<12} {}",
            format_job_status(job_status),
            status.count(job_status)
        );
    }

    Ok(())
}

async fn cmd_import(config: &Config, path: PathBuf) -> Result<()> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let bundle: CaseBundle =
        serde_json::from_str(&contents).context("Failed to parse case bundle")?;
    let documents = bundle.documents.len();

    let store = open_store(config).await?;
    let case_id = import_bundle(store.as_ref(), bundle)
        .await
        .context("Failed to import case")?;

    println!(
        "{}",
        format_success(&format!(
            "Imported case {} with {} documents",
            case_id, documents
        ))
    );
    Ok(())
}

async fn cmd_export(
    config: &Config,
    case_ids: &[String],
    output: PathBuf,
    pretty: bool,
) -> Result<()> {
    info!("Initializing JSON export");

    let store = open_store(config).await?;
    let tracker = stage_tracker(store.clone());
    let exporter = JsonExporter::new(output)?;

    let manifest = exporter
        .export_cases(store.as_ref(), &tracker, case_ids, pretty)
        .await?;
    info!("Export complete: {} files generated", manifest.files.len());

    Ok(())
}

async fn cmd_purge(config: &Config, failed: bool) -> Result<()> {
    let store = open_store(config).await?;
    let queue = JobQueue::new(config.queue.clone()).with_store(store);

    let mut statuses = vec![JobStatus::Completed];
    if failed {
        statuses.push(JobStatus::Failed);
    }

    let purged = queue
        .purge(&config.queue.pipeline_queue, &statuses)
        .await
        .context("Failed to purge jobs")?;
    println!("{}", format_success(&format!("Purged {} jobs", purged)));

    Ok(())
}
