// file: src/utils/logging.rs
// description: Tracing subscriber initialization with optional ANSI coloring

use crate::models::{JobStatus, ProcessingStatus, StageStatus};
use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .with_ansi(colored_output);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

pub fn format_step(step: usize, total: usize, msg: &str) -> String {
    format!("{} {}", format!("[{}/{}]", step, total).cyan().bold(), msg)
}

pub fn format_stage_status(status: Option<StageStatus>) -> ColoredString {
    match status {
        Some(StageStatus::Completed) => "completed".green(),
        Some(StageStatus::Started) => "running".yellow(),
        Some(StageStatus::Failed) => "failed".red(),
        None => "pending".dimmed(),
    }
}

pub fn format_case_status(status: ProcessingStatus) -> ColoredString {
    match status {
        ProcessingStatus::Completed => status.as_str().green(),
        ProcessingStatus::Failed => status.as_str().red(),
        ProcessingStatus::Processing | ProcessingStatus::Queued => status.as_str().yellow(),
        ProcessingStatus::Idle => status.as_str().normal(),
    }
}

pub fn format_job_status(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
        JobStatus::Processing => status.as_str().yellow(),
        JobStatus::Pending => status.as_str().cyan(),
    }
}
