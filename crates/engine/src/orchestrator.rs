//! Run orchestration.
//!
//! A run takes the cross-process [`RunLock`] for the working directory,
//! drains the queue, and executes every job either sequentially or with one
//! worker task per job. Each job encodes into a timestamped temporary name
//! and is renamed to its final name only after the command chain succeeds,
//! so an interrupted run never leaves a final-named partial file behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::task::JoinSet;

use riprun_config::Settings;

use crate::job::Job;
use crate::preset::Preset;
use crate::progress;
use crate::queue::JobQueue;
use crate::report::{drain_report_log, Reporter, RunTally};
use crate::runlock::{LockError, RunLock};

/// Error type for run orchestration.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Summary of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub total: usize,
    pub completed: usize,
    /// Warnings and errors reported between run start and run end.
    pub tally: RunTally,
}

/// Executes queued jobs under the run lock.
pub struct Orchestrator {
    settings: Settings,
    reporter: Arc<Reporter>,
}

/// Temporary output name carrying a start timestamp, renamed to the final
/// name once the job's command chain succeeds.
fn temp_output_name(prefix: &str, suffix: &str, stamp: &str) -> String {
    format!("{}-{}{}", prefix, stamp, suffix)
}

/// Shutdown invocation for this platform.
#[cfg(windows)]
fn shutdown_command(delay_secs: u64) -> (String, Vec<String>) {
    (
        "shutdown".to_string(),
        vec!["/s".to_string(), "/t".to_string(), delay_secs.to_string()],
    )
}

#[cfg(not(windows))]
fn shutdown_command(delay_secs: u64) -> (String, Vec<String>) {
    // `shutdown -h` takes minutes.
    (
        "shutdown".to_string(),
        vec!["-h".to_string(), format!("+{}", delay_secs.div_ceil(60))],
    )
}

fn schedule_shutdown(delay_secs: u64) {
    let (program, args) = shutdown_command(delay_secs);
    tracing::info!("scheduling system shutdown in {} seconds", delay_secs);
    if let Err(e) = std::process::Command::new(&program).args(&args).status() {
        tracing::warn!("failed to schedule shutdown: {}", e);
    }
}

fn remove_if_present(path: &PathBuf) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
    }
}

/// Runs one job to completion. Returns whether the output reached its final
/// name. Failures are reported and counted, never propagated: one broken
/// job must not stop the rest of the run.
async fn execute_job(job: Job, settings: Settings, reporter: Arc<Reporter>) -> bool {
    let input = job.primary_input().clone();
    if !input.exists() {
        reporter.error(format!(
            "the input file \"{}\" does not exist, skipping job",
            input.display()
        ));
        return false;
    }

    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let temp_path = job
        .output_dir
        .join(temp_output_name(&job.output_prefix, &job.plan.output_suffix, &stamp));
    let final_path = job.output_dir.join(job.output_name());

    // A stale log from an earlier run would feed the monitor old blocks.
    remove_if_present(&job.facts.progress_log);

    if !job.plan.pipe_input {
        if let Ok(mut record) = job.progress.lock() {
            record.frame_count = job.facts.media.nb_frames;
            record.duration = job.facts.media.duration;
        }
    }

    let monitor = tokio::spawn(progress::monitor(
        job.facts.progress_log.clone(),
        Arc::clone(&job.progress),
        settings.progress.clone(),
    ));

    let cmd = job
        .plan
        .render(&input.display().to_string(), &temp_path.display().to_string());
    tracing::info!(job_id = %job.id, "running: {}", cmd);

    let ffreport = (job.preset != Preset::Custom)
        .then(|| format!("file={}:level=31", job.facts.report_log.display()));
    let status = tokio::task::spawn_blocking(move || {
        let mut command = std::process::Command::new("sh");
        command.arg("-c").arg(&cmd);
        if let Some(report) = ffreport {
            command.env("FFREPORT", report);
        }
        command.status()
    })
    .await;

    monitor.abort();

    let succeeded = match status {
        Ok(Ok(status)) if status.success() => true,
        Ok(Ok(status)) => {
            reporter.error(format!(
                "job for \"{}\" exited with {}",
                input.display(),
                status
            ));
            false
        }
        Ok(Err(e)) => {
            reporter.error(format!("failed to start job for \"{}\": {}", input.display(), e));
            false
        }
        Err(e) => {
            reporter.error(format!("job worker for \"{}\" failed: {}", input.display(), e));
            false
        }
    };

    drain_report_log(&job.facts.report_log, &reporter);
    remove_if_present(&job.facts.report_log);
    remove_if_present(&job.facts.progress_log);

    if !succeeded {
        return false;
    }

    match std::fs::metadata(&temp_path) {
        Ok(meta) => tracing::info!(
            "encoded {} ({:.2} MiB)",
            temp_path.display(),
            meta.len() as f64 / (1024.0 * 1024.0)
        ),
        Err(e) => tracing::warn!("cannot stat {}: {}", temp_path.display(), e),
    }

    // fs::rename replaces an existing destination on Unix, so the
    // collision has to be caught up front to keep the earlier output.
    if final_path.exists() {
        reporter.error(format!(
            "output {} already exists, leaving the encode at {}",
            final_path.display(),
            temp_path.display()
        ));
        return false;
    }
    if let Err(e) = std::fs::rename(&temp_path, &final_path) {
        reporter.error(format!(
            "failed to rename {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ));
        return false;
    }

    tracing::info!("finished {}", final_path.display());
    true
}

impl Orchestrator {
    pub fn new(settings: Settings, reporter: Arc<Reporter>) -> Self {
        Self { settings, reporter }
    }

    /// Runs every queued job. The queue is drained up front, so it is empty
    /// after the run regardless of individual job outcomes. With
    /// `shutdown_after` set, a system shutdown is scheduled once the run
    /// finishes.
    pub async fn run(
        &self,
        queue: &mut JobQueue,
        shutdown_after: Option<u64>,
    ) -> Result<RunOutcome, RunError> {
        let work_dir = std::env::current_dir()?;
        let _lock = RunLock::acquire(&work_dir)?;

        let baseline = self.reporter.snapshot();
        let jobs = queue.drain_all();
        let total = jobs.len();
        let mut completed = 0;

        if self.settings.run.parallel {
            let mut workers = JoinSet::new();
            for job in jobs {
                let settings = self.settings.clone();
                let reporter = Arc::clone(&self.reporter);
                workers.spawn(execute_job(job, settings, reporter));
            }
            while let Some(result) = workers.join_next().await {
                if result? {
                    completed += 1;
                }
            }
        } else {
            for (i, job) in jobs.into_iter().enumerate() {
                tracing::info!("{} / {}", i + 1, total);
                if execute_job(job, self.settings.clone(), Arc::clone(&self.reporter)).await {
                    completed += 1;
                }
                if i + 1 < total {
                    tokio::time::sleep(Duration::from_secs(self.settings.run.job_gap_secs)).await;
                }
            }
        }

        let tally = self.reporter.snapshot().since(baseline);
        if tally.warnings > 0 {
            tracing::warn!("there are {} warnings in this run", tally.warnings);
        }
        if tally.errors > 0 {
            tracing::error!("there are {} errors in this run", tally.errors);
        }

        if let Some(delay) = shutdown_after {
            schedule_shutdown(delay);
        }

        Ok(RunOutcome {
            total,
            completed,
            tally,
        })
    }
}
