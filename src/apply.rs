//! Standalone deploy run: gate each migration job, run admitted ones, sync once.
use crate::session::{DeploySession, SyncReport};
use crate::tasks::GatedJob;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::process::Command;

/// Runs one admitted job line.
pub trait JobRunner {
    fn run(&self, job: &str) -> Result<()>;
}

/// Runs jobs through `sh -c` in the current directory.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl JobRunner for ShellRunner {
    fn run(&self, job: &str) -> Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(job)
            .status()
            .with_context(|| format!("spawn job: {job}"))?;
        if !status.success() {
            return Err(anyhow!("job failed with status {status}: {job}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Only jobs of this task run; `None` runs every task.
    pub task: Option<String>,
    /// Check and report without running jobs or syncing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    pub ran: Vec<GatedJob>,
    pub skipped: Vec<GatedJob>,
    pub sync: Option<SyncReport>,
}

/// Walk `jobs` in order, consulting the session before each one, then sync.
///
/// A failing job aborts the run before sync, leaving the remote ledger as it
/// was; migrations that already ran will be offered again next deploy.
pub fn run_gated_jobs(
    session: &mut DeploySession<'_>,
    jobs: &[GatedJob],
    options: &ApplyOptions,
    runner: &dyn JobRunner,
) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();
    let selected = jobs
        .iter()
        .filter(|job| options.task.as_deref().is_none_or(|task| job.task == task));
    for job in selected {
        if !session.is_valid(&job.file)? {
            tracing::debug!(
                file = %job.file.display(),
                job = %job.job,
                "skipping applied migration job"
            );
            outcome.skipped.push(job.clone());
            continue;
        }
        if options.dry_run {
            tracing::info!(job = %job.job, "would run migration job");
        } else {
            tracing::info!(
                task = %job.task,
                step = %job.step,
                job = %job.job,
                "running migration job"
            );
            runner.run(&job.job)?;
        }
        outcome.ran.push(job.clone());
    }
    if options.dry_run {
        tracing::info!(
            pending = session.pending().len(),
            "dry run; migration ledger left unchanged"
        );
    } else {
        outcome.sync = session.update()?;
    }
    Ok(outcome)
}
