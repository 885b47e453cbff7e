//! Migration definition files and the gated job lines they contribute.
//!
//! Each definition file maps `task -> step -> job(s)`. Every job is wrapped
//! in a validity check on its file so the host task runner only runs it when
//! the migration has not been applied, and the deploy post step gets the
//! sync operation appended.
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Expression the deploy post step runs to persist the ledger.
pub const SYNC_EXPRESSION: &str = "$(migrations.update)";
pub const DEPLOY_TASK: &str = "deploy";
pub const POST_STEP: &str = "post";

/// `task -> step -> job lines` as handed to the task runner.
pub type TaskTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobLines {
    One(String),
    Many(Vec<String>),
}

type Definition = IndexMap<String, IndexMap<String, Option<JobLines>>>;

/// One job from a migration definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedJob {
    /// Canonical path of the definition file the gate checks.
    pub file: PathBuf,
    pub task: String,
    pub step: String,
    pub job: String,
}

impl GatedJob {
    /// The job line wrapped in its validity check.
    pub fn gated_line(&self) -> String {
        format!(
            "@(if migrations.is_valid(\"{}\")) {}",
            self.file.display(),
            self.job
        )
    }
}

/// Read definition files in order, keeping task, step, and job order per file.
pub fn load_jobs(files: &[PathBuf]) -> Result<Vec<GatedJob>> {
    let mut jobs = Vec::new();
    for path in files {
        jobs.extend(load_file(path)?);
    }
    Ok(jobs)
}

fn load_file(path: &Path) -> Result<Vec<GatedJob>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let file = fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))?;
    let definition: Option<Definition> = serde_yaml::from_str(&text)
        .with_context(|| format!("parse migration definition {}", path.display()))?;

    let mut jobs = Vec::new();
    for (task, steps) in definition.unwrap_or_default() {
        for (step, lines) in steps {
            let lines = match lines {
                None => Vec::new(),
                Some(JobLines::One(job)) => vec![job],
                Some(JobLines::Many(many)) => many,
            };
            for job in lines {
                if job.trim().is_empty() {
                    return Err(anyhow!(
                        "{}: empty job in {task}.{step}",
                        path.display()
                    ));
                }
                jobs.push(GatedJob {
                    file: file.clone(),
                    task: task.clone(),
                    step: step.clone(),
                    job,
                });
            }
        }
    }
    Ok(jobs)
}

/// Build the task table: gated job lines plus the trailing deploy sync.
pub fn task_table(jobs: &[GatedJob]) -> TaskTable {
    let mut table = TaskTable::new();
    for job in jobs {
        table
            .entry(job.task.clone())
            .or_default()
            .entry(job.step.clone())
            .or_default()
            .push(job.gated_line());
    }
    table
        .entry(DEPLOY_TASK.to_string())
        .or_default()
        .entry(POST_STEP.to_string())
        .or_default()
        .push(SYNC_EXPRESSION.to_string());
    table
}
