use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::calculation::JobRunner;
use crate::error::SizingError;
use crate::model::SizingConfiguration;
use crate::workflow::{WorkflowEngine, WorkflowPhase, WorkflowSubmission};

/// Turns a worklist into completed jobs. `Ok(true)` means every job succeeded.
pub trait ExecutorStrategy {
    fn name(&self) -> &'static str;

    fn execute(&self, worklist: &[SizingConfiguration]) -> Result<bool>;
}

/// Runs jobs one after another in this process.
///
/// A failing job is logged and counted; later jobs still run.
pub struct SerialExecutorStrategy {
    runner: Box<dyn JobRunner>,
    current_date: NaiveDate,
}

impl SerialExecutorStrategy {
    pub fn new(runner: Box<dyn JobRunner>, current_date: NaiveDate) -> Self {
        Self {
            runner,
            current_date,
        }
    }
}

impl ExecutorStrategy for SerialExecutorStrategy {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn execute(&self, worklist: &[SizingConfiguration]) -> Result<bool> {
        let mut failed = Vec::new();

        for (index, config) in worklist.iter().enumerate() {
            info!(
                target_slug = %config.target_slug,
                position = index + 1,
                total = worklist.len(),
                "running sizing job"
            );

            if let Err(err) = self.runner.run(config, self.current_date) {
                error!(
                    target_slug = %config.target_slug,
                    error = %format!("{err:#}"),
                    "sizing job failed"
                );
                failed.push(config.target_slug.clone());
            }
        }

        if failed.is_empty() {
            info!(jobs = worklist.len(), "all sizing jobs succeeded");
        } else {
            warn!(
                jobs = worklist.len(),
                failed = failed.len(),
                failed_jobs = %failed.join(","),
                "sizing run finished with failures"
            );
        }

        Ok(failed.is_empty())
    }
}

/// Hands the whole worklist to one workflow-engine run.
///
/// Only the job ids travel; the workflow resolves each job from the manifest.
pub struct ArgoExecutorStrategy {
    engine: Box<dyn WorkflowEngine>,
    template: String,
    project_id: String,
    dataset_id: String,
    bucket: Option<String>,
    wait: bool,
    poll_interval: Duration,
}

impl ArgoExecutorStrategy {
    pub fn new(
        engine: Box<dyn WorkflowEngine>,
        template: impl Into<String>,
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        bucket: Option<String>,
    ) -> Self {
        Self {
            engine,
            template: template.into(),
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            bucket,
            wait: false,
            poll_interval: Duration::from_secs(30),
        }
    }

    pub fn wait_for_completion(mut self, poll_interval: Duration) -> Self {
        self.wait = true;
        self.poll_interval = poll_interval;
        self
    }

    fn submission(&self, job_ids: &[&str]) -> Result<WorkflowSubmission> {
        let encoded = serde_json::to_string(job_ids).context("failed to encode job ids")?;
        Ok(WorkflowSubmission {
            template: self.template.clone(),
            parameters: vec![
                ("job_ids".to_string(), encoded),
                ("project_id".to_string(), self.project_id.clone()),
                ("dataset_id".to_string(), self.dataset_id.clone()),
                ("bucket".to_string(), self.bucket.clone().unwrap_or_default()),
            ],
        })
    }
}

impl ExecutorStrategy for ArgoExecutorStrategy {
    fn name(&self) -> &'static str {
        "argo"
    }

    fn execute(&self, worklist: &[SizingConfiguration]) -> Result<bool> {
        if let Some(config) = worklist.iter().find(|config| config.config_file.is_some()) {
            return Err(SizingError::DistributedFileWorklist(config.target_slug.clone()).into());
        }
        if worklist.is_empty() {
            warn!("empty worklist; nothing submitted");
            return Ok(true);
        }

        let job_ids = worklist
            .iter()
            .map(|config| config.target_slug.as_str())
            .collect::<Vec<_>>();
        let workflow = self.engine.submit(&self.submission(&job_ids)?)?;
        info!(workflow = %workflow, jobs = job_ids.len(), "workflow submitted");

        if !self.wait {
            return Ok(true);
        }

        let mut last_phase = None;
        let phase = loop {
            let phase = self.engine.phase(&workflow)?;
            if last_phase != Some(phase) {
                info!(workflow = %workflow, phase = %phase, "workflow phase");
                last_phase = Some(phase);
            }
            if phase.is_terminal() {
                break phase;
            }
            thread::sleep(self.poll_interval);
        };

        if phase == WorkflowPhase::Succeeded {
            Ok(true)
        } else {
            error!(workflow = %workflow, phase = %phase, "workflow did not succeed");
            Ok(false)
        }
    }
}
