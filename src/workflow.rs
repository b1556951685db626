use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::util::run_command;

/// One workflow-template invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSubmission {
    pub template: String,
    pub parameters: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
}

impl WorkflowPhase {
    pub fn parse(value: &str) -> Self {
        match value {
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Error" => Self::Error,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Error)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Error => "Error",
        };
        f.write_str(text)
    }
}

/// External engine that runs a whole worklist as one workflow.
pub trait WorkflowEngine {
    /// Submits and returns the workflow name.
    fn submit(&self, submission: &WorkflowSubmission) -> Result<String>;

    fn phase(&self, workflow_name: &str) -> Result<WorkflowPhase>;
}

#[derive(Debug, Deserialize)]
struct ArgoWorkflow {
    metadata: ArgoMetadata,
    #[serde(default)]
    status: Option<ArgoStatus>,
}

#[derive(Debug, Deserialize)]
struct ArgoMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArgoStatus {
    #[serde(default)]
    phase: Option<String>,
}

fn parse_workflow(raw: &[u8]) -> Result<ArgoWorkflow> {
    serde_json::from_slice(raw).context("argo returned an unexpected workflow document")
}

/// Argo Workflows through the `argo` CLI.
#[derive(Debug, Clone)]
pub struct ArgoCli {
    namespace: String,
}

impl ArgoCli {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl WorkflowEngine for ArgoCli {
    fn submit(&self, submission: &WorkflowSubmission) -> Result<String> {
        let from = format!("workflowtemplate/{}", submission.template);
        let assignments = submission
            .parameters
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>();

        let mut args = vec!["submit", "-n", self.namespace.as_str(), "--from", from.as_str()];
        for assignment in &assignments {
            args.push("-p");
            args.push(assignment.as_str());
        }
        args.extend(["-o", "json"]);

        let output = run_command("argo", &args, None)?;
        let workflow = parse_workflow(&output)?;
        info!(
            namespace = %self.namespace,
            template = %submission.template,
            workflow = %workflow.metadata.name,
            "submitted workflow"
        );
        Ok(workflow.metadata.name)
    }

    fn phase(&self, workflow_name: &str) -> Result<WorkflowPhase> {
        let output = run_command(
            "argo",
            &["get", workflow_name, "-n", self.namespace.as_str(), "-o", "json"],
            None,
        )?;
        let workflow = parse_workflow(&output)?;
        let phase = workflow
            .status
            .and_then(|status| status.phase)
            .unwrap_or_default();
        Ok(WorkflowPhase::parse(&phase))
    }
}
