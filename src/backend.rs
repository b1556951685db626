use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::model::{Metric, MetricSampleSize, ParameterSet, Segment, TimeLimits};
use crate::util::run_command;

/// What the warehouse needs to materialise one target's metrics table.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRequest<'a> {
    pub project_id: &'a str,
    pub dataset_id: &'a str,
    pub target_slug: &'a str,
    pub targets_table: String,
    pub metrics_table: String,
    pub time_limits: TimeLimits,
    pub segments: &'a [Segment],
    pub metrics: &'a [Metric],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsTable {
    pub table_name: String,
    pub row_count: u64,
}

/// Historical-data query engine. Owns SQL generation and execution.
pub trait HistoricalQueryEngine {
    fn fetch_metrics(&self, request: &MetricsRequest<'_>) -> Result<MetricsTable>;

    fn delete_table(&self, table_name: &str) -> Result<()>;
}

/// Sample-size statistics over a materialised metrics table.
pub trait SampleSizeEngine {
    fn sample_sizes(
        &self,
        table: &MetricsTable,
        metrics: &[Metric],
        parameters: &ParameterSet,
    ) -> Result<BTreeMap<String, MetricSampleSize>>;
}

/// Both engines behind one external program speaking JSON over stdio.
///
/// `<program> fetch-metrics`, `<program> sample-size` and
/// `<program> delete-table` each read one JSON document on stdin and write
/// their answer as JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn call(&self, operation: &str, payload: &serde_json::Value) -> Result<Vec<u8>> {
        let input = serde_json::to_vec(payload)
            .with_context(|| format!("failed to encode {operation} request"))?;
        debug!(program = %self.program, operation, "calling sizing backend");
        run_command(&self.program, &[operation], Some(&input))
    }
}

impl HistoricalQueryEngine for CommandBackend {
    fn fetch_metrics(&self, request: &MetricsRequest<'_>) -> Result<MetricsTable> {
        let payload = serde_json::to_value(request).context("failed to encode metrics request")?;
        let output = self.call("fetch-metrics", &payload)?;
        serde_json::from_slice(&output).with_context(|| {
            format!(
                "{} fetch-metrics returned an invalid metrics table",
                self.program
            )
        })
    }

    fn delete_table(&self, table_name: &str) -> Result<()> {
        self.call("delete-table", &json!({ "table": table_name }))?;
        Ok(())
    }
}

impl SampleSizeEngine for CommandBackend {
    fn sample_sizes(
        &self,
        table: &MetricsTable,
        metrics: &[Metric],
        parameters: &ParameterSet,
    ) -> Result<BTreeMap<String, MetricSampleSize>> {
        let payload = json!({
            "table": table,
            "metrics": metrics.iter().map(|metric| metric.name.as_str()).collect::<Vec<_>>(),
            "power": parameters.power,
            "effect_size": parameters.effect_size,
        });
        let output = self.call("sample-size", &payload)?;
        serde_json::from_slice(&output)
            .with_context(|| format!("{} sample-size returned invalid results", self.program))
    }
}
