use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::backend::{HistoricalQueryEngine, MetricsRequest, SampleSizeEngine};
use crate::export::publish_result;
use crate::model::{ParameterResult, SizingConfiguration, SizingResult};
use crate::storage::ObjectStore;
use crate::util::bq_normalize_name;

/// Runs one sizing job to completion.
pub trait JobRunner {
    fn run(&self, config: &SizingConfiguration, current_date: NaiveDate) -> Result<()>;
}

pub fn targets_table_name(target_slug: &str) -> Result<String> {
    bq_normalize_name(&format!("auto-sizing-{target_slug}"))
}

pub fn metrics_table_name(target_slug: &str) -> Result<String> {
    bq_normalize_name(&format!("metrics-table-{target_slug}"))
}

/// Sample-size calculation for one target recipe.
pub struct SizeCalculation {
    pub project_id: String,
    pub dataset_id: String,
    pub query_engine: Box<dyn HistoricalQueryEngine>,
    pub sample_size_engine: Box<dyn SampleSizeEngine>,
    pub store: Option<Box<dyn ObjectStore>>,
}

impl JobRunner for SizeCalculation {
    fn run(&self, config: &SizingConfiguration, current_date: NaiveDate) -> Result<()> {
        let time_limits = config.dates.time_limits(current_date, &config.target_slug)?;

        let request = MetricsRequest {
            project_id: &self.project_id,
            dataset_id: &self.dataset_id,
            target_slug: &config.target_slug,
            targets_table: targets_table_name(&config.target_slug)?,
            metrics_table: metrics_table_name(&config.target_slug)?,
            time_limits,
            segments: &config.segments,
            metrics: &config.metrics,
        };

        let fetched = self.query_engine.fetch_metrics(&request);
        if let Err(err) = self.query_engine.delete_table(&request.targets_table) {
            warn!(
                table = %request.targets_table,
                error = %err,
                "failed to delete targets scratch table"
            );
        }
        let table = fetched?;
        info!(
            target_slug = %config.target_slug,
            table = %table.table_name,
            rows = table.row_count,
            "metrics table ready"
        );

        if table.row_count == 0 {
            warn!(target_slug = %config.target_slug, "no clients satisfied targeting");
            return Ok(());
        }

        let mut result = SizingResult::new();
        for parameters in &config.parameters {
            let metrics = self
                .sample_size_engine
                .sample_sizes(&table, &config.metrics, parameters)?;
            result.insert(
                parameters.label(),
                ParameterResult {
                    parameters: *parameters,
                    metrics,
                },
            );
        }

        let location = publish_result(self.store.as_deref(), config, &result, current_date)?;
        info!(target_slug = %config.target_slug, location = %location, "published sample sizes");

        Ok(())
    }
}
