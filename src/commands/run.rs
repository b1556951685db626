use std::time::Duration;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use tracing::info;

use crate::backend::CommandBackend;
use crate::calculation::SizeCalculation;
use crate::catalog::MetricHub;
use crate::cli::RunArgs;
use crate::executor::AnalysisExecutor;
use crate::manifest::JsonFileManifestStore;
use crate::storage::open_object_store;
use crate::strategy::{ArgoExecutorStrategy, ExecutorStrategy, SerialExecutorStrategy};
use crate::util::today_utc;
use crate::workflow::ArgoCli;

pub fn run(args: RunArgs) -> Result<()> {
    let today = today_utc();
    let catalog = MetricHub::from_dir(&args.paths.metric_hub)?;
    let manifest_store = JsonFileManifestStore::new(&args.paths.manifest_path);

    let executor = AnalysisExecutor {
        target_slug: args.target_slug.clone(),
        configuration_file: args.local_config.clone(),
        run_manifest_jobs: args.run_manifest_jobs,
        job_id: args.job_id.clone(),
        refresh_manifest: args.refresh_manifest,
        manifest_store: &manifest_store,
        catalog: &catalog,
        target_lists_path: &args.paths.target_lists,
    };

    let strategy = build_strategy(&args, today);
    info!(
        strategy = strategy.name(),
        project_id = %args.project_id,
        dataset_id = %args.dataset_id,
        bucket = %args.bucket.as_deref().unwrap_or("<none>"),
        "starting sizing run"
    );

    if !executor.execute(strategy.as_ref(), today)? {
        bail!("sizing run finished with failed jobs");
    }
    Ok(())
}

fn build_strategy(args: &RunArgs, today: NaiveDate) -> Box<dyn ExecutorStrategy> {
    if args.distributed {
        let strategy = ArgoExecutorStrategy::new(
            Box::new(ArgoCli::new(&args.workflow_namespace)),
            &args.workflow_template,
            &args.project_id,
            &args.dataset_id,
            args.bucket.clone(),
        );
        if args.wait {
            return Box::new(
                strategy.wait_for_completion(Duration::from_secs(args.poll_interval_secs)),
            );
        }
        return Box::new(strategy);
    }

    let calculation = SizeCalculation {
        project_id: args.project_id.clone(),
        dataset_id: args.dataset_id.clone(),
        query_engine: Box::new(CommandBackend::new(&args.sizing_backend)),
        sample_size_engine: Box::new(CommandBackend::new(&args.sizing_backend)),
        store: args.bucket.as_deref().map(open_object_store),
    };
    Box::new(SerialExecutorStrategy::new(Box::new(calculation), today))
}
