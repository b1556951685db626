use anyhow::Result;
use tracing::{info, warn};

use crate::cli::AggregateArgs;
use crate::export::{aggregate, export_aggregate};
use crate::manifest::{JsonFileManifestStore, ManifestStore};
use crate::storage::open_object_store;
use crate::util::today_utc;

pub fn run(args: AggregateArgs) -> Result<()> {
    let run_date = args.date.unwrap_or_else(today_utc);
    let manifest = JsonFileManifestStore::new(&args.paths.manifest_path).load()?;
    let store = open_object_store(&args.bucket);

    info!(
        bucket = %store.describe(),
        run_date = %run_date,
        jobs = manifest.job_count,
        "aggregating sample sizes"
    );

    let aggregation = aggregate(store.as_ref(), &manifest, run_date)?;
    if !aggregation.unknown_job_ids.is_empty() {
        warn!(
            skipped = aggregation.unknown_job_ids.len(),
            job_ids = %aggregation.unknown_job_ids.join(","),
            "results without a manifest entry were skipped"
        );
    }

    let written = export_aggregate(store.as_ref(), &aggregation.report, run_date)?;
    info!(
        matched = aggregation.matched,
        targets = aggregation.report.len(),
        outputs = %written.join(","),
        "aggregate report exported"
    );
    Ok(())
}
