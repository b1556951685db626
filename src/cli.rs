use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "auto-sizing",
    version,
    about = "Sample-size estimation for experiment target populations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    RefreshManifest(RefreshManifestArgs),
    Aggregate(AggregateArgs),
    Status(StatusArgs),
}

/// Locations shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct InputPaths {
    #[arg(long, default_value = "data/manifest.json")]
    pub manifest_path: PathBuf,

    #[arg(long, default_value = "data/target_lists.toml")]
    pub target_lists: PathBuf,

    /// Root of a metric-hub checkout holding `definitions/<app_id>.toml`.
    #[arg(long, default_value = "metric-hub")]
    pub metric_hub: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub paths: InputPaths,

    #[arg(long)]
    pub target_slug: Option<String>,

    /// TOML job document to size instead of manifest jobs.
    #[arg(long)]
    pub local_config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub run_manifest_jobs: bool,

    #[arg(long, requires = "run_manifest_jobs")]
    pub job_id: Option<String>,

    #[arg(long, default_value_t = false)]
    pub refresh_manifest: bool,

    #[arg(long, default_value = "moz-fx-data-experiments")]
    pub project_id: String,

    #[arg(long)]
    pub dataset_id: String,

    /// Result destination: `gs://bucket` or a local directory.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Program implementing the fetch-metrics/sample-size/delete-table protocol.
    #[arg(long, default_value = "auto-sizing-backend")]
    pub sizing_backend: String,

    #[arg(long, default_value_t = false)]
    pub distributed: bool,

    #[arg(long, default_value = "auto-sizing")]
    pub workflow_template: String,

    #[arg(long, default_value = "argo")]
    pub workflow_namespace: String,

    #[arg(long, default_value_t = false)]
    pub wait: bool,

    #[arg(long, default_value_t = 30)]
    pub poll_interval_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RefreshManifestArgs {
    #[command(flatten)]
    pub paths: InputPaths,
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub paths: InputPaths,

    #[arg(long)]
    pub bucket: String,

    /// Run date of the individual results; defaults to today (UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: InputPaths,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_apply() {
        let cli = Cli::try_parse_from([
            "auto-sizing",
            "run",
            "--dataset-id",
            "auto_sizing",
            "--run-manifest-jobs",
            "--job-id",
            "argo_target_3",
        ])
        .expect("arguments parse");

        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.project_id, "moz-fx-data-experiments");
        assert_eq!(args.paths.manifest_path, PathBuf::from("data/manifest.json"));
        assert_eq!(args.job_id.as_deref(), Some("argo_target_3"));
        assert_eq!(args.poll_interval_secs, 30);
        assert!(!args.distributed);
    }

    #[test]
    fn job_id_requires_manifest_mode() {
        let result = Cli::try_parse_from([
            "auto-sizing",
            "run",
            "--dataset-id",
            "d",
            "--job-id",
            "argo_target_3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn aggregate_parses_dates() {
        let cli = Cli::try_parse_from([
            "auto-sizing",
            "aggregate",
            "--bucket",
            "gs://results",
            "--date",
            "2024-03-01",
        ])
        .expect("arguments parse");

        let Commands::Aggregate(args) = cli.command else {
            panic!("expected aggregate subcommand");
        };
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
