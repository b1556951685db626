use std::path::PathBuf;

use chrono::NaiveDate;

/// Named failure conditions of the sizing pipeline.
///
/// Everything not listed here (I/O, subprocess and parse failures) travels as
/// a plain `anyhow::Error` with context attached.
#[derive(Debug, thiserror::Error)]
pub enum SizingError {
    #[error("provide a TOML config file or request manifest jobs")]
    NoConfigFile,

    #[error("invalid app_id `{0}`: must be one of firefox_desktop, firefox_ios, fenix")]
    InvalidAppId(String),

    #[error("{0} -> no `segments` tag found in config file")]
    SegmentsMissing(PathBuf),

    #[error("{0} -> no `metrics` tag found in config file")]
    MetricsMissing(PathBuf),

    #[error("{0} -> no `data_sources` tag found in config file")]
    DataSourcesMissing(PathBuf),

    #[error("{0} -> no `segments.data_sources` tag found in config file")]
    SegmentDataSourcesMissing(PathBuf),

    #[error("{path} -> `{definition}` references unknown data source `{data_source}`")]
    UnknownDataSource {
        path: PathBuf,
        definition: String,
        data_source: String,
    },

    #[error("no {kind} named `{name}` in the metric catalog for {app_id}")]
    CatalogEntryMissing {
        kind: &'static str,
        name: String,
        app_id: String,
    },

    #[error("axis `{0}` has no values; refusing to expand to an empty job set")]
    EmptyAxis(String),

    #[error("job manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("job `{0}` is not present in the manifest")]
    UnknownJobId(String),

    #[error("{target_slug}: analysis period ending {last_date_full_data} extends into the future")]
    AnalysisDatesNotAvailable {
        target_slug: String,
        last_date_full_data: NaiveDate,
    },

    #[error("distributed execution only supports manifest jobs; `{0}` came from a config file")]
    DistributedFileWorklist(String),

    #[error("{0}: no bucket given and no config file directory to write results to")]
    NoResultDestination(String),

    #[error("aggregate report failed schema validation at {location}: {reason}")]
    InvalidReport { location: String, reason: String },
}
