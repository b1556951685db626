use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::SizingError;
use crate::manifest::{JOB_ID_PREFIX, Manifest};
use crate::model::{AppId, SizingConfiguration, SizingResult, TargetRecipe, UserType, parse_tuple_literal};
use crate::storage::ObjectStore;
use crate::util::{bq_normalize_name, date_string, to_json_pretty, write_json_pretty};

pub const SAMPLE_SIZE_PATH: &str = "sample_sizes";

/// Recovers the run date and job id from a per-job result path.
pub const RESULT_PATH_PATTERN: &str =
    r"^sample_sizes/ind_target_results_(\d{4}-\d{2}-\d{2})/sample_sizes_(argo_target_\d+)\.json$";

const REPORT_KEY_PATTERN: &str = r"^(firefox_desktop|firefox_ios|fenix)(:[^:]+)*$";
const PARAMETER_LABEL_PATTERN: &str = r"^Power.+EffectSize.+$";

pub fn individual_results_prefix(run_date: NaiveDate) -> String {
    format!("{SAMPLE_SIZE_PATH}/ind_target_results_{}", date_string(run_date))
}

/// Object path a job's results are published under.
pub fn result_object_path(target_slug: &str, run_date: NaiveDate) -> Result<String> {
    let file = format!("{SAMPLE_SIZE_PATH}_{}.json", bq_normalize_name(target_slug)?);
    if target_slug.starts_with(JOB_ID_PREFIX) {
        Ok(format!("{}/{file}", individual_results_prefix(run_date)))
    } else {
        Ok(format!("{SAMPLE_SIZE_PATH}/{file}"))
    }
}

pub fn aggregate_object_path(run_date: NaiveDate) -> String {
    format!("{SAMPLE_SIZE_PATH}/auto_sizing_results_{}.json", date_string(run_date))
}

pub fn latest_aggregate_object_path() -> String {
    format!("{SAMPLE_SIZE_PATH}/auto_sizing_results_latest.json")
}

/// Writes a job's results and returns where they went.
///
/// Config-file runs without a store write next to the config file.
pub fn publish_result(
    store: Option<&dyn ObjectStore>,
    config: &SizingConfiguration,
    result: &SizingResult,
    run_date: NaiveDate,
) -> Result<String> {
    match (store, &config.config_file) {
        (Some(store), _) => {
            let path = result_object_path(&config.target_slug, run_date)?;
            let data = to_json_pretty(result)?;
            store
                .put(&path, &data)
                .with_context(|| format!("failed to upload results to {}", store.describe()))?;
            Ok(format!("{}/{}", store.describe(), path))
        }
        (None, Some(config_file)) => {
            let stem = if config.target_slug.is_empty() {
                config_file
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(SAMPLE_SIZE_PATH)
                    .to_string()
            } else {
                bq_normalize_name(&config.target_slug)?
            };
            let path = config_file
                .parent()
                .map(|parent| parent.join(format!("{stem}.json")))
                .unwrap_or_else(|| format!("{stem}.json").into());
            write_json_pretty(&path, result)?;
            Ok(path.display().to_string())
        }
        (None, None) => Err(SizingError::NoResultDestination(config.target_slug.clone()).into()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeInfo {
    pub app_id: AppId,
    #[serde(flatten)]
    pub recipe: TargetRecipe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub job_id: String,
    pub target_recipe: RecipeInfo,
    pub sample_sizes: SizingResult,
}

/// Aggregation key to user type to that job's results.
pub type AggregateReport = BTreeMap<String, BTreeMap<UserType, AggregateEntry>>;

#[derive(Debug, Default)]
pub struct Aggregation {
    pub report: AggregateReport,
    pub matched: usize,
    pub unknown_job_ids: Vec<String>,
}

/// Human-readable grouping key: `app_id[:channel][:['L1','L2']][:country][:vN]`.
///
/// `vN` appears only for recipes with a minimum major version.
pub fn build_target_key(app_id: AppId, recipe: &TargetRecipe) -> String {
    let mut parts = vec![app_id.to_string()];

    let channel = parse_tuple_literal(&recipe.release_channel)
        .join(",")
        .to_lowercase();
    if !channel.is_empty() {
        parts.push(channel);
    }

    let locales = recipe.locale.sorted();
    if !locales.is_empty() {
        let quoted = locales
            .iter()
            .map(|code| format!("'{code}'"))
            .collect::<Vec<_>>();
        parts.push(format!("[{}]", quoted.join(",")));
    }

    let country = parse_tuple_literal(&recipe.country).join(",");
    if !country.is_empty() {
        parts.push(country);
    }

    if let Some(version) = recipe.minimum_version {
        parts.push(format!("v{version}"));
    }

    parts.join(":")
}

/// Groups one run date's per-job results by target key and user type.
///
/// Results whose job id is no longer in `manifest` are logged and skipped.
pub fn aggregate(store: &dyn ObjectStore, manifest: &Manifest, run_date: NaiveDate) -> Result<Aggregation> {
    let pattern = Regex::new(RESULT_PATH_PATTERN).context("failed to compile result path regex")?;
    let run_date_text = date_string(run_date);
    let mut aggregation = Aggregation::default();

    for path in store.list(&individual_results_prefix(run_date))? {
        let Some(captures) = pattern.captures(&path) else {
            continue;
        };
        if captures.get(1).map(|m| m.as_str()) != Some(run_date_text.as_str()) {
            continue;
        }
        let Some(job_id) = captures.get(2).map(|m| m.as_str().to_string()) else {
            continue;
        };

        let (app_id, recipe) = match manifest.resolve_entry(&job_id) {
            Ok(resolved) => resolved,
            Err(err) => {
                error!(path = %path, error = %err, "result has no manifest entry; skipping");
                aggregation.unknown_job_ids.push(job_id);
                continue;
            }
        };

        let raw = store.get(&path)?;
        let sample_sizes: SizingResult = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse results at {path}"))?;

        let key = build_target_key(app_id, &recipe);
        let user_type = recipe.user_type;
        let group = aggregation.report.entry(key.clone()).or_default();
        if let Some(previous) = group.get(&user_type) {
            warn!(
                key = %key,
                user_type = %user_type,
                previous = %previous.job_id,
                replacement = %job_id,
                "two jobs share an aggregation key; keeping the later one"
            );
        }
        group.insert(
            user_type,
            AggregateEntry {
                job_id,
                target_recipe: RecipeInfo { app_id, recipe },
                sample_sizes,
            },
        );
        aggregation.matched += 1;
    }

    info!(
        run_date = %run_date_text,
        matched = aggregation.matched,
        groups = aggregation.report.len(),
        unknown = aggregation.unknown_job_ids.len(),
        "aggregated sizing results"
    );
    Ok(aggregation)
}

fn invalid(location: impl Into<String>, reason: impl Into<String>) -> SizingError {
    SizingError::InvalidReport {
        location: location.into(),
        reason: reason.into(),
    }
}

fn require_object<'a>(
    value: &'a Value,
    location: &str,
) -> Result<&'a serde_json::Map<String, Value>, SizingError> {
    value
        .as_object()
        .ok_or_else(|| invalid(location, "expected an object"))
}

fn require_number(object: &serde_json::Map<String, Value>, field: &str, location: &str) -> Result<(), SizingError> {
    match object.get(field) {
        Some(value) if value.is_number() => Ok(()),
        Some(_) => Err(invalid(format!("{location}.{field}"), "expected a number")),
        None => Err(invalid(location, format!("missing `{field}`"))),
    }
}

/// Checks the aggregate report against its published schema.
pub fn validate_report(report: &Value) -> Result<(), SizingError> {
    let key_pattern = Regex::new(REPORT_KEY_PATTERN).map_err(|err| invalid("$", err.to_string()))?;
    let label_pattern =
        Regex::new(PARAMETER_LABEL_PATTERN).map_err(|err| invalid("$", err.to_string()))?;

    for (key, group) in require_object(report, "$")? {
        if !key_pattern.is_match(key) {
            return Err(invalid(key.as_str(), "key does not start with a supported app_id"));
        }

        for (user_type, entry) in require_object(group, key)? {
            let location = format!("{key}.{user_type}");
            if user_type != "new" && user_type != "existing" {
                return Err(invalid(location, "user type must be `new` or `existing`"));
            }
            let entry = require_object(entry, &location)?;

            let recipe_location = format!("{location}.target_recipe");
            let recipe = require_object(
                entry
                    .get("target_recipe")
                    .ok_or_else(|| invalid(&location, "missing `target_recipe`"))?,
                &recipe_location,
            )?;
            for field in ["app_id", "release_channel", "locale", "country", "user_type"] {
                if !recipe.contains_key(field) {
                    return Err(invalid(&recipe_location, format!("missing `{field}`")));
                }
            }

            let sizes_location = format!("{location}.sample_sizes");
            let sample_sizes = require_object(
                entry
                    .get("sample_sizes")
                    .ok_or_else(|| invalid(&location, "missing `sample_sizes`"))?,
                &sizes_location,
            )?;
            for (label, result) in sample_sizes {
                let label_location = format!("{sizes_location}.{label}");
                if !label_pattern.is_match(label) {
                    return Err(invalid(label_location, "label is not a PowerXEffectSizeY label"));
                }
                let result = require_object(result, &label_location)?;

                let parameters_location = format!("{label_location}.parameters");
                let parameters = require_object(
                    result
                        .get("parameters")
                        .ok_or_else(|| invalid(&label_location, "missing `parameters`"))?,
                    &parameters_location,
                )?;
                require_number(parameters, "power", &parameters_location)?;
                require_number(parameters, "effect_size", &parameters_location)?;

                let metrics_location = format!("{label_location}.metrics");
                let metrics = require_object(
                    result
                        .get("metrics")
                        .ok_or_else(|| invalid(&label_location, "missing `metrics`"))?,
                    &metrics_location,
                )?;
                for (metric, stats) in metrics {
                    let stats_location = format!("{metrics_location}.{metric}");
                    let stats = require_object(stats, &stats_location)?;
                    for field in [
                        "number_of_clients_targeted",
                        "sample_size_per_branch",
                        "population_percent_per_branch",
                    ] {
                        require_number(stats, field, &stats_location)?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Validates `report` and writes it as the dated and the latest aggregate.
pub fn export_aggregate(
    store: &dyn ObjectStore,
    report: &AggregateReport,
    run_date: NaiveDate,
) -> Result<Vec<String>> {
    let value = serde_json::to_value(report).context("failed to encode aggregate report")?;
    validate_report(&value)?;

    let data = to_json_pretty(&value)?;
    let mut written = Vec::new();
    for path in [aggregate_object_path(run_date), latest_aggregate_object_path()] {
        store
            .put(&path, &data)
            .with_context(|| format!("failed to upload {path} to {}", store.describe()))?;
        info!(store = %store.describe(), path = %path, "uploaded aggregate report");
        written.push(path);
    }

    Ok(written)
}
