use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::{DataSourceDefinition, ExpressionDefinition, MetricCatalog};
use crate::error::SizingError;
use crate::expand::{Axis, expand};
use crate::model::{
    AppId, DEFAULT_ANALYSIS_LENGTH, DEFAULT_NUM_DATES_ENROLLMENT, DateWindow, Locales, Metric,
    ParameterSet, Segment, SizingCollection, SourceTable, TargetRecipe, UserType,
};
use crate::util::sha256_file;

/// Existing users must have been first seen at least this long before enrollment.
pub const EXISTING_USER_MIN_AGE_DAYS: u64 = 28;

/// Axis order used when expanding `[targets]`. Part of the job-id ordering.
pub const TARGET_AXES: [&str; 5] = [
    "release_channel",
    "locale",
    "country",
    "user_type",
    "minimum_version",
];

const DEFAULT_POWER: [f64; 1] = [0.8];
const DEFAULT_EFFECT_SIZES: [f64; 4] = [0.005, 0.01, 0.02, 0.05];

/// The `target_lists.toml` document driving manifest generation.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetListSpec {
    pub targets: TargetAxes,
    #[serde(default)]
    pub metrics: BTreeMap<AppId, Vec<String>>,
    #[serde(default)]
    pub parameters: ParameterAxes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetAxes {
    pub release_channel: Vec<String>,
    pub locale: Vec<Locales>,
    pub country: Vec<String>,
    pub user_type: Vec<UserType>,
    #[serde(default)]
    pub minimum_version: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterAxes {
    pub power: Vec<f64>,
    pub effect_size: Vec<f64>,
}

impl Default for ParameterAxes {
    fn default() -> Self {
        Self {
            power: DEFAULT_POWER.to_vec(),
            effect_size: DEFAULT_EFFECT_SIZES.to_vec(),
        }
    }
}

impl ParameterAxes {
    pub fn expand(&self) -> Result<Vec<ParameterSet>, SizingError> {
        let axes = vec![
            Axis::new("power", self.power.clone()),
            Axis::new("effect_size", self.effect_size.clone()),
        ];

        Ok(expand(&axes)?
            .into_iter()
            .map(|combination| ParameterSet {
                power: combination.get("power").copied().unwrap_or_default(),
                effect_size: combination.get("effect_size").copied().unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
enum RecipeValue {
    Channel(String),
    Locale(Locales),
    Country(String),
    UserType(UserType),
    MinimumVersion(u32),
}

impl TargetListSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let spec: Self = toml::from_str(raw).context("failed to parse target lists")?;
        Ok(spec)
    }

    /// Loads the document together with the SHA-256 of its bytes.
    pub fn load(path: &Path) -> Result<(Self, String)> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let spec =
            Self::parse(&raw).with_context(|| format!("invalid target lists: {}", path.display()))?;
        let digest = sha256_file(path)?;

        debug!(path = %path.display(), sha256 = %digest, "loaded target lists");
        Ok((spec, digest))
    }

    /// Every target combination, in `TARGET_AXES` order.
    pub fn expand_targets(&self) -> Result<Vec<TargetRecipe>, SizingError> {
        let targets = &self.targets;
        let mut axes = vec![
            Axis::new(
                TARGET_AXES[0],
                targets.release_channel.iter().cloned().map(RecipeValue::Channel).collect(),
            ),
            Axis::new(
                TARGET_AXES[1],
                targets.locale.iter().cloned().map(RecipeValue::Locale).collect(),
            ),
            Axis::new(
                TARGET_AXES[2],
                targets.country.iter().cloned().map(RecipeValue::Country).collect(),
            ),
            Axis::new(
                TARGET_AXES[3],
                targets.user_type.iter().copied().map(RecipeValue::UserType).collect(),
            ),
        ];
        if !targets.minimum_version.is_empty() {
            axes.push(Axis::new(
                TARGET_AXES[4],
                targets
                    .minimum_version
                    .iter()
                    .copied()
                    .map(RecipeValue::MinimumVersion)
                    .collect(),
            ));
        }

        let mut recipes = Vec::new();
        for combination in expand(&axes)? {
            let mut release_channel = String::new();
            let mut locale = Locales(Vec::new());
            let mut country = String::new();
            let mut user_type = UserType::New;
            let mut minimum_version = None;

            for (_, value) in combination.into_pairs() {
                match value {
                    RecipeValue::Channel(value) => release_channel = value,
                    RecipeValue::Locale(value) => locale = value,
                    RecipeValue::Country(value) => country = value,
                    RecipeValue::UserType(value) => user_type = value,
                    RecipeValue::MinimumVersion(value) => minimum_version = Some(value),
                }
            }

            recipes.push(TargetRecipe {
                release_channel,
                locale,
                country,
                user_type,
                minimum_version,
            });
        }

        Ok(recipes)
    }

    pub fn metric_names(&self, app_id: AppId) -> Result<&[String], SizingError> {
        match self.metrics.get(&app_id) {
            Some(names) if !names.is_empty() => Ok(names),
            _ => Err(SizingError::EmptyAxis(format!("metrics.{app_id}"))),
        }
    }
}

struct PopulationTemplate {
    clients_daily: (&'static str, &'static str),
    new_users: (&'static str, &'static str),
    existing_users: (&'static str, &'static str),
    version_column: &'static str,
}

fn population_template(app_id: AppId) -> PopulationTemplate {
    match app_id {
        AppId::FirefoxDesktop => PopulationTemplate {
            clients_daily: ("clients_daily", "mozdata.telemetry.clients_daily"),
            new_users: (
                "clients_last_seen",
                "`moz-fx-data-shared-prod.telemetry.clients_last_seen`",
            ),
            existing_users: (
                "clients_last_seen",
                "`moz-fx-data-shared-prod.telemetry.clients_last_seen`",
            ),
            version_column: "app_version",
        },
        AppId::FirefoxIos => PopulationTemplate {
            clients_daily: (
                "clients_daily",
                "mozdata.org_mozilla_ios_firefox.baseline_clients_daily",
            ),
            new_users: (
                "baseline_clients_first_seen",
                "`moz-fx-data-shared-prod.org_mozilla_ios_firefox.baseline_clients_first_seen`",
            ),
            existing_users: (
                "baseline_clients_last_seen",
                "`moz-fx-data-shared-prod.org_mozilla_ios_firefox.baseline_clients_last_seen`",
            ),
            version_column: "app_display_version",
        },
        AppId::Fenix => PopulationTemplate {
            clients_daily: (
                "clients_daily",
                "mozdata.org_mozilla_firefox.baseline_clients_daily",
            ),
            new_users: (
                "baseline_clients_first_seen",
                "`moz-fx-data-shared-prod.org_mozilla_firefox.baseline_clients_first_seen`",
            ),
            existing_users: (
                "baseline_clients_last_seen",
                "`moz-fx-data-shared-prod.org_mozilla_firefox.baseline_clients_last_seen`",
            ),
            version_column: "app_display_version",
        },
    }
}

fn source((name, from_expr): (&str, &str)) -> SourceTable {
    SourceTable {
        name: name.to_string(),
        from_expr: from_expr.to_string(),
    }
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn clients_daily_sql(recipe: &TargetRecipe, version_column: &str) -> String {
    let mut clauses = vec![
        format!("(normalized_channel = {})", sql_quote(&recipe.release_channel)),
        format!("(UPPER(locale) IN {})", recipe.locale.to_sql_list()),
        format!("(country = {})", sql_quote(&recipe.country)),
    ];
    if let Some(version) = recipe.minimum_version {
        clauses.push(format!(
            "(mozfun.norm.truncate_version({version_column}, 'major') >= {version})"
        ));
    }

    format!("COALESCE(LOGICAL_OR(\n{}\n), FALSE)", clauses.join(" AND\n"))
}

/// First-seen predicate for the recipe's user type.
///
/// New users were first seen on or after `start_date`; existing users were
/// first seen at least `EXISTING_USER_MIN_AGE_DAYS` before it and were active
/// on it.
pub fn user_type_segment(app_id: AppId, user_type: UserType, start_date: NaiveDate) -> Segment {
    let template = population_template(app_id);
    match user_type {
        UserType::New => Segment {
            name: "clients_last_seen_filter".to_string(),
            data_source: source(template.new_users),
            select_expr: format!(
                "COALESCE(MIN(first_seen_date) >= '{}', TRUE)",
                start_date.format("%Y-%m-%d")
            ),
        },
        UserType::Existing => {
            let first_day = start_date - Days::new(EXISTING_USER_MIN_AGE_DAYS);
            Segment {
                name: "clients_last_seen_filter".to_string(),
                data_source: source(template.existing_users),
                select_expr: format!(
                    "COALESCE(MIN(first_seen_date) <= '{}', TRUE)\nAND COALESCE(MIN(days_since_seen) = 0)",
                    first_day.format("%Y-%m-%d")
                ),
            }
        }
    }
}

/// Population predicates for one recipe on one app.
pub fn population_segments(app_id: AppId, recipe: &TargetRecipe, start_date: NaiveDate) -> Vec<Segment> {
    let template = population_template(app_id);
    vec![
        Segment {
            name: "clients_daily_filter".to_string(),
            data_source: source(template.clients_daily),
            select_expr: clients_daily_sql(recipe, template.version_column),
        },
        user_type_segment(app_id, recipe.user_type, start_date),
    ]
}

/// Resolves a manifest target against the shared catalog.
pub fn resolve_from_catalog(
    recipe: &TargetRecipe,
    target_lists: &TargetListSpec,
    app_id: AppId,
    catalog: &dyn MetricCatalog,
    reference_date: NaiveDate,
) -> Result<SizingCollection, SizingError> {
    let dates = DateWindow::default_ending_on(reference_date);
    let segments = population_segments(app_id, recipe, dates.start_date);

    let metrics = target_lists
        .metric_names(app_id)?
        .iter()
        .map(|name| catalog.metric(name, app_id))
        .collect::<Result<Vec<_>, _>>()?;

    let parameters = target_lists.parameters.expand()?;

    Ok(SizingCollection {
        segments,
        metrics,
        parameters,
        dates,
    })
}

#[derive(Debug, Deserialize)]
struct JobDocument {
    segments: SegmentsSection,
    metrics: MetricsSection,
    data_sources: DataSourcesSection,
    #[serde(default)]
    parameters: Option<ParametersSection>,
    #[serde(default)]
    target: Option<TargetSection>,
}

#[derive(Debug, Deserialize)]
struct SegmentsSection {
    #[serde(default)]
    import_from_metric_hub: BTreeMap<AppId, Vec<String>>,
    #[serde(default)]
    data_sources: Option<DataSourcesSection>,
    #[serde(flatten)]
    definitions: BTreeMap<String, ExpressionDefinition>,
}

#[derive(Debug, Deserialize)]
struct MetricsSection {
    #[serde(default)]
    import_from_metric_hub: BTreeMap<AppId, Vec<String>>,
    #[serde(flatten)]
    definitions: BTreeMap<String, ExpressionDefinition>,
}

#[derive(Debug, Deserialize)]
struct DataSourcesSection {
    #[serde(default)]
    import_from_metric_hub: BTreeMap<AppId, Vec<String>>,
    #[serde(flatten)]
    definitions: BTreeMap<String, DataSourceDefinition>,
}

#[derive(Debug, Deserialize)]
struct ParametersSection {
    #[serde(default)]
    sizing: Option<ParameterAxes>,
    #[serde(default)]
    dates: Option<DatesSection>,
}

#[derive(Debug, Deserialize)]
struct DatesSection {
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    num_dates_enrollment: Option<u32>,
    #[serde(default)]
    analysis_length: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TargetSection {
    app_id: AppId,
    user_type: UserType,
}

/// Resolves a self-contained TOML job document.
pub fn resolve_from_file(
    path: &Path,
    catalog: &dyn MetricCatalog,
    reference_date: NaiveDate,
) -> Result<SizingCollection> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let collection = resolve_document(&raw, path, catalog, reference_date)?;

    info!(
        path = %path.display(),
        segments = collection.segments.len(),
        metrics = collection.metrics.len(),
        parameters = collection.parameters.len(),
        start_date = %collection.dates.start_date,
        "resolved sizing config file"
    );
    Ok(collection)
}

fn resolve_document(
    raw: &str,
    path: &Path,
    catalog: &dyn MetricCatalog,
    reference_date: NaiveDate,
) -> Result<SizingCollection> {
    let table: toml::Table =
        toml::from_str(raw).with_context(|| format!("failed to parse {}", path.display()))?;

    if !table.contains_key("segments") {
        return Err(SizingError::SegmentsMissing(path.to_path_buf()).into());
    }
    if !table.contains_key("metrics") {
        return Err(SizingError::MetricsMissing(path.to_path_buf()).into());
    }
    if !table.contains_key("data_sources") {
        return Err(SizingError::DataSourcesMissing(path.to_path_buf()).into());
    }

    let document: JobDocument = toml::Value::Table(table)
        .try_into()
        .with_context(|| format!("invalid sizing config: {}", path.display()))?;

    let (parameter_axes, dates_section) = match document.parameters {
        Some(section) => (section.sizing.unwrap_or_default(), section.dates),
        None => (ParameterAxes::default(), None),
    };
    let dates = resolve_dates(dates_section, reference_date);
    let parameters = parameter_axes.expand()?;

    let mut segments = resolve_segments(&document.segments, path, catalog)?;
    if let Some(target) = document.target {
        segments.push(user_type_segment(target.app_id, target.user_type, dates.start_date));
    }
    let metrics = resolve_metrics(&document.metrics, &document.data_sources, path, catalog)?;

    Ok(SizingCollection {
        segments,
        metrics,
        parameters,
        dates,
    })
}

fn resolve_dates(section: Option<DatesSection>, reference_date: NaiveDate) -> DateWindow {
    let Some(section) = section else {
        return DateWindow::default_ending_on(reference_date);
    };

    let num_dates_enrollment = section
        .num_dates_enrollment
        .unwrap_or(DEFAULT_NUM_DATES_ENROLLMENT);
    let analysis_length = section.analysis_length.unwrap_or(DEFAULT_ANALYSIS_LENGTH);

    match section.start_date {
        Some(start_date) => DateWindow {
            start_date,
            num_dates_enrollment,
            analysis_length,
        },
        None => DateWindow::ending_on(reference_date, num_dates_enrollment, analysis_length),
    }
}

fn lookup_source(
    inline: Option<&DataSourcesSection>,
    imported: &BTreeMap<String, SourceTable>,
    name: &str,
) -> Option<SourceTable> {
    if let Some(definition) = inline.and_then(|section| section.definitions.get(name)) {
        return Some(SourceTable {
            name: name.to_string(),
            from_expr: definition.from_expression.clone(),
        });
    }
    imported.get(name).cloned()
}

fn resolve_segments(
    section: &SegmentsSection,
    path: &Path,
    catalog: &dyn MetricCatalog,
) -> Result<Vec<Segment>> {
    let mut imported_sources = BTreeMap::new();
    if let Some(data_sources) = &section.data_sources {
        for (app_id, names) in &data_sources.import_from_metric_hub {
            for name in names {
                imported_sources.insert(name.clone(), catalog.segment_data_source(name, *app_id)?);
            }
        }
    }

    let mut segments = Vec::new();
    for (name, definition) in &section.definitions {
        if section.data_sources.is_none() {
            return Err(SizingError::SegmentDataSourcesMissing(path.to_path_buf()).into());
        }
        let data_source = lookup_source(
            section.data_sources.as_ref(),
            &imported_sources,
            &definition.data_source,
        )
        .ok_or_else(|| SizingError::UnknownDataSource {
            path: path.to_path_buf(),
            definition: name.clone(),
            data_source: definition.data_source.clone(),
        })?;

        segments.push(Segment {
            name: name.clone(),
            data_source,
            select_expr: definition.select_expression.clone(),
        });
    }

    for (app_id, names) in &section.import_from_metric_hub {
        for name in names {
            segments.push(catalog.segment(name, *app_id)?);
        }
    }

    Ok(segments)
}

fn resolve_metrics(
    section: &MetricsSection,
    data_sources: &DataSourcesSection,
    path: &Path,
    catalog: &dyn MetricCatalog,
) -> Result<Vec<Metric>> {
    let mut imported_sources = BTreeMap::new();
    for (app_id, names) in &data_sources.import_from_metric_hub {
        for name in names {
            imported_sources.insert(name.clone(), catalog.data_source(name, *app_id)?);
        }
    }

    let mut metrics = Vec::new();
    for (name, definition) in &section.definitions {
        let data_source = lookup_source(Some(data_sources), &imported_sources, &definition.data_source)
            .ok_or_else(|| SizingError::UnknownDataSource {
                path: path.to_path_buf(),
                definition: name.clone(),
                data_source: definition.data_source.clone(),
            })?;

        metrics.push(Metric {
            name: name.clone(),
            data_source,
            select_expr: definition.select_expression.clone(),
        });
    }

    for (app_id, names) in &section.import_from_metric_hub {
        for name in names {
            metrics.push(catalog.metric(name, *app_id)?);
        }
    }

    Ok(metrics)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::catalog::tests::desktop_hub;

    pub(crate) const TARGET_LISTS: &str = r#"
[targets]
release_channel = ["release"]
locale = [["EN-US", "EN-CA"], "DE"]
country = ["US", "DE"]
user_type = ["new", "existing"]

[metrics]
firefox_desktop = ["active_hours", "uri_count"]
firefox_ios = ["active_hours"]
fenix = ["active_hours"]

[parameters]
power = [0.8]
effect_size = [0.01, 0.05]
"#;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
    }

    fn recipe(user_type: UserType) -> TargetRecipe {
        TargetRecipe {
            release_channel: "release".to_string(),
            locale: Locales(vec!["EN-US".to_string(), "EN-CA".to_string()]),
            country: "US".to_string(),
            user_type,
            minimum_version: None,
        }
    }

    fn document_path() -> PathBuf {
        PathBuf::from("sizing/test_config.toml")
    }

    #[test]
    fn expand_targets_follows_axis_order() {
        let spec = TargetListSpec::parse(TARGET_LISTS).expect("target lists parse");
        let recipes = spec.expand_targets().expect("targets expand");

        assert_eq!(recipes.len(), 8);
        assert_eq!(recipes[0].locale.0, ["EN-US", "EN-CA"]);
        assert_eq!(recipes[0].country, "US");
        assert_eq!(recipes[0].user_type, UserType::New);
        assert_eq!(recipes[1].user_type, UserType::Existing);
        assert_eq!(recipes[2].country, "DE");
        assert_eq!(recipes[4].locale.0, ["DE"]);
        assert!(recipes.iter().all(|recipe| recipe.minimum_version.is_none()));
    }

    #[test]
    fn target_lists_reject_unknown_apps() {
        let raw = TARGET_LISTS.replace("fenix = ", "focus_android = ");
        assert!(TargetListSpec::parse(&raw).is_err());
    }

    #[test]
    fn existing_users_bound_is_twenty_eight_days_before_start() {
        let segment = user_type_segment(AppId::FirefoxDesktop, UserType::Existing, date("2024-03-01"));
        assert!(segment.select_expr.contains("MIN(first_seen_date) <= '2024-02-02'"));
        assert!(segment.select_expr.contains("MIN(days_since_seen) = 0"));
    }

    #[test]
    fn new_users_bound_is_start_date() {
        let segment = user_type_segment(AppId::Fenix, UserType::New, date("2024-03-01"));
        assert!(segment.select_expr.contains("MIN(first_seen_date) >= '2024-03-01'"));
        assert_eq!(segment.data_source.name, "baseline_clients_first_seen");
    }

    #[test]
    fn catalog_resolution_builds_population_metrics_and_parameters() {
        let spec = TargetListSpec::parse(TARGET_LISTS).expect("target lists parse");
        let collection = resolve_from_catalog(
            &recipe(UserType::Existing),
            &spec,
            AppId::FirefoxDesktop,
            &desktop_hub(),
            date("2024-03-10"),
        )
        .expect("catalog resolution");

        assert_eq!(collection.dates.start_date, date("2024-02-03"));
        assert_eq!(collection.segments.len(), 2);
        assert!(
            collection.segments[0]
                .select_expr
                .contains("(UPPER(locale) IN ('EN-US', 'EN-CA'))")
        );
        assert!(collection.segments[1].select_expr.contains("'2024-01-06'"));
        assert_eq!(collection.metrics.len(), 2);
        assert_eq!(collection.parameters.len(), 2);
        assert_eq!(collection.parameters[1].effect_size, 0.05);
    }

    #[test]
    fn catalog_resolution_requires_metrics_for_the_app() {
        let raw = TARGET_LISTS.replace("fenix = [\"active_hours\"]\n", "");
        let spec = TargetListSpec::parse(&raw).expect("target lists parse");
        let err = resolve_from_catalog(
            &recipe(UserType::New),
            &spec,
            AppId::Fenix,
            &desktop_hub(),
            date("2024-03-10"),
        )
        .expect_err("fenix has no metrics");
        assert!(matches!(err, SizingError::EmptyAxis(axis) if axis == "metrics.fenix"));
    }

    #[test]
    fn minimum_version_adds_version_clause() {
        let mut target = recipe(UserType::New);
        target.minimum_version = Some(120);
        let segments = population_segments(AppId::FirefoxIos, &target, date("2024-03-01"));
        assert!(
            segments[0]
                .select_expr
                .contains("mozfun.norm.truncate_version(app_display_version, 'major') >= 120")
        );
    }

    const JOB_DOCUMENT: &str = r#"
[segments]
[segments.desktop_release]
select_expression = "COALESCE(LOGICAL_OR(normalized_channel = 'release'), FALSE)"
data_source = "clients_daily"

[segments.data_sources.clients_daily]
from_expression = "mozdata.telemetry.clients_daily"

[segments.import_from_metric_hub]
firefox_desktop = ["regular_users_v3"]

[metrics]
[metrics.search_count]
select_expression = "COALESCE(SUM(search_count_all), 0)"
data_source = "search"

[metrics.import_from_metric_hub]
firefox_desktop = ["active_hours"]

[data_sources]
[data_sources.search]
from_expression = "mozdata.search.search_clients_engines_sources_daily"

[parameters.sizing]
power = [0.8, 0.9]
effect_size = [0.01]

[parameters.dates]
start_date = "2024-01-01"
num_dates_enrollment = 14

[target]
app_id = "firefox_desktop"
user_type = "existing"
"#;

    #[test]
    fn file_resolution_merges_inline_and_imported_definitions() {
        let collection = resolve_document(
            JOB_DOCUMENT,
            &document_path(),
            &desktop_hub(),
            date("2024-06-01"),
        )
        .expect("document resolves");

        let segment_names = collection
            .segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            segment_names,
            vec!["desktop_release", "regular_users_v3", "clients_last_seen_filter"]
        );
        assert!(collection.segments[2].select_expr.contains("'2023-12-04'"));

        let metric_names = collection
            .metrics
            .iter()
            .map(|metric| metric.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(metric_names, vec!["search_count", "active_hours"]);
        assert_eq!(
            collection.metrics[0].data_source.from_expr,
            "mozdata.search.search_clients_engines_sources_daily"
        );

        assert_eq!(collection.parameters.len(), 2);
        assert_eq!(collection.dates.start_date, date("2024-01-01"));
        assert_eq!(collection.dates.num_dates_enrollment, 14);
        assert_eq!(collection.dates.analysis_length, 28);
    }

    #[test]
    fn file_resolution_defaults_parameters_and_dates() {
        let raw = r#"
[segments]
[metrics]
[metrics.import_from_metric_hub]
firefox_desktop = ["uri_count"]
[data_sources]
"#;
        let collection = resolve_document(raw, &document_path(), &desktop_hub(), date("2024-03-10"))
            .expect("document resolves");

        assert!(collection.segments.is_empty());
        assert_eq!(collection.parameters.len(), 4);
        assert!(collection.parameters.iter().all(|p| p.power == 0.8));
        assert_eq!(collection.dates.start_date, date("2024-02-03"));
    }

    #[test]
    fn file_resolution_reports_missing_sections() {
        let cases = [
            ("[metrics]\n[data_sources]\n", "segments"),
            ("[segments]\n[data_sources]\n", "metrics"),
            ("[segments]\n[metrics]\n", "data_sources"),
        ];

        for (raw, section) in cases {
            let err = resolve_document(raw, &document_path(), &desktop_hub(), date("2024-03-10"))
                .expect_err("section missing");
            let named = err.downcast_ref::<SizingError>().expect("typed error");
            let matched = match section {
                "segments" => matches!(named, SizingError::SegmentsMissing(_)),
                "metrics" => matches!(named, SizingError::MetricsMissing(_)),
                _ => matches!(named, SizingError::DataSourcesMissing(_)),
            };
            assert!(matched, "unexpected error for missing {section}: {named}");
        }
    }

    #[test]
    fn inline_segments_need_segment_data_sources() {
        let raw = r#"
[segments.inline]
select_expression = "TRUE"
data_source = "clients_daily"
[metrics]
[data_sources]
"#;
        let err = resolve_document(raw, &document_path(), &desktop_hub(), date("2024-03-10"))
            .expect_err("no segment data sources");
        assert!(matches!(
            err.downcast_ref::<SizingError>(),
            Some(SizingError::SegmentDataSourcesMissing(_))
        ));
    }

    #[test]
    fn inline_metrics_need_known_data_sources() {
        let raw = r#"
[segments]
[metrics.orphan]
select_expression = "COUNT(*)"
data_source = "nowhere"
[data_sources]
"#;
        let err = resolve_document(raw, &document_path(), &desktop_hub(), date("2024-03-10"))
            .expect_err("unknown data source");
        assert!(matches!(
            err.downcast_ref::<SizingError>(),
            Some(SizingError::UnknownDataSource { data_source, .. }) if data_source == "nowhere"
        ));
    }
}
