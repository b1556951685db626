use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SizingError;

pub const DEFAULT_NUM_DATES_ENROLLMENT: u32 = 7;
pub const DEFAULT_ANALYSIS_LENGTH: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AppId {
    FirefoxDesktop,
    FirefoxIos,
    Fenix,
}

impl AppId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirefoxDesktop => "firefox_desktop",
            Self::FirefoxIos => "firefox_ios",
            Self::Fenix => "fenix",
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppId {
    type Err = SizingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "firefox_desktop" => Ok(Self::FirefoxDesktop),
            "firefox_ios" => Ok(Self::FirefoxIos),
            "fenix" => Ok(Self::Fenix),
            other => Err(SizingError::InvalidAppId(other.to_string())),
        }
    }
}

impl TryFrom<String> for AppId {
    type Error = SizingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    New,
    Existing,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Existing => "existing",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered locale codes of a target.
///
/// Accepts a single code, a list of codes, or the older tuple-literal text
/// form (`"('EN-CA','EN-US')"`). The text form is split lexically and never
/// evaluated. Always serializes as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Locales(pub Vec<String>);

impl Locales {
    pub fn sorted(&self) -> Vec<String> {
        let mut codes = self.0.clone();
        codes.sort();
        codes
    }

    /// Renders the codes as a SQL list literal, e.g. `('EN-US', 'EN-CA')`.
    pub fn to_sql_list(&self) -> String {
        let quoted = self
            .0
            .iter()
            .map(|code| format!("'{}'", code.replace('\'', "''")))
            .collect::<Vec<_>>();
        format!("({})", quoted.join(", "))
    }
}

impl<'de> Deserialize<'de> for Locales {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        let codes = match Raw::deserialize(deserializer)? {
            Raw::One(text) => parse_tuple_literal(&text),
            Raw::Many(codes) => codes,
        };
        if codes.is_empty() {
            return Err(serde::de::Error::custom("locale must name at least one code"));
        }
        Ok(Self(codes))
    }
}

/// Splits `('A', 'B')`, `('A')` or a bare `A` into its elements.
pub fn parse_tuple_literal(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed);

    inner
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecipe {
    pub release_channel: String,
    pub locale: Locales,
    pub country: String,
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub power: f64,
    pub effect_size: f64,
}

impl ParameterSet {
    /// `Power0.8EffectSize0.05`; whole numbers keep their `.0`.
    pub fn label(&self) -> String {
        format!("Power{:?}EffectSize{:?}", self.power, self.effect_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub num_dates_enrollment: u32,
    pub analysis_length: u32,
}

/// Validated analysis window handed to the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeLimits {
    pub first_enrollment_date: NaiveDate,
    pub last_date_full_data: NaiveDate,
    pub num_dates_enrollment: u32,
    pub analysis_length: u32,
}

impl DateWindow {
    /// Window whose data ends on `reference_date`.
    pub fn ending_on(reference_date: NaiveDate, num_dates_enrollment: u32, analysis_length: u32) -> Self {
        let span = u64::from(num_dates_enrollment) + u64::from(analysis_length) + 1;
        Self {
            start_date: reference_date - Days::new(span),
            num_dates_enrollment,
            analysis_length,
        }
    }

    pub fn default_ending_on(reference_date: NaiveDate) -> Self {
        Self::ending_on(
            reference_date,
            DEFAULT_NUM_DATES_ENROLLMENT,
            DEFAULT_ANALYSIS_LENGTH,
        )
    }

    pub fn last_date_full_data(&self) -> NaiveDate {
        let span = u64::from(self.num_dates_enrollment) + u64::from(self.analysis_length) + 1;
        self.start_date + Days::new(span)
    }

    /// Fails when the window has not fully elapsed by `current_date`.
    pub fn time_limits(&self, current_date: NaiveDate, target_slug: &str) -> Result<TimeLimits, SizingError> {
        let last_date_full_data = self.last_date_full_data();
        if last_date_full_data >= current_date {
            return Err(SizingError::AnalysisDatesNotAvailable {
                target_slug: target_slug.to_string(),
                last_date_full_data,
            });
        }

        Ok(TimeLimits {
            first_enrollment_date: self.start_date,
            last_date_full_data,
            num_dates_enrollment: self.num_dates_enrollment,
            analysis_length: self.analysis_length,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTable {
    pub name: String,
    pub from_expr: String,
}

/// A population predicate evaluated against one data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub name: String,
    pub data_source: SourceTable,
    pub select_expr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    pub data_source: SourceTable,
    pub select_expr: String,
}

/// Resolved targets, metrics, parameters and dates before a slug is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingCollection {
    pub segments: Vec<Segment>,
    pub metrics: Vec<Metric>,
    pub parameters: Vec<ParameterSet>,
    pub dates: DateWindow,
}

/// One fully resolved unit of sizing work.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfiguration {
    pub target_slug: String,
    pub segments: Vec<Segment>,
    pub metrics: Vec<Metric>,
    pub dates: DateWindow,
    pub parameters: Vec<ParameterSet>,
    pub config_file: Option<PathBuf>,
}

impl SizingConfiguration {
    pub fn from_collection(
        target_slug: impl Into<String>,
        collection: SizingCollection,
        config_file: Option<PathBuf>,
    ) -> Self {
        Self {
            target_slug: target_slug.into(),
            segments: collection.segments,
            metrics: collection.metrics,
            dates: collection.dates,
            parameters: collection.parameters,
            config_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSampleSize {
    pub number_of_clients_targeted: f64,
    pub sample_size_per_branch: f64,
    pub population_percent_per_branch: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterResult {
    pub parameters: ParameterSet,
    pub metrics: BTreeMap<String, MetricSampleSize>,
}

/// Per-job published document: parameter label to per-metric stats.
pub type SizingResult = BTreeMap<String, ParameterResult>;
