use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SizingError;
use crate::manifest::APP_ORDER;
use crate::model::{AppId, Metric, Segment, SourceTable};

/// A named select expression bound to a data source by name.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpressionDefinition {
    pub select_expression: String,
    pub data_source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceDefinition {
    pub from_expression: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentDefinitions {
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceDefinition>,
    #[serde(flatten)]
    pub segments: BTreeMap<String, ExpressionDefinition>,
}

/// Contents of one `definitions/<app_id>.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub metrics: BTreeMap<String, ExpressionDefinition>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceDefinition>,
    #[serde(default)]
    pub segments: SegmentDefinitions,
}

/// Shared catalog of named metric, segment and data-source definitions.
pub trait MetricCatalog {
    fn metric(&self, name: &str, app_id: AppId) -> Result<Metric, SizingError>;
    fn data_source(&self, name: &str, app_id: AppId) -> Result<SourceTable, SizingError>;
    fn segment(&self, name: &str, app_id: AppId) -> Result<Segment, SizingError>;
    fn segment_data_source(&self, name: &str, app_id: AppId) -> Result<SourceTable, SizingError>;
}

/// Metric-hub style definitions, one file per application.
#[derive(Debug, Clone, Default)]
pub struct MetricHub {
    definitions: BTreeMap<AppId, Definitions>,
}

impl MetricHub {
    /// Loads `<root>/definitions/<app_id>.toml` for every supported app that has one.
    pub fn from_dir(root: &Path) -> Result<Self> {
        let mut hub = Self::default();
        for app_id in APP_ORDER {
            let path = root.join("definitions").join(format!("{app_id}.toml"));
            if !path.exists() {
                debug!(path = %path.display(), "no metric definitions for app");
                continue;
            }

            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            hub.insert_toml(app_id, &raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
        }

        info!(
            root = %root.display(),
            apps = hub.definitions.len(),
            "loaded metric catalog"
        );
        Ok(hub)
    }

    pub fn insert_toml(&mut self, app_id: AppId, raw: &str) -> Result<()> {
        let definitions: Definitions = toml::from_str(raw)?;
        self.definitions.insert(app_id, definitions);
        Ok(())
    }

    fn app(&self, kind: &'static str, name: &str, app_id: AppId) -> Result<&Definitions, SizingError> {
        self.definitions
            .get(&app_id)
            .ok_or_else(|| missing(kind, name, app_id))
    }
}

fn missing(kind: &'static str, name: &str, app_id: AppId) -> SizingError {
    SizingError::CatalogEntryMissing {
        kind,
        name: name.to_string(),
        app_id: app_id.to_string(),
    }
}

impl MetricCatalog for MetricHub {
    fn metric(&self, name: &str, app_id: AppId) -> Result<Metric, SizingError> {
        let definitions = self.app("metric", name, app_id)?;
        let metric = definitions
            .metrics
            .get(name)
            .ok_or_else(|| missing("metric", name, app_id))?;
        let data_source = self.data_source(&metric.data_source, app_id)?;

        Ok(Metric {
            name: name.to_string(),
            data_source,
            select_expr: metric.select_expression.clone(),
        })
    }

    fn data_source(&self, name: &str, app_id: AppId) -> Result<SourceTable, SizingError> {
        let definitions = self.app("data source", name, app_id)?;
        let source = definitions
            .data_sources
            .get(name)
            .ok_or_else(|| missing("data source", name, app_id))?;

        Ok(SourceTable {
            name: name.to_string(),
            from_expr: source.from_expression.clone(),
        })
    }

    fn segment(&self, name: &str, app_id: AppId) -> Result<Segment, SizingError> {
        let definitions = self.app("segment", name, app_id)?;
        let segment = definitions
            .segments
            .segments
            .get(name)
            .ok_or_else(|| missing("segment", name, app_id))?;
        let data_source = self.segment_data_source(&segment.data_source, app_id)?;

        Ok(Segment {
            name: name.to_string(),
            data_source,
            select_expr: segment.select_expression.clone(),
        })
    }

    fn segment_data_source(&self, name: &str, app_id: AppId) -> Result<SourceTable, SizingError> {
        let definitions = self.app("segment data source", name, app_id)?;
        let source = definitions
            .segments
            .data_sources
            .get(name)
            .ok_or_else(|| missing("segment data source", name, app_id))?;

        Ok(SourceTable {
            name: name.to_string(),
            from_expr: source.from_expression.clone(),
        })
    }
}
