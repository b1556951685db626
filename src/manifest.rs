use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SizingError;
use crate::model::{AppId, TargetRecipe};
use crate::targets::{TARGET_AXES, TargetListSpec};
use crate::util::write_json_atomic;

pub const MANIFEST_VERSION: u32 = 1;

/// Version of the traversal that assigns job ids: `APP_ORDER` outer,
/// `TARGET_AXES` expansion inner. Bump when either changes.
pub const MANIFEST_ORDERING_VERSION: u32 = 1;

pub const APP_ORDER: [AppId; 3] = [AppId::FirefoxDesktop, AppId::FirefoxIos, AppId::Fenix];

pub const JOB_ID_PREFIX: &str = "argo_target";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifestEntry {
    pub job_id: String,
    pub app_id: AppId,
    pub target_recipe: TargetRecipe,
}

/// Durable record of which sizing jobs exist, in assignment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest_version: u32,
    pub ordering_version: u32,
    pub app_order: Vec<AppId>,
    pub target_axes: Vec<String>,
    pub target_lists_sha256: String,
    pub job_count: usize,
    pub jobs: Vec<JobManifestEntry>,
}

impl Manifest {
    pub fn entry(&self, job_id: &str) -> Option<&JobManifestEntry> {
        self.jobs.iter().find(|entry| entry.job_id == job_id)
    }

    pub fn resolve_entry(&self, job_id: &str) -> Result<(AppId, TargetRecipe), SizingError> {
        self.entry(job_id)
            .map(|entry| (entry.app_id, entry.target_recipe.clone()))
            .ok_or_else(|| SizingError::UnknownJobId(job_id.to_string()))
    }

    pub fn is_current_ordering(&self) -> bool {
        self.ordering_version == MANIFEST_ORDERING_VERSION
            && self.app_order == APP_ORDER
            && self.target_axes.iter().map(String::as_str).eq(TARGET_AXES)
    }
}

pub fn job_id(index: usize) -> String {
    format!("{JOB_ID_PREFIX}_{index}")
}

/// Assigns `argo_target_<n>` ids over `APP_ORDER` x expanded targets.
pub fn build_manifest(spec: &TargetListSpec, target_lists_sha256: &str) -> Result<Manifest, SizingError> {
    let recipes = spec.expand_targets()?;

    let mut jobs = Vec::with_capacity(APP_ORDER.len() * recipes.len());
    for app_id in APP_ORDER {
        for recipe in &recipes {
            jobs.push(JobManifestEntry {
                job_id: job_id(jobs.len()),
                app_id,
                target_recipe: recipe.clone(),
            });
        }
    }

    Ok(Manifest {
        manifest_version: MANIFEST_VERSION,
        ordering_version: MANIFEST_ORDERING_VERSION,
        app_order: APP_ORDER.to_vec(),
        target_axes: TARGET_AXES.iter().map(|axis| axis.to_string()).collect(),
        target_lists_sha256: target_lists_sha256.to_string(),
        job_count: jobs.len(),
        jobs,
    })
}

/// Storage for the job manifest.
///
/// `replace` swaps the whole manifest in one step. Callers must ensure a
/// single writer; concurrent refreshes race.
pub trait ManifestStore {
    fn load(&self) -> Result<Manifest>;

    fn replace(&self, manifest: &Manifest) -> Result<()>;

    fn location(&self) -> String;

    fn get_entry(&self, job_id: &str) -> Result<JobManifestEntry> {
        let manifest = self.load()?;
        let entry = manifest
            .entry(job_id)
            .cloned()
            .ok_or_else(|| SizingError::UnknownJobId(job_id.to_string()))?;
        Ok(entry)
    }
}

/// Rebuilds the manifest from `spec` and replaces the stored one wholesale.
pub fn refresh(
    store: &dyn ManifestStore,
    spec: &TargetListSpec,
    target_lists_sha256: &str,
) -> Result<Manifest> {
    let manifest = build_manifest(spec, target_lists_sha256)?;
    store.replace(&manifest)?;

    info!(
        location = %store.location(),
        jobs = manifest.job_count,
        ordering_version = manifest.ordering_version,
        "refreshed job manifest"
    );
    Ok(manifest)
}

#[derive(Debug, Clone)]
pub struct JsonFileManifestStore {
    path: PathBuf,
}

impl JsonFileManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestStore for JsonFileManifestStore {
    fn load(&self) -> Result<Manifest> {
        if !self.path.exists() {
            return Err(SizingError::ManifestMissing(self.path.clone()).into());
        }

        let raw = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let manifest: Manifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        if !manifest.is_current_ordering() {
            warn!(
                path = %self.path.display(),
                ordering_version = manifest.ordering_version,
                "manifest was built with a different job ordering; job ids may not match published results"
            );
        }
        Ok(manifest)
    }

    fn replace(&self, manifest: &Manifest) -> Result<()> {
        write_json_atomic(&self.path, manifest)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
