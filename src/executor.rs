use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Days, NaiveDate};
use tracing::info;

use crate::catalog::MetricCatalog;
use crate::error::SizingError;
use crate::manifest::{Manifest, ManifestStore, refresh};
use crate::model::SizingConfiguration;
use crate::strategy::ExecutorStrategy;
use crate::targets::{TargetListSpec, resolve_from_catalog, resolve_from_file};

/// Decides which sizing jobs a run covers and hands them to a strategy.
///
/// Sources are tried in order: an explicit config file, a single manifest
/// job, then every manifest job.
pub struct AnalysisExecutor<'a> {
    pub target_slug: Option<String>,
    pub configuration_file: Option<PathBuf>,
    pub run_manifest_jobs: bool,
    pub job_id: Option<String>,
    pub refresh_manifest: bool,
    pub manifest_store: &'a dyn ManifestStore,
    pub catalog: &'a dyn MetricCatalog,
    pub target_lists_path: &'a Path,
}

/// Windows end the day before the run so the last day is complete.
pub fn reference_date(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

impl AnalysisExecutor<'_> {
    pub fn execute(&self, strategy: &dyn ExecutorStrategy, today: NaiveDate) -> Result<bool> {
        let worklist = self.worklist(today)?;
        info!(
            strategy = strategy.name(),
            jobs = worklist.len(),
            "executing sizing worklist"
        );
        strategy.execute(&worklist)
    }

    pub fn worklist(&self, today: NaiveDate) -> Result<Vec<SizingConfiguration>> {
        let reference = reference_date(today);

        if let Some(path) = &self.configuration_file {
            let collection = resolve_from_file(path, self.catalog, reference)?;
            let slug = self.target_slug.clone().unwrap_or_default();
            return Ok(vec![SizingConfiguration::from_collection(
                slug,
                collection,
                Some(path.clone()),
            )]);
        }

        if !self.run_manifest_jobs {
            return Err(SizingError::NoConfigFile.into());
        }

        let (target_lists, sha256) = TargetListSpec::load(self.target_lists_path)?;

        if let Some(job_id) = &self.job_id {
            let entry = self.manifest_store.get_entry(job_id)?;
            let collection = resolve_from_catalog(
                &entry.target_recipe,
                &target_lists,
                entry.app_id,
                self.catalog,
                reference,
            )?;
            info!(job_id = %job_id, app_id = %entry.app_id, "resolved manifest job");
            return Ok(vec![SizingConfiguration::from_collection(
                job_id.clone(),
                collection,
                None,
            )]);
        }

        let manifest = if self.refresh_manifest {
            refresh(self.manifest_store, &target_lists, &sha256)?
        } else {
            self.manifest_store.load()?
        };

        self.manifest_worklist(&manifest, &target_lists, reference)
    }

    fn manifest_worklist(
        &self,
        manifest: &Manifest,
        target_lists: &TargetListSpec,
        reference: NaiveDate,
    ) -> Result<Vec<SizingConfiguration>> {
        let mut worklist = Vec::with_capacity(manifest.jobs.len());
        for entry in &manifest.jobs {
            let collection = resolve_from_catalog(
                &entry.target_recipe,
                target_lists,
                entry.app_id,
                self.catalog,
                reference,
            )?;
            worklist.push(SizingConfiguration::from_collection(
                entry.job_id.clone(),
                collection,
                None,
            ));
        }

        info!(
            location = %self.manifest_store.location(),
            jobs = worklist.len(),
            "built worklist from manifest"
        );
        Ok(worklist)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use super::*;
    use crate::catalog::MetricHub;
    use crate::catalog::tests::DESKTOP_DEFINITIONS;
    use crate::manifest::APP_ORDER;
    use crate::manifest::tests::{InMemoryManifestStore, fixture_manifest};
    use crate::model::AppId;
    use crate::targets::tests::TARGET_LISTS;

    struct RecordingStrategy {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl ExecutorStrategy for RecordingStrategy {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn execute(&self, worklist: &[SizingConfiguration]) -> Result<bool> {
            self.seen
                .borrow_mut()
                .extend(worklist.iter().map(|config| config.target_slug.clone()));
            Ok(true)
        }
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
    }

    fn all_apps_hub() -> MetricHub {
        let mut hub = MetricHub::default();
        for app_id in APP_ORDER {
            hub.insert_toml(app_id, DESKTOP_DEFINITIONS)
                .expect("fixture definitions parse");
        }
        hub
    }

    fn target_lists_file(dir: &Path) -> PathBuf {
        let path = dir.join("target_lists.toml");
        fs::write(&path, TARGET_LISTS).expect("write target lists");
        path
    }

    fn executor<'a>(
        store: &'a InMemoryManifestStore,
        catalog: &'a MetricHub,
        target_lists_path: &'a Path,
    ) -> AnalysisExecutor<'a> {
        AnalysisExecutor {
            target_slug: None,
            configuration_file: None,
            run_manifest_jobs: false,
            job_id: None,
            refresh_manifest: false,
            manifest_store: store,
            catalog,
            target_lists_path,
        }
    }

    #[test]
    fn nothing_selected_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryManifestStore::default();
        let hub = all_apps_hub();
        let path = target_lists_file(dir.path());

        let err = executor(&store, &hub, &path)
            .worklist(date("2024-03-11"))
            .expect_err("no source selected");
        assert!(matches!(
            err.downcast_ref::<SizingError>(),
            Some(SizingError::NoConfigFile)
        ));
    }

    #[test]
    fn config_file_takes_precedence_over_manifest_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("custom.toml");
        fs::write(
            &config_path,
            r#"
[segments]
[metrics.import_from_metric_hub]
firefox_desktop = ["active_hours"]
[data_sources]
"#,
        )
        .expect("write config");

        let store = InMemoryManifestStore::with(fixture_manifest());
        let hub = all_apps_hub();
        let path = target_lists_file(dir.path());
        let mut executor = executor(&store, &hub, &path);
        executor.configuration_file = Some(config_path.clone());
        executor.run_manifest_jobs = true;

        let worklist = executor.worklist(date("2024-03-11")).expect("worklist");
        assert_eq!(worklist.len(), 1);
        assert_eq!(worklist[0].target_slug, "");
        assert_eq!(worklist[0].config_file.as_deref(), Some(config_path.as_path()));
        assert_eq!(worklist[0].dates.start_date, date("2024-02-03"));
    }

    #[test]
    fn single_job_resolves_through_the_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryManifestStore::with(fixture_manifest());
        let hub = all_apps_hub();
        let path = target_lists_file(dir.path());
        let mut executor = executor(&store, &hub, &path);
        executor.run_manifest_jobs = true;
        executor.job_id = Some("argo_target_9".to_string());

        let worklist = executor.worklist(date("2024-03-11")).expect("worklist");
        assert_eq!(worklist.len(), 1);
        assert_eq!(worklist[0].target_slug, "argo_target_9");
        assert_eq!(worklist[0].metrics.len(), 1);
        assert_eq!(worklist[0].parameters.len(), 2);
        assert!(worklist[0].segments[0].select_expr.contains("'US'"));
        assert!(worklist[0].config_file.is_none());
    }

    #[test]
    fn all_jobs_refresh_first_and_keep_manifest_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryManifestStore::default();
        let hub = all_apps_hub();
        let path = target_lists_file(dir.path());
        let mut executor = executor(&store, &hub, &path);
        executor.run_manifest_jobs = true;
        executor.refresh_manifest = true;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let strategy = RecordingStrategy {
            seen: Rc::clone(&seen),
        };
        assert!(executor.execute(&strategy, date("2024-03-11")).expect("run"));

        assert_eq!(*store.replacements.borrow(), 1);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 24);
        assert_eq!(seen[0], "argo_target_0");
        assert_eq!(seen[23], "argo_target_23");
    }

    #[test]
    fn all_jobs_without_refresh_need_a_stored_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryManifestStore::default();
        let hub = all_apps_hub();
        let path = target_lists_file(dir.path());
        let mut executor = executor(&store, &hub, &path);
        executor.run_manifest_jobs = true;

        let err = executor.worklist(date("2024-03-11")).expect_err("no manifest");
        assert!(matches!(
            err.downcast_ref::<SizingError>(),
            Some(SizingError::ManifestMissing(_))
        ));
    }

    #[test]
    fn catalog_gaps_abort_manifest_resolution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryManifestStore::with(fixture_manifest());
        let mut hub = MetricHub::default();
        hub.insert_toml(AppId::FirefoxDesktop, DESKTOP_DEFINITIONS)
            .expect("fixture definitions parse");
        let path = target_lists_file(dir.path());
        let mut executor = executor(&store, &hub, &path);
        executor.run_manifest_jobs = true;

        let err = executor.worklist(date("2024-03-11")).expect_err("ios has no definitions");
        assert!(matches!(
            err.downcast_ref::<SizingError>(),
            Some(SizingError::CatalogEntryMissing { .. })
        ));
    }

    #[test]
    fn reference_date_is_the_previous_day() {
        assert_eq!(reference_date(date("2024-03-01")), date("2024-02-29"));
    }
}
