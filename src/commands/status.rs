use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::error::SizingError;
use crate::manifest::{JsonFileManifestStore, MANIFEST_ORDERING_VERSION, ManifestStore};
use crate::util::sha256_file;

pub fn run(args: StatusArgs) -> Result<()> {
    let store = JsonFileManifestStore::new(&args.paths.manifest_path);
    info!(path = %store.path().display(), "status requested");

    let manifest = match store.load() {
        Ok(manifest) => manifest,
        Err(err) if matches!(err.downcast_ref::<SizingError>(), Some(SizingError::ManifestMissing(_))) => {
            warn!(path = %store.path().display(), "job manifest missing; run refresh-manifest");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let mut per_app = BTreeMap::new();
    for entry in &manifest.jobs {
        *per_app.entry(entry.app_id).or_insert(0_usize) += 1;
    }
    let per_app = per_app
        .iter()
        .map(|(app_id, count)| format!("{app_id}={count}"))
        .collect::<Vec<_>>()
        .join(",");

    info!(
        manifest_version = manifest.manifest_version,
        ordering_version = manifest.ordering_version,
        current_ordering_version = MANIFEST_ORDERING_VERSION,
        target_axes = %manifest.target_axes.join(","),
        jobs = manifest.job_count,
        per_app = %per_app,
        "loaded job manifest"
    );

    if args.paths.target_lists.exists() {
        let digest = sha256_file(&args.paths.target_lists)?;
        if digest == manifest.target_lists_sha256 {
            info!(path = %args.paths.target_lists.display(), "manifest matches target lists");
        } else {
            warn!(
                path = %args.paths.target_lists.display(),
                recorded = %manifest.target_lists_sha256,
                current = %digest,
                "target lists changed since the manifest was built"
            );
        }
    } else {
        warn!(path = %args.paths.target_lists.display(), "target lists file missing");
    }

    Ok(())
}
