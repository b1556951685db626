use anyhow::Result;
use tracing::info;

use crate::cli::RefreshManifestArgs;
use crate::manifest::{JsonFileManifestStore, refresh};
use crate::targets::TargetListSpec;

pub fn run(args: RefreshManifestArgs) -> Result<()> {
    let (target_lists, sha256) = TargetListSpec::load(&args.paths.target_lists)?;
    let store = JsonFileManifestStore::new(&args.paths.manifest_path);
    let manifest = refresh(&store, &target_lists, &sha256)?;

    info!(
        path = %args.paths.manifest_path.display(),
        target_lists = %args.paths.target_lists.display(),
        target_lists_sha256 = %manifest.target_lists_sha256,
        jobs = manifest.job_count,
        "manifest written"
    );
    Ok(())
}
