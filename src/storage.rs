use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::util::{command_output, ensure_directory, run_command};

/// Flat key/value blob storage addressed by `/`-separated paths.
pub trait ObjectStore {
    fn put(&self, path: &str, data: &[u8]) -> Result<()>;

    fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Every object path starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn describe(&self) -> String;
}

/// Picks the store for a `--bucket` value: `gs://name` goes through gsutil,
/// anything else is a local directory.
pub fn open_object_store(bucket: &str) -> Box<dyn ObjectStore> {
    match bucket.strip_prefix("gs://") {
        Some(name) => Box::new(GsutilObjectStore::new(name.trim_end_matches('/'))),
        None => Box::new(LocalObjectStore::new(bucket)),
    }
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }
        fs::write(&target, data).with_context(|| format!("failed to write {}", target.display()))
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path);
        fs::read(&target).with_context(|| format!("failed to read {}", target.display()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.root.is_dir() {
            return Ok(keys);
        }

        for entry in WalkDir::new(&self.root) {
            let entry =
                entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).with_context(|| {
                format!("{} escaped {}", entry.path().display(), self.root.display())
            })?;
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Google Cloud Storage bucket accessed through the `gsutil` CLI.
#[derive(Debug, Clone)]
pub struct GsutilObjectStore {
    bucket: String,
}

impl GsutilObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path.trim_start_matches('/'))
    }
}

impl ObjectStore for GsutilObjectStore {
    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let url = self.url(path);
        run_command(
            "gsutil",
            &["-q", "-h", "Content-Type:application/json", "cp", "-", &url],
            Some(data),
        )?;
        debug!(url = %url, bytes = data.len(), "uploaded object");
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        run_command("gsutil", &["cat", &self.url(path)], None)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}**", self.url(prefix));
        let output = command_output("gsutil", &["ls", &pattern], None)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("matched no objects") {
                return Ok(Vec::new());
            }
            anyhow::bail!("gsutil ls {} failed: {}", pattern, stderr.trim());
        }

        let bucket_prefix = format!("gs://{}/", self.bucket);
        let mut keys = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().strip_prefix(&bucket_prefix))
            .filter(|key| !key.is_empty() && !key.ends_with('/'))
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_store_lists_nested_keys_by_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());

        store
            .put("sample_sizes/ind_target_results_2024-03-01/a.json", b"{}")
            .expect("put a");
        store
            .put("sample_sizes/ind_target_results_2024-03-02/b.json", b"{}")
            .expect("put b");
        store.put("other/c.json", b"{}").expect("put c");

        let keys = store
            .list("sample_sizes/ind_target_results_2024-03-01")
            .expect("list");
        assert_eq!(keys, vec!["sample_sizes/ind_target_results_2024-03-01/a.json"]);
        assert_eq!(store.list("").expect("list all").len(), 3);
        assert_eq!(
            store
                .get("sample_sizes/ind_target_results_2024-03-02/b.json")
                .expect("get b"),
            b"{}"
        );
    }

    #[test]
    fn local_store_lists_nothing_before_first_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path().join("bucket"));
        assert!(store.list("sample_sizes").expect("list").is_empty());
    }

    #[test]
    fn bucket_urls_select_gsutil_store() {
        assert_eq!(open_object_store("gs://results/").describe(), "gs://results");
        assert_eq!(open_object_store("/tmp/results").describe(), "/tmp/results");
    }
}
