use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{DatasetId, StorageLocation};
use crate::error::CatalogError;

/// Where generated artifacts are written and where bucket paths are mounted
/// on the local filesystem.
#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    mount_root: Option<Utf8PathBuf>,
}

impl Store {
    pub fn new() -> Result<Self, CatalogError> {
        let cwd = std::env::current_dir().map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let output_root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| CatalogError::Filesystem("invalid working directory path".to_string()))?;
        Ok(Self {
            output_root,
            mount_root: None,
        })
    }

    pub fn new_with_paths(output_root: Utf8PathBuf, mount_root: Option<Utf8PathBuf>) -> Self {
        Self {
            output_root,
            mount_root,
        }
    }

    pub fn with_mount_root(mut self, mount_root: Option<Utf8PathBuf>) -> Self {
        self.mount_root = mount_root;
        self
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn mount_root(&self) -> Option<&Utf8Path> {
        self.mount_root.as_deref()
    }

    pub fn registry_path(&self, dataset: &DatasetId, year: i32) -> Utf8PathBuf {
        self.output_root.join(dataset.registry_file_name(year))
    }

    pub fn schema_path(&self, dataset: &DatasetId) -> Utf8PathBuf {
        self.output_root.join(dataset.schema_file_name())
    }

    pub fn catalog_path(&self) -> Utf8PathBuf {
        self.output_root.join("catalog.json")
    }

    /// Local directory backing a bucket location, `{mount_root}/{bucket}/{key}`.
    pub fn resolve_location(&self, location: &StorageLocation) -> Result<Utf8PathBuf, CatalogError> {
        let mount_root = self.mount_root.as_ref().ok_or_else(|| {
            CatalogError::InvalidConfig(format!(
                "no mount_root configured to read {location}"
            ))
        })?;
        let mut path = mount_root.join(location.bucket());
        for segment in location.key().split(['/', '\\']).filter(|s| !s.is_empty()) {
            if matches!(segment, "." | "..") {
                return Err(CatalogError::InvalidPathFormat(location.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Maps a registry key to a readable local path. Keys carrying a scheme
    /// go through the mount root; everything else is used as given.
    pub fn resolve_file(&self, key: &str) -> Result<Utf8PathBuf, CatalogError> {
        if key.contains("://") {
            let (dir, name) = key
                .rsplit_once('/')
                .ok_or_else(|| CatalogError::InvalidPathFormat(key.to_string()))?;
            let location: StorageLocation = format!("{dir}/").parse()?;
            return Ok(self.resolve_location(&location)?.join(name));
        }
        Ok(Utf8PathBuf::from(key))
    }

    pub fn ensure_output_root(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.output_root.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn file_size(path: &Utf8Path) -> Result<u64, CatalogError> {
        fs::metadata(path.as_std_path())
            .map(|meta| meta.len())
            .map_err(|err| CatalogError::MissingUpstreamInput(format!("{path}: {err}")))
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CatalogError> {
        let mut content = serde_json::to_vec_pretty(value)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        content.push(b'\n');
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".hc-catalog")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .and_then(|_| temp.flush())
            .map_err(|err| CatalogError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("persist {path}: {err}")))?;
        Ok(())
    }

    /// Writes `content` only when `path` does not exist yet. Returns whether
    /// the file was written.
    pub fn write_bytes_if_absent(path: &Utf8Path, content: &[u8]) -> Result<bool, CatalogError> {
        if Self::exists(path) {
            return Ok(false);
        }
        Self::write_bytes_atomic(path, content)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/tmp/out"),
            Some(Utf8PathBuf::from("/s3")),
        );
        let dataset = DatasetId::new(
            "GITM".parse().unwrap(),
            "run1".parse().unwrap(),
            crate::domain::DatasetKind::ModelOutput,
        );
        assert_eq!(store.registry_path(&dataset, 2020), "/tmp/out/GITM-run1_2020.csv");
        assert_eq!(store.schema_path(&dataset), "/tmp/out/GITM-run1_info.json");

        let location: StorageLocation = "s3://helio/ModelOutputs/run1/".parse().unwrap();
        assert_eq!(
            store.resolve_location(&location).unwrap(),
            "/s3/helio/ModelOutputs/run1"
        );
        assert_eq!(
            store.resolve_file("s3://helio/ModelOutputs/run1/a.nc").unwrap(),
            "/s3/helio/ModelOutputs/run1/a.nc"
        );
    }

    #[test]
    fn relative_segments_stay_inside_mount() {
        let store = Store::new_with_paths(Utf8PathBuf::from("/tmp/out"), Some(Utf8PathBuf::from("/s3")));
        for raw in ["s3://helio/../../etc/", "s3://helio/run1/./", "s3://helio/a\\..\\b/"] {
            let location: StorageLocation = raw.parse().unwrap();
            let err = store.resolve_location(&location).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidPathFormat(_)), "{raw}");
        }
        let err = store.resolve_file("s3://helio/../secret.nc").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPathFormat(_)));
    }
}
