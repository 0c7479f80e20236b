use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::TrafficError;

/// Filesystem layout for one project workspace: fetched exports under
/// `data/fetched/`, rendered reports under `output/`, and the versioned
/// taxonomy cache under `.taxonomy_cache/`.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, TrafficError> {
        let cwd = std::env::current_dir().map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| TrafficError::Filesystem("non-utf8 working directory".to_string()))?;
        Ok(Self::new_with_root(&root))
    }

    pub fn new_with_root(root: &Utf8Path) -> Self {
        Self {
            data_dir: root.join("data").join("fetched"),
            output_dir: root.join("output"),
            cache_dir: root.join(".taxonomy_cache"),
        }
    }

    pub fn new_with_paths(
        data_dir: Utf8PathBuf,
        output_dir: Utf8PathBuf,
        cache_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            data_dir,
            output_dir,
            cache_dir,
        }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    pub fn ensure_data_dir(&self) -> Result<(), TrafficError> {
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))
    }

    pub fn ensure_output_dir(&self) -> Result<(), TrafficError> {
        fs::create_dir_all(self.output_dir.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_dir(&self) -> Result<(), TrafficError> {
        fs::create_dir_all(self.cache_dir.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))
    }

    pub fn export_path(&self, file_name: &str) -> Utf8PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> Utf8PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TrafficError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<(), TrafficError> {
        Self::write_bytes_atomic(path, content.as_bytes())
    }
}

/// Point a named reference at an immutable versioned file. A relative
/// symlink where the platform supports it; a physical copy otherwise.
/// Readers only ever dereference the pointer, so both resolve identically.
pub fn update_latest_pointer(pointer: &Utf8Path, target: &Utf8Path) -> Result<(), TrafficError> {
    // symlink_metadata so a dangling link still gets replaced.
    if fs::symlink_metadata(pointer.as_std_path()).is_ok() {
        fs::remove_file(pointer.as_std_path())
            .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
    }

    let target_name = target
        .file_name()
        .ok_or_else(|| TrafficError::Filesystem("latest pointer target has no name".to_string()))?;

    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(target_name, pointer.as_std_path()).is_ok() {
            return Ok(());
        }
    }

    fs::copy(target.as_std_path(), pointer.as_std_path())
        .map_err(|err| TrafficError::Filesystem(err.to_string()))?;
    Ok(())
}
