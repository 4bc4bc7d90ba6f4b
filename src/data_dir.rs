use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable that relocates the cache directory.
pub const DATA_DIR_ENV: &str = "DOCLENS_DATA_DIR";

const CACHE_FILE: &str = "cache.redb";

/// Directory holding the persistent search cache.
///
/// Only one file lives here today: the redb database with the cached
/// documents and the version marker they correspond to.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Pick the cache directory and make sure it exists.
    ///
    /// `--data-dir` wins over [`DATA_DIR_ENV`], which wins over
    /// `$XDG_DATA_HOME/doclens`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) => PathBuf::from(val),
                None => xdg_data_home()?,
            },
        };

        if !root.is_dir() {
            std::fs::create_dir_all(&root)
                .map_err(|_| Error::DataDir(root.clone()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the redb cache, created on first open.
    pub fn cache_db(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("doclens")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}
