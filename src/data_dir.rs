use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    strategy::first_some,
};

pub const DATA_DIR_ENV: &str = "REFINDEX_DATA_DIR";
pub const DOCUMENTS_ENV: &str = "REFINDEX_DOCUMENTS";

/// Where the persisted index lives, and the default home of the PDFs.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The REFINDEX_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/refindex/)
    ///
    /// The directory is created if missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = first_some(&[
            &|| explicit.map(Path::to_path_buf),
            &|| env_path(DATA_DIR_ENV),
            &|| xdg::BaseDirectories::with_prefix("refindex").get_data_home(),
        ])
        .ok_or_else(|| {
            Error::Config(
                "no data directory: pass --data-dir or set REFINDEX_DATA_DIR"
                    .into(),
            )
        })?;

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_file(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// The PDF directory: an explicit path (from --documents), then the
    /// REFINDEX_DOCUMENTS environment variable, then `<data dir>/pdfs`.
    pub fn documents_dir(&self, explicit: Option<&Path>) -> PathBuf {
        first_some(&[
            &|| explicit.map(Path::to_path_buf),
            &|| env_path(DOCUMENTS_ENV),
        ])
        .unwrap_or_else(|| self.root.join("pdfs"))
    }
}

/// A non-empty environment variable as a path.
fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
