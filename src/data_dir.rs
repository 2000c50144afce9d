//! On-disk layout of a dictionary.
//!
//! ```text
//! <root>/
//!   entries.redb    terms, definitions and their children
//!   definitions/    tantivy index over definition text
//! ```

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable naming the dictionary root.
pub const DATA_DIR_ENV: &str = "WORDBANK_DATA_DIR";

const ENTRIES_FILE: &str = "entries.redb";
const DEFINITIONS_SUBDIR: &str = "definitions";

/// A dictionary root that is known to exist.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Open the dictionary root, creating it when missing.
    ///
    /// `--data-dir` beats `WORDBANK_DATA_DIR`, which beats the XDG data
    /// home (`~/.local/share/wordbank`).
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match choose_root(explicit, std::env::var_os(DATA_DIR_ENV)) {
            Some(root) => root,
            None => xdg::BaseDirectories::with_prefix("wordbank")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config("no XDG data home for the dictionary".into())
                })?,
        };
        ensure_dir(&root)?;
        tracing::debug!(root = %root.display(), "using dictionary root");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The redb file holding every record.
    pub fn entries_db(&self) -> PathBuf {
        self.root.join(ENTRIES_FILE)
    }

    /// The definition index directory, created on first use.
    pub fn definitions_dir(&self) -> Result<PathBuf> {
        let dir = self.root.join(DEFINITIONS_SUBDIR);
        ensure_dir(&dir)?;
        Ok(dir)
    }
}

/// Root from the flag or the environment; `None` defers to XDG.
/// An empty environment value counts as unset.
fn choose_root(explicit: Option<&Path>, env: Option<OsString>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        tracing::error!(dir = %dir.display(), error = %e, "cannot create directory");
        Error::DataDir(dir.to_path_buf())
    })
}
