use std::path::{Path, PathBuf};

/// Settings shared by every system opened from one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `systems/`.
    pub root: PathBuf,
    /// Upper bound on case applications per reduction. `None` is unbounded.
    pub reduction_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            reduction_limit: None,
        }
    }
}

impl Config {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn systems_dir(&self) -> PathBuf {
        self.root.join("systems")
    }

    pub fn system_dir(&self, name: &str) -> PathBuf {
        self.systems_dir().join(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
