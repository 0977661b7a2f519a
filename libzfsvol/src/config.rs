//! Startup configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::zfs::DEFAULT_ZFS_BINARY;
use crate::error::ConfigError;

/// Socket bound when no listener is handed over at startup.
pub const DEFAULT_SOCKET_PATH: &str = "/run/docker/plugins/zfs.sock";

/// Time allowed for in-flight requests after a shutdown signal.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Validated plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Root datasets in priority order. The first one also receives legacy
    /// names.
    pub datasets: Vec<String>,
    pub legacy_names: bool,
    pub socket_path: PathBuf,
    pub zfs_binary: PathBuf,
    pub shutdown_timeout: Duration,
}

impl PluginConfig {
    /// Validate and normalise the root dataset list.
    ///
    /// Trailing slashes are trimmed. Empty lists, absolute paths, empty
    /// components, snapshot or bookmark names, and duplicates are rejected.
    pub fn new<I, S>(datasets: I, legacy_names: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        for raw in datasets {
            let root = normalise(raw.as_ref())?;
            if !seen.insert(root.clone()) {
                return Err(ConfigError::DuplicateDataset(root));
            }
            roots.push(root);
        }
        if roots.is_empty() {
            return Err(ConfigError::MissingDatasets);
        }

        Ok(Self {
            datasets: roots,
            legacy_names,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            zfs_binary: PathBuf::from(DEFAULT_ZFS_BINARY),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        })
    }

    pub fn with_socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_zfs_binary(mut self, binary: impl AsRef<Path>) -> Self {
        self.zfs_binary = binary.as_ref().to_path_buf();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

fn normalise(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason| ConfigError::InvalidDataset {
        dataset: raw.to_owned(),
        reason,
    };

    let name = raw.trim().trim_end_matches('/');
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.starts_with('/') {
        return Err(invalid("must be a dataset path, not a filesystem path"));
    }
    if name.split('/').any(str::is_empty) {
        return Err(invalid("empty path component"));
    }
    if name.contains(['@', '#']) {
        return Err(invalid("snapshots and bookmarks cannot hold volumes"));
    }
    Ok(name.to_owned())
}
