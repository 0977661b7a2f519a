//! Error types.
//!
//! Per-request failures are represented by [`VolumeError`], which derives
//! [`thiserror::Error`] and [`Serialize`]/[`Deserialize`] so it can be logged
//! structurally and rendered into the plugin protocol's `Err` field.
//! [`DatasetError`] is what a [`DatasetBackend`](crate::dataset::DatasetBackend)
//! reports; [`ConfigError`] and [`TransportError`] cover startup and serving.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for volume operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// The name does not map to a dataset one level beneath a configured root.
    #[error("invalid volume name {0:?}: not a direct child of a configured dataset")]
    InvalidName(String),

    /// The resolved dataset already exists.
    #[error("volume {0} already exists")]
    AlreadyExists(String),

    /// The resolved dataset does not exist.
    #[error("volume {0} not found")]
    NotFound(String),

    /// Any other error reported by the dataset backend.
    #[error("backend error: {0}")]
    BackendFailure(String),
}

impl VolumeError {
    /// Create a [`VolumeError::BackendFailure`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::BackendFailure(e.to_string())
    }
}

/// Errors reported by a dataset backend.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// No dataset with this name exists.
    #[error("dataset {0} does not exist")]
    NotFound(String),

    /// A dataset with this name already exists.
    #[error("dataset {0} already exists")]
    AlreadyExists(String),

    /// The backend refused the operation.
    #[error("{operation} {dataset}: {reason}")]
    Failed {
        operation: &'static str,
        dataset: String,
        reason: String,
    },

    /// The `zfs` command exited unsuccessfully.
    #[error("`zfs {args}` exited with {code:?}: {stderr}")]
    Command {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Output from the backend could not be interpreted.
    #[error("unexpected output for {dataset}: {reason}")]
    Parse { dataset: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<DatasetError> for VolumeError {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::NotFound(name) => Self::NotFound(name),
            DatasetError::AlreadyExists(name) => Self::AlreadyExists(name),
            other => Self::backend(other),
        }
    }
}

/// Invalid or missing startup configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No root dataset was configured.
    #[error("zfs dataset name is a required field")]
    MissingDatasets,

    /// A root dataset name cannot hold volumes.
    #[error("invalid dataset name {dataset:?}: {reason}")]
    InvalidDataset {
        /// Name as given on the command line or in the environment.
        dataset: String,
        /// Which rule it breaks.
        reason: &'static str,
    },

    /// The same root appears twice after normalisation.
    #[error("dataset {0} is configured more than once")]
    DuplicateDataset(String),
}

/// Errors raised while binding, serving, or talking to the plugin endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The default socket could not be created.
    #[error("bind {path}: {source}")]
    Bind {
        /// Socket path being bound.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A handed-over socket or its environment variables are unusable.
    #[error("socket activation: {0}")]
    Activation(String),

    /// The request named a method this plugin does not implement.
    #[error("unknown plugin method {0}")]
    UnknownMethod(String),

    /// A request or response body did not match its method's shape.
    #[error("malformed {method} payload: {reason}")]
    Malformed {
        /// Plugin method the body belongs to.
        method: String,
        /// Decoder message.
        reason: String,
    },

    /// HTTP-level failure on the client side.
    #[error("http: {0}")]
    Http(String),

    /// The serving worker failed.
    #[error("plugin server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// The serving worker stopped before a shutdown was requested.
    #[error("plugin server stopped without a shutdown request")]
    Closed,

    /// In-flight requests did not finish within the shutdown deadline.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// Any other I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a [`TransportError::Http`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn http<E: std::fmt::Display>(e: E) -> Self {
        Self::Http(e.to_string())
    }
}
