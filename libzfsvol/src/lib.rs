//! # libzfsvol — ZFS volumes for container hosts
//!
//! `libzfsvol` exposes ZFS datasets as named volumes through the Docker volume
//! plugin protocol. Volumes are datasets exactly one level beneath a set of
//! configured root datasets. It runs on Tokio, logs through `tracing` and
//! reports structured errors with `thiserror`.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, requests, capabilities. |
//! | [`error`] | [`VolumeError`] and the backend, config and transport errors. |
//! | [`resolver`] | [`NameResolver`]: volume name to dataset path. |
//! | [`driver`] | [`VolumeDriver`] trait: the plugin operation set. |
//! | [`dataset`] | [`DatasetBackend`](dataset::DatasetBackend) seam, `zfs` CLI and in-memory backends. |
//! | [`backend`] | [`ZfsDriver`], the driver built on a dataset backend. |
//! | [`message`] | [`PluginRequest`] / [`PluginResponse`] protocol envelope. |
//! | [`transport`] | HTTP server lifecycle, socket hand-off, client. |
//! | [`config`] | Validated [`PluginConfig`]. |
//! | [`logging`] | Subscriber setup with an explicit level. |

pub mod backend;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod logging;
pub mod message;
pub mod resolver;
pub mod transport;
pub mod types;

pub use backend::ZfsDriver;
pub use config::PluginConfig;
pub use driver::VolumeDriver;
pub use error::{ConfigError, DatasetError, TransportError, VolumeError};
pub use message::{PluginRequest, PluginResponse};
pub use resolver::NameResolver;
pub use types::*;
