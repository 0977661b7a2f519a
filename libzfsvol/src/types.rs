//! Core volume types: records, requests, and capabilities.
//!
//! Field names follow the Docker volume plugin wire format (`Name`,
//! `Mountpoint`, `Opts`, ...), so these types are serialized directly into
//! request and response bodies by [`crate::message`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Volume records
// ---------------------------------------------------------------------------

/// A volume as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// Name as seen by the caller: the full dataset path, or the bare leaf
    /// name for legacy entries.
    #[serde(rename = "Name")]
    pub name: String,
    /// Live mountpoint reported by the backend.
    #[serde(rename = "Mountpoint", default)]
    pub mountpoint: String,
    /// RFC 3339 creation timestamp, when the backend could provide one.
    #[serde(rename = "CreatedAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Volume {
    pub fn new(name: impl Into<String>, mountpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mountpoint: mountpoint.into(),
            created_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    #[serde(rename = "Name")]
    pub name: String,
    /// Passed through verbatim as dataset properties.
    #[serde(rename = "Opts", default, deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
}

impl CreateVolumeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Request carrying only a volume name (`Get`, `Path`, `Remove`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

impl NameRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Request to mount or unmount a volume on behalf of a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountRequest {
    #[serde(rename = "Name")]
    pub name: String,
    /// Opaque caller id (a container id for Docker).
    #[serde(rename = "ID", default)]
    pub id: String,
}

impl MountRequest {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Visibility of the volumes a driver manages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes exist on this host only.
    Local,
    /// Volumes are visible cluster-wide.
    Global,
}

/// Capabilities advertised by a volume driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    #[serde(rename = "Scope")]
    pub scope: Scope,
}

impl Capabilities {
    pub const LOCAL: Self = Self {
        scope: Scope::Local,
    };
}

/// Docker sends `"Opts": null` when no options were given.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
