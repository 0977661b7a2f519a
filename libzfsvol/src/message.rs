//! Volume plugin protocol messages.
//!
//! Every call is an HTTP `POST /<method>` carrying a JSON body. The method
//! name selects the [`PluginRequest`] variant; the reply is a
//! [`PluginResponse`], whose JSON shape depends on the variant. Failures are
//! reported as `{"Err": "<message>"}`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::types::*;

/// Content type used for every request and response body.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

/// Plugin subsystem implemented by this driver.
pub const IMPLEMENTS: &str = "VolumeDriver";

pub const ACTIVATE: &str = "Plugin.Activate";
pub const CREATE: &str = "VolumeDriver.Create";
pub const REMOVE: &str = "VolumeDriver.Remove";
pub const MOUNT: &str = "VolumeDriver.Mount";
pub const PATH: &str = "VolumeDriver.Path";
pub const UNMOUNT: &str = "VolumeDriver.Unmount";
pub const GET: &str = "VolumeDriver.Get";
pub const LIST: &str = "VolumeDriver.List";
pub const CAPABILITIES: &str = "VolumeDriver.Capabilities";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A decoded plugin call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginRequest {
    /// Handshake: which subsystems does the plugin implement.
    Activate,
    Create(CreateVolumeRequest),
    Remove(NameRequest),
    Mount(MountRequest),
    Path(NameRequest),
    Unmount(MountRequest),
    Get(NameRequest),
    List,
    Capabilities,
}

impl PluginRequest {
    /// Decode the body of a call to `method`. An empty body is read as `{}`.
    pub fn decode(method: &str, body: &[u8]) -> Result<Self, TransportError> {
        Ok(match method {
            ACTIVATE => Self::Activate,
            CREATE => Self::Create(parse(method, body)?),
            REMOVE => Self::Remove(parse(method, body)?),
            MOUNT => Self::Mount(parse(method, body)?),
            PATH => Self::Path(parse(method, body)?),
            UNMOUNT => Self::Unmount(parse(method, body)?),
            GET => Self::Get(parse(method, body)?),
            LIST => Self::List,
            CAPABILITIES => Self::Capabilities,
            other => return Err(TransportError::UnknownMethod(other.to_owned())),
        })
    }

    /// Method name this request is sent to.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Activate => ACTIVATE,
            Self::Create(_) => CREATE,
            Self::Remove(_) => REMOVE,
            Self::Mount(_) => MOUNT,
            Self::Path(_) => PATH,
            Self::Unmount(_) => UNMOUNT,
            Self::Get(_) => GET,
            Self::List => LIST,
            Self::Capabilities => CAPABILITIES,
        }
    }

    /// JSON request body.
    pub fn body(&self) -> Result<Vec<u8>, TransportError> {
        let body = match self {
            Self::Activate | Self::List | Self::Capabilities => Ok(b"{}".to_vec()),
            Self::Create(req) => serde_json::to_vec(req),
            Self::Remove(req) | Self::Path(req) | Self::Get(req) => serde_json::to_vec(req),
            Self::Mount(req) | Self::Unmount(req) => serde_json::to_vec(req),
        };
        body.map_err(|e| malformed(self.method(), e))
    }
}

impl fmt::Display for PluginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(req) => write!(f, "Create(name={})", req.name),
            Self::Remove(req) => write!(f, "Remove({})", req.name),
            Self::Mount(req) => write!(f, "Mount({}, id={})", req.name, req.id),
            Self::Path(req) => write!(f, "Path({})", req.name),
            Self::Unmount(req) => write!(f, "Unmount({}, id={})", req.name, req.id),
            Self::Get(req) => write!(f, "Get({})", req.name),
            Self::Activate => f.write_str("Activate"),
            Self::List => f.write_str("List"),
            Self::Capabilities => f.write_str("Capabilities"),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Reply to a plugin call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginResponse {
    /// Subsystems implemented, in reply to [`PluginRequest::Activate`].
    Activated(Vec<String>),
    /// Success without payload (`Create`, `Remove`, `Unmount`).
    Ok,
    /// Mountpoint (`Mount`, `Path`).
    Mountpoint(String),
    Volume(Volume),
    Volumes(Vec<Volume>),
    Capabilities(Capabilities),
    /// The call failed; carries the message sent as `Err`.
    Error(String),
}

#[derive(Serialize, Deserialize)]
struct ActivateBody {
    #[serde(rename = "Implements")]
    implements: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct MountpointBody {
    #[serde(rename = "Mountpoint")]
    mountpoint: String,
}

#[derive(Serialize, Deserialize)]
struct VolumeBody {
    #[serde(rename = "Volume")]
    volume: Volume,
}

#[derive(Serialize, Deserialize)]
struct VolumesBody {
    #[serde(rename = "Volumes", default)]
    volumes: Option<Vec<Volume>>,
}

#[derive(Serialize, Deserialize)]
struct CapabilitiesBody {
    #[serde(rename = "Capabilities")]
    capabilities: Capabilities,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Err")]
    err: String,
}

impl PluginResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// JSON body for this response.
    pub fn to_json(&self) -> Value {
        let body = match self {
            Self::Activated(implements) => serde_json::to_value(ActivateBody {
                implements: implements.clone(),
            }),
            Self::Ok => Ok(Value::Object(Default::default())),
            Self::Mountpoint(mp) => serde_json::to_value(MountpointBody {
                mountpoint: mp.clone(),
            }),
            Self::Volume(volume) => serde_json::to_value(VolumeBody {
                volume: volume.clone(),
            }),
            Self::Volumes(volumes) => serde_json::to_value(VolumesBody {
                volumes: Some(volumes.clone()),
            }),
            Self::Capabilities(capabilities) => serde_json::to_value(CapabilitiesBody {
                capabilities: *capabilities,
            }),
            Self::Error(err) => serde_json::to_value(ErrorBody { err: err.clone() }),
        };
        // These bodies contain only strings, maps and lists.
        body.unwrap_or(Value::Null)
    }

    /// Decode the reply to a call to `method`. A non-success reply is read as
    /// an `Err` body.
    pub fn decode(method: &str, success: bool, body: &[u8]) -> Result<Self, TransportError> {
        if !success {
            let ErrorBody { err } = parse::<ErrorBody>(method, body)?;
            return Ok(Self::Error(err));
        }
        // Error bodies may also arrive with a success status.
        if let Ok(ErrorBody { err }) = serde_json::from_slice::<ErrorBody>(body)
            && !err.is_empty()
        {
            return Ok(Self::Error(err));
        }

        Ok(match method {
            ACTIVATE => {
                let ActivateBody { implements } = parse::<ActivateBody>(method, body)?;
                Self::Activated(implements)
            }
            CREATE | REMOVE | UNMOUNT => Self::Ok,
            MOUNT | PATH => {
                let MountpointBody { mountpoint } = parse::<MountpointBody>(method, body)?;
                Self::Mountpoint(mountpoint)
            }
            GET => {
                let VolumeBody { volume } = parse::<VolumeBody>(method, body)?;
                Self::Volume(volume)
            }
            LIST => {
                let VolumesBody { volumes } = parse::<VolumesBody>(method, body)?;
                Self::Volumes(volumes.unwrap_or_default())
            }
            CAPABILITIES => {
                let CapabilitiesBody { capabilities } = parse::<CapabilitiesBody>(method, body)?;
                Self::Capabilities(capabilities)
            }
            other => return Err(TransportError::UnknownMethod(other.to_owned())),
        })
    }
}

impl fmt::Display for PluginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated(implements) => write!(f, "Activated({})", implements.join(",")),
            Self::Ok => f.write_str("Ok"),
            Self::Mountpoint(mp) => write!(f, "Mountpoint({mp})"),
            Self::Volume(v) => write!(f, "Volume({})", v.name),
            Self::Volumes(vs) => write!(f, "Volumes(count={})", vs.len()),
            Self::Capabilities(c) => write!(f, "Capabilities({:?})", c.scope),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}

fn parse<T: DeserializeOwned>(method: &str, body: &[u8]) -> Result<T, TransportError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| malformed(method, e))
}

fn malformed(method: &str, e: impl fmt::Display) -> TransportError {
    TransportError::Malformed {
        method: method.to_owned(),
        reason: e.to_string(),
    }
}
