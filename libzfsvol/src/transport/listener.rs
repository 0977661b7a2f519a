//! Listening endpoints: sockets handed over at startup, or the default Unix
//! socket.
//!
//! Hand-off follows the systemd convention: `LISTEN_PID` names the process the
//! sockets are meant for and `LISTEN_FDS` counts them, starting at fd 3.

use std::fmt;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::sys::socket::{
    AddressFamily, SockType, SockaddrLike, SockaddrStorage, getsockname, getsockopt, sockopt,
};
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// First file descriptor passed by the service manager.
pub const LISTEN_FDS_START: RawFd = 3;

/// Permissions applied to a socket file this process creates.
const SOCKET_MODE: u32 = 0o660;

/// Sockets handed over at startup.
///
/// Only the first descriptor is adopted; the others are recorded so the
/// caller can report them, and are never touched.
#[derive(Debug, Default)]
pub struct HandedOver {
    pub first: Option<PluginListener>,
    pub ignored: Vec<RawFd>,
}

/// A bound endpoint the plugin server can accept on.
#[derive(Debug)]
pub enum PluginListener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl PluginListener {
    /// Bind the default Unix socket at `path`, replacing a stale socket file
    /// and creating the parent directory if needed.
    pub async fn bind_unix(path: &Path) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(bind_err)?;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_err(e)),
        }

        let listener = UnixListener::bind(path).map_err(bind_err)?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))
            .await
            .map_err(bind_err)?;
        info!(path = %path.display(), "plugin socket bound");
        Ok(Self::Unix(listener))
    }

    /// Adopt an already-listening socket.
    ///
    /// # Safety
    ///
    /// `fd` must be an open socket that nothing else owns. It is closed if it
    /// cannot be adopted.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Result<Self, TransportError> {
        // SAFETY: caller guarantees `fd` is open and unowned.
        Self::from_owned_fd(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Adopt a listening stream socket.
    ///
    /// The descriptor is marked close-on-exec so `zfs` child processes do not
    /// inherit it; its address family picks the listener type. Datagram and
    /// non-listening sockets are rejected.
    pub fn from_owned_fd(fd: OwnedFd) -> Result<Self, TransportError> {
        let raw = fd.as_raw_fd();
        let activation_err =
            |what: &str, e: nix::Error| TransportError::Activation(format!("fd {raw}: {what}: {e}"));

        fcntl(raw, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|e| activation_err("set close-on-exec", e))?;

        let kind = getsockopt(&fd, sockopt::SockType).map_err(|e| activation_err("SO_TYPE", e))?;
        if kind != SockType::Stream {
            return Err(TransportError::Activation(format!(
                "fd {raw}: not a stream socket ({kind:?})"
            )));
        }
        if !getsockopt(&fd, sockopt::AcceptConn).map_err(|e| activation_err("SO_ACCEPTCONN", e))? {
            return Err(TransportError::Activation(format!(
                "fd {raw}: socket is not listening"
            )));
        }

        let addr: SockaddrStorage =
            getsockname(raw).map_err(|e| activation_err("getsockname", e))?;
        match addr.family() {
            Some(AddressFamily::Unix) => {
                let std = std::os::unix::net::UnixListener::from(fd);
                std.set_nonblocking(true)?;
                Ok(Self::Unix(UnixListener::from_std(std)?))
            }
            Some(AddressFamily::Inet | AddressFamily::Inet6) => {
                let std = std::net::TcpListener::from(fd);
                std.set_nonblocking(true)?;
                Ok(Self::Tcp(TcpListener::from_std(std)?))
            }
            other => Err(TransportError::Activation(format!(
                "fd {raw}: unsupported address family {other:?}"
            ))),
        }
    }

    /// Sockets handed to this process.
    pub fn from_env() -> Result<HandedOver, TransportError> {
        let fds = activation_fds(
            std::env::var("LISTEN_PID").ok().as_deref(),
            std::env::var("LISTEN_FDS").ok().as_deref(),
            nix::unistd::getpid().as_raw(),
        )?;
        // SAFETY: the service manager passed these descriptors to this process
        // and nothing else in it has claimed them.
        unsafe { adopt_first(fds) }
    }

    /// Pick the endpoint to serve on: the first handed-over socket, or a
    /// freshly bound Unix socket at `default_path` when there is none.
    pub async fn select(handed: HandedOver, default_path: &Path) -> Result<Self, TransportError> {
        if !handed.ignored.is_empty() {
            warn!(
                ignored = ?handed.ignored,
                "driver does not support multiple sockets, using the first"
            );
        }
        match handed.first {
            Some(listener) => {
                debug!(listener = %listener, "using handed-over socket");
                Ok(listener)
            }
            None => {
                debug!("no sockets handed over, binding default endpoint");
                Self::bind_unix(default_path).await
            }
        }
    }

    /// Filesystem path for Unix listeners.
    pub fn unix_path(&self) -> Option<PathBuf> {
        match self {
            Self::Unix(l) => l
                .local_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(Path::to_path_buf)),
            Self::Tcp(_) => None,
        }
    }
}

impl fmt::Display for PluginListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(_) => match self.unix_path() {
                Some(path) => write!(f, "unix:{}", path.display()),
                None => f.write_str("unix:<unnamed>"),
            },
            Self::Tcp(l) => match l.local_addr() {
                Ok(addr) => write!(f, "tcp:{addr}"),
                Err(_) => f.write_str("tcp:<unknown>"),
            },
        }
    }
}

/// Adopt the first of `fds`; the rest are only recorded.
///
/// # Safety
///
/// The first descriptor must be an open socket that nothing else owns.
unsafe fn adopt_first(mut fds: impl Iterator<Item = RawFd>) -> Result<HandedOver, TransportError> {
    let Some(first) = fds.next() else {
        return Ok(HandedOver::default());
    };
    // SAFETY: forwarded from the caller.
    let first = unsafe { PluginListener::from_raw_fd(first) }?;
    let ignored: Vec<RawFd> = fds.collect();
    for &fd in &ignored {
        warn!(fd, "ignoring extra handed-over socket");
    }
    Ok(HandedOver {
        first: Some(first),
        ignored,
    })
}

/// Descriptors handed to process `pid`, from the raw `LISTEN_PID` and
/// `LISTEN_FDS` values. Sockets meant for another process are ignored.
fn activation_fds(
    listen_pid: Option<&str>,
    listen_fds: Option<&str>,
    pid: i32,
) -> Result<std::ops::Range<RawFd>, TransportError> {
    let none = LISTEN_FDS_START..LISTEN_FDS_START;
    let (Some(listen_pid), Some(listen_fds)) = (listen_pid, listen_fds) else {
        return Ok(none);
    };

    let target: i32 = listen_pid
        .trim()
        .parse()
        .map_err(|e| TransportError::Activation(format!("LISTEN_PID {listen_pid:?}: {e}")))?;
    if target != pid {
        debug!(target, pid, "sockets were handed to another process");
        return Ok(none);
    }

    let count: RawFd = listen_fds
        .trim()
        .parse()
        .map_err(|e| TransportError::Activation(format!("LISTEN_FDS {listen_fds:?}: {e}")))?;
    if count < 0 {
        return Err(TransportError::Activation(format!(
            "LISTEN_FDS {count} is negative"
        )));
    }
    let end = LISTEN_FDS_START.checked_add(count).ok_or_else(|| {
        TransportError::Activation(format!("LISTEN_FDS {count} is out of range"))
    })?;
    Ok(LISTEN_FDS_START..end)
}
