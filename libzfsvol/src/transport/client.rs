//! Client for the plugin protocol over a Unix socket, as a container engine
//! would call it.

use std::path::PathBuf;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE as CONTENT_TYPE_HEADER, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, instrument, warn};

use crate::error::TransportError;
use crate::message::{CONTENT_TYPE, PluginRequest, PluginResponse};

/// Sends [`PluginRequest`]s to a plugin listening on a Unix socket.
///
/// Every request uses its own connection.
#[derive(Debug, Clone)]
pub struct PluginClient {
    socket: PathBuf,
}

impl PluginClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Send a request and wait for the decoded response. Driver failures come
    /// back as [`PluginResponse::Error`], not as `Err`.
    #[instrument(skip(self), fields(request = %request))]
    pub async fn request(&self, request: &PluginRequest) -> Result<PluginResponse, TransportError> {
        let stream = UnixStream::connect(&self.socket).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(TransportError::http)?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(error = %e, "plugin connection error");
            }
        });

        let method = request.method();
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/{method}"))
            .header(HOST, "plugin")
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .body(Full::new(Bytes::from(request.body()?)))
            .map_err(TransportError::http)?;

        let resp = sender.send_request(req).await.map_err(TransportError::http)?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(TransportError::http)?
            .to_bytes();
        debug!(%status, len = body.len(), "plugin response received");

        PluginResponse::decode(method, status.is_success(), &body)
    }
}
