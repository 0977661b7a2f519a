//! HTTP server that accepts plugin calls on a [`PluginListener`] and
//! dispatches them to a [`VolumeDriver`].

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::sync::Notify;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SHUTDOWN_TIMEOUT;
use crate::driver::VolumeDriver;
use crate::error::TransportError;
use crate::message::{CONTENT_TYPE, IMPLEMENTS, PluginRequest, PluginResponse};
use crate::transport::listener::PluginListener;

/// Serves a [`VolumeDriver`] over the plugin protocol.
pub struct PluginServer<D> {
    driver: Arc<D>,
    shutdown_timeout: Duration,
}

impl<D> PluginServer<D>
where
    D: VolumeDriver + 'static,
{
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// How long in-flight requests may take to finish once shutdown starts.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Serve on `listener` until `signal` resolves, then shut down gracefully.
    ///
    /// Serving happens on a spawned worker. If the worker stops before the
    /// signal, its error is returned ([`TransportError::Closed`] if it stopped
    /// cleanly). After the signal no new connections are accepted and in-flight
    /// requests get `shutdown_timeout` to complete; past that the worker is
    /// aborted and [`TransportError::ShutdownTimeout`] is returned.
    pub async fn run<F>(self, listener: PluginListener, signal: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()> + Send,
    {
        info!(%listener, "volume plugin listening");
        let shutdown = Arc::new(Notify::new());
        let mut worker = tokio::spawn(serve(
            listener,
            router(Arc::clone(&self.driver)),
            Arc::clone(&shutdown),
        ));

        tokio::select! {
            res = &mut worker => {
                let err = match flatten(res) {
                    Ok(()) => TransportError::Closed,
                    Err(e) => e,
                };
                error!(error = %err, "error running handler");
                return Err(err);
            }
            () = signal => info!("shutdown signal received, draining requests"),
        }

        shutdown.notify_one();
        match tokio::time::timeout(self.shutdown_timeout, &mut worker).await {
            Err(_) => {
                worker.abort();
                error!(timeout = ?self.shutdown_timeout, "error shutting down server");
                Err(TransportError::ShutdownTimeout(self.shutdown_timeout))
            }
            Ok(res) => match flatten(res) {
                Ok(()) => {
                    info!("volume plugin stopped");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "error in handler after shutdown");
                    Err(e)
                }
            },
        }
    }
}

fn flatten(res: Result<io::Result<()>, JoinError>) -> Result<(), TransportError> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::Serve(e)),
        Err(e) => Err(TransportError::Serve(io::Error::other(e))),
    }
}

async fn serve(listener: PluginListener, router: Router, shutdown: Arc<Notify>) -> io::Result<()> {
    let signal = async move { shutdown.notified().await };
    match listener {
        PluginListener::Unix(l) => axum::serve(l, router).with_graceful_shutdown(signal).await,
        PluginListener::Tcp(l) => axum::serve(l, router).with_graceful_shutdown(signal).await,
    }
}

/// Routes `POST /<method>` to `driver`.
pub fn router<D>(driver: Arc<D>) -> Router
where
    D: VolumeDriver + 'static,
{
    Router::new()
        .route("/{method}", post(handle::<D>))
        .with_state(driver)
}

#[instrument(skip_all, fields(method = %method))]
async fn handle<D>(State(driver): State<Arc<D>>, Path(method): Path<String>, body: Bytes) -> Response
where
    D: VolumeDriver + 'static,
{
    let request = match PluginRequest::decode(&method, &body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting plugin call");
            let status = match e {
                TransportError::UnknownMethod(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            return reply(status, &PluginResponse::Error(e.to_string()));
        }
    };

    debug!(%request, "plugin call received");
    let response = dispatch(driver.as_ref(), request).await;
    debug!(%response, "plugin call answered");
    response.into_response()
}

/// Map a [`PluginRequest`] to the matching driver call and wrap the result.
pub async fn dispatch<D>(driver: &D, request: PluginRequest) -> PluginResponse
where
    D: VolumeDriver + ?Sized,
{
    let result = match request {
        PluginRequest::Activate => Ok(PluginResponse::Activated(vec![IMPLEMENTS.to_owned()])),
        PluginRequest::Create(req) => driver.create(req).await.map(|()| PluginResponse::Ok),
        PluginRequest::Remove(req) => driver.remove(&req.name).await.map(|()| PluginResponse::Ok),
        PluginRequest::Mount(req) => driver.mount(req).await.map(PluginResponse::Mountpoint),
        PluginRequest::Path(req) => driver.path(&req.name).await.map(PluginResponse::Mountpoint),
        PluginRequest::Unmount(req) => driver.unmount(req).await.map(|()| PluginResponse::Ok),
        PluginRequest::Get(req) => driver.get(&req.name).await.map(PluginResponse::Volume),
        PluginRequest::List => driver.list().await.map(PluginResponse::Volumes),
        PluginRequest::Capabilities => Ok(PluginResponse::Capabilities(driver.capabilities())),
    };
    result.unwrap_or_else(|e| {
        warn!(error = %e, "volume operation failed");
        PluginResponse::Error(e.to_string())
    })
}

fn reply(status: StatusCode, response: &PluginResponse) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        response.to_json().to_string(),
    )
        .into_response()
}

impl IntoResponse for PluginResponse {
    fn into_response(self) -> Response {
        let status = if self.is_error() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        reply(status, &self)
    }
}
