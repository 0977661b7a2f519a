use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libzfsvol::dataset::{Dataset, DatasetBackend, MemoryBackend};
use libzfsvol::message::IMPLEMENTS;
use libzfsvol::transport::{HandedOver, PluginClient, PluginListener, PluginServer};
use libzfsvol::{
    Capabilities, CreateVolumeRequest, DatasetError, MountRequest, NameRequest, PluginRequest,
    PluginResponse, TransportError, ZfsDriver,
};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

/// Memory backend whose `create_recursive` announces itself and then stalls.
struct SlowBackend {
    inner: MemoryBackend,
    delay: Duration,
    started: Notify,
}

impl SlowBackend {
    async fn with_root(root: &str, delay: Duration) -> Self {
        let inner = MemoryBackend::new();
        inner.create_recursive(root, &HashMap::new()).await.unwrap();
        Self {
            inner,
            delay,
            started: Notify::new(),
        }
    }
}

#[async_trait]
impl DatasetBackend for SlowBackend {
    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    async fn create(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        self.inner.create(path, properties).await
    }

    async fn create_recursive(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.create_recursive(path, properties).await
    }

    async fn get(&self, path: &str) -> Result<Dataset, DatasetError> {
        self.inner.get(path).await
    }

    async fn destroy(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        self.inner.destroy(dataset).await
    }

    async fn list_children(&self, dataset: &Dataset) -> Result<Vec<Dataset>, DatasetError> {
        self.inner.list_children(dataset).await
    }

    async fn mount_point(&self, dataset: &Dataset) -> Result<String, DatasetError> {
        self.inner.mount_point(dataset).await
    }

    async fn creation_time(&self, dataset: &Dataset) -> Result<DateTime<Utc>, DatasetError> {
        self.inner.creation_time(dataset).await
    }
}

struct Running {
    socket: PathBuf,
    stop: oneshot::Sender<()>,
    server: JoinHandle<Result<(), TransportError>>,
}

async fn start<B>(dir: &Path, backend: Arc<B>, legacy: bool, timeout: Duration) -> Running
where
    B: DatasetBackend + 'static,
{
    let roots = vec!["tank/docker".to_owned()];
    let driver = ZfsDriver::new(backend, &roots, legacy).await.unwrap();
    let socket = dir.join("plugins").join("zfs.sock");
    let listener = PluginListener::select(HandedOver::default(), &socket).await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(
        PluginServer::new(Arc::new(driver))
            .with_shutdown_timeout(timeout)
            .run(listener, async move {
                let _ = stopped.await;
            }),
    );
    Running {
        socket,
        stop,
        server,
    }
}

#[tokio::test]
async fn volume_round_trip_over_unix_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let running = start(tmp.path(), Arc::clone(&backend), true, Duration::from_secs(5)).await;
    let client = PluginClient::new(&running.socket);

    assert_eq!(
        client.request(&PluginRequest::Activate).await.unwrap(),
        PluginResponse::Activated(vec![IMPLEMENTS.to_owned()])
    );

    let create = CreateVolumeRequest::new("tank/docker/web").with_option("compression", "lz4");
    assert_eq!(
        client.request(&PluginRequest::Create(create)).await.unwrap(),
        PluginResponse::Ok
    );
    assert_eq!(
        backend.properties("tank/docker/web"),
        Some(HashMap::from([("compression".into(), "lz4".into())]))
    );

    match client
        .request(&PluginRequest::Get(NameRequest::new("web")))
        .await
        .unwrap()
    {
        PluginResponse::Volume(v) => {
            assert_eq!(v.name, "web");
            assert_eq!(v.mountpoint, "/tank/docker/web");
            assert!(v.created_at.is_some());
        }
        other => panic!("unexpected response {other}"),
    }

    match client.request(&PluginRequest::List).await.unwrap() {
        PluginResponse::Volumes(volumes) => {
            let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
            assert_eq!(names, ["tank/docker/web", "web"]);
        }
        other => panic!("unexpected response {other}"),
    }

    let mount = MountRequest::new("web", "c0ffee");
    assert_eq!(
        client.request(&PluginRequest::Mount(mount.clone())).await.unwrap(),
        PluginResponse::Mountpoint("/tank/docker/web".into())
    );
    assert_eq!(
        client.request(&PluginRequest::Unmount(mount)).await.unwrap(),
        PluginResponse::Ok
    );
    assert_eq!(
        client.request(&PluginRequest::Capabilities).await.unwrap(),
        PluginResponse::Capabilities(Capabilities::LOCAL)
    );

    let duplicate = CreateVolumeRequest::new("web");
    assert!(
        client
            .request(&PluginRequest::Create(duplicate))
            .await
            .unwrap()
            .is_error()
    );

    assert_eq!(
        client
            .request(&PluginRequest::Remove(NameRequest::new("tank/docker/web")))
            .await
            .unwrap(),
        PluginResponse::Ok
    );
    assert_eq!(
        client
            .request(&PluginRequest::Get(NameRequest::new("web")))
            .await
            .unwrap(),
        PluginResponse::Error("volume tank/docker/web not found".into())
    );

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn in_flight_create_finishes_after_shutdown_signal() {
    let tmp = tempfile::tempdir().unwrap();
    let backend =
        Arc::new(SlowBackend::with_root("tank/docker", Duration::from_millis(800)).await);
    let running = start(tmp.path(), Arc::clone(&backend), false, Duration::from_secs(5)).await;
    let client = PluginClient::new(&running.socket);

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .request(&PluginRequest::Create(CreateVolumeRequest::new(
                    "tank/docker/slow",
                )))
                .await
        })
    };

    backend.started.notified().await;
    running.stop.send(()).unwrap();

    // New connections are refused while the Create is still draining.
    let refused = tokio::time::timeout(Duration::from_millis(400), async {
        while client.request(&PluginRequest::List).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(refused.is_ok(), "listener kept accepting after the shutdown signal");
    assert!(!in_flight.is_finished());

    assert_eq!(in_flight.await.unwrap().unwrap(), PluginResponse::Ok);
    running.server.await.unwrap().unwrap();
    assert!(backend.inner.contains("tank/docker/slow"));

    // The listener is gone once the server has stopped.
    assert!(client.request(&PluginRequest::List).await.is_err());
}

#[tokio::test]
async fn stalled_request_hits_shutdown_deadline() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::with_root("tank/docker", Duration::from_secs(3600)).await);
    let running = start(
        tmp.path(),
        Arc::clone(&backend),
        false,
        Duration::from_millis(200),
    )
    .await;
    let client = PluginClient::new(&running.socket);

    let in_flight = tokio::spawn(async move {
        client
            .request(&PluginRequest::Create(CreateVolumeRequest::new(
                "tank/docker/stuck",
            )))
            .await
    });

    backend.started.notified().await;
    running.stop.send(()).unwrap();

    assert!(matches!(
        running.server.await.unwrap(),
        Err(TransportError::ShutdownTimeout(t)) if t == Duration::from_millis(200)
    ));
    assert!(!backend.inner.contains("tank/docker/stuck"));
    // Connection tasks outlive the aborted server; the process exit reaps them.
    in_flight.abort();
}
