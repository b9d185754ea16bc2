//! Shared test support: an in-process HTTP volume stub and a master
//! spawned on an ephemeral port.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use volt_core::index::IndexApi;
use volt_index_memory::MemoryIndex;
use volt_master::{Master, MasterConfig};

/// A volume server stub: stores whatever PUT hands it, keyed by URI path.
pub struct Volume {
    pub endpoint: String,
    pub blobs: Arc<DashMap<String, Bytes>>,
    addr: SocketAddr,
    delay: Option<Duration>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct StubState {
    blobs: Arc<DashMap<String, Bytes>>,
    delay: Option<Duration>,
}

async fn volume_handler(State(stub): State<StubState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match method {
        Method::PUT => {
            if let Some(delay) = stub.delay {
                tokio::time::sleep(delay).await;
            }
            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .unwrap();
            stub.blobs.insert(path, body);
            empty_status(StatusCode::CREATED)
        }
        Method::GET => match stub.blobs.get(&path) {
            Some(blob) => Response::new(Body::from(blob.value().clone())),
            None => empty_status(StatusCode::NOT_FOUND),
        },
        Method::HEAD => match stub.blobs.get(&path) {
            Some(blob) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, blob.value().len())
                .body(Body::empty())
                .unwrap(),
            None => empty_status(StatusCode::NOT_FOUND),
        },
        Method::DELETE => {
            if stub.blobs.remove(&path).is_some() {
                empty_status(StatusCode::NO_CONTENT)
            } else {
                empty_status(StatusCode::NOT_FOUND)
            }
        }
        _ => empty_status(StatusCode::METHOD_NOT_ALLOWED),
    }
}

fn empty_status(status: StatusCode) -> Response {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    res
}

impl Volume {
    pub async fn spawn() -> Volume {
        Self::spawn_with_delay(None).await
    }

    /// A stub that delays PUTs, to hold a write fan-out in flight.
    pub async fn spawn_with_delay(delay: Option<Duration>) -> Volume {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let blobs = Arc::new(DashMap::new());
        let task = serve_stub(listener, blobs.clone(), delay);
        Volume {
            endpoint: format!("127.0.0.1:{}", addr.port()),
            blobs,
            addr,
            delay,
            task,
        }
    }

    /// Stops answering; connections to the endpoint are refused.
    pub async fn stop(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }

    /// Comes back up on the same endpoint, keeping the stored blobs.
    pub async fn restart(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        let listener = loop {
            match tokio::net::TcpListener::bind(self.addr).await {
                Ok(listener) => break listener,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        };
        self.task = serve_stub(listener, self.blobs.clone(), self.delay);
    }

    /// The stub's copy of a blob, keyed by the on-volume URI path
    /// (subvolume prefix included).
    pub fn blob(&self, path: &str) -> Option<Bytes> {
        self.blobs.get(path).map(|b| b.value().clone())
    }
}

fn serve_stub(
    listener: tokio::net::TcpListener,
    blobs: Arc<DashMap<String, Bytes>>,
    delay: Option<Duration>,
) -> JoinHandle<()> {
    let app = axum::Router::new()
        .fallback(volume_handler)
        .with_state(StubState { blobs, delay });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    })
}

/// A running master over a `MemoryIndex`, plus the pieces tests poke at.
pub struct TestMaster {
    pub base: String,
    pub index: Arc<MemoryIndex>,
    pub config: MasterConfig,
}

pub async fn spawn_volumes(n: usize) -> Vec<Volume> {
    let mut volumes = Vec::with_capacity(n);
    for _ in 0..n {
        volumes.push(Volume::spawn().await);
    }
    volumes
}

pub fn test_config(volumes: &[Volume], replicas: usize) -> MasterConfig {
    MasterConfig {
        listen: "127.0.0.1:0".to_string(),
        index_path: "/tmp/unused".into(),
        volumes: volumes.iter().map(|v| v.endpoint.clone()).collect(),
        replicas,
        subvolumes: 1,
        protect: false,
        md5sum: true,
        voltimeout_ms: 300,
    }
}

pub async fn spawn_master(config: MasterConfig) -> TestMaster {
    let index = Arc::new(MemoryIndex::new());
    let master = Master::new(config.clone(), index.clone() as Arc<dyn IndexApi>).unwrap();
    TestMaster {
        base: serve_master(master).await,
        index,
        config,
    }
}

/// Serves an already-assembled master on an ephemeral port and returns its
/// base URL.
pub async fn serve_master(master: Arc<Master>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = master.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// An HTTP client that does not follow the 302 redirects the master hands
/// out.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub fn method(name: &str) -> reqwest::Method {
    reqwest::Method::from_bytes(name.as_bytes()).unwrap()
}

/// Maps a record volume entry ("host:port/0") back to the stub that serves
/// it.
pub fn stub_for<'a>(volumes: &'a [Volume], entry: &str) -> &'a Volume {
    let (endpoint, _) = entry.rsplit_once('/').unwrap();
    volumes
        .iter()
        .find(|v| v.endpoint == endpoint)
        .unwrap_or_else(|| panic!("no stub for volume entry {entry}"))
}
