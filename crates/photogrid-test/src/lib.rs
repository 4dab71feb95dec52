//! Helpers for testing the photogrid service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`image_server`], make sure that the server is held until
//!    all requests to it have been made. If the server is dropped, the ports
//!    remain open and all connections to it will time out. To avoid this,
//!    assign it to a variable: `let server = test::image_server();`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, Request};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

use photogrid_sources::{CameraInfo, PhotoId, PhotoReference, RoverApiConfig};

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the photogrid
///    crates and mutes all other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("photogrid_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Deterministic fake image contents for the given photo id.
pub fn image_bytes(id: u64) -> Vec<u8> {
    // JPEG SOI marker followed by the id, repeated to give the payload some
    // weight.
    let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0];
    bytes.extend(std::iter::repeat_n(id.to_le_bytes(), 32).flatten());
    bytes
}

/// A [`PhotoReference`] whose image lives on the given test server.
pub fn photo_reference(id: u64, server: &Server) -> PhotoReference {
    PhotoReference {
        id: PhotoId::new(id),
        sol: 1000,
        camera: CameraInfo {
            name: "FHAZ".into(),
            full_name: "Front Hazard Avoidance Camera".into(),
        },
        img_src: server.url(&format!("/photos/{id}.jpg")),
        earth_date: "2015-05-30".into(),
    }
}

/// A [`RoverApiConfig`] pointing at the given test server.
pub fn api_config(server: &Server) -> RoverApiConfig {
    RoverApiConfig {
        url: server.url("/api/"),
        api_key: "TEST_KEY".into(),
        headers: Default::default(),
    }
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a
/// `tokio::test`. It automatically stops serving when dropped. All requests
/// are counted and can be inspected via [`accesses`](Self::accesses).
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl Server {
    fn start<F>(make_router: F) -> Self
    where
        F: FnOnce(Url) -> Router,
    {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let base = format!("http://localhost:{}/", socket.port())
            .parse()
            .unwrap();

        let hits = Arc::new(Mutex::new(BTreeMap::new()));
        let hitcounter = {
            let hits = Arc::clone(&hits);
            move |req: Request, next: Next| {
                let hits = Arc::clone(&hits);
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(req.uri().path().to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = make_router(base).layer(middleware::from_fn(hitcounter));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            hits,
        }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }

    /// Returns the total number of requests served so far, and resets the
    /// counters.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns the number of requests per path served so far, and resets the
    /// counters.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn serve_photo(name: &str) -> Response {
    let id: u64 = match name.trim_end_matches(".jpg").parse() {
        Ok(id) => id,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        Body::from(image_bytes(id)),
    )
        .into_response()
}

/// Spawns an image server for tests.
///
/// The server serves deterministic image bytes (see [`image_bytes`]) under
/// `/photos/<id>.jpg`, a rover photo API under `/api/`, and a few routes
/// useful for error injection:
///
///  - `/delay/<duration>/<id>.jpg` serves a photo after the given delay.
///  - `/respond_statuscode/<num>/...` responds with the given status code.
pub fn image_server() -> Server {
    Server::start(|base| {
        Router::new()
            .route(
                "/photos/:name",
                get(|Path(name): Path<String>| async move { serve_photo(&name) }),
            )
            .route(
                "/delay/:time/:name",
                get(|Path((time, name)): Path<(String, String)>| async move {
                    let duration = humantime::parse_duration(&time).unwrap();
                    tokio::time::sleep(duration).await;

                    serve_photo(&name)
                }),
            )
            .route(
                "/respond_statuscode/:num/*tail",
                get(|Path((num, _)): Path<(u16, String)>| async move {
                    StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
            .route(
                "/api/manifests/:rover",
                get(|Path(rover): Path<String>| async move { Json(manifest_json(&rover)) }),
            )
            .route(
                "/api/rovers/:rover/photos",
                get(move |Path(rover): Path<String>| {
                    let base = base.clone();
                    async move { Json(photos_json(&rover, &base)) }
                }),
            )
    })
}

fn manifest_json(rover: &str) -> serde_json::Value {
    serde_json::json!({
        "photo_manifest": {
            "name": rover,
            "landing_date": "2012-08-06",
            "status": "active",
            "max_sol": 1000,
            "total_photos": 13,
            "photos": [
                { "sol": 25, "earth_date": "2012-08-31", "total_photos": 10, "cameras": ["FHAZ", "MAST"] },
                { "sol": 1000, "earth_date": "2015-05-30", "total_photos": 3, "cameras": ["FHAZ"] }
            ]
        }
    })
}

fn photos_json(rover: &str, base: &Url) -> serde_json::Value {
    let photos: Vec<_> = (1..=3u64)
        .map(|n| {
            serde_json::json!({
                "id": 100 + n,
                "sol": 1000,
                "camera": { "id": 20, "name": "FHAZ", "full_name": "Front Hazard Avoidance Camera" },
                "img_src": base.join(&format!("photos/{}.jpg", 100 + n)).unwrap(),
                "earth_date": "2015-05-30",
                "rover": { "id": 5, "name": rover }
            })
        })
        .collect();

    serde_json::json!({ "photos": photos })
}
