//! In-process stand-in for the Triton blob service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::Router;

pub const OBJECT_ID: &str = "x-objectid";
pub const HASH_TYPE: &str = "x-hash-type";
pub const SERVER_TOKEN: &str = "x-mozy-server-token";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub hash_type: Option<String>,
    pub object_id: Option<String>,
    pub len: usize,
}

#[derive(Default)]
pub struct MockBackend {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub raw_objects: Mutex<HashMap<String, Bytes>>,
    pub sessions: Mutex<HashMap<String, Vec<u8>>>,
    pub requests: Mutex<Vec<Recorded>>,
    /// Id handed out when an upload session is opened.
    pub session_id: Mutex<String>,
    /// Answer every append with another redirect.
    pub redirect_every_append: Mutex<bool>,
    /// Status returned for appends to an existing session.
    pub append_status: Mutex<Option<u16>>,
    /// Status returned for single-shot creates.
    pub create_status: Mutex<Option<u16>>,
    /// Status returned for HEAD on an upload session.
    pub head_status: Mutex<Option<u16>>,
    /// Open sessions with a 303 that has no `Location`.
    pub omit_location: Mutex<bool>,
    tokens_issued: Mutex<u32>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        *backend.session_id.lock().unwrap() = "session-42".to_string();
        Arc::new(backend)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn object(&self, id: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    pub fn session_bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    fn record(&self, method: Method, path: String, headers: &HeaderMap, len: usize) {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(Recorded {
            method,
            path,
            token: get(SERVER_TOKEN),
            hash_type: get(HASH_TYPE),
            object_id: get(OBJECT_ID),
            len,
        });
    }

    fn next_token(&self) -> String {
        let mut issued = self.tokens_issued.lock().unwrap();
        *issued += 1;
        format!("token-{}", *issued)
    }
}

/// Serve `backend` on an ephemeral port and return its base URL.
pub async fn spawn(backend: Arc<MockBackend>) -> String {
    let app = Router::new()
        .route("/blob", post(open_session))
        .route("/blob/", post(create_object))
        .route(
            "/blob/{id}",
            axum::routing::get(fetch_object)
                .head(head_session)
                .post(append_chunk)
                .delete(delete_object),
        )
        .route("/raw/{id}", put(raw_store).get(raw_fetch))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn open_session(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.record(Method::POST, "/blob".to_string(), &headers, body.len());
    let id = backend.session_id.lock().unwrap().clone();
    backend
        .sessions
        .lock()
        .unwrap()
        .insert(id.clone(), body.to_vec());

    if *backend.omit_location.lock().unwrap() {
        return (StatusCode::SEE_OTHER, "no location").into_response();
    }

    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, format!("/blob/{}", id)),
            (header::HeaderName::from_static(SERVER_TOKEN), backend.next_token()),
        ],
    )
        .into_response()
}

async fn append_chunk(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.record(Method::POST, format!("/blob/{}", id), &headers, body.len());

    if *backend.redirect_every_append.lock().unwrap() {
        return (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, "/blob/another-session".to_string())],
        )
            .into_response();
    }
    if let Some(status) = *backend.append_status.lock().unwrap() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, "append rejected").into_response();
    }

    let mut sessions = backend.sessions.lock().unwrap();
    match sessions.get_mut(&id) {
        Some(data) => {
            data.extend_from_slice(&body);
            (
                StatusCode::OK,
                [(header::HeaderName::from_static(SERVER_TOKEN), backend.next_token())],
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "no such session").into_response(),
    }
}

async fn head_session(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.record(Method::HEAD, format!("/blob/{}", id), &headers, 0);
    if let Some(status) = *backend.head_status.lock().unwrap() {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    match backend.sessions.lock().unwrap().get(&id) {
        Some(data) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .body(Body::empty())
            .unwrap(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_object(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.record(Method::POST, "/blob/".to_string(), &headers, body.len());

    if let Some(status) = *backend.create_status.lock().unwrap() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, "create rejected").into_response();
    }
    let Some(id) = headers.get(OBJECT_ID).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing object id").into_response();
    };
    backend.objects.lock().unwrap().insert(id.to_string(), body);
    StatusCode::CREATED.into_response()
}

async fn fetch_object(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.record(Method::GET, format!("/blob/{}", id), &headers, 0);
    match backend.object(&id) {
        Some(data) => (StatusCode::OK, data).into_response(),
        None => (StatusCode::NOT_FOUND, "no such object").into_response(),
    }
}

async fn delete_object(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.record(Method::DELETE, format!("/blob/{}", id), &headers, 0);
    match backend.objects.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::OK.into_response(),
        None => (StatusCode::NOT_FOUND, "no such object").into_response(),
    }
}

async fn raw_store(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.record(Method::PUT, format!("/raw/{}", id), &headers, body.len());
    backend.raw_objects.lock().unwrap().insert(id, body);
    StatusCode::NO_CONTENT.into_response()
}

async fn raw_fetch(
    State(backend): State<Arc<MockBackend>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.record(Method::GET, format!("/raw/{}", id), &headers, 0);
    match backend.raw_objects.lock().unwrap().get(&id).cloned() {
        Some(data) => (StatusCode::OK, data).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
