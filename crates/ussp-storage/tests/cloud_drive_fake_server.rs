//! Cloud drive adapter tests against an in-process fake Drive API
//!
//! The fake implements just enough of the v3 surface (token refresh, name
//! queries, multipart create/update, media download, trash) to drive the
//! adapter end to end without network access.

use axum::body::Bytes;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ussp_storage::cloud_drive::{CloudDriveAdapter, CloudDriveConfig};
use ussp_storage::{content_fingerprint, StorageAdapter};

const FOLDER_ID: &str = "folder-1";
const ACCESS_TOKEN: &str = "fake-access";
const REFRESH_TOKEN: &str = "rt-1";

struct FakeFile {
    name: String,
    parents: Vec<String>,
    mime_type: String,
    app_properties: HashMap<String, String>,
    data: Vec<u8>,
    trashed: bool,
}

#[derive(Default)]
struct FakeState {
    files: HashMap<String, FakeFile>,
    next_id: u64,
    token_requests: u32,
    fail_next_uploads: u32,
    reject_next_auth: bool,
}

type Shared = Arc<Mutex<FakeState>>;

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let mut state = state.lock().unwrap();
    if state.reject_next_auth {
        state.reject_next_auth = false;
        return false;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", ACCESS_TOKEN).as_str())
}

/// Read a single-quoted, backslash-escaped literal following `marker`
fn quoted_after(query: &str, marker: &str) -> Option<String> {
    let start = query.find(marker)? + marker.len();
    let mut out = String::new();
    let mut chars = query[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '\'' => return Some(out),
            other => out.push(other),
        }
    }
    None
}

fn split_related(headers: &HeaderMap, body: &[u8]) -> (Value, String, Vec<u8>) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    let boundary = content_type.split("boundary=").nth(1).unwrap();
    let delimiter = format!("--{}", boundary).into_bytes();

    let mut positions = Vec::new();
    let mut i = 0;
    while i + delimiter.len() <= body.len() {
        if body[i..].starts_with(&delimiter) {
            positions.push(i);
            i += delimiter.len();
        } else {
            i += 1;
        }
    }
    assert!(positions.len() >= 3, "expected two parts");

    let part = |n: usize| -> (String, Vec<u8>) {
        let raw = &body[positions[n] + delimiter.len()..positions[n + 1]];
        let raw = raw.strip_prefix(b"\r\n").unwrap();
        let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8(raw[..split].to_vec()).unwrap();
        let content = raw[split + 4..raw.len() - 2].to_vec();
        (head, content)
    };

    let (_, metadata) = part(0);
    let (media_head, data) = part(1);
    let mime = media_head.trim_start_matches("Content-Type: ").to_string();
    (serde_json::from_slice(&metadata).unwrap(), mime, data)
}

fn file_json(id: &str, file: &FakeFile) -> Value {
    json!({
        "id": id,
        "name": file.name,
        "size": file.data.len().to_string(),
        "mimeType": file.mime_type,
        "appProperties": file.app_properties,
    })
}

fn app_properties(metadata: &Value) -> HashMap<String, String> {
    serde_json::from_value(metadata["appProperties"].clone()).unwrap_or_default()
}

async fn token(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("grant_type").map(String::as_str) != Some("refresh_token")
        || form.get("refresh_token").map(String::as_str) != Some(REFRESH_TOKEN)
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    state.lock().unwrap().token_requests += 1;
    Json(json!({"access_token": ACCESS_TOKEN, "expires_in": 3600, "token_type": "Bearer"}))
        .into_response()
}

async fn list_files(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let q = params.get("q").cloned().unwrap_or_default();
    let state = state.lock().unwrap();

    let in_folder = q.contains(&format!("'{}' in parents", FOLDER_ID));
    let by_name = quoted_after(&q, "name='");
    let by_namespace = quoted_after(&q, "value='");

    let files: Vec<Value> = state
        .files
        .iter()
        .filter(|(_, f)| !f.trashed && in_folder && f.parents.iter().any(|p| p == FOLDER_ID))
        .filter(|(_, f)| by_name.as_ref().map_or(true, |n| &f.name == n))
        .filter(|(_, f)| {
            by_namespace
                .as_ref()
                .map_or(true, |ns| f.app_properties.get("namespace") == Some(ns))
        })
        .map(|(id, f)| file_json(id, f))
        .collect();

    Json(json!({ "files": files })).into_response()
}

async fn get_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == FOLDER_ID {
        return Json(json!({ "id": id })).into_response();
    }
    let state = state.lock().unwrap();
    match state.files.get(&id).filter(|f| !f.trashed) {
        Some(file) if params.get("alt").map(String::as_str) == Some("media") => {
            file.data.clone().into_response()
        }
        Some(file) => Json(file_json(&id, file)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn patch_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut state = state.lock().unwrap();
    match state.files.get_mut(&id) {
        Some(file) => {
            if body["trashed"] == json!(true) {
                file.trashed = true;
            }
            Json(json!({ "id": id })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_upload(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut state = state.lock().unwrap();
    if state.fail_next_uploads > 0 {
        state.fail_next_uploads -= 1;
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let (metadata, mime, data) = split_related(&headers, &body);
    state.next_id += 1;
    let id = format!("file-{}", state.next_id);
    let parents = serde_json::from_value(metadata["parents"].clone()).unwrap_or_default();
    state.files.insert(
        id.clone(),
        FakeFile {
            name: metadata["name"].as_str().unwrap_or_default().to_string(),
            parents,
            mime_type: mime,
            app_properties: app_properties(&metadata),
            data,
            trashed: false,
        },
    );
    Json(json!({ "id": id })).into_response()
}

async fn update_upload(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (metadata, mime, data) = split_related(&headers, &body);
    let mut state = state.lock().unwrap();
    match state.files.get_mut(&id) {
        Some(file) => {
            file.mime_type = mime;
            file.app_properties = app_properties(&metadata);
            file.data = data;
            Json(json!({ "id": id })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_fake_drive() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeState::default()));
    let app = Router::new()
        .route("/token", post(token))
        .route("/drive/files", get(list_files))
        .route("/drive/files/:id", get(get_file).patch(patch_file))
        .route("/upload/files", post(create_upload))
        .route("/upload/files/:id", patch(update_upload))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn adapter_for(base: &str, folder: &str) -> CloudDriveAdapter {
    let config: CloudDriveConfig = serde_json::from_value(json!({
        "clientId": "cid",
        "clientSecret": "secret",
        "refreshToken": REFRESH_TOKEN,
        "folderId": folder,
        "apiBase": format!("{}/drive", base),
        "uploadBase": format!("{}/upload", base),
        "tokenUrl": format!("{}/token", base),
    }))
    .unwrap();
    CloudDriveAdapter::new(config).unwrap()
}

#[tokio::test]
async fn test_upload_download_stat_roundtrip() {
    let (base, _state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    let location = adapter
        .upload("ns", "hello.txt", b"hi there", None)
        .await
        .unwrap();
    assert_eq!(location.address, "file-1");
    assert_eq!(location.mime_type, "text/plain");
    assert_eq!(location.fingerprint, content_fingerprint(b"hi there"));

    assert_eq!(adapter.download("ns", "hello.txt").await.unwrap(), b"hi there");

    let stat = adapter.stat("ns", "hello.txt").await.unwrap();
    assert_eq!(stat.size, 8);
    assert_eq!(stat.fingerprint, location.fingerprint);
    assert_eq!(stat.mime_type, "text/plain");
}

#[tokio::test]
async fn test_overwrite_updates_existing_object() {
    let (base, state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    adapter.upload("ns", "a.bin", b"one", None).await.unwrap();
    let second = adapter.upload("ns", "a.bin", b"two", None).await.unwrap();

    assert_eq!(second.address, "file-1");
    assert_eq!(state.lock().unwrap().files.len(), 1);
    assert_eq!(adapter.download("ns", "a.bin").await.unwrap(), b"two");
}

#[tokio::test]
async fn test_missing_and_delete_semantics() {
    let (base, _state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    assert!(adapter.download("ns", "nope").await.unwrap_err().is_not_found());
    assert!(adapter.stat("ns", "nope").await.unwrap_err().is_not_found());
    adapter.delete("ns", "nope").await.unwrap();

    adapter.upload("ns", "gone.txt", b"x", None).await.unwrap();
    assert!(adapter.exists("ns", "gone.txt").await.unwrap());
    adapter.delete("ns", "gone.txt").await.unwrap();
    assert!(!adapter.exists("ns", "gone.txt").await.unwrap());
    adapter.delete("ns", "gone.txt").await.unwrap();
}

#[tokio::test]
async fn test_list_filters_by_namespace() {
    let (base, _state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    adapter.upload("ns-a", "b.txt", b"1", None).await.unwrap();
    adapter.upload("ns-a", "a.txt", b"2", None).await.unwrap();
    adapter.upload("ns-b", "c.txt", b"3", None).await.unwrap();

    assert_eq!(adapter.list("ns-a").await.unwrap(), vec!["a.txt", "b.txt"]);
    assert_eq!(adapter.list("ns-b").await.unwrap(), vec!["c.txt"]);
    assert!(adapter.list("ns-c").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_names_with_quotes_are_escaped() {
    let (base, _state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    adapter.upload("ns", "it's.txt", b"quoted", None).await.unwrap();
    assert_eq!(adapter.download("ns", "it's.txt").await.unwrap(), b"quoted");
}

#[tokio::test]
async fn test_retries_server_errors() {
    let (base, state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);
    state.lock().unwrap().fail_next_uploads = 1;

    adapter.upload("ns", "retry.txt", b"ok", None).await.unwrap();
    assert_eq!(adapter.download("ns", "retry.txt").await.unwrap(), b"ok");
}

#[tokio::test]
async fn test_persistent_server_errors_surface_as_io() {
    let (base, state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);
    state.lock().unwrap().fail_next_uploads = 10;

    let err = adapter.upload("ns", "x.txt", b"x", None).await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(err.to_string().contains("cloud_drive"));
}

#[tokio::test]
async fn test_token_is_cached_and_refreshed_on_401() {
    let (base, state) = spawn_fake_drive().await;
    let adapter = adapter_for(&base, FOLDER_ID);

    adapter.upload("ns", "a.txt", b"a", None).await.unwrap();
    adapter.download("ns", "a.txt").await.unwrap();
    assert_eq!(state.lock().unwrap().token_requests, 1);

    state.lock().unwrap().reject_next_auth = true;
    adapter.download("ns", "a.txt").await.unwrap();
    assert_eq!(state.lock().unwrap().token_requests, 2);
}

#[tokio::test]
async fn test_connection_probe() {
    let (base, _state) = spawn_fake_drive().await;
    assert!(adapter_for(&base, FOLDER_ID).test_connection().await);
    assert!(!adapter_for(&base, "no-such-folder").test_connection().await);
}
