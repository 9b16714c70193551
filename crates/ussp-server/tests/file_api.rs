//! File and backup API over HTTP

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Utc;
use serde_json::json;

use common::*;
use ussp_server::{model::Namespace, ReplicationQueue};
use ussp_storage::content_fingerprint;

async fn namespace_id(app: &TestApp, name: &str) -> String {
    app.state
        .persistence
        .get_namespace_by_name(name)
        .await
        .unwrap()
        .unwrap()
        .id
}

async fn upload(app: &TestApp, token: &str, namespace: &str, path: &str, data: &[u8]) -> StatusCode {
    let uri = format!(
        "/api/files/upload?{}",
        form(&[("namespaceId", namespace), ("path", path)])
    );
    app.send(authed("POST", &uri, token, Body::from(data.to_vec())))
        .await
        .status()
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = TestApp::new().await;

    let response = app.send(get("/api/files?namespaceId=acme-app")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    assert_eq!(body_json(response).await["error"], "unauthorized");

    let response = app
        .send(authed("GET", "/api/backup/status", "not-a-token", Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new().await;
    let token = app
        .state
        .tokens
        .issue_access_token_at("acme-app", Some("u1"), Utc::now() - chrono::Duration::hours(2))
        .unwrap();

    let response = app
        .send(authed("GET", "/api/files?namespaceId=acme-app", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_namespace_of_other_client_is_forbidden() {
    let app = TestApp::new().await;
    let acme = access_token(&app, "acme-app").await;
    let other = access_token(&app, "other-app").await;

    assert_eq!(upload(&app, &acme, "acme-app", "a.txt", b"mine").await, StatusCode::CREATED);
    assert_eq!(
        upload(&app, &other, "acme-app", "a.txt", b"theirs").await,
        StatusCode::FORBIDDEN
    );

    let response = app
        .send(authed(
            "GET",
            "/api/files/download?namespaceId=acme-app&path=a.txt",
            &other,
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_namespace_and_file_are_not_found() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    assert_eq!(
        upload(&app, &token, "no-such-namespace", "a.txt", b"x").await,
        StatusCode::NOT_FOUND
    );

    let response = app
        .send(authed(
            "GET",
            "/api/files/download?namespaceId=acme-app&path=missing.txt",
            &token,
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_traversal_stays_inside_storage_root() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    let status = upload(&app, &token, "acme-app", "../../etc/passwd", b"root:x:0:0").await;
    assert!(
        status == StatusCode::CREATED || status == StatusCode::BAD_REQUEST,
        "unexpected status {}",
        status
    );

    let storage_root = app.dir.path().join("primary").canonicalize().unwrap();
    for entry in walk(app.dir.path()) {
        if entry.is_file() {
            assert!(entry.canonicalize().unwrap().starts_with(&storage_root));
        }
    }
    assert!(!app.dir.path().join("etc").exists());
}

fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[tokio::test]
async fn test_list_overwrite_and_delete() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    assert_eq!(upload(&app, &token, "acme-app", "b.txt", b"one").await, StatusCode::CREATED);
    assert_eq!(upload(&app, &token, "acme-app", "a.txt", b"two").await, StatusCode::CREATED);
    assert_eq!(upload(&app, &token, "acme-app", "a.txt", b"three").await, StatusCode::CREATED);

    let response = app
        .send(authed("GET", "/api/files?namespaceId=acme-app", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let files = body_json(response).await;
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "a.txt");
    assert_eq!(files[0]["sizeBytes"], 5);
    assert_eq!(files[0]["contentFingerprint"], content_fingerprint(b"three"));

    let response = app
        .send(authed(
            "DELETE",
            "/api/files?namespaceId=acme-app&path=a.txt",
            &token,
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send(authed(
            "GET",
            "/api/files/download?namespaceId=acme-app&path=a.txt",
            &token,
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_type_is_mime_hint() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/files/upload?namespaceId=acme-app&path=data")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["mimeType"], "application/json");

    let response = app
        .send(authed(
            "GET",
            "/api/files/download?namespaceId=acme-app&path=data",
            &token,
            Body::empty(),
        ))
        .await;
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_quota_counts_overwrite_delta() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    let mut namespace: Namespace = app
        .state
        .persistence
        .get_namespace_by_name("acme-app")
        .await
        .unwrap()
        .unwrap();
    namespace.id = "quota-ns".to_string();
    namespace.name = "quota-ns".to_string();
    namespace.quota_bytes = Some(10);
    app.state
        .persistence
        .insert_namespace_if_absent(namespace)
        .await
        .unwrap();

    assert_eq!(upload(&app, &token, "quota-ns", "a", &[0; 8]).await, StatusCode::CREATED);
    assert_eq!(upload(&app, &token, "quota-ns", "b", &[0; 3]).await, StatusCode::FORBIDDEN);
    // Replacing 8 bytes with 10 fits
    assert_eq!(upload(&app, &token, "quota-ns", "a", &[0; 10]).await, StatusCode::CREATED);
}

#[tokio::test]
async fn test_namespace_without_adapter_fails_at_file_access() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    app.state
        .persistence
        .insert_namespace_if_absent(Namespace {
            id: "bare".to_string(),
            name: "bare".to_string(),
            adapter_id: None,
            quota_bytes: None,
            owner_client: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(upload(&app, &token, "bare", "a.txt", b"x").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backup_copies_file_between_adapters() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;
    let ns_id = namespace_id(&app, "acme-app").await;

    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    assert_eq!(upload(&app, &token, &ns_id, "photo.raw", &data).await, StatusCode::CREATED);
    let file = app
        .state
        .persistence
        .find_file(&ns_id, "photo.raw")
        .await
        .unwrap()
        .unwrap();

    let body = json!({
        "fileId": file.id,
        "sourceAdapterId": "primary",
        "targetAdapterId": "backup",
    });
    let response = app.send(post_json("/api/backup/create", &body, Some(&token))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let job = body_json(response).await;
    assert_eq!(job["status"], "pending");
    let job_id = job["id"].as_str().unwrap().to_string();

    let queue = ReplicationQueue::new(
        Arc::clone(&app.state.persistence),
        Arc::clone(&app.state.registry),
    );
    assert_eq!(queue.run_once().await.unwrap(), 1);

    let response = app
        .send(authed("GET", &format!("/api/backup/jobs/{}", job_id), &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await;
    assert_eq!(job["status"], "completed");
    assert!(job["completedAt"].is_string());

    let source = app.state.adapter("primary").await.unwrap();
    let target = app.state.adapter("backup").await.unwrap();
    let original = source.download(&ns_id, "photo.raw").await.unwrap();
    let replica = target.download(&ns_id, "photo.raw").await.unwrap();
    assert_eq!(replica.len(), data.len());
    assert_eq!(replica, original);
    assert_eq!(content_fingerprint(&replica), file.content_fingerprint);

    let response = app
        .send(authed("GET", "/api/backup/status?status=completed", &token, Body::empty()))
        .await;
    let jobs = body_json(response).await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_backup_of_vanished_source_fails_cleanly() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;
    let ns_id = namespace_id(&app, "acme-app").await;

    assert_eq!(upload(&app, &token, &ns_id, "gone.txt", b"bye").await, StatusCode::CREATED);
    let file = app
        .state
        .persistence
        .find_file(&ns_id, "gone.txt")
        .await
        .unwrap()
        .unwrap();

    // Bytes disappear behind the record's back
    let source = app.state.adapter("primary").await.unwrap();
    source.delete(&ns_id, "gone.txt").await.unwrap();

    let body = json!({
        "fileId": file.id,
        "sourceAdapterId": "primary",
        "targetAdapterId": "backup",
    });
    let response = app.send(post_json("/api/backup/create", &body, Some(&token))).await;
    let job_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let queue = ReplicationQueue::new(
        Arc::clone(&app.state.persistence),
        Arc::clone(&app.state.registry),
    );
    queue.run_once().await.unwrap();

    let job = app.state.persistence.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status.as_str(), "failed");
    assert!(!job.error_message.unwrap().is_empty());

    let target = app.state.adapter("backup").await.unwrap();
    assert!(!target.exists(&ns_id, "gone.txt").await.unwrap());
}

#[tokio::test]
async fn test_backup_request_validation() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;
    let other = access_token(&app, "other-app").await;
    assert_eq!(upload(&app, &token, "acme-app", "f.txt", b"x").await, StatusCode::CREATED);
    let ns_id = namespace_id(&app, "acme-app").await;
    let file = app.state.persistence.find_file(&ns_id, "f.txt").await.unwrap().unwrap();

    let cases = [
        (json!({ "sourceAdapterId": "primary", "targetAdapterId": "backup" }), &token, StatusCode::BAD_REQUEST),
        (json!({ "fileId": file.id, "sourceAdapterId": "primary", "targetAdapterId": "primary" }), &token, StatusCode::BAD_REQUEST),
        (json!({ "fileId": "nope", "sourceAdapterId": "primary", "targetAdapterId": "backup" }), &token, StatusCode::NOT_FOUND),
        (json!({ "fileId": file.id, "sourceAdapterId": "primary", "targetAdapterId": "tape" }), &token, StatusCode::NOT_FOUND),
        (json!({ "fileId": file.id, "sourceAdapterId": "primary", "targetAdapterId": "backup" }), &other, StatusCode::FORBIDDEN),
    ];
    for (body, bearer, expected) in cases {
        let response = app.send(post_json("/api/backup/create", &body, Some(bearer.as_str()))).await;
        assert_eq!(response.status(), expected, "body: {}", body);
    }

    let response = app
        .send(authed("GET", "/api/backup/status?status=bogus", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(authed("GET", "/api/backup/jobs/missing", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_adapter_connection_check() {
    let app = TestApp::new().await;
    let token = access_token(&app, "acme-app").await;

    let response = app
        .send(authed("GET", "/api/adapters/primary/test", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["connected"], true);
    assert_eq!(report["kind"], "local");

    let response = app
        .send(authed("GET", "/api/adapters/nope/test", &token, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
