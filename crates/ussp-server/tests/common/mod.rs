//! Shared harness for the HTTP integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use serde_json::{Map, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

use ussp_config::{AdapterSeed, Config, UserSeed};
use ussp_security::pkce::{generate_challenge, PkceChallenge};
use ussp_server::{build_state, create_router, AppState};

pub const REDIRECT_URI: &str = "https://acme.example/cb";
pub const PASSWORD: &str = "wonderland";

/// Router plus state over two local adapters and one user, `alice`
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub dir: TempDir,
}

fn local_seed(name: &str, dir: &TempDir, is_default: bool) -> AdapterSeed {
    let mut config = Map::new();
    config.insert(
        "basePath".to_string(),
        Value::String(dir.path().join(name).display().to_string()),
    );
    AdapterSeed {
        name: name.to_string(),
        kind: "local".to_string(),
        is_default,
        config,
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.bcrypt_cost = 4;
    config.adapters = vec![local_seed("primary", dir, true), local_seed("backup", dir, false)];
    config.users = vec![
        UserSeed {
            username: "alice".to_string(),
            password_hash: None,
            password: Some(PASSWORD.to_string()),
        },
        UserSeed {
            username: "bob".to_string(),
            password_hash: None,
            password: Some("builder".to_string()),
        },
    ];
    config
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let state = build_state(&config).await.unwrap();
        let router = create_router(Arc::clone(&state));
        Self { router, state, dir }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn form(pairs: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(pairs).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, body: String, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn post_json(uri: &str, body: &Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(body)
        .unwrap()
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
}

/// Pending authorize request of a client
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub pkce: PkceChallenge,
}

impl AuthorizeRequest {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            state: "s-7f3a".to_string(),
            pkce: generate_challenge(),
        }
    }

    pub fn params(&self) -> Vec<(&str, &str)> {
        vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_challenge", self.pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", self.state.as_str()),
        ]
    }

    pub fn authorize_uri(&self) -> String {
        format!("/oauth/authorize?{}", form(&self.params()))
    }
}

/// Log in and return the `name=value` pair for the Cookie header
pub async fn login(app: &TestApp, request: &AuthorizeRequest, username: &str, password: &str) -> String {
    let mut pairs = vec![("username", username), ("password", password)];
    pairs.extend(request.params());
    let response = app.send(post_form("/oauth/login", form(&pairs), None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

/// Value of the hidden `csrf_token` field on the consent page
pub fn csrf_token(html: &str) -> String {
    let marker = "name=\"csrf_token\" value=\"";
    let start = html.find(marker).unwrap() + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

/// Consent page for a logged-in session, returning its CSRF token
pub async fn consent(app: &TestApp, request: &AuthorizeRequest, cookie: &str) -> String {
    let response = app
        .send(
            Request::builder()
                .uri(request.authorize_uri())
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    csrf_token(&body_text(response).await)
}

/// Approve and return the redirect `Location`
pub async fn approve(app: &TestApp, request: &AuthorizeRequest, cookie: &str, csrf: &str) -> Url {
    let mut pairs = request.params();
    pairs.push(("csrf_token", csrf));
    let response = app
        .send(post_form("/oauth/authorize/approve", form(&pairs), Some(cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    Url::parse(&location(&response).unwrap()).unwrap()
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Run the whole browser leg and return an authorization code
pub async fn authorization_code(app: &TestApp, request: &AuthorizeRequest) -> String {
    let response = app.send(get(&request.authorize_uri())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = login(app, request, "alice", PASSWORD).await;
    let csrf = consent(app, request, &cookie).await;
    let redirect = approve(app, request, &cookie, &csrf).await;
    query_param(&redirect, "code").unwrap()
}

/// Exchange a code and return the token response
pub async fn exchange(app: &TestApp, request: &AuthorizeRequest, code: &str) -> Response<Body> {
    let body = serde_json::json!({
        "grant_type": "authorization_code",
        "code": code,
        "client_id": request.client_id,
        "code_verifier": request.pkce.verifier,
    });
    app.send(post_json("/oauth/token", &body, None)).await
}

/// Full flow for `client_id`, returning an access token
pub async fn access_token(app: &TestApp, client_id: &str) -> String {
    let request = AuthorizeRequest::new(client_id);
    let code = authorization_code(app, &request).await;
    let response = exchange(app, &request, &code).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}
