// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! OAuth2 authorization server routes
//!
//! # Endpoints
//! - GET /oauth/authorize - Login or consent page
//! - POST /oauth/login - Start a session, then resume the authorize request
//! - POST /oauth/logout - End the session
//! - POST /oauth/authorize/approve - Issue a code and redirect back
//! - POST /oauth/authorize/deny - Redirect back with `access_denied`
//! - POST /oauth/token - `authorization_code` and `refresh_token` grants

pub mod flow;
pub mod pages;

pub use flow::{AuthorizeParams, TokenRequest, ValidatedAuthorize};

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, PRAGMA, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;

use ussp_security::{audit, auth::verify_password, constant_time_eq};

use crate::error::{ApiError, ApiResult};
use crate::session::{clear_session_cookie, session_cookie, session_id_from_cookie, Session};
use crate::state::AppState;

/// Routes under `/oauth`, state supplied by the caller
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/authorize/approve", post(approve))
        .route("/oauth/authorize/deny", post(deny))
        .route("/oauth/token", post(token))
        .route("/oauth/login", post(login))
        .route("/oauth/logout", post(logout))
}

/// Login form: credentials plus the pending authorize parameters
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(flatten)]
    params: AuthorizeParams,
}

/// Approve/deny form
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    #[serde(default)]
    csrf_token: Option<String>,
    #[serde(flatten)]
    params: AuthorizeParams,
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_id_from_cookie)
        .map(str::to_string)
}

async fn current_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let id = session_id(headers)?;
    state.sessions.get(&id).await
}

/// GET /oauth/authorize
async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> ApiResult<Response> {
    let request = flow::validate_params(&params)?;
    let client = flow::provision(&state, &request).await?;
    flow::check_redirect_uri(&client, &request.redirect_uri)?;

    let page = match current_session(&state, &headers).await {
        Some(session) => pages::consent_page(&request, &session.username, &session.csrf_token),
        None => pages::login_page(&request.to_params(), None),
    };
    Ok(Html(page).into_response())
}

/// POST /oauth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let user = state.persistence.get_user_by_username(&form.username).await?;

    // Unknown usernames are checked against a decoy so both paths cost one bcrypt
    let hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => state.auth.decoy_password_hash.clone(),
    };
    let password = form.password.clone();
    let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password check failed: {}", e)))?;

    let user = match user {
        Some(user) if matched => user,
        _ => {
            audit::log_authentication_failed(Some(&form.username), "invalid credentials");
            let page = pages::login_page(&form.params, Some("Invalid username or password."));
            return Ok((StatusCode::UNAUTHORIZED, Html(page)).into_response());
        }
    };

    audit::log_authentication_success(&user.id);
    let session = state.sessions.create(&user.id, &user.username).await;
    let cookie = session_cookie(&session.id, state.auth.session_ttl, state.auth.cookie_secure);
    tracing::info!(username = %user.username, "User logged in");

    if form.params.client_id.is_none() {
        return Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response());
    }

    let query = serde_urlencoded::to_string(&form.params)
        .map_err(|e| ApiError::Internal(format!("failed to encode authorize request: {}", e)))?;
    let location = format!("/oauth/authorize?{}", query);
    Ok((StatusCode::SEE_OTHER, [(LOCATION, location), (SET_COOKIE, cookie)]).into_response())
}

/// POST /oauth/logout
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id).await;
    }
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, clear_session_cookie(state.auth.cookie_secure))],
    )
        .into_response()
}

/// Session, CSRF and redirect checks shared by approve and deny
async fn consent_context(
    state: &AppState,
    headers: &HeaderMap,
    form: &ConsentForm,
) -> ApiResult<(Session, ValidatedAuthorize)> {
    let session = current_session(state, headers)
        .await
        .ok_or_else(|| ApiError::Unauthorized("login required".to_string()))?;

    let presented = form.csrf_token.as_deref().unwrap_or_default();
    if !constant_time_eq(presented.as_bytes(), session.csrf_token.as_bytes()) {
        audit::log_access_denied(
            form.params.client_id.as_deref().unwrap_or_default(),
            Some(&session.user_id),
            "oauth consent",
            "csrf token mismatch",
        );
        return Err(ApiError::forbidden("csrf token mismatch"));
    }

    let request = flow::validate_params(&form.params)?;
    let client = state
        .persistence
        .get_client(&request.client_id)
        .await?
        .ok_or_else(|| ApiError::validation(format!("unknown client: {}", request.client_id)))?;
    flow::check_redirect_uri(&client, &request.redirect_uri)?;

    Ok((session, request))
}

/// POST /oauth/authorize/approve
async fn approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> ApiResult<Response> {
    let (session, request) = consent_context(&state, &headers, &form).await?;
    let code = flow::issue_code(&state, &request, &session.user_id).await?;

    let location = flow::redirect_with(
        &request.redirect_uri,
        &[("code", Some(code.as_str())), ("state", request.state.as_deref())],
    )?;
    tracing::info!(client_id = %request.client_id, user_id = %session.user_id, "Consent approved");
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

/// POST /oauth/authorize/deny
async fn deny(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> ApiResult<Response> {
    let (session, request) = consent_context(&state, &headers, &form).await?;
    audit::log_access_denied(
        &request.client_id,
        Some(&session.user_id),
        "oauth consent",
        "user denied consent",
    );

    let location = flow::redirect_with(
        &request.redirect_uri,
        &[("error", Some("access_denied")), ("state", request.state.as_deref())],
    )?;
    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

fn parse_token_request(headers: &HeaderMap, body: &[u8]) -> ApiResult<TokenRequest> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::validation(format!("malformed JSON body: {}", e)))
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| ApiError::validation(format!("malformed form body: {}", e)))
    }
}

/// POST /oauth/token
async fn token(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let result = match parse_token_request(&headers, &body) {
        Ok(request) => flow::grant(&state, &request).await,
        Err(e) => Err(e),
    };

    let mut response = match result {
        Ok(pair) => Json(pair).into_response(),
        Err(e) => e.into_response(),
    };
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
