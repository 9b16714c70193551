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
//! Adapter probe

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use ussp_security::AuthClient;

use crate::error::ApiResult;
use crate::state::AppState;

/// Routes under `/api/adapters`
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/adapters/:id/test", get(test_adapter))
}

/// Result of a connection probe
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    adapter_id: String,
    kind: String,
    connected: bool,
}

/// GET /api/adapters/:id/test
async fn test_adapter(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Path(id): Path<String>,
) -> ApiResult<Json<ConnectionReport>> {
    let adapter = state.adapter(&id).await?;
    let connected = adapter.test_connection().await;
    tracing::info!(adapter_id = %id, client_id = %client.client_id, connected, "Adapter probe");

    Ok(Json(ConnectionReport {
        adapter_id: id,
        kind: adapter.kind().to_string(),
        connected,
    }))
}
