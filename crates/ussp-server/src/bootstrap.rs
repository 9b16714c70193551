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
//! Build application state from configuration
//!
//! Seeds adapters, namespaces, clients and users into a fresh
//! [`MemoryStore`]. Seeded adapters use their name as id.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use serde_json::{Map, Value};

use ussp_config::{Config, ReplicationConfig};
use ussp_security::{auth::hash_password, random::generate_client_secret, TokenService};
use ussp_storage::{AdapterDescriptor, AdapterRegistry};

use crate::model::{new_id, Client, Namespace, User};
use crate::persistence::{MemoryStore, Persistence};
use crate::replication::ReplicationQueue;
use crate::security::validate_client_id;
use crate::session::MemorySessionStore;
use crate::state::{AppState, AuthSettings};

/// Id of the adapter created when none is configured
pub const FALLBACK_ADAPTER_ID: &str = "local";

/// Storage root of the fallback adapter
pub const FALLBACK_STORAGE_PATH: &str = "./data/storage";

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| Duration::days(365 * 100))
}

fn fallback_adapter() -> AdapterDescriptor {
    let mut config = Map::new();
    config.insert(
        "basePath".to_string(),
        Value::String(FALLBACK_STORAGE_PATH.to_string()),
    );
    AdapterDescriptor {
        id: FALLBACK_ADAPTER_ID.to_string(),
        name: FALLBACK_ADAPTER_ID.to_string(),
        kind: "local".to_string(),
        config,
        is_default: true,
    }
}

/// Token lifetimes and cookie flags from the `auth` section
pub fn auth_settings(config: &Config) -> anyhow::Result<AuthSettings> {
    let decoy_password_hash = hash_password(&generate_client_secret(), config.auth.bcrypt_cost)
        .context("failed to hash decoy password")?;

    Ok(AuthSettings {
        code_ttl: seconds(config.auth.authorization_code_ttl_secs),
        refresh_token_ttl: seconds(config.auth.refresh_token_ttl_secs),
        session_ttl: seconds(config.auth.session_ttl_secs),
        cookie_secure: config.auth.cookie_secure,
        decoy_password_hash,
    })
}

/// Create state and seed every configured record
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    if config.uses_default_secret() {
        tracing::warn!("auth.jwt_secret is the built-in development secret; set USSP_JWT_SECRET");
    }

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(AdapterRegistry::new());

    seed_adapters(config, store.as_ref(), &registry).await?;
    seed_namespaces(config, store.as_ref()).await?;
    seed_clients(config, store.as_ref()).await?;
    seed_users(config, store.as_ref()).await?;

    let tokens = Arc::new(TokenService::new(
        &config.auth.jwt_secret,
        seconds(config.auth.access_token_ttl_secs),
    ));
    let sessions = Arc::new(MemorySessionStore::new(seconds(config.auth.session_ttl_secs)));

    let state = AppState::new(store, sessions, registry, tokens, auth_settings(config)?)
        .with_max_body_bytes(config.server.max_body_bytes);
    Ok(Arc::new(state))
}

/// Replication worker configured from the `replication` section
pub fn replication_queue(state: &AppState, config: &ReplicationConfig) -> ReplicationQueue {
    ReplicationQueue::new(Arc::clone(&state.persistence), Arc::clone(&state.registry))
        .with_batch_size(config.batch_size)
        .with_poll_interval(StdDuration::from_secs(config.poll_interval_secs))
}

async fn seed_adapters(
    config: &Config,
    store: &dyn Persistence,
    registry: &AdapterRegistry,
) -> anyhow::Result<()> {
    let descriptors: Vec<AdapterDescriptor> = if config.adapters.is_empty() {
        tracing::info!(path = FALLBACK_STORAGE_PATH, "No adapters configured; using local storage");
        vec![fallback_adapter()]
    } else {
        config
            .adapters
            .iter()
            .map(|seed| AdapterDescriptor {
                id: seed.name.clone(),
                name: seed.name.clone(),
                kind: seed.kind.clone(),
                config: seed.config.clone(),
                is_default: seed.is_default,
            })
            .collect()
    };

    for descriptor in descriptors {
        // Construct now so a bad config fails at startup rather than on first use
        registry
            .resolve(&descriptor)
            .await
            .with_context(|| format!("adapter '{}' could not be constructed", descriptor.name))?;
        tracing::info!(
            adapter_id = %descriptor.id,
            kind = %descriptor.kind,
            is_default = descriptor.is_default,
            "Registered adapter"
        );
        store.upsert_adapter(descriptor).await?;
    }
    Ok(())
}

async fn seed_namespaces(config: &Config, store: &dyn Persistence) -> anyhow::Result<()> {
    let default_adapter = store.default_adapter().await?.map(|d| d.id);

    for seed in &config.namespaces {
        let adapter_id = seed.adapter.clone().or_else(|| default_adapter.clone());
        let (namespace, created) = store
            .insert_namespace_if_absent(Namespace {
                id: new_id(),
                name: seed.name.clone(),
                adapter_id,
                quota_bytes: seed.quota_bytes,
                owner_client: seed.owner_client.clone(),
                created_at: Utc::now(),
            })
            .await?;
        if created {
            tracing::info!(namespace = %namespace.name, namespace_id = %namespace.id, "Seeded namespace");
        }
    }
    Ok(())
}

async fn seed_clients(config: &Config, store: &dyn Persistence) -> anyhow::Result<()> {
    for seed in &config.clients {
        if let Err(reason) = validate_client_id(&seed.client_id) {
            bail!("invalid client_id '{}': {}", seed.client_id, reason);
        }
        let (client, created) = store
            .insert_client_if_absent(Client {
                client_id: seed.client_id.clone(),
                secret: seed.secret.clone().unwrap_or_else(generate_client_secret),
                name: seed.name.clone().unwrap_or_else(|| seed.client_id.clone()),
                redirect_uris: seed.redirect_uris.iter().cloned().collect::<BTreeSet<_>>(),
                created_at: Utc::now(),
            })
            .await?;
        if created {
            tracing::info!(client_id = %client.client_id, "Seeded client");
        }
    }
    Ok(())
}

async fn seed_users(config: &Config, store: &dyn Persistence) -> anyhow::Result<()> {
    for seed in &config.users {
        let password_hash = match (&seed.password_hash, &seed.password) {
            (Some(hash), _) => hash.clone(),
            (None, Some(password)) => hash_password(password, config.auth.bcrypt_cost)
                .with_context(|| format!("failed to hash password of user '{}'", seed.username))?,
            (None, None) => bail!("user '{}' has neither password nor password_hash", seed.username),
        };

        store
            .create_user(User {
                id: new_id(),
                username: seed.username.clone(),
                password_hash,
            })
            .await?;
        tracing::info!(username = %seed.username, "Seeded user");
    }
    Ok(())
}
