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
//! Login sessions
//!
//! A session links the `ussp_session` cookie to the user who logged in and
//! carries the CSRF token embedded in consent forms. Expired sessions are
//! evicted on every store access.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use ussp_security::random::{generate_csrf_token, generate_session_id};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "ussp_session";

/// An authenticated browser session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Cookie value
    pub id: String,
    /// Logged-in user id
    pub user_id: String,
    /// Logged-in user name
    pub username: String,
    /// Token that approve/deny forms must echo back
    pub csrf_token: String,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Storage for login sessions
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Start a session for a user
    async fn create(&self, user_id: &str, username: &str) -> Session;

    /// Look up a live session
    async fn get(&self, id: &str) -> Option<Session>;

    /// End a session
    async fn remove(&self, id: &str);

    /// Number of live sessions
    async fn len(&self) -> usize;
}

/// Process-local [`SessionStore`]
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    /// Create a store whose sessions live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn evict_expired(sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        sessions.retain(|_, s| s.expires_at > now);
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: &str, username: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            csrf_token: generate_csrf_token(),
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        Self::evict_expired(&mut sessions, now);
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        Self::evict_expired(&mut sessions, Utc::now());
        sessions.get(id).cloned()
    }

    async fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        Self::evict_expired(&mut sessions, Utc::now());
    }

    async fn len(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        Self::evict_expired(&mut sessions, Utc::now());
        sessions.len()
    }
}

/// Extract the session id from a `Cookie` header value
pub fn session_id_from_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value starting a session
pub fn session_cookie(session_id: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        max_age.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value ending a session
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::zero(), secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemorySessionStore::new(Duration::hours(1));
        let session = store.create("u1", "alice").await;

        assert_eq!(session.id.len(), 64);
        assert_ne!(session.id, session.csrf_token);
        let found = store.get(&session.id).await.unwrap();
        assert_eq!(found.username, "alice");

        store.remove(&session.id).await;
        assert!(store.get(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_evicted_on_access() {
        let store = MemorySessionStore::new(Duration::seconds(-1));
        let session = store.create("u1", "alice").await;

        assert!(store.get(&session.id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_cookie_parsing() {
        assert_eq!(
            session_id_from_cookie("theme=dark; ussp_session=abc123; other=1"),
            Some("abc123")
        );
        assert_eq!(session_id_from_cookie("ussp_session="), None);
        assert_eq!(session_id_from_cookie("theme=dark"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("abc", Duration::hours(1), true);
        assert!(cookie.starts_with("ussp_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!clear_session_cookie(false).contains("Secure"));
    }
}
