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

//! Storage error types
//!
//! Every adapter failure carries the adapter kind, namespace and path so the
//! caller can diagnose it. Adapter configuration values are never part of a
//! message.

use crate::AdapterKind;
use std::io;
use thiserror::Error;

/// Boxed underlying failure carried by [`StorageError::Io`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object absent from the backend
    #[error("{kind} adapter: object not found: {namespace}/{path}")]
    NotFound {
        /// Adapter that reported the miss
        kind: AdapterKind,
        /// Namespace key
        namespace: String,
        /// File name within the namespace
        path: String,
    },

    /// Resolved path would leave the adapter's base directory
    #[error("path escapes storage root: {namespace}/{path}")]
    PathEscape {
        /// Namespace key
        namespace: String,
        /// Offending file name as supplied
        path: String,
    },

    /// Namespace key or file name is unusable (empty, dot-prefixed, etc.)
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Backend I/O failure
    #[error("{kind} adapter I/O error on {namespace}/{path}: {source}")]
    Io {
        /// Adapter that failed
        kind: AdapterKind,
        /// Namespace key
        namespace: String,
        /// File name within the namespace
        path: String,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// Descriptor kind outside the supported set
    #[error("unknown adapter kind: {0}")]
    UnknownAdapterKind(String),

    /// Descriptor config failed to parse or validate
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Create a NotFound error
    pub fn not_found(kind: AdapterKind, namespace: &str, path: &str) -> Self {
        StorageError::NotFound {
            kind,
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    /// Create a PathEscape error
    pub fn path_escape(namespace: &str, path: &str) -> Self {
        StorageError::PathEscape {
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    /// Create an InvalidName error
    pub fn invalid_name<S: Into<String>>(msg: S) -> Self {
        StorageError::InvalidName(msg.into())
    }

    /// Create an InvalidConfig error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        StorageError::InvalidConfig(msg.into())
    }

    /// Wrap a backend failure with its location
    pub fn io<E>(kind: AdapterKind, namespace: &str, path: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Io {
            kind,
            namespace: namespace.to_string(),
            path: path.to_string(),
            source: source.into(),
        }
    }

    /// Translate an `io::Error`, keeping `NotFound` distinct
    pub fn from_io(kind: AdapterKind, namespace: &str, path: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::not_found(kind, namespace, path)
        } else {
            Self::io(kind, namespace, path, err)
        }
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Check if this error signals an attempted traversal
    pub fn is_path_escape(&self) -> bool {
        matches!(self, StorageError::PathEscape { .. })
    }
}
