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

//! Local filesystem storage adapter
//!
//! Files live at `{base_path}/{namespace}/{encoded_name}`:
//! ```text
//! base_path/
//!   3f2a.../          <- namespace key
//!     hello.txt
//!     report.pdf
//! ```
//!
//! # Path safety
//!
//! File names are checked, then encoded into a single path component:
//! - names with a `..` segment fail with [`StorageError::PathEscape`]
//! - empty, dot-prefixed and NUL-bearing names are rejected
//! - `%`, `/` and `\` are percent-encoded (`%25`, `%2F`, `%5C`)
//!
//! The encoding is one-to-one, so distinct names never share a stored file,
//! and [`StorageAdapter::list`] decodes entries back to the names clients sent.
//!
//! After encoding the final path is re-resolved against the canonical base
//! directory. A namespace directory or target file that resolves outside the
//! base (through a symlink, for instance) fails with
//! [`StorageError::PathEscape`].
//!
//! Writes are atomic: data goes to a hidden temp file that is synced and then
//! renamed over the target.

use crate::error::{StorageError, StorageResult};
use crate::{content_fingerprint, mime, resolve_mime, AdapterKind, FileLocation, FileStat, StorageAdapter};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Descriptor config for a local adapter
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Base directory; created when missing
    #[serde(alias = "basePath", alias = "path")]
    pub base_path: PathBuf,
}

/// Local filesystem storage adapter
#[derive(Clone)]
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    /// Create an adapter rooted at `root`, creating the directory if needed
    ///
    /// The root is canonicalized once here; every containment check compares
    /// against the canonical form.
    pub async fn new<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let display = root.display().to_string();

        if !root.exists() {
            fs::create_dir_all(&root)
                .await
                .map_err(|e| StorageError::io(AdapterKind::Local, "", &display, e))?;
        } else if !root.is_dir() {
            return Err(StorageError::invalid_config(format!(
                "path exists but is not a directory: {}",
                display
            )));
        }

        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| StorageError::io(AdapterKind::Local, "", &display, e))?;

        Ok(LocalAdapter { root })
    }

    /// Build from a descriptor config
    pub async fn from_config(config: LocalConfig) -> StorageResult<Self> {
        Self::new(config.base_path).await
    }

    /// Canonical base directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode a client-supplied file name into a single safe path component
    pub fn encode_name(name: &str) -> StorageResult<String> {
        if name.contains('\0') {
            return Err(StorageError::invalid_name("file name contains NUL"));
        }
        if name.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(StorageError::path_escape("", name));
        }
        if name.is_empty() {
            return Err(StorageError::invalid_name("file name is empty"));
        }
        if name.starts_with('.') {
            return Err(StorageError::invalid_name(format!(
                "file name may not start with '.': {}",
                name
            )));
        }

        Ok(name
            .replace('%', "%25")
            .replace('/', "%2F")
            .replace('\\', "%5C"))
    }

    /// Reverse [`LocalAdapter::encode_name`] for an on-disk entry
    pub fn decode_name(encoded: &str) -> Option<String> {
        urlencoding::decode(encoded).ok().map(|name| name.into_owned())
    }

    fn validate_namespace(namespace: &str) -> StorageResult<()> {
        if namespace.is_empty()
            || namespace.starts_with('.')
            || namespace.contains(['/', '\\', '\0'])
        {
            return Err(StorageError::invalid_name(format!(
                "invalid namespace key: {:?}",
                namespace
            )));
        }
        Ok(())
    }

    /// Resolve the absolute path for `(namespace, name)` and verify containment
    async fn resolve(&self, namespace: &str, name: &str) -> StorageResult<(PathBuf, String)> {
        Self::validate_namespace(namespace)?;
        let encoded = Self::encode_name(name).map_err(|e| match e {
            StorageError::PathEscape { .. } => StorageError::path_escape(namespace, name),
            other => other,
        })?;

        let mut dir = self.root.join(namespace);
        match fs::canonicalize(&dir).await {
            Ok(canonical) => {
                if !canonical.starts_with(&self.root) {
                    return Err(StorageError::path_escape(namespace, name));
                }
                dir = canonical;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(AdapterKind::Local, namespace, name, e)),
        }

        let path = dir.join(&encoded);
        if !path.starts_with(&self.root) || path.parent() != Some(dir.as_path()) {
            return Err(StorageError::path_escape(namespace, name));
        }

        // An existing target may itself be a link pointing elsewhere
        match fs::canonicalize(&path).await {
            Ok(canonical) if !canonical.starts_with(&self.root) => {
                return Err(StorageError::path_escape(namespace, name));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(AdapterKind::Local, namespace, name, e)),
        }

        Ok((path, encoded))
    }

    fn io_err(namespace: &str, name: &str, err: std::io::Error) -> StorageError {
        StorageError::from_io(AdapterKind::Local, namespace, name, err)
    }
}

impl fmt::Debug for LocalAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAdapter")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Local
    }

    async fn upload(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> StorageResult<FileLocation> {
        let (path, encoded) = self.resolve(namespace, name).await?;
        let io_err = |e: std::io::Error| StorageError::io(AdapterKind::Local, namespace, name, e);

        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).await.map_err(io_err)?;

        let temp_path = dir.join(format!(
            ".{}.{}.tmp",
            encoded,
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }

        debug!(namespace, name, size = data.len(), "Stored file on local disk");

        Ok(FileLocation {
            address: path.display().to_string(),
            size: data.len() as u64,
            mime_type: resolve_mime(name, mime_hint),
            fingerprint: content_fingerprint(data),
        })
    }

    async fn download(&self, namespace: &str, name: &str) -> StorageResult<Vec<u8>> {
        let (path, _) = self.resolve(namespace, name).await?;
        fs::read(&path)
            .await
            .map_err(|e| Self::io_err(namespace, name, e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> StorageResult<()> {
        let (path, _) = self.resolve(namespace, name).await?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(namespace, name, "Deleted local file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(namespace, name, e)),
        }
    }

    async fn stat(&self, namespace: &str, name: &str) -> StorageResult<FileStat> {
        let (path, _) = self.resolve(namespace, name).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::io_err(namespace, name, e))?;
        if !metadata.is_file() {
            return Err(StorageError::not_found(AdapterKind::Local, namespace, name));
        }
        let data = fs::read(&path)
            .await
            .map_err(|e| Self::io_err(namespace, name, e))?;

        Ok(FileStat {
            size: metadata.len(),
            mime_type: mime::guess_from_name(name).to_string(),
            fingerprint: content_fingerprint(&data),
        })
    }

    async fn list(&self, namespace: &str) -> StorageResult<Vec<String>> {
        Self::validate_namespace(namespace)?;
        let dir = self.root.join(namespace);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(namespace, "", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_err(namespace, "", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Self::io_err(namespace, "", e))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(encoded) = entry.file_name().to_str() {
                if encoded.starts_with('.') {
                    continue;
                }
                if let Some(name) = Self::decode_name(encoded) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn test_connection(&self) -> bool {
        match fs::metadata(&self.root).await {
            Ok(m) => m.is_dir(),
            Err(_) => false,
        }
    }
}
