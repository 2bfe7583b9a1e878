//! Script storage
//!
//! Saved scripts are [`ScriptDocument`]s written as pretty JSON, one
//! `<slug>.json` file per script, in a single directory.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::export::ScriptDocument;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("script '{0}' not found")]
    NotFound(String),
    #[error("'{0}' is not a usable script name")]
    InvalidName(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed script {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEntry {
    pub name: String,
    pub path: PathBuf,
    pub steps: usize,
    pub created_at: DateTime<Utc>,
}

pub struct ScriptStorage {
    dir: PathBuf,
}

impl ScriptStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join(format!("{}.json", slug(name)?)))
    }

    pub async fn save(&self, document: &ScriptDocument) -> Result<PathBuf, StorageError> {
        let path = self.path_for(&document.name)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;
        let body = serde_json::to_vec_pretty(document).map_err(|source| StorageError::Format {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body)
            .await
            .map_err(|source| io_error(&path, source))?;
        debug!(path = %path.display(), steps = document.steps.len(), "script saved");
        Ok(path)
    }

    pub async fn load(&self, name: &str) -> Result<ScriptDocument, StorageError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        read_document(&path).await
    }

    /// Every readable script, oldest first. Unreadable files are skipped.
    pub async fn list(&self) -> Result<Vec<ScriptEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(source) => return Err(io_error(&self.dir, source)),
        };
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|source| io_error(&self.dir, source))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_document(&path).await {
                Ok(document) => entries.push(ScriptEntry {
                    name: document.name,
                    steps: document.steps.len(),
                    created_at: document.created_at,
                    path,
                }),
                Err(err) => warn!(error = %err, "skipping unreadable script"),
            }
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }
}

/// Reads a script document from any path.
pub async fn read_document(path: &Path) -> Result<ScriptDocument, StorageError> {
    let raw = fs::read(path).await.map_err(|source| io_error(path, source))?;
    serde_json::from_slice(&raw).map_err(|source| StorageError::Format {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File-name form of a script name.
fn slug(name: &str) -> Result<String, StorageError> {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        Err(StorageError::InvalidName(name.to_string()))
    } else {
        Ok(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use webtest_core_types::Step;

    #[test]
    fn slugs_are_file_safe() {
        assert_eq!(slug("Login Flow / v2").unwrap(), "login-flow-v2");
        assert_eq!(slug("checkout_2").unwrap(), "checkout_2");
        assert!(slug(" // ").is_err());
    }

    #[tokio::test]
    async fn saved_scripts_load_back() {
        let dir = tempdir().unwrap();
        let storage = ScriptStorage::new(dir.path().join("scripts"));
        let document = ScriptDocument::new(
            "Login Flow",
            "https://example.com",
            vec![Step::navigate("https://example.com/login")],
        );

        let path = storage.save(&document).await.unwrap();
        assert!(path.ends_with("login-flow.json"));
        assert_eq!(storage.load("login flow").await.unwrap(), document);

        let listed = storage.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Login Flow");
        assert_eq!(listed[0].steps, 1);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempdir().unwrap();
        let storage = ScriptStorage::new(dir.path().join("absent"));
        assert!(storage.list().await.unwrap().is_empty());
        assert!(matches!(
            storage.load("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_files_are_skipped_by_list() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        let storage = ScriptStorage::new(dir.path());
        assert!(storage.list().await.unwrap().is_empty());
        assert!(matches!(
            storage.load("broken").await,
            Err(StorageError::Format { .. })
        ));
    }
}
