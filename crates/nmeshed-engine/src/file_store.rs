// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A disk-backed [`QueueStore`], one JSON file per workspace, for embedders
//! (CLI tools, desktop hosts) that have no browser `IndexedDB`/key-value
//! store to inject and just want the offline queue to survive a restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::queue::{QueueEntry, QueueStore, QueueStoreError};

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: String,
    value: Vec<u8>,
    timestamp: u64,
}

impl From<&QueueEntry> for PersistedEntry {
    fn from(e: &QueueEntry) -> Self {
        Self {
            key: e.key.clone(),
            value: e.value.clone(),
            timestamp: e.timestamp,
        }
    }
}

impl From<PersistedEntry> for QueueEntry {
    fn from(e: PersistedEntry) -> Self {
        Self {
            key: e.key,
            value: e.value,
            timestamp: e.timestamp,
        }
    }
}

pub struct FileQueueStore {
    dir: PathBuf,
}

impl FileQueueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, workspace_id: &str) -> PathBuf {
        // workspace ids are opaque strings; percent-encode to keep the
        // result a safe filename regardless of content.
        self.dir
            .join(format!("{}.json", urlencoding::encode(workspace_id)))
    }
}

#[async_trait::async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self, workspace_id: &str) -> Result<Vec<QueueEntry>, QueueStoreError> {
        let path = self.path_for(workspace_id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let entries: Vec<PersistedEntry> = serde_json::from_slice(&bytes)
                    .map_err(|e| QueueStoreError::Backend(e.to_string()))?;
                Ok(entries.into_iter().map(Into::into).collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(QueueStoreError::Backend(e.to_string())),
        }
    }

    async fn save(&self, workspace_id: &str, entries: &[QueueEntry]) -> Result<(), QueueStoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| QueueStoreError::Backend(e.to_string()))?;
        let persisted: Vec<PersistedEntry> = entries.iter().map(Into::into).collect();
        let bytes = serde_json::to_vec(&persisted).map_err(|e| QueueStoreError::Backend(e.to_string()))?;
        fs::write(self.path_for(workspace_id), bytes)
            .await
            .map_err(|e| QueueStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, workspace_id: &str) -> Result<(), QueueStoreError> {
        match fs::remove_file(self.path_for(workspace_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueStoreError::Backend(e.to_string())),
        }
    }
}

pub fn default_dir_under(base: &Path) -> PathBuf {
    base.join("nmeshed").join("queues")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileQueueStore::new(dir.path());
        let entries = vec![QueueEntry {
            key: "a".into(),
            value: vec![1, 2],
            timestamp: 9,
        }];
        store.save("ws-1", &entries).await.unwrap();
        let loaded = store.load("ws-1").await.unwrap();
        assert_eq!(loaded, entries);
    }

    #[tokio::test]
    async fn load_of_missing_workspace_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileQueueStore::new(dir.path());
        assert_eq!(store.load("nope").await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn delete_removes_persisted_file() {
        let dir = tempdir().unwrap();
        let store = FileQueueStore::new(dir.path());
        store
            .save(
                "ws-1",
                &[QueueEntry {
                    key: "a".into(),
                    value: vec![1],
                    timestamp: 1,
                }],
            )
            .await
            .unwrap();
        store.delete("ws-1").await.unwrap();
        assert_eq!(store.load("ws-1").await.unwrap(), Vec::new());
    }
}
