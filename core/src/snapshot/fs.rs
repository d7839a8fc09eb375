/*
 * Copyright 2025 append-compaction
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Snapshot chain stored as one JSON file per snapshot under `<table>/snapshot/`.
//!
//! A snapshot is first written to a hidden temporary file and then hard-linked
//! to `snapshot-<id>`. Linking fails when the target already exists, which makes
//! publication a conditional create: exactly one committer wins each id and no
//! reader ever observes a partially written snapshot. `LATEST` is only a hint;
//! the true latest id is found by probing forward from it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::SnapshotStore;
use crate::Result;
use crate::spec::{Snapshot, SnapshotId};

const SNAPSHOT_DIR: &str = "snapshot";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const LATEST_HINT: &str = "LATEST";

#[derive(Debug, Clone)]
pub struct FileSystemSnapshotStore {
    snapshot_dir: PathBuf,
}

impl FileSystemSnapshotStore {
    /// Opens (and creates if needed) the snapshot directory of the table at `table_path`.
    pub async fn new(table_path: impl AsRef<Path>) -> Result<Self> {
        let snapshot_dir = table_path.as_ref().join(SNAPSHOT_DIR);
        fs::create_dir_all(&snapshot_dir).await?;
        Ok(Self { snapshot_dir })
    }

    fn snapshot_path(&self, id: SnapshotId) -> PathBuf {
        self.snapshot_dir.join(format!("{}{}", SNAPSHOT_PREFIX, id))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir
            .join(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }

    async fn read_hint(&self) -> Result<Option<SnapshotId>> {
        match fs::read_to_string(self.snapshot_dir.join(LATEST_HINT)).await {
            Ok(content) => Ok(content.trim().parse().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_hint(&self, id: SnapshotId) -> Result<()> {
        let tmp = self.temp_path(LATEST_HINT);
        fs::write(&tmp, id.to_string()).await?;
        fs::rename(&tmp, self.snapshot_dir.join(LATEST_HINT)).await?;
        Ok(())
    }

    async fn list_snapshot_ids(&self) -> Result<Vec<SnapshotId>> {
        let mut ids = vec![];
        let mut entries = fs::read_dir(&self.snapshot_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|name| name.strip_prefix(SNAPSHOT_PREFIX))
                .and_then(|id| id.parse::<SnapshotId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn exists(&self, id: SnapshotId) -> Result<bool> {
        Ok(fs::try_exists(self.snapshot_path(id)).await?)
    }
}

#[async_trait]
impl SnapshotStore for FileSystemSnapshotStore {
    async fn latest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        let mut latest = match self.read_hint().await? {
            Some(hint) if self.exists(hint).await? => hint,
            _ => match self.list_snapshot_ids().await?.last() {
                Some(id) => *id,
                None => return Ok(None),
            },
        };
        // The hint may lag behind a concurrent publish.
        while self.exists(latest + 1).await? {
            latest += 1;
        }
        Ok(Some(latest))
    }

    async fn earliest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        Ok(self.list_snapshot_ids().await?.first().copied())
    }

    async fn load_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        match fs::read(self.snapshot_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_publish(&self, snapshot: &Snapshot) -> Result<bool> {
        let target = self.snapshot_path(snapshot.id);
        if fs::try_exists(&target).await? {
            return Ok(false);
        }

        let tmp = self.temp_path(&format!("{}{}", SNAPSHOT_PREFIX, snapshot.id));
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?).await?;

        let published = match fs::hard_link(&tmp, &target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        };

        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::warn!("Failed to remove temporary snapshot file {:?}: {}", tmp, e);
        }

        let published = published?;
        if published {
            if let Err(e) = self.write_hint(snapshot.id).await {
                tracing::warn!("Failed to refresh {} hint to {}: {}", LATEST_HINT, snapshot.id, e);
            }
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CommitKind, DataFileMeta, ManifestDelta, ManifestEntry};

    fn snapshot(id: SnapshotId) -> Snapshot {
        Snapshot {
            id,
            commit_user: "writer".to_owned(),
            commit_identifier: id,
            commit_kind: CommitKind::Append,
            time_millis: 0,
            delta: ManifestDelta::new(vec![ManifestEntry::add(DataFileMeta::new_append(
                format!("data-{}.parquet", id),
                1,
                16,
            ))]),
            total_record_count: id,
            delta_record_count: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemSnapshotStore::new(dir.path()).await.unwrap();

        assert_eq!(store.latest_snapshot_id().await.unwrap(), None);
        assert!(store.try_publish(&snapshot(1)).await.unwrap());
        assert!(store.try_publish(&snapshot(2)).await.unwrap());

        assert_eq!(store.latest_snapshot_id().await.unwrap(), Some(2));
        assert_eq!(store.earliest_snapshot_id().await.unwrap(), Some(1));
        assert_eq!(store.load_snapshot(2).await.unwrap(), Some(snapshot(2)));
        assert_eq!(store.load_snapshot(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_same_id_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemSnapshotStore::new(dir.path()).await.unwrap();

        assert!(store.try_publish(&snapshot(1)).await.unwrap());
        let mut other = snapshot(1);
        other.commit_user = "other".to_owned();
        assert!(!store.try_publish(&other).await.unwrap());
        assert_eq!(
            store.load_snapshot(1).await.unwrap().unwrap().commit_user,
            "writer"
        );
    }

    #[tokio::test]
    async fn test_latest_probes_past_stale_hint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemSnapshotStore::new(dir.path()).await.unwrap();
        for id in 1..=3 {
            assert!(store.try_publish(&snapshot(id)).await.unwrap());
        }
        store.write_hint(1).await.unwrap();
        assert_eq!(store.latest_snapshot_id().await.unwrap(), Some(3));

        fs::remove_file(dir.path().join(SNAPSHOT_DIR).join(LATEST_HINT))
            .await
            .unwrap();
        assert_eq!(store.latest_snapshot_id().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_publish_has_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileSystemSnapshotStore::new(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut s = snapshot(1);
                    s.commit_user = format!("writer-{}", i);
                    store.try_publish(&s).await.unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
