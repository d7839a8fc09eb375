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

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::Stream;

use crate::spec::{Snapshot, SnapshotId};
use crate::{CompactionError, Result};

mod fs;
mod memory;
mod store;

pub use fs::FileSystemSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use store::SnapshotStore;

/// Read and publish access to a table's snapshot chain.
///
/// Snapshot bodies never change once published, so loaded snapshots are cached
/// for the lifetime of the manager. Clones share the store and the cache.
#[derive(Clone)]
pub struct SnapshotManager {
    store: Arc<dyn SnapshotStore>,
    cache: Arc<RwLock<HashMap<SnapshotId, Arc<Snapshot>>>>,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `None` when nothing was ever committed to the table.
    pub async fn latest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        self.store.latest_snapshot_id().await
    }

    pub async fn earliest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        self.store.earliest_snapshot_id().await
    }

    /// Loads snapshot `id`, failing with [`CompactionError::NotFound`] if it
    /// was never published or has been expired.
    pub async fn snapshot(&self, id: SnapshotId) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(snapshot.clone());
        }

        let snapshot = self
            .store
            .load_snapshot(id)
            .await?
            .map(Arc::new)
            .ok_or(CompactionError::NotFound { snapshot_id: id })?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, snapshot.clone());
        Ok(snapshot)
    }

    pub async fn latest_snapshot(&self) -> Result<Option<Arc<Snapshot>>> {
        match self.latest_snapshot_id().await? {
            Some(id) => Ok(Some(self.snapshot(id).await?)),
            None => Ok(None),
        }
    }

    /// Snapshots in `(from_exclusive, to_inclusive]`, oldest first, loaded lazily.
    pub fn snapshots(
        &self,
        from_exclusive: Option<SnapshotId>,
        to_inclusive: SnapshotId,
    ) -> impl Stream<Item = Result<Arc<Snapshot>>> + Send + 'static {
        let manager = self.clone();
        let start = from_exclusive.map_or(1, |id| id + 1);
        async_stream::try_stream! {
            for id in start..=to_inclusive {
                yield manager.snapshot(id).await?;
            }
        }
    }

    /// Publishes `snapshot` as the successor of the current latest one.
    ///
    /// Returns `false` if a concurrent committer already took its id.
    pub async fn try_publish(&self, snapshot: Snapshot) -> Result<bool> {
        let published = self.store.try_publish(&snapshot).await?;
        if published {
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(snapshot.id, Arc::new(snapshot));
        }
        Ok(published)
    }
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager").finish_non_exhaustive()
    }
}
