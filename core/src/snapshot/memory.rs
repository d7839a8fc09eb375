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

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::SnapshotStore;
use crate::spec::{Snapshot, SnapshotId};
use crate::{CompactionError, Result};

/// Snapshot chain kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<SnapshotId, Snapshot>>,
    /// Highest id ever published; expiring snapshots never lowers it.
    latest: RwLock<Option<SnapshotId>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a snapshot body the way an external retention process would.
    pub fn expire_snapshot(&self, id: SnapshotId) -> bool {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        Ok(*self.latest.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn earliest_snapshot_id(&self) -> Result<Option<SnapshotId>> {
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .next()
            .copied())
    }

    async fn load_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn try_publish(&self, snapshot: &Snapshot) -> Result<bool> {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        let expected = latest.map_or(1, |id| id + 1);
        if snapshot.id < expected {
            return Ok(false);
        }
        if snapshot.id > expected {
            return Err(CompactionError::InvalidCommit(format!(
                "snapshot {} would leave a gap after {:?}",
                snapshot.id, *latest
            )));
        }
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.id, snapshot.clone());
        *latest = Some(snapshot.id);
        Ok(true)
    }
}
