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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::TryStreamExt;

use crate::file_selection::RestoredFileSet;
use crate::snapshot::SnapshotManager;
use crate::spec::{DataFileMeta, Snapshot, SnapshotId};
use crate::{CompactionError, Result};

/// Number of most recent snapshots whose removals are remembered.
pub(crate) const REMOVAL_HISTORY_SNAPSHOTS: u64 = 256;

/// Live files of the table as of `snapshot_id`, advanced one snapshot at a time.
///
/// Remembers which of the last [`REMOVAL_HISTORY_SNAPSHOTS`] snapshots removed
/// each file so a rejected commit can name it.
#[derive(Debug, Default)]
pub(crate) struct LiveFileIndex {
    files: RestoredFileSet,
    removed_by: HashMap<String, SnapshotId>,
    removals: VecDeque<(SnapshotId, Vec<String>)>,
    snapshot_id: Option<SnapshotId>,
}

impl LiveFileIndex {
    pub(crate) fn snapshot_id(&self) -> Option<SnapshotId> {
        self.snapshot_id
    }

    pub(crate) fn is_live(&self, file_name: &str) -> bool {
        self.files.contains(file_name)
    }

    pub(crate) fn removed_by(&self, file_name: &str) -> Option<SnapshotId> {
        self.removed_by.get(file_name).copied()
    }

    pub(crate) fn live_files(&self) -> impl Iterator<Item = &DataFileMeta> {
        self.files.files()
    }

    pub(crate) fn total_record_count(&self) -> u64 {
        self.files.total_row_count()
    }

    /// Applies the snapshot that directly follows the indexed one.
    pub(crate) fn apply(&mut self, snapshot: &Snapshot) {
        let removed: Vec<String> = snapshot
            .delta
            .deleted()
            .map(|f| f.file_name.clone())
            .collect();
        for file_name in &removed {
            self.removed_by.insert(file_name.clone(), snapshot.id);
        }
        if !removed.is_empty() {
            self.removals.push_back((snapshot.id, removed));
        }
        self.forget_removals_before(snapshot.id.saturating_sub(REMOVAL_HISTORY_SNAPSHOTS - 1));
        self.files.apply(&snapshot.delta);
        self.snapshot_id = Some(snapshot.id);
    }

    fn forget_removals_before(&mut self, oldest_kept: SnapshotId) {
        while let Some((id, _)) = self.removals.front() {
            if *id >= oldest_kept {
                break;
            }
            let Some((id, file_names)) = self.removals.pop_front() else {
                break;
            };
            for file_name in file_names {
                // a re-added and removed again file points at the newer snapshot
                if self.removed_by.get(&file_name) == Some(&id) {
                    self.removed_by.remove(&file_name);
                }
            }
        }
    }

    /// Catches up with `latest` and returns the snapshots applied on the way.
    pub(crate) async fn advance_to(
        &mut self,
        manager: &SnapshotManager,
        latest: Option<SnapshotId>,
    ) -> Result<Vec<Arc<Snapshot>>> {
        let Some(latest) = latest else {
            return match self.snapshot_id {
                None => Ok(vec![]),
                Some(id) => Err(CompactionError::Unexpected(format!(
                    "table has no snapshots but snapshot {} was already observed",
                    id
                ))),
            };
        };
        if let Some(current) = self.snapshot_id {
            if latest < current {
                return Err(CompactionError::Unexpected(format!(
                    "latest snapshot {} is older than observed snapshot {}",
                    latest, current
                )));
            }
        }

        let snapshots: Vec<Arc<Snapshot>> = manager
            .snapshots(self.snapshot_id, latest)
            .try_collect()
            .await?;
        for snapshot in &snapshots {
            self.apply(snapshot);
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MemorySnapshotStore;
    use crate::spec::{CommitKind, ManifestDelta, ManifestEntry};

    fn snapshot(id: SnapshotId, delta: ManifestDelta) -> Snapshot {
        Snapshot {
            id,
            commit_user: "writer".to_owned(),
            commit_identifier: id,
            commit_kind: CommitKind::Append,
            time_millis: 0,
            delta,
            total_record_count: 0,
            delta_record_count: 0,
        }
    }

    #[tokio::test]
    async fn test_advance_tracks_removals() {
        let manager = SnapshotManager::new(Arc::new(MemorySnapshotStore::new()));
        let a = DataFileMeta::new_append("a", 2, 20);
        let b = DataFileMeta::new_append("b", 3, 30);
        manager
            .try_publish(snapshot(
                1,
                ManifestDelta::new(vec![ManifestEntry::add(a.clone()), ManifestEntry::add(b)]),
            ))
            .await
            .unwrap();
        manager
            .try_publish(snapshot(2, ManifestDelta::new(vec![ManifestEntry::delete(a)])))
            .await
            .unwrap();

        let mut index = LiveFileIndex::default();
        let applied = index.advance_to(&manager, Some(2)).await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(index.snapshot_id(), Some(2));
        assert!(!index.is_live("a"));
        assert!(index.is_live("b"));
        assert_eq!(index.removed_by("a"), Some(2));
        assert_eq!(index.total_record_count(), 3);

        assert!(index.advance_to(&manager, Some(2)).await.unwrap().is_empty());
        assert!(index.advance_to(&manager, Some(1)).await.is_err());
    }

    #[test]
    fn test_removal_history_is_bounded() {
        let mut index = LiveFileIndex::default();
        let total = REMOVAL_HISTORY_SNAPSHOTS * 2;
        for id in 1..=total {
            let name = format!("f{}", id);
            let delta = if id == 1 {
                ManifestDelta::new(vec![ManifestEntry::add(DataFileMeta::new_append(
                    &name, 1, 1,
                ))])
            } else {
                ManifestDelta::new(vec![
                    ManifestEntry::delete(DataFileMeta::new_append(format!("f{}", id - 1), 1, 1)),
                    ManifestEntry::add(DataFileMeta::new_append(&name, 1, 1)),
                ])
            };
            index.apply(&snapshot(id, delta));
        }

        assert_eq!(index.removed_by.len() as u64, REMOVAL_HISTORY_SNAPSHOTS);
        assert_eq!(index.removals.len() as u64, REMOVAL_HISTORY_SNAPSHOTS);
        assert_eq!(index.removed_by(&format!("f{}", total - 1)), Some(total));
        assert_eq!(index.removed_by("f1"), None);
        assert!(index.is_live(&format!("f{}", total)));
    }
}
