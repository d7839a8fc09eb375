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

//! Planning side of append-table compaction.
//!
//! The coordinator keeps a private working set of small files, rebuilt from
//! snapshot deltas, and hands out disjoint groups of them as tasks.

use futures::TryStreamExt;
use tracing::{debug, info};

use super::AppendCompactTask;
use crate::common::CompactionMetricsRecorder;
use crate::config::CompactionConfig;
use crate::file_selection::{
    FilesIterator, GroupFilterStrategy, GroupingStrategyEnum, MinGroupFileCountStrategy,
    RestoredFileSet,
};
use crate::snapshot::SnapshotManager;
use crate::spec::{DataFileMeta, Snapshot, SnapshotId};
use crate::{CompactionError, Result};

pub struct AppendCompactCoordinator {
    snapshot_manager: SnapshotManager,
    restored: RestoredFileSet,
    last_scanned_snapshot_id: Option<SnapshotId>,
    min_file_count: MinGroupFileCountStrategy,
    target_file_size: u64,
    grouping: GroupingStrategyEnum,
    metrics: CompactionMetricsRecorder,
}

impl AppendCompactCoordinator {
    pub fn new(snapshot_manager: SnapshotManager, config: &CompactionConfig) -> Self {
        Self {
            snapshot_manager,
            restored: RestoredFileSet::new(),
            last_scanned_snapshot_id: None,
            min_file_count: MinGroupFileCountStrategy {
                min_group_file_count: config.min_file_num,
            },
            target_file_size: config.target_file_size,
            grouping: GroupingStrategyEnum::from_config(config),
            metrics: CompactionMetricsRecorder::noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: CompactionMetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn last_scanned_snapshot_id(&self) -> Option<SnapshotId> {
        self.last_scanned_snapshot_id
    }

    /// Folds every snapshot committed since the last scan into the working set.
    ///
    /// Returns `false` when there was nothing new. All snapshots are loaded
    /// before the first one is applied: if any of them is missing the scan
    /// fails with `NotFound` and the working set is left as it was.
    pub async fn scan(&mut self) -> Result<bool> {
        let Some(latest) = self.snapshot_manager.latest_snapshot_id().await? else {
            return Ok(false);
        };
        if let Some(last) = self.last_scanned_snapshot_id {
            if latest == last {
                return Ok(false);
            }
            if latest < last {
                return Err(CompactionError::Unexpected(format!(
                    "latest snapshot {} is older than scanned snapshot {}",
                    latest, last
                )));
            }
        }

        let snapshots: Vec<_> = self
            .snapshot_manager
            .snapshots(self.last_scanned_snapshot_id, latest)
            .try_collect()
            .await?;
        for snapshot in &snapshots {
            self.apply(snapshot);
        }
        debug!(
            "Scanned snapshots ({:?}, {}], {} restored files",
            self.last_scanned_snapshot_id,
            latest,
            self.restored.len()
        );
        self.last_scanned_snapshot_id = Some(latest);
        Ok(true)
    }

    fn apply(&mut self, snapshot: &Snapshot) {
        self.restored.apply(&snapshot.delta);
    }

    /// Groups of restored files per level, skipping levels that already hold
    /// a file of at least the target size.
    pub fn files_iterator(&self) -> FilesIterator {
        FilesIterator::new(self.restored.files(), self.target_file_size)
    }

    /// Turns every eligible candidate into a task and withdraws its files.
    ///
    /// A withdrawn file is never planned again by this coordinator unless a
    /// snapshot re-adds it, so repeated calls without a scan never hand out
    /// the same file twice.
    pub fn compact_plan(&mut self) -> Vec<AppendCompactTask> {
        let candidates: Vec<_> = self
            .files_iterator()
            .flat_map(|group| self.grouping.group_files(group))
            .collect();

        let mut tasks = vec![];
        for candidate in candidates {
            if !self.min_file_count.keep(&candidate) {
                debug!(
                    "Level {} candidate of {} files filtered by {}, waiting",
                    candidate.level,
                    candidate.len(),
                    self.min_file_count
                );
                continue;
            }
            let level = candidate.level;
            let files = candidate.into_files();
            self.restored.withdraw(&files);
            tasks.push(AppendCompactTask::new(files, level));
        }

        if !tasks.is_empty() {
            info!(
                "Planned {} compaction tasks with {} strategy, {} files left restored",
                tasks.len(),
                self.grouping,
                self.restored.len()
            );
        }
        self.metrics.record_planned_tasks(tasks.len());
        tasks
    }

    pub async fn run(&mut self) -> Result<Vec<AppendCompactTask>> {
        self.scan().await?;
        Ok(self.compact_plan())
    }

    pub fn list_restored_files(&self) -> Vec<DataFileMeta> {
        self.restored.files().cloned().collect()
    }
}

impl std::fmt::Debug for AppendCompactCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendCompactCoordinator")
            .field("last_scanned_snapshot_id", &self.last_scanned_snapshot_id)
            .field("restored", &self.restored.len())
            .field("min_file_count", &self.min_file_count)
            .field("target_file_size", &self.target_file_size)
            .field("grouping", &self.grouping)
            .finish()
    }
}
