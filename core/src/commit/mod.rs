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

//! Optimistic publication of commit messages onto the snapshot chain.
//!
//! A commit reads the latest snapshot id as its base and tries to publish
//! `base + 1`. When another committer wins that id, the commit catches up with
//! the new snapshots, checks that none of them removed a file it removes, and
//! tries again on top of the new latest snapshot. Retries back off
//! exponentially and are bounded by [`CommitRetryConfig`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Mutex;

use crate::common::CompactionMetricsRecorder;
use crate::config::CommitRetryConfig;
use crate::snapshot::SnapshotManager;
use crate::spec::{
    CommitKind, CommitMessage, DataFileMeta, ManifestDelta, ManifestEntry, Snapshot, SnapshotId,
};
use crate::{CompactionError, Result};

mod conflict;
mod index;

pub use crate::spec::conflicting_deletes;
use conflict::{check_live, check_rebase, commit_kind, merge_messages};
use index::LiveFileIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(SnapshotId),
    /// Nothing to add or remove; no snapshot was created.
    NoOp,
}

impl CommitOutcome {
    pub fn snapshot_id(&self) -> Option<SnapshotId> {
        match self {
            CommitOutcome::Committed(id) => Some(*id),
            CommitOutcome::NoOp => None,
        }
    }
}

enum DeltaPlan<'a> {
    /// Applied as is on top of whatever snapshot is latest.
    Fixed(&'a ManifestDelta),
    /// Replaces every live file with these.
    Overwrite(&'a [DataFileMeta]),
}

/// Publishes commit messages of one committing user.
///
/// Keeps an index of the table's live files that is advanced incrementally, so
/// a long-lived `TableCommit` only loads the snapshots published since its
/// previous commit.
pub struct TableCommit {
    snapshot_manager: SnapshotManager,
    commit_user: String,
    retry_config: CommitRetryConfig,
    metrics: CompactionMetricsRecorder,
    index: Mutex<LiveFileIndex>,
    next_identifier: AtomicU64,
}

impl TableCommit {
    pub fn new(
        snapshot_manager: SnapshotManager,
        commit_user: impl Into<String>,
        retry_config: CommitRetryConfig,
    ) -> Self {
        Self {
            snapshot_manager,
            commit_user: commit_user.into(),
            retry_config,
            metrics: CompactionMetricsRecorder::noop(),
            index: Mutex::new(LiveFileIndex::default()),
            next_identifier: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: CompactionMetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn commit_user(&self) -> &str {
        &self.commit_user
    }

    pub async fn commit(&self, messages: Vec<CommitMessage>) -> Result<CommitOutcome> {
        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        self.commit_with_identifier(identifier, messages).await
    }

    /// Publishes every message in one snapshot, or none of them.
    pub async fn commit_with_identifier(
        &self,
        identifier: u64,
        messages: Vec<CommitMessage>,
    ) -> Result<CommitOutcome> {
        let delta = merge_messages(&messages)?;
        if delta.is_empty() {
            tracing::debug!(
                "Commit {} of {} has nothing to publish",
                identifier,
                self.commit_user
            );
            return Ok(CommitOutcome::NoOp);
        }
        let files = delta.deleted().map(|f| f.file_name.clone()).collect();
        self.commit_delta(
            identifier,
            commit_kind(&messages),
            DeltaPlan::Fixed(&delta),
            files,
        )
        .await
    }

    /// Replaces the table's content with the new files of `messages`.
    ///
    /// The files to remove are taken from the latest snapshot on every attempt.
    pub async fn overwrite(&self, messages: Vec<CommitMessage>) -> Result<CommitOutcome> {
        if messages.iter().any(|m| !m.compact_increment.is_empty()) {
            return Err(CompactionError::InvalidCommit(
                "overwrite can not carry compaction results".to_owned(),
            ));
        }
        let new_files = merge_messages(&messages)?
            .added()
            .cloned()
            .collect::<Vec<_>>();
        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        self.commit_delta(
            identifier,
            CommitKind::Overwrite,
            DeltaPlan::Overwrite(&new_files),
            vec![],
        )
        .await
    }

    async fn commit_delta(
        &self,
        identifier: u64,
        kind: CommitKind,
        plan: DeltaPlan<'_>,
        files: Vec<String>,
    ) -> Result<CommitOutcome> {
        let start = Instant::now();
        let deadline = self.retry_config.timeout.map(|timeout| start + timeout);
        let attempts = AtomicUsize::new(0);

        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(self.retry_config.retry_initial_delay)
            .with_max_delay(self.retry_config.retry_max_delay)
            .with_max_times(self.retry_config.max_retries)
            .with_jitter();

        let operation = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.attempt(identifier, kind, &plan)
        };

        let result = operation
            .retry(retry_strategy)
            .sleep(tokio::time::sleep)
            .when(|e: &CompactionError| {
                e.is_retryable() && deadline.is_none_or(|deadline| Instant::now() < deadline)
            })
            .notify(|e: &CompactionError, delay: Duration| {
                self.metrics.record_commit_retry();
                tracing::warn!(
                    "Commit {} of {} lost a race ({}), retrying in {:?}",
                    identifier,
                    self.commit_user,
                    e,
                    delay
                );
            })
            .await;

        match result {
            Ok(Some(snapshot_id)) => {
                self.metrics
                    .record_commit_success(start.elapsed().as_secs_f64() * 1000.0);
                Ok(CommitOutcome::Committed(snapshot_id))
            }
            Ok(None) => Ok(CommitOutcome::NoOp),
            Err(CompactionError::Superseded { base_version }) => {
                self.metrics.record_commit_failure();
                let attempts = attempts.load(Ordering::Relaxed);
                tracing::warn!(
                    "Commit {} of {} gave up after {} attempts",
                    identifier,
                    self.commit_user,
                    attempts
                );
                Err(CompactionError::RetryExhausted {
                    attempts,
                    base_version,
                    files,
                })
            }
            Err(e) => {
                self.metrics.record_commit_failure();
                Err(e)
            }
        }
    }

    /// One publish attempt on top of the latest snapshot.
    async fn attempt(
        &self,
        identifier: u64,
        kind: CommitKind,
        plan: &DeltaPlan<'_>,
    ) -> Result<Option<SnapshotId>> {
        let mut index = self.index.lock().await;
        let latest = self.snapshot_manager.latest_snapshot_id().await?;
        // A committer that never observed the table builds on what it reads now.
        let base_version = index.snapshot_id().or(latest);
        let committed_since = index.advance_to(&self.snapshot_manager, latest).await?;

        let delta = match plan {
            DeltaPlan::Fixed(delta) => {
                check_rebase(base_version, &committed_since, delta)?;
                check_live(&index, delta)?;
                (*delta).clone()
            }
            DeltaPlan::Overwrite(new_files) => {
                let mut delta = ManifestDelta::new(
                    index
                        .live_files()
                        .cloned()
                        .map(ManifestEntry::delete)
                        .collect(),
                );
                for file in new_files.iter() {
                    delta.push(ManifestEntry::add(file.clone()));
                }
                check_live(&index, &delta)?;
                delta
            }
        };
        if delta.is_empty() {
            return Ok(None);
        }

        let delta_record_count = delta.record_count_delta();
        let total_record_count =
            (index.total_record_count() as i64 + delta_record_count).max(0) as u64;
        let snapshot = Snapshot {
            id: latest.map_or(1, |id| id + 1),
            commit_user: self.commit_user.clone(),
            commit_identifier: identifier,
            commit_kind: kind,
            time_millis: now_millis(),
            delta,
            total_record_count,
            delta_record_count,
        };

        if !self.snapshot_manager.try_publish(snapshot.clone()).await? {
            return Err(CompactionError::Superseded {
                base_version: latest,
            });
        }

        index.apply(&snapshot);
        tracing::info!(
            "{} committed snapshot {} ({}): +{} -{} files, {} rows in table",
            self.commit_user,
            snapshot.id,
            snapshot.commit_kind,
            snapshot.delta.added().count(),
            snapshot.delta.deleted().count(),
            snapshot.total_record_count
        );
        Ok(Some(snapshot.id))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
