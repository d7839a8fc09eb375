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

//! Append-table compaction: planning, rewriting and committing small files.
//!
//! [`AppendCompactCoordinator`] plans [`AppendCompactTask`]s from the table's
//! snapshot history. [`Compaction`] drives one coordinator end to end: it runs
//! the tasks on an executor and commits their results through a [`TableCommit`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use mixtrics::metrics::BoxedRegistry;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use crate::commit::{CommitOutcome, TableCommit};
use crate::common::{CompactionMetricsRecorder, Metrics};
use crate::config::CommitRetryConfig;
use crate::executor::{
    CompactionExecutor, ExecutorType, RewriteFilesStat, create_compaction_executor,
};
use crate::spec::{CommitMessage, DataFileMeta, SnapshotId};
use crate::table::FileStoreTable;
use crate::{CompactionError, ErrorKind, Result};

mod coordinator;
mod task;
mod validator;

pub use coordinator::AppendCompactCoordinator;
pub use task::AppendCompactTask;
pub use validator::CompactionValidator;

/// Builder for [`Compaction`].
pub struct CompactionBuilder {
    table: FileStoreTable,

    executor_type: Option<ExecutorType>,
    registry: Option<BoxedRegistry>,
    commit_user: Option<Cow<'static, str>>,
    commit_retry_config: Option<CommitRetryConfig>,
}

impl CompactionBuilder {
    pub fn new(table: FileStoreTable) -> Self {
        Self {
            table,

            executor_type: None,
            registry: None,
            commit_user: None,
            commit_retry_config: None,
        }
    }

    pub fn with_executor_type(mut self, executor_type: ExecutorType) -> Self {
        self.executor_type = Some(executor_type);
        self
    }

    pub fn with_registry(mut self, registry: BoxedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_commit_user(mut self, commit_user: impl Into<Cow<'static, str>>) -> Self {
        self.commit_user = Some(commit_user.into());
        self
    }

    pub fn with_retry_config(mut self, retry_config: CommitRetryConfig) -> Self {
        self.commit_retry_config = Some(retry_config);
        self
    }

    pub fn build(self) -> Compaction {
        let table = match self.registry {
            Some(registry) => self.table.with_metrics(Arc::new(Metrics::new(registry))),
            None => self.table,
        };
        let commit_user = self
            .commit_user
            .unwrap_or_else(|| Cow::Owned(format!("compaction-{}", uuid::Uuid::new_v4())));
        let commit = match self.commit_retry_config {
            Some(retry_config) => {
                TableCommit::new(table.snapshot_manager().clone(), commit_user, retry_config)
                    .with_metrics(table.metrics_recorder())
            }
            None => table.new_commit(commit_user),
        };

        let executor_type = self.executor_type.unwrap_or_default();
        Compaction {
            coordinator: Mutex::new(table.new_coordinator()),
            executor: create_compaction_executor(executor_type),
            validate: table.config().enable_validate_compaction || !executor_type.writes_data(),
            metrics: table.metrics_recorder(),
            commit,
            table,
        }
    }
}

/// Outcome of one [`Compaction::compact`] round.
#[derive(Debug, Default)]
pub struct CompactionResult {
    /// Snapshot holding the compaction, `None` if nothing was committed.
    pub snapshot_id: Option<SnapshotId>,
    pub committed_tasks: Vec<AppendCompactTask>,
    /// Tasks whose rewrite or validation failed. Their files stay withdrawn
    /// from the coordinator until it is rebuilt.
    pub failed_tasks: Vec<FailedCompactTask>,
    pub stat: RewriteFilesStat,
}

/// A planned task that produced nothing committable, with the reason.
#[derive(Debug)]
pub struct FailedCompactTask {
    pub task: AppendCompactTask,
    pub error: CompactionError,
}

/// Compacts one table: plan, rewrite, validate and commit.
pub struct Compaction {
    table: FileStoreTable,
    coordinator: Mutex<AppendCompactCoordinator>,
    executor: Box<dyn CompactionExecutor>,
    /// Re-read outputs before committing them.
    validate: bool,
    commit: TableCommit,
    metrics: CompactionMetricsRecorder,
}

impl Compaction {
    pub fn table(&self) -> &FileStoreTable {
        &self.table
    }

    pub fn commit_user(&self) -> &str {
        self.commit.commit_user()
    }

    /// Files the coordinator may still plan. Does not wait for running rewrites.
    pub async fn list_restored_files(&self) -> Vec<DataFileMeta> {
        self.coordinator.lock().await.list_restored_files()
    }

    /// Runs one compaction round.
    ///
    /// Returns `None` if no task was planned. Successful tasks are committed
    /// together in one snapshot; if every task failed, the first error is returned.
    pub async fn compact(&self) -> Result<Option<CompactionResult>> {
        let start = Instant::now();
        let tasks = self.coordinator.lock().await.run().await?;
        if tasks.is_empty() {
            return Ok(None);
        }

        let max_concurrent_tasks = self.table.config().max_concurrent_tasks;
        let results: Vec<_> = stream::iter(tasks)
            .map(|task| async move {
                let result = self.rewrite(&task).await;
                (task, result)
            })
            .buffer_unordered(max_concurrent_tasks)
            .collect()
            .await;

        let mut committed_tasks = vec![];
        let mut failed_tasks = vec![];
        let mut messages = vec![];
        let mut stat = RewriteFilesStat::default();
        for (task, result) in results {
            match result {
                Ok((message, task_stat)) => {
                    stat.merge(&task_stat);
                    messages.push(message);
                    committed_tasks.push(task);
                }
                Err(error) => {
                    self.metrics.record_executor_error();
                    warn!(
                        "Compaction task of {} files on table {} failed: {}",
                        task.compact_before().len(),
                        self.table.name(),
                        error
                    );
                    failed_tasks.push(FailedCompactTask { task, error });
                }
            }
        }

        if messages.is_empty() {
            return match failed_tasks.into_iter().next() {
                Some(failed) => Err(failed.error),
                None => Ok(None),
            };
        }

        let outcome = match self.commit.commit(messages.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::RetryExhausted) {
                    self.discard_outputs(&messages).await;
                }
                return Err(e);
            }
        };

        self.metrics
            .record_compaction_duration(start.elapsed().as_secs_f64());
        self.metrics.record_compaction_complete(&stat);
        info!(
            "Compacted {} files into {} on table {} in snapshot {:?}, {} tasks failed",
            stat.input_files_count,
            stat.output_files_count,
            self.table.name(),
            outcome.snapshot_id(),
            failed_tasks.len()
        );

        Ok(Some(CompactionResult {
            snapshot_id: match outcome {
                CommitOutcome::Committed(id) => Some(id),
                CommitOutcome::NoOp => None,
            },
            committed_tasks,
            failed_tasks,
            stat,
        }))
    }

    async fn rewrite(&self, task: &AppendCompactTask) -> Result<(CommitMessage, RewriteFilesStat)> {
        let (message, stat) = task
            .do_compact_with_stat(&self.table, self.executor.as_ref())
            .await?;
        if self.validate {
            let validator = CompactionValidator::new(
                self.table.file_io().clone(),
                task,
                &message,
                self.table.name(),
            );
            if let Err(e) = validator.validate().await {
                self.discard_outputs(std::slice::from_ref(&message)).await;
                return Err(e);
            }
        }
        Ok((message, stat))
    }

    /// Deletes compaction outputs that no snapshot references.
    async fn discard_outputs(&self, messages: &[CommitMessage]) {
        let outputs = messages
            .iter()
            .flat_map(|m| m.compact_increment.compact_after.iter());
        for file in outputs {
            if let Err(e) = self.table.file_io().delete_file(file.file_name()).await {
                warn!(
                    "Failed to delete unreferenced compaction output {}: {}",
                    file.file_name(),
                    e
                );
            }
        }
    }

    /// Calls [`Self::compact`] every `interval` until `shutdown` fires.
    ///
    /// A failed round is logged and the next one starts on the following tick.
    pub async fn run_loop(&self, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Compaction loop of table {} stopped", self.table.name());
                    return;
                }
                _ = ticker.tick() => {
                    match self.compact().await {
                        Ok(Some(result)) => debug!(
                            "Compaction round committed snapshot {:?}",
                            result.snapshot_id
                        ),
                        Ok(None) => debug!("Nothing to compact on table {}", self.table.name()),
                        Err(e) => error!(
                            "Compaction round on table {} failed: {}",
                            self.table.name(),
                            e
                        ),
                    }
                }
            }
        }
    }
}
