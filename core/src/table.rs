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

use std::path::Path;
use std::sync::Arc;

use arrow_array::RecordBatch;
use futures::TryStreamExt;

use crate::Result;
use crate::commit::TableCommit;
use crate::common::{CompactionMetricsRecorder, Metrics};
use crate::compaction::AppendCompactCoordinator;
use crate::config::CompactionConfig;
use crate::file_selection::RestoredFileSet;
use crate::io::{FileIO, MemoryFileIO, ParquetFileIO, RollingFileWriter};
use crate::snapshot::{FileSystemSnapshotStore, MemorySnapshotStore, SnapshotManager};
use crate::spec::{CommitMessage, DataFileMeta, FileSource};

/// An append-only table: its snapshot chain, its data files and its options.
#[derive(Clone)]
pub struct FileStoreTable {
    name: String,
    snapshot_manager: SnapshotManager,
    file_io: Arc<dyn FileIO>,
    config: Arc<CompactionConfig>,
    metrics: Arc<Metrics>,
}

impl FileStoreTable {
    pub fn new(
        name: impl Into<String>,
        snapshot_manager: SnapshotManager,
        file_io: Arc<dyn FileIO>,
        config: CompactionConfig,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot_manager,
            file_io,
            config: Arc::new(config),
            metrics: Arc::new(Metrics::noop()),
        }
    }

    /// Table whose snapshots and data files live in process memory.
    pub fn in_memory(name: impl Into<String>, config: CompactionConfig) -> Self {
        Self::new(
            name,
            SnapshotManager::new(Arc::new(MemorySnapshotStore::new())),
            Arc::new(MemoryFileIO::new()),
            config,
        )
    }

    /// Table stored under `path`: snapshots in `path/snapshot`, parquet data in `path/data`.
    pub async fn open_local(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        config: CompactionConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let store = FileSystemSnapshotStore::new(path).await?;
        let file_io = ParquetFileIO::new(path).await?;
        Ok(Self::new(
            name,
            SnapshotManager::new(Arc::new(store)),
            Arc::new(file_io),
            config,
        ))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot_manager(&self) -> &SnapshotManager {
        &self.snapshot_manager
    }

    pub fn file_io(&self) -> &Arc<dyn FileIO> {
        &self.file_io
    }

    pub fn config(&self) -> &Arc<CompactionConfig> {
        &self.config
    }

    pub fn metrics_recorder(&self) -> CompactionMetricsRecorder {
        CompactionMetricsRecorder::new(self.metrics.clone(), self.name.clone())
    }

    pub fn new_write(&self) -> AppendWriter {
        AppendWriter {
            writer: RollingFileWriter::new(
                self.file_io.clone(),
                0,
                FileSource::Append,
                self.config.target_file_size,
                self.config.max_concurrent_closes,
            ),
        }
    }

    pub fn new_commit(&self, commit_user: impl Into<String>) -> TableCommit {
        TableCommit::new(
            self.snapshot_manager.clone(),
            commit_user,
            self.config.commit_retry.clone(),
        )
        .with_metrics(self.metrics_recorder())
    }

    pub fn new_coordinator(&self) -> AppendCompactCoordinator {
        AppendCompactCoordinator::new(self.snapshot_manager.clone(), &self.config)
            .with_metrics(self.metrics_recorder())
    }

    /// Files of the latest snapshot, replayed from the full history.
    pub async fn live_files(&self) -> Result<Vec<DataFileMeta>> {
        let Some(latest) = self.snapshot_manager.latest_snapshot_id().await? else {
            return Ok(vec![]);
        };
        let files = self
            .snapshot_manager
            .snapshots(None, latest)
            .try_fold(RestoredFileSet::new(), |mut files, snapshot| async move {
                files.apply(&snapshot.delta);
                Ok(files)
            })
            .await?;
        Ok(files.files().cloned().collect())
    }

    /// Every row of the latest snapshot.
    pub async fn read_all(&self) -> Result<Vec<RecordBatch>> {
        let mut batches = vec![];
        for file in self.live_files().await? {
            let mut stream = self.file_io.read(&file);
            while let Some(batch) = stream.try_next().await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}

impl std::fmt::Debug for FileStoreTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStoreTable")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Writes new level-0 files for the append path.
pub struct AppendWriter {
    writer: RollingFileWriter,
}

impl AppendWriter {
    pub async fn write(&mut self, batch: RecordBatch) -> Result<()> {
        self.writer.write(batch).await
    }

    /// Closes the files written so far and describes them for a commit.
    ///
    /// The writer can keep writing afterwards into new files.
    pub async fn prepare_commit(&mut self) -> Result<CommitMessage> {
        Ok(CommitMessage::append(self.writer.close().await?))
    }

    /// Deletes every file written since the last `prepare_commit`.
    pub async fn abort(&mut self) {
        self.writer.abort().await;
    }
}
