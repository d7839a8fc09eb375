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

use crate::Result;
use crate::executor::{CompactionExecutor, RewriteFilesRequest, RewriteFilesStat};
use crate::spec::{CommitMessage, DataFileMeta};
use crate::table::FileStoreTable;

/// One unit of compaction work: rewrite `compact_before` into new files of `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCompactTask {
    compact_before: Vec<DataFileMeta>,
    level: u32,
}

impl AppendCompactTask {
    pub fn new(compact_before: Vec<DataFileMeta>, level: u32) -> Self {
        Self {
            compact_before,
            level,
        }
    }

    pub fn compact_before(&self) -> &[DataFileMeta] {
        &self.compact_before
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn total_row_count(&self) -> u64 {
        self.compact_before.iter().map(|f| f.row_count).sum()
    }

    /// Rewrites the input files and describes the result for a commit.
    ///
    /// Nothing is published here. On error no message is returned and the
    /// output files of the failed attempt have already been removed by the executor.
    pub async fn do_compact(
        &self,
        table: &FileStoreTable,
        executor: &dyn CompactionExecutor,
    ) -> Result<CommitMessage> {
        self.do_compact_with_stat(table, executor)
            .await
            .map(|(message, _)| message)
    }

    pub(crate) async fn do_compact_with_stat(
        &self,
        table: &FileStoreTable,
        executor: &dyn CompactionExecutor,
    ) -> Result<(CommitMessage, RewriteFilesStat)> {
        let response = executor
            .rewrite_files(RewriteFilesRequest {
                file_io: table.file_io().clone(),
                input_files: self.compact_before.clone(),
                output_level: self.level,
                config: table.config().clone(),
            })
            .await?;
        Ok((
            CommitMessage::compact(self.compact_before.clone(), response.data_files),
            response.stat,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int64Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::config::CompactionConfig;
    use crate::executor::{MergeExecutor, MockExecutor};
    use crate::io::MemoryFileIO;
    use crate::snapshot::{MemorySnapshotStore, SnapshotManager};

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap()
    }

    async fn write_files(table: &FileStoreTable, batches: &[&[i64]]) -> Vec<DataFileMeta> {
        let mut files = vec![];
        for values in batches {
            let mut write = table.new_write();
            write.write(batch(values)).await.unwrap();
            files.extend(write.prepare_commit().await.unwrap().new_files);
        }
        files
    }

    #[tokio::test]
    async fn test_do_compact_conserves_rows() {
        let table = FileStoreTable::in_memory("t", CompactionConfig::default());
        let inputs = write_files(&table, &[&[1, 2], &[3], &[4, 5, 6]]).await;
        let task = AppendCompactTask::new(inputs.clone(), 0);
        assert_eq!(task.total_row_count(), 6);

        let message = task.do_compact(&table, &MergeExecutor).await.unwrap();
        assert!(message.new_files.is_empty());
        assert_eq!(message.compact_increment.compact_before, inputs);
        let after = &message.compact_increment.compact_after;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].row_count, 6);
        assert_eq!(after[0].level, 0);
    }

    #[tokio::test]
    async fn test_do_compact_missing_input_fails() {
        let file_io = MemoryFileIO::new();
        let table = FileStoreTable::new(
            "t",
            SnapshotManager::new(Arc::new(MemorySnapshotStore::new())),
            Arc::new(file_io.clone()),
            CompactionConfig::default(),
        );
        let mut inputs = write_files(&table, &[&[1], &[2]]).await;
        inputs.push(DataFileMeta::new_append("data-missing.parquet", 1, 8));

        let task = AppendCompactTask::new(inputs, 0);
        assert!(task.do_compact(&table, &MergeExecutor).await.is_err());
        assert_eq!(file_io.file_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_compact() {
        let table = FileStoreTable::in_memory("t", CompactionConfig::default());
        let inputs = vec![
            DataFileMeta::new_append("a", 1, 10),
            DataFileMeta::new_append("b", 2, 20),
        ];
        let (message, stat) = AppendCompactTask::new(inputs, 0)
            .do_compact_with_stat(&table, &MockExecutor)
            .await
            .unwrap();
        assert_eq!(message.compact_increment.compact_after[0].row_count, 3);
        assert_eq!(stat.input_files_count, 2);
        assert_eq!(stat.output_total_bytes, 30);
    }
}
