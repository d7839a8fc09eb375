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

use std::sync::Arc;

use arrow_array::RecordBatch;
use futures::future;
use tokio::task::JoinHandle;

use super::{DataFileWriter, FileIO};
use crate::spec::{DataFileMeta, FileSource};
use crate::{CompactionError, Result};

/// Splits written rows into files of roughly `target_file_size` bytes.
///
/// A new file is started lazily on the first batch after a roll. Finished files
/// are closed on spawned tasks, at most `max_concurrent_closes` at a time.
pub struct RollingFileWriter {
    file_io: Arc<dyn FileIO>,
    level: u32,
    file_source: FileSource,
    /// The current active writer.
    inner_writer: Option<Box<dyn DataFileWriter>>,
    target_file_size: u64,
    /// Files already closed.
    data_files: Vec<DataFileMeta>,
    close_futures: Vec<JoinHandle<Result<DataFileMeta>>>,
    /// Names of every file this writer started, closed or not.
    started_files: Vec<String>,
    max_concurrent_closes: usize,
}

impl RollingFileWriter {
    pub fn new(
        file_io: Arc<dyn FileIO>,
        level: u32,
        file_source: FileSource,
        target_file_size: u64,
        max_concurrent_closes: usize,
    ) -> Self {
        Self {
            file_io,
            level,
            file_source,
            inner_writer: None,
            target_file_size,
            data_files: vec![],
            close_futures: vec![],
            started_files: vec![],
            max_concurrent_closes: max_concurrent_closes.max(1),
        }
    }

    pub async fn write(&mut self, input: RecordBatch) -> Result<()> {
        if input.num_rows() == 0 {
            return Ok(());
        }
        let input_size = input.get_array_memory_size() as u64;
        let current_written_size = self
            .inner_writer
            .as_ref()
            .map_or(0, |w| w.current_written_size());

        if need_build_new_file(current_written_size, input_size, self.target_file_size) {
            if let Some(mut inner_writer) = self.inner_writer.take() {
                if self.close_futures.len() >= self.max_concurrent_closes {
                    self.wait_for_one_close().await?;
                }
                let close_handle = tokio::spawn(async move { inner_writer.close().await });
                self.close_futures.push(close_handle);
            }
        }

        if self.inner_writer.is_none() {
            let writer = self
                .file_io
                .new_writer(self.level, self.file_source)
                .await?;
            self.started_files.push(writer.file_name().to_owned());
            self.inner_writer = Some(writer);
        }
        if let Some(writer) = self.inner_writer.as_mut() {
            writer.write(input).await?;
        }
        Ok(())
    }

    /// Closes every file and returns them in no particular order.
    pub async fn close(&mut self) -> Result<Vec<DataFileMeta>> {
        let mut data_files = std::mem::take(&mut self.data_files);

        for close_handle in std::mem::take(&mut self.close_futures) {
            data_files.push(join_close(close_handle).await?);
        }

        if let Some(mut writer) = self.inner_writer.take() {
            data_files.push(writer.close().await?);
        }
        self.started_files.clear();
        Ok(data_files)
    }

    /// Deletes every file this writer started since the last successful `close`.
    ///
    /// None of them were published, so failures are only logged.
    pub async fn abort(&mut self) {
        self.inner_writer = None;
        for close_handle in std::mem::take(&mut self.close_futures) {
            // Let in-flight closes finish so their files can be removed.
            if let Err(e) = join_close(close_handle).await {
                tracing::debug!("Close failed while aborting writer: {}", e);
            }
        }
        self.data_files.clear();

        for file_name in std::mem::take(&mut self.started_files) {
            if let Err(e) = self.file_io.delete_file(&file_name).await {
                tracing::warn!("Failed to delete orphaned data file {}: {}", file_name, e);
            }
        }
    }

    async fn wait_for_one_close(&mut self) -> Result<()> {
        if self.close_futures.is_empty() {
            return Ok(());
        }

        let (result, _index, remaining) =
            future::select_all(std::mem::take(&mut self.close_futures)).await;
        self.close_futures = remaining;

        self.data_files.push(flatten_join(result)?);
        Ok(())
    }
}

async fn join_close(handle: JoinHandle<Result<DataFileMeta>>) -> Result<DataFileMeta> {
    flatten_join(handle.await)
}

fn flatten_join(
    result: std::result::Result<Result<DataFileMeta>, tokio::task::JoinError>,
) -> Result<DataFileMeta> {
    match result {
        Ok(result) => result,
        Err(e) => Err(CompactionError::Execution(format!(
            "Failed to join close task: {}",
            e
        ))),
    }
}

pub fn need_build_new_file(
    current_written_size: u64,
    input_size: u64,
    target_file_size: u64,
) -> bool {
    // Below 10% of the target the file is always kept open.
    if current_written_size < target_file_size / 10 {
        return false;
    }
    if current_written_size + input_size > target_file_size * 3 / 2 {
        return true;
    }
    current_written_size + input_size > target_file_size
        && current_written_size > target_file_size * 7 / 10
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use futures::TryStreamExt;

    use super::*;
    use crate::io::MemoryFileIO;

    fn batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_need_build_new_file_total_size_exceeds_threshold() {
        let target_size = 1000;

        assert!(need_build_new_file(800, 800, target_size)); // 1600 > 1500
        assert!(need_build_new_file(1000, 600, target_size));
    }

    #[test]
    fn test_need_build_new_file_normal_cases() {
        let target_size = 1000;

        assert!(need_build_new_file(800, 300, target_size));
        assert!(!need_build_new_file(800, 100, target_size));
        assert!(!need_build_new_file(600, 500, target_size));
    }

    #[test]
    fn test_need_build_new_file_edge_cases() {
        let target_size = 1000;

        assert!(!need_build_new_file(0, 2000, target_size));
        assert!(!need_build_new_file(700, 400, target_size));
        assert!(need_build_new_file(701, 400, target_size));
        assert!(!need_build_new_file(99, 5000, target_size));
    }

    #[tokio::test]
    async fn test_rolls_every_batch_with_tiny_target() {
        let file_io = Arc::new(MemoryFileIO::new());
        let mut writer = RollingFileWriter::new(file_io.clone(), 0, FileSource::Compact, 1, 2);
        for i in 0..5 {
            writer.write(batch(vec![i; (i + 1) as usize])).await.unwrap();
        }
        let files = writer.close().await.unwrap();

        assert_eq!(files.len(), 5);
        assert_eq!(files.iter().map(|f| f.row_count).sum::<u64>(), 15);
        assert!(files.iter().all(|f| f.file_source == FileSource::Compact));
        assert_eq!(file_io.file_count(), 5);
    }

    #[tokio::test]
    async fn test_single_file_with_large_target() {
        let file_io = Arc::new(MemoryFileIO::new());
        let mut writer =
            RollingFileWriter::new(file_io.clone(), 0, FileSource::Append, 1 << 30, 4);
        for i in 0..10 {
            writer.write(batch(vec![i, i + 1])).await.unwrap();
        }
        writer.write(batch(vec![])).await.unwrap();
        let files = writer.close().await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].row_count, 20);
        let rows: Vec<RecordBatch> = file_io.read(&files[0]).try_collect().await.unwrap();
        assert_eq!(rows.iter().map(RecordBatch::num_rows).sum::<usize>(), 20);
    }

    #[tokio::test]
    async fn test_close_without_writes() {
        let file_io = Arc::new(MemoryFileIO::new());
        let mut writer = RollingFileWriter::new(file_io.clone(), 0, FileSource::Append, 100, 1);
        assert!(writer.close().await.unwrap().is_empty());
        assert_eq!(file_io.file_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_removes_started_files() {
        let file_io = Arc::new(MemoryFileIO::new());
        let mut writer = RollingFileWriter::new(file_io.clone(), 0, FileSource::Compact, 1, 1);
        for i in 0..4 {
            writer.write(batch(vec![i])).await.unwrap();
        }
        writer.abort().await;
        assert_eq!(file_io.file_count(), 0);
    }

    #[tokio::test]
    async fn test_panicked_close_is_execution_error() {
        let handle: JoinHandle<Result<DataFileMeta>> =
            tokio::spawn(async { panic!("close panicked") });
        let err = join_close(handle).await.unwrap_err();
        assert!(matches!(err, CompactionError::Execution(_)));
    }

    #[tokio::test]
    async fn test_abort_keeps_closed_files() {
        let file_io = Arc::new(MemoryFileIO::new());
        let mut writer = RollingFileWriter::new(file_io.clone(), 0, FileSource::Append, 1, 1);
        writer.write(batch(vec![1])).await.unwrap();
        let closed = writer.close().await.unwrap();
        writer.write(batch(vec![2])).await.unwrap();
        writer.abort().await;

        assert_eq!(file_io.file_count(), 1);
        assert!(file_io.contains(closed[0].file_name()));
    }
}
