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

use std::time::Instant;

use async_trait::async_trait;
use futures::TryStreamExt;

use super::{CompactionExecutor, RewriteFilesRequest, RewriteFilesResponse, RewriteFilesStat};
use crate::error::Result;
use crate::io::RollingFileWriter;
use crate::spec::{DataFileMeta, FileSource};

/// Streams every input row into new files sized toward the target file size.
///
/// Rows keep their per-file order but files are visited in request order, so
/// the output order is not the table's original order. On failure every output
/// file the attempt started is deleted again.
pub struct MergeExecutor;

#[async_trait]
impl CompactionExecutor for MergeExecutor {
    async fn rewrite_files(&self, request: RewriteFilesRequest) -> Result<RewriteFilesResponse> {
        let start = Instant::now();
        let mut writer = RollingFileWriter::new(
            request.file_io.clone(),
            request.output_level,
            FileSource::Compact,
            request.config.target_file_size,
            request.config.max_concurrent_closes,
        );

        let data_files = match copy_rows(&request, &mut writer).await {
            Ok(data_files) => data_files,
            Err(e) => {
                writer.abort().await;
                return Err(e);
            }
        };

        let stat = RewriteFilesStat::new(&request.input_files, &data_files);
        tracing::info!(
            "Merged {} files ({} rows, {} bytes) into {} files ({} bytes) in {:?}",
            stat.input_files_count,
            stat.input_row_count,
            stat.input_total_bytes,
            stat.output_files_count,
            stat.output_total_bytes,
            start.elapsed()
        );
        Ok(RewriteFilesResponse { data_files, stat })
    }
}

async fn copy_rows(
    request: &RewriteFilesRequest,
    writer: &mut RollingFileWriter,
) -> Result<Vec<DataFileMeta>> {
    for file in &request.input_files {
        let mut batches = request.file_io.read(file);
        while let Some(batch) = batches.try_next().await? {
            writer.write(batch).await?;
        }
    }
    writer.close().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int32Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::ErrorKind;
    use crate::config::CompactionConfigBuilder;
    use crate::io::{FileIO, MemoryFileIO};

    async fn write_file(io: &MemoryFileIO, rows: i32) -> DataFileMeta {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from((0..rows).collect::<Vec<_>>()))],
        )
        .unwrap();
        let mut writer = io.new_writer(0, FileSource::Append).await.unwrap();
        writer.write(batch).await.unwrap();
        writer.close().await.unwrap()
    }

    fn request(io: &MemoryFileIO, files: Vec<DataFileMeta>, target: u64) -> RewriteFilesRequest {
        RewriteFilesRequest {
            file_io: Arc::new(io.clone()),
            input_files: files,
            output_level: 0,
            config: Arc::new(
                CompactionConfigBuilder::default()
                    .target_file_size(target)
                    .build()
                    .unwrap(),
            ),
        }
    }

    #[tokio::test]
    async fn test_merge_conserves_rows() {
        let io = MemoryFileIO::new();
        let mut inputs = vec![];
        for rows in 1..=6 {
            inputs.push(write_file(&io, rows).await);
        }

        let response = MergeExecutor
            .rewrite_files(request(&io, inputs.clone(), 1 << 30))
            .await
            .unwrap();

        assert_eq!(response.data_files.len(), 1);
        assert_eq!(response.stat.input_row_count, 21);
        assert_eq!(response.stat.output_row_count, 21);
        assert!(
            response
                .data_files
                .iter()
                .all(|f| f.file_source == FileSource::Compact)
        );
        // inputs are left in place, they are still referenced by the table
        assert!(inputs.iter().all(|f| io.contains(f.file_name())));
    }

    #[tokio::test]
    async fn test_read_failure_leaves_no_outputs() {
        let io = MemoryFileIO::new();
        let mut inputs = vec![write_file(&io, 3).await, write_file(&io, 4).await];
        inputs.push(DataFileMeta::new_append("missing.parquet", 1, 1));

        let err = MergeExecutor
            .rewrite_files(request(&io, inputs, 1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(io.file_count(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_outputs() {
        let io = MemoryFileIO::new();
        let inputs = vec![write_file(&io, 100).await, write_file(&io, 100).await];
        let stored: u64 = inputs.iter().map(|f| f.file_size).sum();
        // room for roughly one more file
        io.set_capacity(stored + inputs[0].file_size + inputs[0].file_size / 2);

        let err = MergeExecutor
            .rewrite_files(request(&io, inputs, 1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(io.file_count(), 2);
    }
}
