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

use append_compaction_core::{
    CompactionConfig, CompactionConfigBuilder, CompactionError, FileStoreTable, Result,
    TableCommit,
};
use arrow_array::{Int64Array, RecordBatch};
use futures::TryStreamExt;

use crate::test_utils::generator::RecordBatchGenerator;

pub mod generator;

pub const TEST_TARGET_FILE_SIZE: u64 = 128 * 1024 * 1024;

pub fn test_config(min_file_num: usize) -> Result<CompactionConfig> {
    CompactionConfigBuilder::default()
        .min_file_num(min_file_num)
        .target_file_size(TEST_TARGET_FILE_SIZE)
        .enable_validate_compaction(true)
        .build()
}

/// Writes `files` files of `rows_per_file` rows, one commit per file.
///
/// Ids continue from `first_id`; returns the id after the last row written.
pub async fn append_files(
    table: &FileStoreTable,
    commit: &TableCommit,
    files: usize,
    rows_per_file: usize,
    first_id: i64,
) -> Result<i64> {
    let mut next_id = first_id;
    for _ in 0..files {
        let mut write = table.new_write();
        let generator = RecordBatchGenerator::new(rows_per_file, next_id);
        let mut batches = std::pin::pin!(generator.generate());
        while let Some(batch) = batches.try_next().await? {
            write.write(batch).await?;
        }
        commit.commit(vec![write.prepare_commit().await?]).await?;
        next_id += rows_per_file as i64;
    }
    Ok(next_id)
}

/// Sorted ids of every live row.
pub async fn collect_ids(table: &FileStoreTable) -> Result<Vec<i64>> {
    let mut ids = vec![];
    for batch in table.read_all().await? {
        ids.extend(id_column(&batch)?.values().iter().copied());
    }
    ids.sort_unstable();
    Ok(ids)
}

fn id_column(batch: &RecordBatch) -> Result<&Int64Array> {
    batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| CompactionError::Unexpected("batch has no Int64 id column".to_owned()))
}

pub async fn live_row_count(table: &FileStoreTable) -> Result<u64> {
    Ok(table
        .live_files()
        .await?
        .iter()
        .map(|f| f.row_count)
        .sum())
}

/// Installs a fmt subscriber for the bench binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
