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

//! Table read and write path for data files.

use arrow_array::RecordBatch;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;
use crate::spec::{DataFileMeta, FileSource};

mod memory;
mod parquet_file;
mod rolling_writer;

pub use memory::MemoryFileIO;
pub use parquet_file::ParquetFileIO;
pub use rolling_writer::{RollingFileWriter, need_build_new_file};

/// Writer of exactly one new data file.
#[async_trait]
pub trait DataFileWriter: Send + 'static {
    /// Name the file will be published under.
    fn file_name(&self) -> &str;

    async fn write(&mut self, batch: RecordBatch) -> Result<()>;

    fn current_written_size(&self) -> u64;

    /// Finishes the file and returns its metadata.
    async fn close(&mut self) -> Result<DataFileMeta>;
}

/// Storage of a table's data files.
#[async_trait]
pub trait FileIO: Send + Sync + 'static {
    /// Streams every row of `file`.
    fn read(&self, file: &DataFileMeta) -> BoxStream<'static, Result<RecordBatch>>;

    /// Starts a new data file at `level`, named uniquely.
    async fn new_writer(&self, level: u32, source: FileSource) -> Result<Box<dyn DataFileWriter>>;

    /// Removes a data file. Removing a missing file succeeds.
    async fn delete_file(&self, file_name: &str) -> Result<()>;
}

pub(crate) fn new_data_file_name() -> String {
    format!("data-{}.parquet", uuid::Uuid::new_v4())
}
