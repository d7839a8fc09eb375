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

use async_trait::async_trait;

use crate::config::CompactionConfig;
use crate::error::Result;
use crate::io::FileIO;
use crate::spec::DataFileMeta;

pub mod merge;
pub mod mock;

pub use merge::MergeExecutor;
pub use mock::MockExecutor;

/// Rewrites a set of data files into new ones holding the same rows.
#[async_trait]
pub trait CompactionExecutor: Send + Sync + 'static {
    async fn rewrite_files(&self, request: RewriteFilesRequest) -> Result<RewriteFilesResponse>;
}

pub struct RewriteFilesRequest {
    pub file_io: Arc<dyn FileIO>,
    pub input_files: Vec<DataFileMeta>,
    /// Level assigned to every output file.
    pub output_level: u32,
    pub config: Arc<CompactionConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct RewriteFilesResponse {
    pub data_files: Vec<DataFileMeta>,
    pub stat: RewriteFilesStat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteFilesStat {
    pub input_files_count: usize,
    pub input_total_bytes: u64,
    pub input_row_count: u64,
    pub output_files_count: usize,
    pub output_total_bytes: u64,
    pub output_row_count: u64,
}

impl RewriteFilesStat {
    pub fn new(input_files: &[DataFileMeta], output_files: &[DataFileMeta]) -> Self {
        Self {
            input_files_count: input_files.len(),
            input_total_bytes: input_files.iter().map(|f| f.file_size).sum(),
            input_row_count: input_files.iter().map(|f| f.row_count).sum(),
            output_files_count: output_files.len(),
            output_total_bytes: output_files.iter().map(|f| f.file_size).sum(),
            output_row_count: output_files.iter().map(|f| f.row_count).sum(),
        }
    }

    pub fn merge(&mut self, other: &RewriteFilesStat) {
        self.input_files_count += other.input_files_count;
        self.input_total_bytes += other.input_total_bytes;
        self.input_row_count += other.input_row_count;
        self.output_files_count += other.output_files_count;
        self.output_total_bytes += other.output_total_bytes;
        self.output_row_count += other.output_row_count;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorType {
    /// Reads every input row and writes it through the rolling writer.
    #[default]
    Merge,
    /// Produces output metadata without touching any data file. Its outputs
    /// never pass validation, so nothing it plans is ever committed.
    Mock,
}

impl ExecutorType {
    /// Whether the executor's output files hold the rows they declare.
    pub fn writes_data(&self) -> bool {
        match self {
            ExecutorType::Merge => true,
            ExecutorType::Mock => false,
        }
    }
}

pub fn create_compaction_executor(executor_type: ExecutorType) -> Box<dyn CompactionExecutor> {
    match executor_type {
        ExecutorType::Merge => Box::new(MergeExecutor),
        ExecutorType::Mock => Box::new(MockExecutor),
    }
}
