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

use async_trait::async_trait;

use super::*;
use crate::spec::FileSource;

/// Pretends to merge: returns one output file carrying the summed row count
/// and size of the inputs without reading or writing any data.
pub struct MockExecutor;

#[async_trait]
impl CompactionExecutor for MockExecutor {
    async fn rewrite_files(&self, request: RewriteFilesRequest) -> Result<RewriteFilesResponse> {
        if request.input_files.is_empty() {
            return Ok(RewriteFilesResponse::default());
        }
        let output = DataFileMeta::new(
            crate::io::new_data_file_name(),
            request.input_files.iter().map(|f| f.row_count).sum(),
            request.input_files.iter().map(|f| f.file_size).sum(),
            request.output_level,
            FileSource::Compact,
        );
        let data_files = vec![output];
        let stat = RewriteFilesStat::new(&request.input_files, &data_files);
        Ok(RewriteFilesResponse { data_files, stat })
    }
}
