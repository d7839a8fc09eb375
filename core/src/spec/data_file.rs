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

use serde::{Deserialize, Serialize};

/// Which write path produced a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSource {
    Append,
    Compact,
}

/// Metadata of one immutable data file.
///
/// `row_count` and `file_size` are fixed when the file is closed; a file is
/// either referenced by a snapshot's state as a whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFileMeta {
    /// Unique name of the file, relative to the table data directory.
    pub file_name: String,
    pub row_count: u64,
    /// Size in bytes.
    pub file_size: u64,
    /// Compaction generation, 0 for freshly written files.
    pub level: u32,
    pub file_source: FileSource,
}

impl DataFileMeta {
    pub fn new(
        file_name: impl Into<String>,
        row_count: u64,
        file_size: u64,
        level: u32,
        file_source: FileSource,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            row_count,
            file_size,
            level,
            file_source,
        }
    }

    /// Shorthand for a level-0 file produced by the append path.
    pub fn new_append(file_name: impl Into<String>, row_count: u64, file_size: u64) -> Self {
        Self::new(file_name, row_count, file_size, 0, FileSource::Append)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
