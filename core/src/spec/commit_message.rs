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

use super::DataFileMeta;

/// Files rewritten by one compaction: `compact_before` leave the table, `compact_after` join it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactIncrement {
    pub compact_before: Vec<DataFileMeta>,
    pub compact_after: Vec<DataFileMeta>,
}

impl CompactIncrement {
    pub fn new(compact_before: Vec<DataFileMeta>, compact_after: Vec<DataFileMeta>) -> Self {
        Self {
            compact_before,
            compact_after,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.compact_before.is_empty() && self.compact_after.is_empty()
    }
}

/// Unit handed to [`crate::commit::TableCommit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMessage {
    pub new_files: Vec<DataFileMeta>,
    pub compact_increment: CompactIncrement,
}

impl CommitMessage {
    pub fn append(new_files: Vec<DataFileMeta>) -> Self {
        Self {
            new_files,
            compact_increment: CompactIncrement::default(),
        }
    }

    pub fn compact(compact_before: Vec<DataFileMeta>, compact_after: Vec<DataFileMeta>) -> Self {
        Self {
            new_files: vec![],
            compact_increment: CompactIncrement::new(compact_before, compact_after),
        }
    }

    pub fn new_files(&self) -> &[DataFileMeta] {
        &self.new_files
    }

    pub fn compact_increment(&self) -> &CompactIncrement {
        &self.compact_increment
    }

    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.compact_increment.is_empty()
    }
}
