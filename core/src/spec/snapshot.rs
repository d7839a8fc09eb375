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

use super::ManifestDelta;

/// Snapshot ids start at 1 and grow by exactly one per published commit.
pub type SnapshotId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommitKind {
    Append,
    Compact,
    Overwrite,
}

impl std::fmt::Display for CommitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitKind::Append => write!(f, "APPEND"),
            CommitKind::Compact => write!(f, "COMPACT"),
            CommitKind::Overwrite => write!(f, "OVERWRITE"),
        }
    }
}

/// Immutable point-in-time version of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub commit_user: String,
    pub commit_identifier: u64,
    pub commit_kind: CommitKind,
    pub time_millis: u64,
    /// Changes relative to snapshot `id - 1`.
    pub delta: ManifestDelta,
    /// Rows live in the table once this snapshot is applied.
    pub total_record_count: u64,
    pub delta_record_count: i64,
}
