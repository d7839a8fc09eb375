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

//! Logical table model: data files, snapshots, manifest deltas and commit messages.

mod commit_message;
mod data_file;
mod manifest;
mod snapshot;

pub use commit_message::{CommitMessage, CompactIncrement};
pub use data_file::{DataFileMeta, FileSource};
pub use manifest::{FileKind, ManifestDelta, ManifestEntry, conflicting_deletes};
pub use snapshot::{CommitKind, Snapshot, SnapshotId};
