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

//! Validation of a commit's delta before and after rebasing it.

use std::collections::HashSet;
use std::sync::Arc;

use super::index::LiveFileIndex;
use crate::spec::{
    CommitKind, CommitMessage, ManifestDelta, ManifestEntry, Snapshot, SnapshotId,
    conflicting_deletes,
};
use crate::{CompactionError, Result};

/// Folds all messages into one delta: removals first, then additions.
///
/// A file may appear at most once across all removals and additions.
pub(crate) fn merge_messages(messages: &[CommitMessage]) -> Result<ManifestDelta> {
    let mut seen = HashSet::new();
    let mut delta = ManifestDelta::default();

    let deletes = messages
        .iter()
        .flat_map(|m| m.compact_increment.compact_before.iter());
    for file in deletes {
        if !seen.insert(file.file_name()) {
            return Err(CompactionError::InvalidCommit(format!(
                "file {} is removed more than once",
                file.file_name()
            )));
        }
        delta.push(ManifestEntry::delete(file.clone()));
    }

    let adds = messages.iter().flat_map(|m| {
        m.new_files
            .iter()
            .chain(m.compact_increment.compact_after.iter())
    });
    for file in adds {
        if !seen.insert(file.file_name()) {
            return Err(CompactionError::InvalidCommit(format!(
                "file {} is added more than once or both added and removed",
                file.file_name()
            )));
        }
        delta.push(ManifestEntry::add(file.clone()));
    }

    Ok(delta)
}

/// `Compact` when only compaction results are committed.
pub(crate) fn commit_kind(messages: &[CommitMessage]) -> CommitKind {
    if messages.iter().all(|m| m.new_files.is_empty()) {
        CommitKind::Compact
    } else {
        CommitKind::Append
    }
}

/// Rejects `delta` if any snapshot committed after `base_version` removed one
/// of the files it removes.
pub(crate) fn check_rebase(
    base_version: Option<SnapshotId>,
    committed_since: &[Arc<Snapshot>],
    delta: &ManifestDelta,
) -> Result<()> {
    if !delta.has_deletions() {
        return Ok(());
    }
    for theirs in committed_since {
        let files = conflicting_deletes(delta, &theirs.delta);
        if !files.is_empty() {
            return Err(CompactionError::Conflict {
                base_version,
                conflicting_version: Some(theirs.id),
                files,
            });
        }
    }
    Ok(())
}

/// Checks `delta` against the live files it would be applied on.
pub(crate) fn check_live(index: &LiveFileIndex, delta: &ManifestDelta) -> Result<()> {
    let mut missing: Vec<String> = delta
        .deleted()
        .filter(|f| !index.is_live(f.file_name()))
        .map(|f| f.file_name.clone())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        let conflicting_version = missing.iter().find_map(|f| index.removed_by(f));
        return Err(CompactionError::Conflict {
            base_version: index.snapshot_id(),
            conflicting_version,
            files: missing,
        });
    }

    if let Some(file) = delta.added().find(|f| index.is_live(f.file_name())) {
        return Err(CompactionError::InvalidCommit(format!(
            "file {} is already live in snapshot {:?}",
            file.file_name(),
            index.snapshot_id()
        )));
    }
    Ok(())
}
