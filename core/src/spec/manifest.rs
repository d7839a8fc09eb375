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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::DataFileMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: FileKind,
    pub file: DataFileMeta,
}

impl ManifestEntry {
    pub fn add(file: DataFileMeta) -> Self {
        Self {
            kind: FileKind::Add,
            file,
        }
    }

    pub fn delete(file: DataFileMeta) -> Self {
        Self {
            kind: FileKind::Delete,
            file,
        }
    }
}

/// Ordered file additions and removals that turn one snapshot's file set into the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDelta {
    entries: Vec<ManifestEntry>,
}

impl ManifestDelta {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &DataFileMeta> {
        self.files_of(FileKind::Add)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &DataFileMeta> {
        self.files_of(FileKind::Delete)
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted().next().is_some()
    }

    /// Rows added minus rows removed.
    pub fn record_count_delta(&self) -> i64 {
        self.entries
            .iter()
            .map(|entry| match entry.kind {
                FileKind::Add => entry.file.row_count as i64,
                FileKind::Delete => -(entry.file.row_count as i64),
            })
            .sum()
    }

    fn files_of(&self, kind: FileKind) -> impl Iterator<Item = &DataFileMeta> {
        self.entries
            .iter()
            .filter(move |entry| entry.kind == kind)
            .map(|entry| &entry.file)
    }
}

/// Files removed by both deltas.
///
/// A non-empty result means `mine` can not be rebased on top of `theirs`: the
/// same file would be deleted twice and its rows dropped or duplicated.
pub fn conflicting_deletes(mine: &ManifestDelta, theirs: &ManifestDelta) -> Vec<String> {
    let theirs: HashSet<&str> = theirs.deleted().map(|f| f.file_name()).collect();
    if theirs.is_empty() {
        return vec![];
    }
    let mut conflicts: Vec<String> = mine
        .deleted()
        .filter(|f| theirs.contains(f.file_name()))
        .map(|f| f.file_name.clone())
        .collect();
    conflicts.sort();
    conflicts.dedup();
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, rows: u64) -> DataFileMeta {
        DataFileMeta::new_append(name, rows, rows * 10)
    }

    #[test]
    fn test_record_count_delta() {
        let delta = ManifestDelta::new(vec![
            ManifestEntry::delete(file("a", 3)),
            ManifestEntry::delete(file("b", 4)),
            ManifestEntry::add(file("c", 7)),
            ManifestEntry::add(file("d", 2)),
        ]);
        assert_eq!(delta.record_count_delta(), 2);
        assert_eq!(delta.added().count(), 2);
        assert_eq!(delta.deleted().count(), 2);
    }

    #[test]
    fn test_conflicting_deletes_detects_double_delete() {
        let mine = ManifestDelta::new(vec![
            ManifestEntry::delete(file("a", 1)),
            ManifestEntry::delete(file("b", 1)),
            ManifestEntry::add(file("ab", 2)),
        ]);
        let theirs = ManifestDelta::new(vec![
            ManifestEntry::delete(file("b", 1)),
            ManifestEntry::delete(file("c", 1)),
            ManifestEntry::add(file("bc", 2)),
        ]);
        assert_eq!(conflicting_deletes(&mine, &theirs), vec!["b".to_owned()]);
    }

    #[test]
    fn test_appends_never_conflict() {
        let mine = ManifestDelta::new(vec![ManifestEntry::delete(file("a", 1))]);
        let theirs = ManifestDelta::new(vec![ManifestEntry::add(file("a2", 1))]);
        assert!(conflicting_deletes(&mine, &theirs).is_empty());

        let mine = ManifestDelta::new(vec![ManifestEntry::add(file("x", 1))]);
        let theirs = ManifestDelta::new(vec![ManifestEntry::delete(file("y", 1))]);
        assert!(conflicting_deletes(&mine, &theirs).is_empty());
    }
}
