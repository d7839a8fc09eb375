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

use std::collections::BTreeMap;

use crate::spec::{DataFileMeta, FileKind, ManifestDelta};

/// Files believed to be live in the table and not yet claimed by a compaction plan.
///
/// The set is a pure fold over snapshot deltas: replaying the full history into
/// an empty set rebuilds exactly the table's live files. Planning removes
/// claimed files through [`RestoredFileSet::withdraw`], which is the only other
/// mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredFileSet {
    files: BTreeMap<String, DataFileMeta>,
}

impl RestoredFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `deltas` in order into an empty set.
    pub fn rebuild<'a>(deltas: impl IntoIterator<Item = &'a ManifestDelta>) -> Self {
        deltas.into_iter().fold(Self::new(), |mut set, delta| {
            set.apply(delta);
            set
        })
    }

    pub fn apply(&mut self, delta: &ManifestDelta) {
        for entry in delta.entries() {
            match entry.kind {
                FileKind::Add => {
                    self.files
                        .insert(entry.file.file_name.clone(), entry.file.clone());
                }
                FileKind::Delete => {
                    self.files.remove(entry.file.file_name());
                }
            }
        }
    }

    /// Removes claimed files; names not in the set are ignored.
    pub fn withdraw(&mut self, files: &[DataFileMeta]) {
        for file in files {
            self.files.remove(file.file_name());
        }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files ordered by name.
    pub fn files(&self) -> impl Iterator<Item = &DataFileMeta> {
        self.files.values()
    }

    pub fn total_row_count(&self) -> u64 {
        self.files.values().map(|f| f.row_count).sum()
    }
}
