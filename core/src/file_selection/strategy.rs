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

//! Grouping of restored files into compaction candidates.
//!
//! Planning runs in three stages:
//! 1. Level grouping: files are grouped by level, lowest level first, and a
//!    group holding any file of at least the target size is skipped.
//! 2. Grouping: each level group is split by `Single` (all in one) or
//!    `BinPack` (First-Fit Decreasing by file size).
//! 3. Group filters: candidates with too few files are dropped.

use std::collections::btree_map;
use std::collections::BTreeMap;

use itertools::Itertools;

use super::packer::ListPacker;
use crate::config::{CompactionConfig, GroupingStrategy};
use crate::spec::DataFileMeta;

/// Files of one level considered together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub level: u32,
    pub files: Vec<DataFileMeta>,
    pub total_size: u64,
}

impl FileGroup {
    pub fn new(level: u32, files: Vec<DataFileMeta>) -> Self {
        let total_size = files.iter().map(|f| f.file_size).sum();
        Self {
            level,
            files,
            total_size,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn max_file_size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size).max().unwrap_or(0)
    }

    pub fn into_files(self) -> Vec<DataFileMeta> {
        self.files
    }
}

/// Decides whether a group is worth compacting.
pub trait GroupFilterStrategy: std::fmt::Debug + std::fmt::Display + Sync + Send {
    fn keep(&self, group: &FileGroup) -> bool;
}

/// Skips a group entirely once its largest file reaches the target size, so
/// files that are already big are never rewritten again.
#[derive(Debug, Clone)]
pub struct LargeFileSkipStrategy {
    pub target_file_size: u64,
}

impl GroupFilterStrategy for LargeFileSkipStrategy {
    fn keep(&self, group: &FileGroup) -> bool {
        !group.is_empty() && group.max_file_size() < self.target_file_size
    }
}

impl std::fmt::Display for LargeFileSkipStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LargeFileSkip[>={}B]", self.target_file_size)
    }
}

/// Drops candidates holding fewer files than the compaction minimum.
#[derive(Debug, Clone)]
pub struct MinGroupFileCountStrategy {
    pub min_group_file_count: usize,
}

impl GroupFilterStrategy for MinGroupFileCountStrategy {
    fn keep(&self, group: &FileGroup) -> bool {
        group.len() >= self.min_group_file_count
    }
}

impl std::fmt::Display for MinGroupFileCountStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MinGroupFileCount[{}]", self.min_group_file_count)
    }
}

/// Lazy sequence of level groups eligible for compaction, lowest level first.
///
/// Holds its own copy of the files it was created from; groups are materialized
/// one level at a time and the iterator can not be restarted.
#[derive(Debug)]
pub struct FilesIterator {
    levels: btree_map::IntoIter<u32, Vec<DataFileMeta>>,
    skip: LargeFileSkipStrategy,
}

impl FilesIterator {
    pub fn new<'a>(files: impl IntoIterator<Item = &'a DataFileMeta>, target_file_size: u64) -> Self {
        let levels: BTreeMap<u32, Vec<DataFileMeta>> = files
            .into_iter()
            .cloned()
            .into_group_map_by(|f| f.level)
            .into_iter()
            .collect();
        Self {
            levels: levels.into_iter(),
            skip: LargeFileSkipStrategy { target_file_size },
        }
    }
}

impl Iterator for FilesIterator {
    type Item = FileGroup;

    fn next(&mut self) -> Option<FileGroup> {
        for (level, files) in self.levels.by_ref() {
            let group = FileGroup::new(level, files);
            if self.skip.keep(&group) {
                return Some(group);
            }
            tracing::debug!(
                "Skip level {} group of {} files, largest file {} >= {}",
                level,
                group.len(),
                group.max_file_size(),
                self.skip.target_file_size
            );
        }
        None
    }
}

/// Splits an eligible level group into compaction candidates.
#[derive(Debug)]
pub enum GroupingStrategyEnum {
    Single(SingleGroupingStrategy),
    BinPack(BinPackGroupingStrategy),
}

impl GroupingStrategyEnum {
    pub fn from_config(config: &CompactionConfig) -> Self {
        match config.grouping_strategy {
            GroupingStrategy::Single => GroupingStrategyEnum::Single(SingleGroupingStrategy),
            GroupingStrategy::BinPack => GroupingStrategyEnum::BinPack(
                BinPackGroupingStrategy::new(config.target_file_size),
            ),
        }
    }

    pub fn group_files(&self, group: FileGroup) -> Vec<FileGroup> {
        match self {
            GroupingStrategyEnum::Single(strategy) => strategy.group_files(group),
            GroupingStrategyEnum::BinPack(strategy) => strategy.group_files(group),
        }
    }
}

impl std::fmt::Display for GroupingStrategyEnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupingStrategyEnum::Single(strategy) => write!(f, "{}", strategy),
            GroupingStrategyEnum::BinPack(strategy) => write!(f, "{}", strategy),
        }
    }
}

/// Keeps the whole level group as one candidate.
#[derive(Debug)]
pub struct SingleGroupingStrategy;

impl SingleGroupingStrategy {
    pub fn group_files(&self, group: FileGroup) -> Vec<FileGroup> {
        if group.is_empty() {
            vec![]
        } else {
            vec![group]
        }
    }
}

impl std::fmt::Display for SingleGroupingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SingleGrouping")
    }
}

#[derive(Debug)]
pub struct BinPackGroupingStrategy {
    pub target_group_size: u64,
}

impl BinPackGroupingStrategy {
    pub fn new(target_group_size: u64) -> Self {
        Self { target_group_size }
    }

    pub fn group_files(&self, group: FileGroup) -> Vec<FileGroup> {
        let level = group.level;
        ListPacker::new(self.target_group_size)
            .pack(group.into_files(), |f| f.file_size)
            .into_iter()
            .filter(|bin| !bin.is_empty())
            .map(|bin| FileGroup::new(level, bin))
            .collect()
    }
}

impl std::fmt::Display for BinPackGroupingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BinPackGrouping[target={}B]", self.target_group_size)
    }
}
