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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use arrow_array::RecordBatch;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use super::{DataFileWriter, FileIO, new_data_file_name};
use crate::spec::{DataFileMeta, FileSource};
use crate::{CompactionError, Result};

#[derive(Debug, Default)]
struct MemoryStorage {
    files: RwLock<HashMap<String, Vec<RecordBatch>>>,
    /// Bytes the storage may hold before writes fail.
    capacity: AtomicU64,
}

impl MemoryStorage {
    fn used_bytes(&self) -> u64 {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|batches| batches_size(batches))
            .sum()
    }
}

/// Data files kept as Arrow batches in process memory.
///
/// A file's size is the in-memory size of its batches. Clones share storage.
#[derive(Debug, Clone)]
pub struct MemoryFileIO {
    storage: Arc<MemoryStorage>,
}

impl Default for MemoryFileIO {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileIO {
    pub fn new() -> Self {
        let storage = MemoryStorage::default();
        storage.capacity.store(u64::MAX, Ordering::Relaxed);
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Makes writes fail once stored plus pending bytes would exceed `capacity`.
    pub fn set_capacity(&self, capacity: u64) {
        self.storage.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn file_count(&self) -> usize {
        self.storage
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.storage
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(file_name)
    }
}

#[async_trait]
impl FileIO for MemoryFileIO {
    fn read(&self, file: &DataFileMeta) -> BoxStream<'static, Result<RecordBatch>> {
        let batches = self
            .storage
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file.file_name())
            .cloned();
        match batches {
            Some(batches) => stream::iter(batches.into_iter().map(Ok)).boxed(),
            None => {
                let err = std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("data file {} does not exist", file.file_name()),
                );
                stream::once(async move { Err(CompactionError::from(err)) }).boxed()
            }
        }
    }

    async fn new_writer(&self, level: u32, source: FileSource) -> Result<Box<dyn DataFileWriter>> {
        Ok(Box::new(MemoryDataFileWriter {
            storage: self.storage.clone(),
            file_name: new_data_file_name(),
            level,
            source,
            batches: vec![],
            written_size: 0,
        }))
    }

    async fn delete_file(&self, file_name: &str) -> Result<()> {
        self.storage
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file_name);
        Ok(())
    }
}

struct MemoryDataFileWriter {
    storage: Arc<MemoryStorage>,
    file_name: String,
    level: u32,
    source: FileSource,
    batches: Vec<RecordBatch>,
    written_size: u64,
}

#[async_trait]
impl DataFileWriter for MemoryDataFileWriter {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn write(&mut self, batch: RecordBatch) -> Result<()> {
        let size = batch.get_array_memory_size() as u64;
        self.check_capacity(size)?;
        self.written_size += size;
        self.batches.push(batch);
        Ok(())
    }

    fn current_written_size(&self) -> u64 {
        self.written_size
    }

    async fn close(&mut self) -> Result<DataFileMeta> {
        self.check_capacity(0)?;
        let batches = std::mem::take(&mut self.batches);
        let row_count = batches.iter().map(|b| b.num_rows() as u64).sum();
        let file_size = batches_size(&batches);
        self.storage
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.file_name.clone(), batches);
        Ok(DataFileMeta::new(
            self.file_name.clone(),
            row_count,
            file_size,
            self.level,
            self.source,
        ))
    }
}

impl MemoryDataFileWriter {
    fn check_capacity(&self, incoming: u64) -> Result<()> {
        let capacity = self.storage.capacity.load(Ordering::Relaxed);
        let required = self
            .storage
            .used_bytes()
            .saturating_add(self.written_size)
            .saturating_add(incoming);
        if required > capacity {
            return Err(std::io::Error::other(format!(
                "no space left for {} in memory storage of {} bytes",
                self.file_name, capacity
            ))
            .into());
        }
        Ok(())
    }
}

fn batches_size(batches: &[RecordBatch]) -> u64 {
    batches
        .iter()
        .map(|b| b.get_array_memory_size() as u64)
        .sum()
}
