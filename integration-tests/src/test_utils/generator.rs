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

use std::sync::Arc;

use append_compaction_core::Result;
use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_stream::try_stream;
use rand::Rng;
use rand::distr::Alphanumeric;

const DEFAULT_BATCH_SIZE: usize = 512;
const DEFAULT_STRING_LENGTH: usize = 16;

/// `id: Int64, name: Utf8` schema used by the generated batches.
pub fn test_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]))
}

pub struct RecordBatchGenerator {
    pub num_rows: usize,
    pub batch_size: usize,
    pub first_id: i64,
    pub schema: SchemaRef,
}

impl RecordBatchGenerator {
    /// Generates `num_rows` rows with consecutive ids starting at `first_id`.
    pub fn new(num_rows: usize, first_id: i64) -> Self {
        Self {
            num_rows,
            batch_size: DEFAULT_BATCH_SIZE,
            first_id,
            schema: test_schema(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Yields batches of `batch_size` rows; the last one may be shorter.
    pub fn generate(&self) -> impl futures::Stream<Item = Result<RecordBatch>> + '_ {
        try_stream! {
            let mut remaining = self.num_rows;
            let mut next_id = self.first_id;
            while remaining > 0 {
                let rows = remaining.min(self.batch_size);
                let batch = self.generate_batch(next_id, rows)?;
                remaining -= rows;
                next_id += rows as i64;
                yield batch;
            }
        }
    }

    fn generate_batch(&self, first_id: i64, rows: usize) -> Result<RecordBatch> {
        let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(
            first_id..first_id + rows as i64,
        ));
        let mut rng = rand::rng();
        let names: ArrayRef = Arc::new(StringArray::from_iter_values((0..rows).map(|_| {
            (0..DEFAULT_STRING_LENGTH)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect::<String>()
        })));
        Ok(RecordBatch::try_new(self.schema.clone(), vec![ids, names])?)
    }
}
