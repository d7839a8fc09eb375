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

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use arrow_array::RecordBatch;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use parquet::arrow::{AsyncArrowWriter, ParquetRecordBatchStreamBuilder};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tokio::fs;

use super::{DataFileWriter, FileIO, new_data_file_name};
use crate::spec::{DataFileMeta, FileSource};
use crate::{CompactionError, Result};

const DATA_DIR: &str = "data";

/// Parquet data files under `<table>/data/` on the local filesystem.
#[derive(Debug, Clone)]
pub struct ParquetFileIO {
    data_dir: PathBuf,
    props: WriterProperties,
}

impl ParquetFileIO {
    pub async fn new(table_path: impl AsRef<Path>) -> Result<Self> {
        let data_dir = table_path.as_ref().join(DATA_DIR);
        fs::create_dir_all(&data_dir).await?;
        Ok(Self {
            data_dir,
            props: WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build(),
        })
    }

    pub fn data_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }
}

fn read_parquet(path: PathBuf) -> impl Stream<Item = Result<RecordBatch>> + Send + 'static {
    try_stream! {
        let file = fs::File::open(&path).await?;
        let mut batches = ParquetRecordBatchStreamBuilder::new(file).await?.build()?;
        while let Some(batch) = batches.try_next().await? {
            yield batch;
        }
    }
}

#[async_trait]
impl FileIO for ParquetFileIO {
    fn read(&self, file: &DataFileMeta) -> BoxStream<'static, Result<RecordBatch>> {
        read_parquet(self.data_path(file.file_name())).boxed()
    }

    async fn new_writer(&self, level: u32, source: FileSource) -> Result<Box<dyn DataFileWriter>> {
        let file_name = new_data_file_name();
        Ok(Box::new(ParquetDataFileWriter {
            path: self.data_path(&file_name),
            file_name,
            level,
            source,
            props: self.props.clone(),
            writer: None,
            row_count: 0,
        }))
    }

    async fn delete_file(&self, file_name: &str) -> Result<()> {
        match fs::remove_file(self.data_path(file_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens the file on the first batch, once the schema is known.
struct ParquetDataFileWriter {
    path: PathBuf,
    file_name: String,
    level: u32,
    source: FileSource,
    props: WriterProperties,
    writer: Option<AsyncArrowWriter<fs::File>>,
    row_count: u64,
}

#[async_trait]
impl DataFileWriter for ParquetDataFileWriter {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn write(&mut self, batch: RecordBatch) -> Result<()> {
        if self.writer.is_none() {
            let file = fs::File::create(&self.path).await?;
            self.writer = Some(AsyncArrowWriter::try_new(
                file,
                batch.schema(),
                Some(self.props.clone()),
            )?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch).await?;
        }
        self.row_count += batch.num_rows() as u64;
        Ok(())
    }

    fn current_written_size(&self) -> u64 {
        self.writer
            .as_ref()
            .map_or(0, |w| (w.bytes_written() + w.in_progress_size()) as u64)
    }

    async fn close(&mut self) -> Result<DataFileMeta> {
        let writer = self.writer.take().ok_or_else(|| {
            CompactionError::Unexpected(format!("data file {} has no rows", self.file_name))
        })?;
        writer.close().await?;
        let file_size = fs::metadata(&self.path).await?.len();
        Ok(DataFileMeta::new(
            self.file_name.clone(),
            self.row_count,
            file_size,
            self.level,
            self.source,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn batch(start: i64, rows: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let ids: Vec<i64> = (start..start + rows).collect();
        let names: Vec<String> = ids.iter().map(|i| format!("name-{}", i)).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let io = ParquetFileIO::new(dir.path()).await.unwrap();

        let mut writer = io.new_writer(0, FileSource::Append).await.unwrap();
        assert_eq!(writer.current_written_size(), 0);
        writer.write(batch(0, 100)).await.unwrap();
        let first_size = writer.current_written_size();
        assert!(first_size > 0);
        writer.write(batch(100, 50)).await.unwrap();
        assert!(writer.current_written_size() >= first_size);
        let file = writer.close().await.unwrap();

        assert_eq!(file.row_count, 150);
        assert!(io.data_path(file.file_name()).exists());
        assert_eq!(
            file.file_size,
            std::fs::metadata(io.data_path(file.file_name())).unwrap().len()
        );

        let batches: Vec<RecordBatch> = io.read(&file).try_collect().await.unwrap();
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 150);
    }

    #[tokio::test]
    async fn test_delete_and_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        let io = ParquetFileIO::new(dir.path()).await.unwrap();

        let mut writer = io.new_writer(0, FileSource::Append).await.unwrap();
        writer.write(batch(0, 1)).await.unwrap();
        let file = writer.close().await.unwrap();

        io.delete_file(file.file_name()).await.unwrap();
        io.delete_file(file.file_name()).await.unwrap();
        let err = io.read(&file).try_collect::<Vec<_>>().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
    }

    #[tokio::test]
    async fn test_close_empty_writer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let io = ParquetFileIO::new(dir.path()).await.unwrap();
        let mut writer = io.new_writer(0, FileSource::Append).await.unwrap();
        assert!(writer.close().await.is_err());
    }
}
