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

use thiserror::Error;

use crate::spec::SnapshotId;

/// Coarse classification of [`CompactionError`], used by callers to decide on recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A snapshot id does not exist or was expired.
    NotFound,
    /// A commit was superseded by an incompatible concurrent commit.
    Conflict,
    /// Reading or writing a data file (or snapshot file) failed.
    IoFailure,
    /// Commit retries were exhausted.
    RetryExhausted,
    Other,
}

#[derive(Error, Debug)]
pub enum CompactionError {
    #[error("Snapshot {snapshot_id} not found")]
    NotFound { snapshot_id: SnapshotId },

    #[error(
        "Commit conflict on base snapshot {base_version:?}: files {files:?} were already removed by snapshot {conflicting_version:?}"
    )]
    Conflict {
        base_version: Option<SnapshotId>,
        conflicting_version: Option<SnapshotId>,
        files: Vec<String>,
    },

    #[error(
        "Commit gave up after {attempts} attempts, last base snapshot {base_version:?}, files to remove {files:?}"
    )]
    RetryExhausted {
        attempts: usize,
        base_version: Option<SnapshotId>,
        files: Vec<String>,
    },

    /// Publish lost the race for the next snapshot id. Retried inside the commit loop.
    #[error("Snapshot after base {base_version:?} was published concurrently")]
    Superseded { base_version: Option<SnapshotId> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Compaction validation failed: {0}")]
    CompactionValidator(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl CompactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompactionError::NotFound { .. } => ErrorKind::NotFound,
            CompactionError::Conflict { .. } => ErrorKind::Conflict,
            CompactionError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            CompactionError::Io(_) | CompactionError::Parquet(_) | CompactionError::Arrow(_) => {
                ErrorKind::IoFailure
            }
            _ => ErrorKind::Other,
        }
    }

    /// Only a lost publish race is worth another commit attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompactionError::Superseded { .. })
    }
}

pub type Result<T> = std::result::Result<T, CompactionError>;
