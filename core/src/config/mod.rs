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

//! Table options that drive compaction planning, file writing and commit retries.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use derive_builder::Builder;

use crate::{CompactionError, Result};

pub const MIN_FILE_NUM: &str = "compaction.min.file-num";
pub const TARGET_FILE_SIZE: &str = "target-file-size";
pub const FILE_GROUPING: &str = "compaction.file-grouping";
pub const MAX_CONCURRENT_TASKS: &str = "compaction.max-concurrent-tasks";
pub const VALIDATE_COMPACTION: &str = "compaction.validate";
pub const MAX_CONCURRENT_CLOSES: &str = "write.max-concurrent-closes";
pub const COMMIT_MAX_RETRIES: &str = "commit.max-retries";
pub const COMMIT_MIN_RETRY_WAIT: &str = "commit.min-retry-wait";
pub const COMMIT_MAX_RETRY_WAIT: &str = "commit.max-retry-wait";
pub const COMMIT_TIMEOUT: &str = "commit.timeout";

pub const DEFAULT_MIN_FILE_NUM: usize = 5;
pub const DEFAULT_TARGET_FILE_SIZE: u64 = 128 * 1024 * 1024; // 128 MB
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;
pub const DEFAULT_MAX_CONCURRENT_CLOSES: usize = 4;
pub const DEFAULT_COMMIT_MAX_RETRIES: usize = 10;
pub const DEFAULT_COMMIT_MIN_RETRY_WAIT: Duration = Duration::from_millis(10);
pub const DEFAULT_COMMIT_MAX_RETRY_WAIT: Duration = Duration::from_secs(10);

/// How an eligible level group is turned into compaction candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupingStrategy {
    /// The whole group becomes one candidate.
    #[default]
    Single,
    /// First-Fit-Decreasing bins of `target_file_size`.
    BinPack,
}

impl FromStr for GroupingStrategy {
    type Err = CompactionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(GroupingStrategy::Single),
            "bin-pack" | "binpack" => Ok(GroupingStrategy::BinPack),
            other => Err(CompactionError::Config(format!(
                "unknown {} value: {}",
                FILE_GROUPING, other
            ))),
        }
    }
}

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", error = "CompactionError"))]
pub struct CompactionConfig {
    /// Minimum number of files in a group before a task is planned.
    #[builder(default = "DEFAULT_MIN_FILE_NUM")]
    pub min_file_num: usize,
    /// Output size target, and the size at which a file is never re-packed.
    #[builder(default = "DEFAULT_TARGET_FILE_SIZE")]
    pub target_file_size: u64,
    #[builder(default)]
    pub grouping_strategy: GroupingStrategy,
    #[builder(default = "DEFAULT_MAX_CONCURRENT_TASKS")]
    pub max_concurrent_tasks: usize,
    #[builder(default = "DEFAULT_MAX_CONCURRENT_CLOSES")]
    pub max_concurrent_closes: usize,
    /// Check row-count conservation of every task before committing it.
    #[builder(default)]
    pub enable_validate_compaction: bool,
    #[builder(default)]
    pub commit_retry: CommitRetryConfig,
}

impl CompactionConfigBuilder {
    fn validate(&self) -> std::result::Result<(), CompactionError> {
        if self.min_file_num == Some(0) {
            return Err(CompactionError::Config(format!(
                "{} must be at least 1",
                MIN_FILE_NUM
            )));
        }
        if self.max_concurrent_tasks == Some(0) || self.max_concurrent_closes == Some(0) {
            return Err(CompactionError::Config(
                "concurrency limits must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl From<derive_builder::UninitializedFieldError> for CompactionError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        CompactionError::Config(e.to_string())
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            min_file_num: DEFAULT_MIN_FILE_NUM,
            target_file_size: DEFAULT_TARGET_FILE_SIZE,
            grouping_strategy: GroupingStrategy::default(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            max_concurrent_closes: DEFAULT_MAX_CONCURRENT_CLOSES,
            enable_validate_compaction: false,
            commit_retry: CommitRetryConfig::default(),
        }
    }
}

impl CompactionConfig {
    /// Builds the config from table options; unknown keys are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut builder = CompactionConfigBuilder::default();
        let mut retry = CommitRetryConfigBuilder::default();

        if let Some(v) = options.get(MIN_FILE_NUM) {
            builder.min_file_num(parse_number(MIN_FILE_NUM, v)?);
        }
        if let Some(v) = options.get(TARGET_FILE_SIZE) {
            builder.target_file_size(parse_memory_size(v)?);
        }
        if let Some(v) = options.get(FILE_GROUPING) {
            builder.grouping_strategy(v.parse()?);
        }
        if let Some(v) = options.get(MAX_CONCURRENT_TASKS) {
            builder.max_concurrent_tasks(parse_number(MAX_CONCURRENT_TASKS, v)?);
        }
        if let Some(v) = options.get(MAX_CONCURRENT_CLOSES) {
            builder.max_concurrent_closes(parse_number(MAX_CONCURRENT_CLOSES, v)?);
        }
        if let Some(v) = options.get(VALIDATE_COMPACTION) {
            builder.enable_validate_compaction(parse_bool(VALIDATE_COMPACTION, v)?);
        }
        if let Some(v) = options.get(COMMIT_MAX_RETRIES) {
            retry.max_retries(parse_number(COMMIT_MAX_RETRIES, v)?);
        }
        if let Some(v) = options.get(COMMIT_MIN_RETRY_WAIT) {
            retry.retry_initial_delay(parse_duration(v)?);
        }
        if let Some(v) = options.get(COMMIT_MAX_RETRY_WAIT) {
            retry.retry_max_delay(parse_duration(v)?);
        }
        if let Some(v) = options.get(COMMIT_TIMEOUT) {
            retry.timeout(Some(parse_duration(v)?));
        }

        builder.commit_retry(retry.build()?);
        builder.build()
    }
}

/// Bounds for the optimistic commit loop.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(build_fn(error = "CompactionError"))]
pub struct CommitRetryConfig {
    /// Publish attempts after the first one.
    #[builder(default = "DEFAULT_COMMIT_MAX_RETRIES")]
    pub max_retries: usize,
    #[builder(default = "DEFAULT_COMMIT_MIN_RETRY_WAIT")]
    pub retry_initial_delay: Duration,
    #[builder(default = "DEFAULT_COMMIT_MAX_RETRY_WAIT")]
    pub retry_max_delay: Duration,
    /// Wall-clock bound over all attempts of one commit.
    #[builder(default)]
    pub timeout: Option<Duration>,
}

impl Default for CommitRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_COMMIT_MAX_RETRIES,
            retry_initial_delay: DEFAULT_COMMIT_MIN_RETRY_WAIT,
            retry_max_delay: DEFAULT_COMMIT_MAX_RETRY_WAIT,
            timeout: None,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| CompactionError::Config(format!("{} = {:?}: {}", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|e| CompactionError::Config(format!("{} = {:?}: {}", key, value, e)))
}

/// Parses durations such as `10 ms`, `5s` or `1 min`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    humantime::parse_duration(&compact)
        .map_err(|e| CompactionError::Config(format!("invalid duration {:?}: {}", value, e)))
}

/// Parses memory sizes such as `1 b`, `64kb` or `128 mb` (binary multiples).
pub fn parse_memory_size(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| CompactionError::Config(format!("invalid memory size {:?}", value)))?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "bytes" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => {
            return Err(CompactionError::Config(format!(
                "unknown memory unit {:?} in {:?}",
                other, value
            )));
        }
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| CompactionError::Config(format!("memory size {:?} overflows", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CompactionConfigBuilder::default().build().unwrap();
        assert_eq!(config.min_file_num, DEFAULT_MIN_FILE_NUM);
        assert_eq!(config.target_file_size, DEFAULT_TARGET_FILE_SIZE);
        assert_eq!(config.grouping_strategy, GroupingStrategy::Single);
        assert_eq!(config.commit_retry, CommitRetryConfig::default());
    }

    #[test]
    fn test_from_options() {
        let config = CompactionConfig::from_options(&options(&[
            (MIN_FILE_NUM, "3"),
            (TARGET_FILE_SIZE, "1 b"),
            (FILE_GROUPING, "bin-pack"),
            (COMMIT_MAX_RETRIES, "2"),
            (COMMIT_MIN_RETRY_WAIT, "5 ms"),
            (COMMIT_TIMEOUT, "30 s"),
            ("bucket", "-1"),
        ]))
        .unwrap();
        assert_eq!(config.min_file_num, 3);
        assert_eq!(config.target_file_size, 1);
        assert_eq!(config.grouping_strategy, GroupingStrategy::BinPack);
        assert_eq!(config.commit_retry.max_retries, 2);
        assert_eq!(
            config.commit_retry.retry_initial_delay,
            Duration::from_millis(5)
        );
        assert_eq!(config.commit_retry.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_options() {
        assert!(CompactionConfig::from_options(&options(&[(MIN_FILE_NUM, "0")])).is_err());
        assert!(CompactionConfig::from_options(&options(&[(MIN_FILE_NUM, "abc")])).is_err());
        assert!(CompactionConfig::from_options(&options(&[(TARGET_FILE_SIZE, "12 parsecs")])).is_err());
        assert!(CompactionConfig::from_options(&options(&[(FILE_GROUPING, "random")])).is_err());
    }

    #[test]
    fn test_parse_memory_size() {
        assert_eq!(parse_memory_size("1 b").unwrap(), 1);
        assert_eq!(parse_memory_size("123").unwrap(), 123);
        assert_eq!(parse_memory_size("64kb").unwrap(), 64 * 1024);
        assert_eq!(parse_memory_size("128 MB").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_memory_size("2 gb").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_memory_size("mb").is_err());
    }
}
