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

use mixtrics::metrics::{BoxedCounterVec, BoxedHistogramVec, BoxedRegistry, Buckets};
use mixtrics::registry::noop::NoopMetricsRegistry;

use crate::executor::RewriteFilesStat;

const LABELS: &[&str] = &["table_name"];

pub struct Metrics {
    // commit metrics
    pub commit_counter: BoxedCounterVec,
    pub commit_failed_counter: BoxedCounterVec,
    pub commit_retry_counter: BoxedCounterVec,
    pub commit_duration: BoxedHistogramVec,

    // compaction metrics
    pub compaction_duration: BoxedHistogramVec,
    pub compaction_planned_tasks: BoxedCounterVec,
    pub compaction_executor_error_counter: BoxedCounterVec,
    pub compaction_input_files_count: BoxedCounterVec,
    pub compaction_output_files_count: BoxedCounterVec,
    pub compaction_input_bytes_total: BoxedCounterVec,
    pub compaction_output_bytes_total: BoxedCounterVec,
}

impl Metrics {
    pub fn new(registry: BoxedRegistry) -> Self {
        let commit_counter = registry.register_counter_vec(
            "append_table_commit_counter".into(),
            "append-compaction published snapshot counts".into(),
            LABELS,
        );

        let commit_failed_counter = registry.register_counter_vec(
            "append_table_commit_failed_counter".into(),
            "append-compaction commit failed counts".into(),
            LABELS,
        );

        let commit_retry_counter = registry.register_counter_vec(
            "append_table_commit_retry_counter".into(),
            "append-compaction commit attempts lost to a concurrent publish".into(),
            LABELS,
        );

        // 1ms 10ms 100ms 1s 10s 100s
        let commit_duration = registry.register_histogram_vec_with_buckets(
            "append_table_commit_duration".into(),
            "append-compaction commit duration in milliseconds".into(),
            LABELS,
            Buckets::exponential(1.0, 10.0, 6),
        );

        let compaction_duration = registry.register_histogram_vec_with_buckets(
            "append_compaction_duration".into(),
            "append-compaction compaction round duration in seconds".into(),
            LABELS,
            Buckets::exponential(
                0.1, 4.0, 10, // Start at 100ms, multiply each bucket by 4, up to 10 buckets
            ),
        );

        let compaction_planned_tasks = registry.register_counter_vec(
            "append_compaction_planned_tasks".into(),
            "Number of compaction tasks planned by the coordinator".into(),
            LABELS,
        );

        let compaction_executor_error_counter = registry.register_counter_vec(
            "append_compaction_executor_error_counter".into(),
            "append-compaction task execution error counts".into(),
            LABELS,
        );

        let compaction_input_files_count = registry.register_counter_vec(
            "append_compaction_input_files_count".into(),
            "Number of input files being compacted".into(),
            LABELS,
        );

        let compaction_output_files_count = registry.register_counter_vec(
            "append_compaction_output_files_count".into(),
            "Number of output files from compaction".into(),
            LABELS,
        );

        let compaction_input_bytes_total = registry.register_counter_vec(
            "append_compaction_input_bytes_total".into(),
            "Total number of bytes in input files for compaction".into(),
            LABELS,
        );

        let compaction_output_bytes_total = registry.register_counter_vec(
            "append_compaction_output_bytes_total".into(),
            "Total number of bytes in output files from compaction".into(),
            LABELS,
        );

        Self {
            commit_counter,
            commit_failed_counter,
            commit_retry_counter,
            commit_duration,
            compaction_duration,
            compaction_planned_tasks,
            compaction_executor_error_counter,
            compaction_input_files_count,
            compaction_output_files_count,
            compaction_input_bytes_total,
            compaction_output_bytes_total,
        }
    }

    /// Metrics that go nowhere, for callers that did not supply a registry.
    pub fn noop() -> Self {
        Self::new(Box::new(NoopMetricsRegistry))
    }
}

/// Records metrics under one table's labels.
#[derive(Clone)]
pub struct CompactionMetricsRecorder {
    metrics: Arc<Metrics>,
    table_name: String,
}

impl CompactionMetricsRecorder {
    pub fn new(metrics: Arc<Metrics>, table_name: impl Into<String>) -> Self {
        Self {
            metrics,
            table_name: table_name.into(),
        }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(Metrics::noop()), "")
    }

    fn label_vec(&self) -> [std::borrow::Cow<'static, str>; 1] {
        [self.table_name.clone().into()]
    }

    pub fn record_commit_success(&self, duration_ms: f64) {
        let label_vec = self.label_vec();

        self.metrics.commit_counter.counter(&label_vec).increase(1);
        self.metrics
            .commit_duration
            .histogram(&label_vec)
            .record(duration_ms);
    }

    pub fn record_commit_failure(&self) {
        let label_vec = self.label_vec();

        self.metrics
            .commit_failed_counter
            .counter(&label_vec)
            .increase(1);
    }

    pub fn record_commit_retry(&self) {
        let label_vec = self.label_vec();

        self.metrics
            .commit_retry_counter
            .counter(&label_vec)
            .increase(1);
    }

    pub fn record_planned_tasks(&self, count: usize) {
        if count == 0 {
            return;
        }
        let label_vec = self.label_vec();

        self.metrics
            .compaction_planned_tasks
            .counter(&label_vec)
            .increase(count as u64);
    }

    pub fn record_executor_error(&self) {
        let label_vec = self.label_vec();

        self.metrics
            .compaction_executor_error_counter
            .counter(&label_vec)
            .increase(1);
    }

    pub fn record_compaction_duration(&self, duration_secs: f64) {
        let label_vec = self.label_vec();

        self.metrics
            .compaction_duration
            .histogram(&label_vec)
            .record(duration_secs);
    }

    /// Records input and output volume of finished tasks.
    pub fn record_compaction_complete(&self, stats: &RewriteFilesStat) {
        let label_vec = self.label_vec();

        if stats.input_files_count > 0 {
            self.metrics
                .compaction_input_files_count
                .counter(&label_vec)
                .increase(stats.input_files_count as u64);
        }

        if stats.input_total_bytes > 0 {
            self.metrics
                .compaction_input_bytes_total
                .counter(&label_vec)
                .increase(stats.input_total_bytes);
        }

        if stats.output_files_count > 0 {
            self.metrics
                .compaction_output_files_count
                .counter(&label_vec)
                .increase(stats.output_files_count as u64);
        }

        if stats.output_total_bytes > 0 {
            self.metrics
                .compaction_output_bytes_total
                .counter(&label_vec)
                .increase(stats.output_total_bytes);
        }
    }
}
