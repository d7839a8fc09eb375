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

//! End-to-end compaction scenarios against in-memory and local parquet tables.

use std::collections::HashSet;

use append_compaction_core::executor::MergeExecutor;
use append_compaction_core::{CompactionBuilder, ErrorKind, FileStoreTable};

use crate::test_utils::{append_files, collect_ids, live_row_count, test_config};

fn expected_ids(rows: i64) -> Vec<i64> {
    (0..rows).collect()
}

#[test_log::test(tokio::test)]
async fn test_eleven_then_twelve_single_row_files() {
    let table = FileStoreTable::in_memory("t", test_config(3).unwrap());
    let writer = table.new_commit("writer");
    let compactor = table.new_commit("compactor");
    let mut coordinator = table.new_coordinator();

    let next_id = append_files(&table, &writer, 11, 1, 0).await.unwrap();
    let tasks = coordinator.run().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].compact_before().len(), 11);

    let message = tasks[0].do_compact(&table, &MergeExecutor).await.unwrap();
    compactor.commit(vec![message]).await.unwrap();
    coordinator.scan().await.unwrap();
    let restored = coordinator.list_restored_files();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].row_count, 11);

    let next_id = append_files(&table, &writer, 11, 1, next_id).await.unwrap();
    coordinator.scan().await.unwrap();
    assert_eq!(coordinator.list_restored_files().len(), 12);

    let tasks = coordinator.compact_plan();
    assert_eq!(tasks.len(), 1);
    assert!(coordinator.list_restored_files().is_empty());

    let message = tasks[0].do_compact(&table, &MergeExecutor).await.unwrap();
    compactor.commit(vec![message]).await.unwrap();
    coordinator.scan().await.unwrap();
    let restored = coordinator.list_restored_files();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].row_count, 22);

    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(next_id));
}

#[test_log::test(tokio::test)]
async fn test_continuous_compaction() {
    let table = FileStoreTable::in_memory("t", test_config(3).unwrap());
    let writer = table.new_commit("writer");
    let compaction = CompactionBuilder::new(table.clone())
        .with_commit_user("compactor")
        .build();

    let mut next_id = 0;
    for round in 0..20 {
        next_id = append_files(&table, &writer, 5, 7, next_id).await.unwrap();
        let result = compaction.compact().await.unwrap().unwrap();
        assert!(result.failed_tasks.is_empty());
        assert_eq!(
            result.stat.input_row_count,
            result.stat.output_row_count,
            "round {}",
            round
        );
        assert_eq!(live_row_count(&table).await.unwrap(), next_id as u64);
    }

    let mut coordinator = table.new_coordinator();
    coordinator.scan().await.unwrap();
    let restored: HashSet<String> = coordinator
        .list_restored_files()
        .into_iter()
        .map(|f| f.file_name)
        .collect();
    let live: HashSet<String> = table
        .live_files()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.file_name)
        .collect();
    assert_eq!(restored, live);
    assert_eq!(live.len(), 1);
    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(next_id));
}

#[tokio::test]
async fn test_coordinator_rounds_account_for_all_rows() {
    let table = FileStoreTable::in_memory("t", test_config(3).unwrap());
    let writer = table.new_commit("writer");
    let compactor = table.new_commit("compactor");
    let mut coordinator = table.new_coordinator();

    let mut next_id = 0;
    for round in 0..20 {
        next_id = append_files(&table, &writer, 3, 5, next_id).await.unwrap();
        let tasks = coordinator.run().await.unwrap();
        assert!(!tasks.is_empty(), "round {}", round);

        let mut messages = vec![];
        for task in &tasks {
            messages.push(task.do_compact(&table, &MergeExecutor).await.unwrap());
        }
        compactor.commit(messages).await.unwrap();

        assert!(coordinator.scan().await.unwrap(), "round {}", round);
        let restored_rows: u64 = coordinator
            .list_restored_files()
            .iter()
            .map(|f| f.row_count)
            .sum();
        assert_eq!(restored_rows, next_id as u64, "round {}", round);
    }

    loop {
        let tasks = coordinator.run().await.unwrap();
        if tasks.is_empty() {
            break;
        }
        let mut messages = vec![];
        for task in &tasks {
            messages.push(task.do_compact(&table, &MergeExecutor).await.unwrap());
        }
        compactor.commit(messages).await.unwrap();
    }

    let restored = coordinator.list_restored_files();
    let live = table.live_files().await.unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(live.len(), 1);
    assert_eq!(restored[0].file_name, live[0].file_name);
    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(next_id));
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_writer_and_compactor() {
    let table = FileStoreTable::in_memory("t", test_config(3).unwrap());
    let compaction = CompactionBuilder::new(table.clone()).build();

    let writer = tokio::spawn({
        let table = table.clone();
        async move {
            let commit = table.new_commit("writer");
            append_files(&table, &commit, 30, 4, 0).await
        }
    });

    while !writer.is_finished() {
        if let Err(e) = compaction.compact().await {
            assert_eq!(e.kind(), ErrorKind::RetryExhausted, "{}", e);
        }
        tokio::task::yield_now().await;
    }
    let written = writer.await.unwrap().unwrap();
    assert_eq!(written, 120);
    compaction.compact().await.unwrap();

    assert_eq!(live_row_count(&table).await.unwrap(), 120);
    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(120));
}

#[tokio::test]
async fn test_competing_compactions_conflict() {
    let table = FileStoreTable::in_memory("t", test_config(2).unwrap());
    let writer = table.new_commit("writer");
    append_files(&table, &writer, 4, 3, 0).await.unwrap();

    let mut first = table.new_coordinator();
    let mut second = table.new_coordinator();
    let first_tasks = first.run().await.unwrap();
    let second_tasks = second.run().await.unwrap();
    assert_eq!(first_tasks, second_tasks);

    let first_message = first_tasks[0].do_compact(&table, &MergeExecutor).await.unwrap();
    let second_message = second_tasks[0]
        .do_compact(&table, &MergeExecutor)
        .await
        .unwrap();

    table
        .new_commit("compactor-1")
        .commit(vec![first_message])
        .await
        .unwrap();
    let err = table
        .new_commit("compactor-2")
        .commit(vec![second_message])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(table.live_files().await.unwrap().len(), 1);
    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(12));
}

#[tokio::test]
async fn test_restart_compacts_abandoned_files() {
    let table = FileStoreTable::in_memory("t", test_config(3).unwrap());
    let writer = table.new_commit("writer");
    append_files(&table, &writer, 6, 2, 0).await.unwrap();

    let mut crashed = table.new_coordinator();
    let abandoned = crashed.run().await.unwrap();
    assert_eq!(abandoned.len(), 1);
    assert!(crashed.compact_plan().is_empty());
    drop(crashed);

    let compaction = CompactionBuilder::new(table.clone()).build();
    let result = compaction.compact().await.unwrap().unwrap();
    assert_eq!(result.stat.input_files_count, 6);
    assert_eq!(table.live_files().await.unwrap().len(), 1);
    assert_eq!(collect_ids(&table).await.unwrap(), expected_ids(12));
}

#[test_log::test(tokio::test)]
async fn test_local_parquet_table() {
    let dir = tempfile::tempdir().unwrap();
    let table = FileStoreTable::open_local("local", dir.path(), test_config(3).unwrap())
        .await
        .unwrap();
    let writer = table.new_commit("writer");
    append_files(&table, &writer, 8, 100, 0).await.unwrap();

    let compaction = CompactionBuilder::new(table.clone()).build();
    let result = compaction.compact().await.unwrap().unwrap();
    assert_eq!(result.stat.input_files_count, 8);
    assert_eq!(result.stat.output_row_count, 800);

    let reopened = FileStoreTable::open_local("local", dir.path(), test_config(3).unwrap())
        .await
        .unwrap();
    let live = reopened.live_files().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].row_count, 800);
    assert_eq!(collect_ids(&reopened).await.unwrap(), expected_ids(800));
    assert_eq!(
        reopened
            .snapshot_manager()
            .latest_snapshot_id()
            .await
            .unwrap(),
        Some(9)
    );
}
