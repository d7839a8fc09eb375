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

use std::time::Instant;

use append_compaction_core::{CompactionBuilder, FileStoreTable, Result};
use append_compaction_integration_tests::test_utils::{
    append_files, init_tracing, live_row_count, test_config,
};

const DEFAULT_ROUNDS: usize = 10;
const DEFAULT_FILES_PER_ROUND: usize = 20;
const DEFAULT_ROWS_PER_FILE: usize = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Usage:
    // cargo run --bin bench -- [table_path] [rounds] [files_per_round] [rows_per_file]
    let args: Vec<String> = std::env::args().collect();
    let rounds = parse_arg(&args, 2, DEFAULT_ROUNDS);
    let files_per_round = parse_arg(&args, 3, DEFAULT_FILES_PER_ROUND);
    let rows_per_file = parse_arg(&args, 4, DEFAULT_ROWS_PER_FILE);

    let config = test_config(2)?;
    match args.get(1) {
        Some(path) => {
            let table = FileStoreTable::open_local("bench", path, config).await?;
            run(table, rounds, files_per_round, rows_per_file).await
        }
        None => {
            let dir = tempfile::tempdir()?;
            let table = FileStoreTable::open_local("bench", dir.path(), config).await?;
            run(table, rounds, files_per_round, rows_per_file).await
        }
    }
}

fn parse_arg(args: &[String], index: usize, default: usize) -> usize {
    args.get(index)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn run(
    table: FileStoreTable,
    rounds: usize,
    files_per_round: usize,
    rows_per_file: usize,
) -> Result<()> {
    let writer = table.new_commit("bench-writer");
    let compaction = CompactionBuilder::new(table.clone())
        .with_commit_user("bench-compactor")
        .build();

    let mut next_id = live_row_count(&table).await? as i64;
    for round in 0..rounds {
        let start = Instant::now();
        next_id = append_files(&table, &writer, files_per_round, rows_per_file, next_id).await?;
        let write_elapsed = start.elapsed();

        let start = Instant::now();
        let result = compaction.compact().await?;
        tracing::info!(
            "round {}: wrote {} files in {:?}, compacted {} files in {:?}",
            round,
            files_per_round,
            write_elapsed,
            result.map_or(0, |r| r.stat.input_files_count),
            start.elapsed()
        );
    }

    tracing::info!(
        "table {} holds {} rows in {} files",
        table.name(),
        live_row_count(&table).await?,
        table.live_files().await?.len()
    );
    Ok(())
}
