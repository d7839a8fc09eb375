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

use async_trait::async_trait;

use crate::Result;
use crate::spec::{Snapshot, SnapshotId};

/// Durable home of the snapshot chain.
///
/// Implementations must make `try_publish` atomic: of all callers racing to
/// publish the same id, exactly one observes `true`.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    async fn latest_snapshot_id(&self) -> Result<Option<SnapshotId>>;

    async fn earliest_snapshot_id(&self) -> Result<Option<SnapshotId>>;

    /// Returns `None` when the snapshot was never written or has been expired.
    async fn load_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    /// Publishes `snapshot` if no snapshot with its id exists yet.
    ///
    /// Returns `false` when another committer already published that id.
    async fn try_publish(&self, snapshot: &Snapshot) -> Result<bool>;
}
