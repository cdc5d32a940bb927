// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Join barrier over per-host tasks.

use futures::future::{join_all, BoxFuture};

use crate::error::{AggregateJoinError, HostError};

/// A per-host task that can be awaited to a terminal state.
pub trait Joinable: Send {
    fn host(&self) -> &str;

    /// Wait until the task is completed, failed or cancelled.
    fn wait(&mut self) -> BoxFuture<'_, ()>;

    /// Failure recorded once the task is terminal.
    fn failure(&self) -> Option<&HostError>;
}

/// Wait for every task in `tasks` to reach a terminal state.
///
/// Never returns early. With `raise_on_error`, failures of every host are
/// collected into one [`AggregateJoinError`] after all tasks are terminal;
/// results of successful hosts stay available on `tasks`. Without it,
/// failures are left on the per-host results.
pub async fn join<T: Joinable>(
    tasks: &mut [T],
    raise_on_error: bool,
) -> Result<(), AggregateJoinError> {
    join_all(tasks.iter_mut().map(|task| task.wait())).await;

    if !raise_on_error {
        return Ok(());
    }

    let failures: Vec<HostError> = tasks
        .iter()
        .filter_map(|task| task.failure().cloned())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        tracing::debug!("{} of {} hosts failed", failures.len(), tasks.len());
        Err(AggregateJoinError {
            total: tasks.len(),
            failures,
        })
    }
}
