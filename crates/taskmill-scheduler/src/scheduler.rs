/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! The sweep loop.
//!
//! A single scheduler instance sleeps for the configured interval, then
//! sweeps: select every task that is due for release or stuck, flip it to
//! `queued`, and publish it. The status flip commits before the publish and
//! no transaction spans the two, so a crash in between can produce a
//! duplicate delivery - absorbed downstream by the worker's idempotent
//! claim.
//!
//! Failure policy per tick: a failed sweep read aborts the tick (the next
//! one retries); a failed status flip or publish skips that task only.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use taskmill::{StoreError, Task, TaskPublisher, TaskStatus, DAL};

/// Grace window after which a `queued` task with no worker pickup, or a
/// `processing` task with no progress, is considered stuck.
const STUCK_AFTER_SECS: i64 = 3600;

/// Store operations the sweep needs.
#[async_trait]
pub trait SweepStore: Send + Sync {
    /// Tasks due for release or stuck past the grace window.
    async fn due_for_requeue(&self, stuck_after: ChronoDuration) -> Result<Vec<Task>, StoreError>;
    /// Flips a task to `queued` ahead of republication.
    async fn mark_queued(&self, task_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
impl SweepStore for DAL {
    async fn due_for_requeue(&self, stuck_after: ChronoDuration) -> Result<Vec<Task>, StoreError> {
        self.tasks().due_for_requeue(stuck_after).await
    }

    async fn mark_queued(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.tasks().mark_queued(task_id).await
    }
}

/// The periodic sweeper.
pub struct Scheduler {
    interval: Duration,
    store: Arc<dyn SweepStore>,
    publisher: Arc<dyn TaskPublisher>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        store: Arc<dyn SweepStore>,
        publisher: Arc<dyn TaskPublisher>,
    ) -> Self {
        Self {
            interval,
            store,
            publisher,
        }
    }

    /// Runs sweep-and-sleep until shutdown.
    ///
    /// Shutdown is honored at the sleep boundary; an in-flight sweep always
    /// completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "scheduler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.sweep().await,
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    return;
                }
            }
        }
    }

    /// One sweep: select, flip, publish.
    pub async fn sweep(&self) {
        let tasks = match self
            .store
            .due_for_requeue(ChronoDuration::seconds(STUCK_AFTER_SECS))
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "sweep select failed; will retry next tick");
                return;
            }
        };

        if tasks.is_empty() {
            debug!("sweep found nothing to requeue");
            return;
        }
        info!(count = tasks.len(), "sweep selected tasks to requeue");

        for mut task in tasks {
            if let Err(e) = self.store.mark_queued(task.id).await {
                error!(task_id = %task.id, error = %e, "failed to mark task queued");
                continue;
            }

            task.status = TaskStatus::Queued;
            if let Err(e) = self.publisher.publish(&task).await {
                // The row already reads `queued`; the stuck-rescue branch
                // republishes it after the grace window.
                error!(task_id = %task.id, error = %e, "failed to publish task");
                continue;
            }

            info!(task_id = %task.id, "requeued task");
        }
    }
}
