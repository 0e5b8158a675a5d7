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

//! The worker's per-message protocol.
//!
//! Each worker consumes one delivery at a time (`prefetch = 1`) and runs it
//! through [`decide`]: deserialize, claim, execute, finalize. The function
//! is pure with respect to the broker - it returns a [`Verdict`] and the
//! delivery loop applies the matching ack/nack - so the whole protocol is
//! testable without a broker.
//!
//! Decision table:
//!
//! | Condition | Verdict | Row |
//! |---|---|---|
//! | Malformed body | discard | untouched |
//! | Claim rejected (budget spent / not claimable) | discard | untouched |
//! | Store error during claim | discard | untouched (scheduler rescues) |
//! | Handler failure | requeue | `error` |
//! | Handler success | ack | `done` |
//!
//! The claim is the only gate on retries: it increments the attempt counter
//! and fails once the budget is spent, so a task can never execute more
//! than `max_retries` times even across crash-restart.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::{Channel, Consumer};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use taskmill::{ClaimOutcome, HandlerRegistry, StoreError, Task, TaskQueue, TaskStatus, DAL};

/// Store operations the worker needs.
#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// The atomic claim: `queued|postponed|error -> processing` with
    /// `retries += 1`, conditional on the budget.
    async fn claim(&self, task_id: Uuid) -> Result<ClaimOutcome, StoreError>;
    /// Terminal status updates (`done` / `error`).
    async fn set_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError>;
}

#[async_trait]
impl WorkerStore for DAL {
    async fn claim(&self, task_id: Uuid) -> Result<ClaimOutcome, StoreError> {
        self.tasks().claim(task_id).await
    }

    async fn set_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
        self.tasks().set_status(task_id, status).await
    }
}

/// How to terminate a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Acknowledge; the task is done.
    Ack,
    /// Negative-acknowledge with redelivery; the task gets another attempt.
    Requeue,
    /// Negative-acknowledge without redelivery; the message is dropped.
    Discard,
}

/// Runs one delivery through deserialize - claim - execute - finalize.
pub async fn decide(
    body: &[u8],
    store: &dyn WorkerStore,
    registry: &HandlerRegistry,
    worker: usize,
) -> Verdict {
    let envelope: Task = match serde_json::from_slice(body) {
        Ok(task) => task,
        Err(e) => {
            warn!(worker, error = %e, "discarding malformed message");
            return Verdict::Discard;
        }
    };

    let task = match store.claim(envelope.id).await {
        Ok(ClaimOutcome::Claimed(task)) => task,
        Ok(ClaimOutcome::Rejected) => {
            info!(worker, task_id = %envelope.id, "claim rejected; discarding delivery");
            return Verdict::Discard;
        }
        Err(e) => {
            // If the row is still queued the scheduler's stuck-rescue will
            // republish it; if it was already mutated, the claim protects
            // against double execution.
            error!(worker, task_id = %envelope.id, error = %e, "failed to claim task");
            return Verdict::Discard;
        }
    };

    match registry.execute(&task.task_type, &task.payload).await {
        Ok(()) => {
            if let Err(e) = store.set_status(task.id, TaskStatus::Done).await {
                error!(worker, task_id = %task.id, error = %e, "failed to mark task done");
            }
            info!(worker, task_id = %task.id, attempt = task.retries, "task completed");
            Verdict::Ack
        }
        Err(e) => {
            error!(worker, task_id = %task.id, attempt = task.retries, error = %e, "task failed");
            if let Err(e) = store.set_status(task.id, TaskStatus::Error).await {
                error!(worker, task_id = %task.id, error = %e, "failed to mark task errored");
            }
            Verdict::Requeue
        }
    }
}

/// One member of the worker pool.
///
/// Owns a dedicated consumer channel with `prefetch = 1`; parallelism
/// across the pool comes from running N workers, not from concurrency
/// inside one.
pub struct Worker {
    id: usize,
    _channel: Channel,
    deliveries: Consumer,
    store: Arc<dyn WorkerStore>,
    registry: Arc<HandlerRegistry>,
}

impl Worker {
    /// Opens the worker's consumer channel.
    pub async fn new(
        id: usize,
        queue: &TaskQueue,
        store: Arc<dyn WorkerStore>,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self, taskmill::BrokerError> {
        let (channel, deliveries) = queue.consumer_channel(&format!("worker-{}", id)).await?;
        Ok(Self {
            id,
            _channel: channel,
            deliveries,
            store,
            registry,
        })
    }

    /// Consumes deliveries until the stream ends or shutdown is signalled.
    ///
    /// Shutdown is graceful: an in-flight message is finalized before the
    /// loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "worker started");
        loop {
            tokio::select! {
                delivery = self.deliveries.next() => match delivery {
                    Some(Ok(delivery)) => self.process(delivery).await,
                    Some(Err(e)) => {
                        error!(worker = self.id, error = %e, "consumer stream error");
                        break;
                    }
                    None => {
                        warn!(worker = self.id, "consumer stream closed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!(worker = self.id, "worker draining");
                    break;
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery) {
        let verdict = decide(&delivery.data, self.store.as_ref(), &self.registry, self.id).await;

        let result = match verdict {
            Verdict::Ack => delivery.ack(BasicAckOptions::default()).await,
            Verdict::Requeue => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
            Verdict::Discard => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
        };

        if let Err(e) = result {
            error!(worker = self.id, error = %e, "failed to finalize delivery");
        }
    }
}
