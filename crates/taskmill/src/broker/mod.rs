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

//! AMQP broker layer.
//!
//! One durable queue (`tasks`) carries JSON task envelopes with persistent
//! delivery. Publishers (the API and the scheduler) share a channel;
//! each worker opens its own consumer channel with `prefetch = 1` and
//! manual acknowledgement, which is the platform's only flow-control
//! primitive.
//!
//! Publish failures are deliberately survivable: the row is already durable
//! in the store, and the scheduler's stuck-rescue republishes it.

use async_trait::async_trait;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::info;

use crate::error::BrokerError;
use crate::models::Task;

/// Name of the single durable work queue.
pub const TASK_QUEUE_NAME: &str = "tasks";

/// AMQP persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Something tasks can be published to.
///
/// The seam between the API/scheduler and the broker; tests substitute a
/// recording implementation.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Publishes a task's JSON envelope to the work queue.
    async fn publish(&self, task: &Task) -> Result<(), BrokerError>;
}

/// Connection to the broker plus the shared publishing channel.
///
/// Created once per service. Worker consumers get their own channels via
/// [`TaskQueue::consumer_channel`].
pub struct TaskQueue {
    connection: Connection,
    channel: Channel,
}

impl TaskQueue {
    /// Connects to the broker and declares the durable work queue.
    pub async fn connect(amqp_url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                TASK_QUEUE_NAME,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(queue = TASK_QUEUE_NAME, "connected to broker");

        Ok(Self { connection, channel })
    }

    /// Opens a dedicated consumer channel.
    ///
    /// The channel is configured with `prefetch = 1` so the broker holds at
    /// most one unacknowledged delivery per consumer, and the consumer uses
    /// manual acknowledgement.
    pub async fn consumer_channel(
        &self,
        consumer_tag: &str,
    ) -> Result<(Channel, Consumer), BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let consumer = channel
            .basic_consume(
                TASK_QUEUE_NAME,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok((channel, consumer))
    }
}

#[async_trait]
impl TaskPublisher for TaskQueue {
    async fn publish(&self, task: &Task) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(task)?;

        self.channel
            .basic_publish(
                "",
                TASK_QUEUE_NAME,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await?
            .await?;

        Ok(())
    }
}
