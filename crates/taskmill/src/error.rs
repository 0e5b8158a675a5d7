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

//! Shared error types, one enum per layer.
//!
//! The split mirrors the failure policy table of the platform: store errors
//! and broker errors are operational and handled per-actor (skip the tick,
//! discard the delivery, log and continue), while [`SubmitError`] is a
//! client-facing validation failure that must never persist anything.

use thiserror::Error;

/// Inclusive lower bound for a task's retry budget.
pub const MIN_RETRIES: i16 = 1;

/// Inclusive upper bound for a task's retry budget.
pub const MAX_RETRIES: i16 = 10;

/// Errors raised by the data access layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Checking a connection out of the pool failed.
    #[error("failed to get database connection: {0}")]
    Pool(String),

    /// The blocking database interaction was aborted or panicked.
    #[error("database interaction failed: {0}")]
    Interact(String),

    /// The statement itself failed.
    #[error(transparent)]
    Query(#[from] diesel::result::Error),

    /// An insert hit a uniqueness constraint.
    #[error("record already exists")]
    AlreadyExists,

    /// Running embedded migrations failed.
    #[error("failed to run migrations: {0}")]
    Migration(String),
}

/// Errors raised by the AMQP broker layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    /// The task could not be serialized into the wire envelope.
    #[error("failed to encode task envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Validation failures surfaced to submitting clients.
///
/// Checks run in declaration order and the first failure wins; none of
/// these leave a row behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("unknown task type '{0}'")]
    UnknownType(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("max_retries must be between {MIN_RETRIES} and {MAX_RETRIES}")]
    RetriesOutOfRange(i16),

    #[error("run_at must be in the future")]
    RunAtInPast,
}

/// Errors raised when dispatching a claimed task to its handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The task type is known to validation but nothing registered an
    /// executor for it. A deployment error, surfaced as execution failure.
    #[error("no handler registered for task type '{0}'")]
    Missing(String),

    /// The handler ran and reported failure.
    #[error("handler failed: {0}")]
    Failed(#[source] anyhow::Error),
}
