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

//! Task Model
//!
//! This module defines the task record and its status machine. The same
//! struct serves as the database row and as the JSON broker envelope, so
//! whatever the API persists is exactly what a worker later deserializes.
//!
//! # Status machine
//!
//! ```text
//!  submit (immediate)          submit (run_at set)
//!        │                           │
//!        ▼                           ▼
//!    [queued] ◀────scheduler────[postponed]
//!        │
//!  worker claim (retries += 1, conditional on retries < max_retries)
//!        │
//!        ▼
//!  [processing] ──ok──▶ [done]
//!        │
//!       fail
//!        ▼
//!    [error]  (redelivered; claimable again until the budget is spent)
//! ```
//!
//! `done` is terminal and never claimable. `processing` is not claimable
//! either: a redelivery racing an in-flight execution fails the claim and is
//! discarded.

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// Stored as lowercase text in the `status` column and serialized the same
/// way in the broker envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromSqlRow, AsExpression,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Dispatchable; either has an outstanding broker message or will be
    /// rescued by the scheduler.
    Queued,
    /// Waiting for its `run_at` time; released by the scheduler.
    Postponed,
    /// Claimed by a worker; the attempt counter has been incremented.
    Processing,
    /// Terminal success.
    Done,
    /// Most recent attempt failed. Claimable again until `retries`
    /// reaches `max_retries`.
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Postponed => "postponed",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }

}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "postponed" => Ok(TaskStatus::Postponed),
            "processing" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

impl ToSql<Text, Pg> for TaskStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for TaskStatus {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(value)?;
        s.parse::<TaskStatus>().map_err(Into::into)
    }
}

/// A task row, and equally the JSON envelope published to the broker.
#[derive(
    Debug, Clone, PartialEq, Queryable, QueryableByName, Selectable, Serialize, Deserialize,
)]
#[diesel(table_name = crate::database::schema::tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    /// Unique identifier, assigned at submission.
    pub id: Uuid,
    /// Owner of the task; reads are scoped to `(user_id, id)`.
    pub user_id: i64,
    /// Tag identifying the handler to dispatch to.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Structured payload; schema depends on `task_type`.
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    /// Number of execution attempts started (incremented on claim).
    pub retries: i16,
    /// Inclusive attempt ceiling, in `[1, 10]`.
    pub max_retries: i16,
    /// Earliest execution time; presence implies the task was submitted
    /// postponed.
    pub run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new task to be inserted.
///
/// `status: None` lets the row fall through to the column default
/// (`queued`); timestamps are filled in by the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub user_id: i64,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub max_retries: i16,
    pub status: Option<TaskStatus>,
    pub run_at: Option<DateTime<Utc>>,
}

impl NewTask {
    /// Builds an insertable task with a fresh id.
    ///
    /// A supplied `run_at` makes the initial status `postponed`; otherwise
    /// the row is created with the default `queued` status.
    pub fn new(
        user_id: i64,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        max_retries: i16,
        run_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            task_type: task_type.into(),
            payload,
            max_retries,
            status: run_at.map(|_| TaskStatus::Postponed),
            run_at,
        }
    }
}
