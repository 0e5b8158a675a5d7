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

//! Task persistence operations, including the atomic claim.
//!
//! The claim is the single source of truth for retry accounting: it checks
//! the budget, increments the attempt counter and moves the row to
//! `processing` in one conditional UPDATE. Splitting it into read-then-write
//! would reintroduce the double-execution race across workers.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::Timestamptz;
use uuid::Uuid;

use super::{ClaimOutcome, DAL};
use crate::database::schema::tasks;
use crate::error::StoreError;
use crate::models::{NewTask, Task, TaskStatus};

/// Sweep query: tasks that are due for release, stuck in `queued` without a
/// worker picking them up, or orphaned in `processing` by a crashed worker.
///
/// `coalesce(run_at, created_at)` covers immediately-submitted tasks, whose
/// `run_at` is null.
const SWEEP_SQL: &str = "\
    SELECT id, user_id, type, payload, status, retries, max_retries, \
           run_at, created_at, updated_at \
    FROM tasks \
    WHERE (status = 'postponed' AND run_at <= $1) \
       OR (status = 'queued' AND coalesce(run_at, created_at) < $2) \
       OR (status = 'processing' AND updated_at < $2) \
    ORDER BY created_at ASC";

/// Task operations.
pub struct TaskDAL<'a> {
    pub(super) dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    /// Inserts a new task and returns the committed row, including the
    /// server-assigned timestamps and defaulted status.
    pub async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let conn = self.dal.database.conn().await?;
        let task = conn
            .interact(move |conn| {
                diesel::insert_into(tasks::table)
                    .values(&new_task)
                    .returning(Task::as_returning())
                    .get_result(conn)
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(task)
    }

    /// Fetches a task scoped to its owner.
    pub async fn get(&self, user_id: i64, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let conn = self.dal.database.conn().await?;
        let task = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::id.eq(task_id))
                    .filter(tasks::user_id.eq(user_id))
                    .select(Task::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(task)
    }

    /// Lists all tasks belonging to a user, newest first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Task>, StoreError> {
        let conn = self.dal.database.conn().await?;
        let tasks = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::user_id.eq(user_id))
                    .order(tasks::created_at.desc())
                    .select(Task::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(tasks)
    }

    /// Atomically claims a task for execution.
    ///
    /// Moves the row to `processing` and increments `retries`, conditional
    /// on `retries < max_retries` and the row being in a claimable state
    /// (`queued`, `postponed`, or `error` awaiting its next attempt).
    /// `done` is never claimable, and neither is `processing`, so a
    /// redelivery racing an in-flight execution is rejected here.
    ///
    /// The condition and the increment live in one UPDATE; two concurrent
    /// claims on the same row serialize in the database and exactly one
    /// observes [`ClaimOutcome::Claimed`].
    pub async fn claim(&self, task_id: Uuid) -> Result<ClaimOutcome, StoreError> {
        let conn = self.dal.database.conn().await?;
        let claimed = conn
            .interact(move |conn| {
                diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id))
                        .filter(tasks::retries.lt(tasks::max_retries))
                        .filter(tasks::status.eq_any(vec![
                            TaskStatus::Queued,
                            TaskStatus::Postponed,
                            TaskStatus::Error,
                        ])),
                )
                .set((
                    tasks::status.eq(TaskStatus::Processing),
                    tasks::retries.eq(tasks::retries + 1),
                ))
                .returning(Task::as_returning())
                .get_result(conn)
                .optional()
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;

        Ok(match claimed {
            Some(task) => ClaimOutcome::Claimed(task),
            None => ClaimOutcome::Rejected,
        })
    }

    /// Sets a task's status unconditionally.
    ///
    /// Used by workers for the terminal transitions (`done`, `error`);
    /// `updated_at` is maintained by a database trigger.
    pub async fn set_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.dal.database.conn().await?;
        conn.interact(move |conn| {
            diesel::update(tasks::table.find(task_id))
                .set(tasks::status.eq(status))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(())
    }

    /// Marks a task `queued` ahead of (re)publication.
    ///
    /// Idempotent when the row is already queued.
    pub async fn mark_queued(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.set_status(task_id, TaskStatus::Queued).await
    }

    /// Selects the tasks the scheduler should requeue this tick:
    ///
    /// 1. `postponed` tasks whose `run_at` has passed,
    /// 2. `queued` tasks older than `stuck_after` with no worker pickup
    ///    (a lost publish),
    /// 3. `processing` tasks untouched for longer than `stuck_after`
    ///    (a worker crashed between claim and ack).
    pub async fn due_for_requeue(&self, stuck_after: Duration) -> Result<Vec<Task>, StoreError> {
        let now: DateTime<Utc> = Utc::now();
        let stale = now - stuck_after;

        let conn = self.dal.database.conn().await?;
        let tasks = conn
            .interact(move |conn| {
                diesel::sql_query(SWEEP_SQL)
                    .bind::<Timestamptz, _>(now)
                    .bind::<Timestamptz, _>(stale)
                    .load::<Task>(conn)
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(tasks)
    }
}
