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

//! Data Access Layer
//!
//! The [`DAL`] hands out per-entity accessors ([`TaskDAL`], [`UserDAL`]).
//! Every operation is a single statement; all mutual exclusion is delegated
//! to the database through conditional updates, so no in-process locks are
//! needed anywhere in the platform.

pub mod task;
pub mod user;

use crate::database::Database;
use crate::models::Task;

pub use task::TaskDAL;
pub use user::UserDAL;

/// Result of attempting to claim a task for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The task moved to `processing`; the returned row carries the
    /// already-incremented attempt counter.
    Claimed(Task),
    /// The conditional update matched no row: the retry budget is spent or
    /// the task is not in a claimable state. The delivery should be
    /// discarded.
    Rejected,
}

/// Data Access Layer facade.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct DAL {
    database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Task operations.
    pub fn tasks(&self) -> TaskDAL<'_> {
        TaskDAL { dal: self }
    }

    /// User operations.
    pub fn users(&self) -> UserDAL<'_> {
        UserDAL { dal: self }
    }
}
