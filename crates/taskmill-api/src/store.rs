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

//! The API's persistence seam.
//!
//! Handlers depend on [`ApiStore`] rather than the DAL directly so the
//! handler tests can run against an in-memory store.

use async_trait::async_trait;
use uuid::Uuid;

use taskmill::{NewTask, NewUser, StoreError, Task, User, DAL};

/// Persistence operations the API needs.
#[async_trait]
pub trait ApiStore: Send + Sync {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError>;
    async fn get_task(&self, user_id: i64, task_id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, StoreError>;
    async fn create_user(&self, new_user: NewUser) -> Result<i64, StoreError>;
    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError>;
}

/// Production store backed by the shared DAL.
pub struct PostgresStore {
    dal: DAL,
}

impl PostgresStore {
    pub fn new(dal: DAL) -> Self {
        Self { dal }
    }
}

#[async_trait]
impl ApiStore for PostgresStore {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError> {
        self.dal.tasks().create(new_task).await
    }

    async fn get_task(&self, user_id: i64, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        self.dal.tasks().get(user_id, task_id).await
    }

    async fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, StoreError> {
        self.dal.tasks().list(user_id).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<i64, StoreError> {
        self.dal.users().create(new_user).await
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.dal.users().find_by_email(email).await
    }
}
