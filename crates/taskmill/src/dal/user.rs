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

//! User persistence operations.

use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;

use super::DAL;
use crate::database::schema::users;
use crate::error::StoreError;
use crate::models::{NewUser, User};

/// User operations.
pub struct UserDAL<'a> {
    pub(super) dal: &'a DAL,
}

impl<'a> UserDAL<'a> {
    /// Inserts a new user and returns the allocated id.
    ///
    /// A duplicate email surfaces as [`StoreError::AlreadyExists`].
    pub async fn create(&self, new_user: NewUser) -> Result<i64, StoreError> {
        let conn = self.dal.database.conn().await?;
        let user_id = conn
            .interact(move |conn| {
                diesel::insert_into(users::table)
                    .values(&new_user)
                    .returning(users::id)
                    .get_result::<i64>(conn)
                    .map_err(|e| match e {
                        diesel::result::Error::DatabaseError(
                            DatabaseErrorKind::UniqueViolation,
                            _,
                        ) => StoreError::AlreadyExists,
                        other => StoreError::Query(other),
                    })
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(user_id)
    }

    /// Looks a user up by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        let conn = self.dal.database.conn().await?;
        let user = conn
            .interact(move |conn| {
                users::table
                    .filter(users::email.eq(email))
                    .select(User::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::Interact(e.to_string()))??;
        Ok(user)
    }
}
