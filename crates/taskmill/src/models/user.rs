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

//! User Model
//!
//! Users exist only to resolve ownership of tasks; the platform keeps the
//! account surface to an id, a unique email and a password hash.

use diesel::prelude::*;

/// A user row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::database::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i64,
    pub email: String,
    /// bcrypt hash bytes; never serialized.
    pub password_hash: Vec<u8>,
}

/// A new user to be inserted; the id is allocated by the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::database::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Vec<u8>,
}
