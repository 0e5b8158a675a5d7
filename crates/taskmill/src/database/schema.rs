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

//! Diesel table definitions, kept in lockstep with `migrations/`.

diesel::table! {
    tasks (id) {
        id -> Uuid,
        user_id -> Int8,
        #[sql_name = "type"]
        task_type -> Text,
        payload -> Jsonb,
        status -> Text,
        retries -> Int2,
        max_retries -> Int2,
        run_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Int8,
        email -> Text,
        password_hash -> Bytea,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tasks, users);
