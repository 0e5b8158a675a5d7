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

//! HTTP API server for the Taskmill task-execution platform.
//!
//! Exposes registration and login (unauthenticated) plus task submission
//! and reads (bearer-token authenticated). Handlers talk to the store and
//! the broker through the [`store::ApiStore`] and
//! [`taskmill::TaskPublisher`] seams, which the handler tests substitute
//! with in-memory implementations.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub use routes::router;
pub use state::AppState;
