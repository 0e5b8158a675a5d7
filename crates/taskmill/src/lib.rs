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

//! # Taskmill
//!
//! Core library for the Taskmill asynchronous task-execution platform.
//!
//! Taskmill accepts typed work items, stores them durably in PostgreSQL,
//! dispatches them through a durable AMQP queue, and executes them on a pool
//! of workers under a per-task retry bound. This crate holds everything the
//! three services (API, scheduler, worker) share:
//!
//! - [`models`] - the task and user records and the task status machine
//! - [`database`] - the connection pool and Diesel schema
//! - [`dal`] - the data access layer, including the atomic claim transition
//! - [`broker`] - the AMQP work queue (publish side and consumer channels)
//! - [`payload`] - typed payload schemas and per-type validators
//! - [`registry`] - the handler registry workers dispatch through
//! - [`error`] - shared error types
//!
//! # Delivery semantics
//!
//! Taskmill is at-least-once with a retry ceiling. The single source of
//! truth for retry accounting is the claim transition
//! ([`dal::TaskDAL::claim`]): a conditional UPDATE that moves a task into
//! `processing` and increments its attempt counter in one statement, and
//! reports rejection when the budget is exhausted or the task is not in a
//! claimable state. Handlers must therefore tolerate repeated execution.

pub mod broker;
pub mod dal;
pub mod database;
pub mod error;
pub mod models;
pub mod payload;
pub mod registry;

pub use broker::{TaskPublisher, TaskQueue, TASK_QUEUE_NAME};
pub use dal::{ClaimOutcome, DAL};
pub use database::Database;
pub use error::{BrokerError, HandlerError, StoreError, SubmitError};
pub use models::{NewTask, NewUser, Task, TaskStatus, User};
pub use registry::{HandlerRegistry, TaskHandler};
