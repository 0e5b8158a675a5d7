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

//! Request handlers and the router.
//!
//! `CreateTask` runs its validation steps in a fixed order (unknown type,
//! payload, retry range, run_at) and the first failure wins. Persistence
//! precedes publishing, and a publish failure is logged but never fails the
//! request: the row is already durable and the scheduler's stuck-rescue
//! will republish it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use taskmill::error::{MAX_RETRIES, MIN_RETRIES};
use taskmill::payload::{self, DEFAULT_MAX_RETRIES};
use taskmill::{NewTask, NewUser, SubmitError, Task};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: Value,
    #[serde(default)]
    pub max_retries: Option<i16>,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
}

async fn register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    if !payload::is_mailbox_address(&creds.email) || creds.password.is_empty() {
        info!("rejected registration with invalid email or password format");
        return Err(ApiError::InvalidCredentialFormat);
    }

    let password = creds.password;
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| ApiError::Internal(e.into()))?;

    let user_id = state
        .store
        .create_user(NewUser {
            email: creds.email.clone(),
            password_hash: hash.into_bytes(),
        })
        .await?;

    info!(email = %creds.email, user_id, "created user");
    Ok((StatusCode::CREATED, Json(json!({ "user_id": user_id }))))
}

async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .find_user(&creds.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let hash = String::from_utf8(user.password_hash)
        .map_err(|e| ApiError::Internal(e.into()))?;
    let password = creds.password;
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| ApiError::Internal(e.into()))?;

    if !valid {
        info!(email = %creds.email, "rejected login with invalid credentials");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(user.id)
        .map_err(|e| ApiError::Internal(e.into()))?;

    info!(email = %creds.email, user_id = user.id, "user logged in");
    Ok(Json(json!({ "token": format!("Bearer {}", token) })))
}

async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !payload::is_registered_type(&req.task_type) {
        info!(user_id, task_type = %req.task_type, "rejected task with unknown type");
        return Err(SubmitError::UnknownType(req.task_type).into());
    }

    payload::validate(&req.task_type, &req.payload)?;

    let max_retries = match req.max_retries {
        None => DEFAULT_MAX_RETRIES,
        Some(v) if (MIN_RETRIES..=MAX_RETRIES).contains(&v) => v,
        Some(v) => {
            info!(user_id, max_retries = v, "rejected task with out-of-range retry budget");
            return Err(SubmitError::RetriesOutOfRange(v).into());
        }
    };

    if let Some(run_at) = req.run_at {
        if run_at <= Utc::now() {
            info!(user_id, %run_at, "rejected task with run_at in the past");
            return Err(SubmitError::RunAtInPast.into());
        }
    }

    let new_task = NewTask::new(user_id, req.task_type, req.payload, max_retries, req.run_at);
    let task = state.store.create_task(new_task).await?;

    // Immediate tasks go straight to the queue. Postponed tasks wait for
    // the scheduler to release them.
    if task.run_at.is_none() {
        match state.publisher.publish(&task).await {
            Ok(()) => info!(task_id = %task.id, user_id, "published task"),
            Err(e) => {
                error!(task_id = %task.id, user_id, error = %e,
                    "failed to publish task; the scheduler will rescue it")
            }
        }
    }

    info!(task_id = %task.id, user_id, "created task");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_id = Uuid::parse_str(&id).map_err(|_| ApiError::InvalidTaskId)?;

    match state.store.get_task(user_id, task_id).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound),
    }
}

async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.store.list_tasks(user_id).await?;
    Ok(Json(tasks))
}
