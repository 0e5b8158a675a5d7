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

//! API error type and its HTTP rendering.
//!
//! Every error leaves the server as `{"error": string}` with the
//! conventional status code. Internal failures are logged with their full
//! chain and surface only a generic message to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use taskmill::{StoreError, SubmitError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Task submission validation failure (400).
    #[error("{0}")]
    Submit(#[from] SubmitError),

    #[error("invalid email or password format")]
    InvalidCredentialFormat,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("invalid task id")]
    InvalidTaskId,

    #[error("task not found")]
    NotFound,

    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => ApiError::UserAlreadyExists,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Submit(_)
            | ApiError::InvalidCredentialFormat
            | ApiError::UserAlreadyExists
            | ApiError::InvalidTaskId => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(source) => {
                error!(error = ?source, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
