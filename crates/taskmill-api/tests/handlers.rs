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

//! Handler tests against in-memory store and publisher implementations.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use taskmill::{
    BrokerError, NewTask, NewUser, StoreError, Task, TaskPublisher, TaskStatus, User,
};
use taskmill_api::auth::TokenManager;
use taskmill_api::store::ApiStore;
use taskmill_api::{router, AppState};

#[derive(Default)]
struct MockStore {
    tasks: Mutex<Vec<Task>>,
    users: Mutex<Vec<User>>,
    next_user_id: AtomicI64,
}

impl MockStore {
    fn new() -> Self {
        Self {
            next_user_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl ApiStore for MockStore {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let now = Utc::now();
        let task = Task {
            id: new_task.id,
            user_id: new_task.user_id,
            task_type: new_task.task_type,
            payload: new_task.payload,
            status: new_task.status.unwrap_or(TaskStatus::Queued),
            retries: 0,
            max_retries: new_task.max_retries,
            run_at: new_task.run_at,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn get_task(&self, user_id: i64, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id && t.user_id == user_id)
            .cloned())
    }

    async fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<i64, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(StoreError::AlreadyExists);
        }
        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        users.push(User {
            id,
            email: new_user.email,
            password_hash: new_user.password_hash,
        });
        Ok(id)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[derive(Default)]
struct MockPublisher {
    published: Mutex<Vec<Task>>,
    fail: AtomicBool,
}

impl MockPublisher {
    fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskPublisher for MockPublisher {
    async fn publish(&self, task: &Task) -> Result<(), BrokerError> {
        if self.fail.load(Ordering::SeqCst) {
            let parse_err = serde_json::from_str::<Value>("{").unwrap_err();
            return Err(BrokerError::Encode(parse_err));
        }
        self.published.lock().unwrap().push(task.clone());
        Ok(())
    }
}

const SECRET: &[u8] = b"handler-test-secret";

fn test_app() -> (Router, Arc<MockStore>, Arc<MockPublisher>, TokenManager) {
    let store = Arc::new(MockStore::new());
    let publisher = Arc::new(MockPublisher::default());
    let tokens = TokenManager::new(SECRET);
    let state = AppState {
        store: store.clone(),
        publisher: publisher.clone(),
        tokens: tokens.clone(),
    };
    (router(state), store, publisher, tokens)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_request(method: &str, uri: &str, tokens: &TokenManager, user_id: i64, body: Option<Value>) -> Request<Body> {
    let token = tokens.issue(user_id).unwrap();
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn email_task_body() -> Value {
    json!({"type": "send_email", "payload": {"to": "a@b.com", "subject": "s"}})
}

#[tokio::test]
async fn register_creates_user() {
    let (app, _, _, _) = test_app();
    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/api/register",
            json!({"email": "a@b.com", "password": "hunter2"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], 1);
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let (app, _, _, _) = test_app();
    let creds = json!({"email": "a@b.com", "password": "hunter2"});

    let (status, _) = call(&app, json_request("POST", "/api/register", creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, json_request("POST", "/api/register", creds)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "user already exists");
}

#[tokio::test]
async fn register_rejects_malformed_email() {
    let (app, _, _, _) = test_app();
    let (status, body) = call(
        &app,
        json_request(
            "POST",
            "/api/register",
            json!({"email": "not-an-address", "password": "hunter2"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("format"));
}

#[tokio::test]
async fn login_round_trip() {
    let (app, _, _, tokens) = test_app();
    let creds = json!({"email": "a@b.com", "password": "hunter2"});

    call(&app, json_request("POST", "/api/register", creds.clone())).await;

    let (status, body) = call(&app, json_request("POST", "/api/login", creds)).await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap();
    let token = token.strip_prefix("Bearer ").expect("Bearer scheme");
    assert_eq!(tokens.verify(token).unwrap(), 1);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let (app, _, _, _) = test_app();
    call(
        &app,
        json_request(
            "POST",
            "/api/register",
            json!({"email": "a@b.com", "password": "hunter2"}),
        ),
    )
    .await;

    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/api/login",
            json!({"email": "a@b.com", "password": "wrong"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_unknown_user() {
    let (app, _, _, _) = test_app();
    let (status, _) = call(
        &app,
        json_request(
            "POST",
            "/api/login",
            json!({"email": "ghost@b.com", "password": "hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_task_requires_token() {
    let (app, store, _, _) = test_app();
    let (status, _) = call(&app, json_request("POST", "/api/tasks", email_task_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn create_task_immediate_is_queued_and_published() {
    let (app, store, publisher, tokens) = test_app();
    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(email_task_body())),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["retries"], 0);
    assert_eq!(body["max_retries"], 3);
    assert_eq!(body["user_id"], 7);
    assert_eq!(store.task_count(), 1);
    assert_eq!(publisher.published_count(), 1);
}

#[tokio::test]
async fn create_task_postponed_is_not_published() {
    let (app, _, publisher, tokens) = test_app();
    let run_at = Utc::now() + Duration::hours(1);
    let body = json!({
        "type": "send_email",
        "payload": {"to": "a@b.com", "subject": "s"},
        "run_at": run_at,
    });

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "postponed");
    assert_eq!(publisher.published_count(), 0);
}

#[tokio::test]
async fn create_task_rejects_unknown_type() {
    let (app, store, _, tokens) = test_app();
    let body = json!({"type": "noop", "payload": {}});

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown task type"));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn create_task_rejects_invalid_payload() {
    let (app, store, _, tokens) = test_app();
    let body = json!({"type": "send_email", "payload": {"to": "not-an-address"}});

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid payload"));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn create_task_rejects_out_of_range_retries() {
    let (app, store, _, tokens) = test_app();
    for max_retries in [0, 11] {
        let mut body = email_task_body();
        body["max_retries"] = json!(max_retries);

        let (status, body) = call(
            &app,
            authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("max_retries"));
    }
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn create_task_accepts_custom_retry_budget() {
    let (app, _, _, tokens) = test_app();
    let mut body = email_task_body();
    body["max_retries"] = json!(10);

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["max_retries"], 10);
}

#[tokio::test]
async fn create_task_rejects_run_at_in_past() {
    let (app, store, _, tokens) = test_app();
    let mut body = email_task_body();
    body["run_at"] = json!(Utc::now() - Duration::minutes(5));

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("run_at"));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn create_task_survives_publish_failure() {
    let (app, store, publisher, tokens) = test_app();
    publisher.fail.store(true, Ordering::SeqCst);

    let (status, body) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(email_task_body())),
    )
    .await;

    // The row is durable; the scheduler's stuck-rescue republishes it.
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "queued");
    assert_eq!(store.task_count(), 1);
    assert_eq!(publisher.published_count(), 0);
}

#[tokio::test]
async fn get_task_is_scoped_to_owner() {
    let (app, _, _, tokens) = test_app();
    let (_, created) = call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(email_task_body())),
    )
    .await;
    let task_id = created["id"].as_str().unwrap().to_string();

    let uri = format!("/api/tasks/{}", task_id);
    let (status, body) = call(&app, authed_request("GET", &uri, &tokens, 7, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_str().unwrap(), task_id);

    // Another user cannot see it.
    let (status, _) = call(&app, authed_request("GET", &uri, &tokens, 8, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_task_rejects_malformed_id() {
    let (app, _, _, tokens) = test_app();
    let (status, body) = call(
        &app,
        authed_request("GET", "/api/tasks/not-a-uuid", &tokens, 7, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid task id");
}

#[tokio::test]
async fn list_tasks_returns_only_own_tasks() {
    let (app, _, _, tokens) = test_app();
    call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(email_task_body())),
    )
    .await;
    call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 7, Some(email_task_body())),
    )
    .await;
    call(
        &app,
        authed_request("POST", "/api/tasks", &tokens, 8, Some(email_task_body())),
    )
    .await;

    let (status, body) = call(&app, authed_request("GET", "/api/tasks", &tokens, 7, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}
