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

//! Handler registry.
//!
//! Maps a task type tag to its executor. Registration happens once at
//! worker boot; after that the registry is read-only and shared across the
//! pool.
//!
//! # Handler contract
//!
//! Handlers are functions of the payload alone and must tolerate repeated
//! execution: delivery is at-least-once, and a crash after side effects but
//! before acknowledgement causes a redelivery.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HandlerError;

/// A type-specific task executor, registered at boot.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes the task. The payload has already passed the type's
    /// validator at submission, but handlers re-parse it into the typed
    /// schema so their invariants stay local.
    async fn execute(&self, payload: &Value) -> anyhow::Result<()>;
}

/// Read-only mapping of task type to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a task type, replacing any previous one.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Looks up the handler for a task type.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Executes the handler registered for `task_type`.
    ///
    /// A known type without a registered handler is a deployment error,
    /// surfaced as [`HandlerError::Missing`] and treated by the worker like
    /// any other execution failure.
    pub async fn execute(&self, task_type: &str, payload: &Value) -> Result<(), HandlerError> {
        let handler = self
            .get(task_type)
            .ok_or_else(|| HandlerError::Missing(task_type.to_string()))?;

        handler.execute(payload).await.map_err(HandlerError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn execute(&self, _payload: &Value) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn executes_registered_handler() {
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let mut registry = HandlerRegistry::new();
        registry.register("send_email", handler.clone());

        registry
            .execute("send_email", &json!({}))
            .await
            .expect("handler should succeed");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_handler_is_an_error() {
        let registry = HandlerRegistry::new();
        let err = registry.execute("send_email", &json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Missing(_)));
    }

    #[tokio::test]
    async fn handler_failure_is_propagated() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "send_email",
            Arc::new(CountingHandler {
                calls: AtomicUsize::new(0),
                fail: true,
            }),
        );

        let err = registry.execute("send_email", &json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }
}
