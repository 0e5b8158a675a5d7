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

//! `download_files` handler.
//!
//! Fetches every URL in the payload, at most [`MAX_PARALLEL`] at a time
//! with a per-request timeout, and stores the bodies under the configured
//! base directory with UUID names. Any individual failure fails the whole
//! task; the aggregated error lists every URL that went wrong.

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use taskmill::payload::DownloadFilesPayload;
use taskmill::TaskHandler;

/// Per-request ceiling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// In-handler download parallelism.
const MAX_PARALLEL: usize = 5;

/// Executes `download_files` tasks.
pub struct DownloadHandler {
    client: reqwest::Client,
    base_path: PathBuf,
}

impl DownloadHandler {
    pub fn new(base_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_path: base_path.into(),
        })
    }

    async fn download_one(&self, url: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?
            .error_for_status()
            .context("unexpected status")?;
        let bytes = response.bytes().await.context("failed to read body")?;

        let name = format!("{}{}", Uuid::new_v4(), extension_of(url));
        let path = self.base_path.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl TaskHandler for DownloadHandler {
    async fn execute(&self, payload: &Value) -> anyhow::Result<()> {
        let payload: DownloadFilesPayload =
            serde_json::from_value(payload.clone()).context("payload does not match schema")?;
        let total = payload.urls.len();

        let results: Vec<(String, anyhow::Result<()>)> = stream::iter(payload.urls)
            .map(|url| async move {
                let result = self.download_one(&url).await;
                (url, result)
            })
            .buffer_unordered(MAX_PARALLEL)
            .collect()
            .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(url, result)| result.err().map(|e| format!("{}: {:#}", url, e)))
            .collect();

        if !failures.is_empty() {
            anyhow::bail!(
                "{} of {} downloads failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            );
        }

        info!(count = total, "downloaded files");
        Ok(())
    }
}

/// Extension (with leading dot) of the URL's final path segment, if any.
fn extension_of(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or_default();
    match name.rfind('.') {
        Some(index) => &name[index..],
        None => "",
    }
}
