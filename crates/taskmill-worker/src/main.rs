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

mod handlers;
mod worker;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskmill::{Database, HandlerRegistry, TaskQueue, DAL};

use handlers::{DownloadHandler, EmailHandler, ImageHandler};
use worker::{Worker, WorkerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let amqp_url = env::var("AMQP_URL").context("AMQP_URL must be set")?;
    let num_workers: usize = env::var("NUM_WORKERS")
        .context("NUM_WORKERS must be set")?
        .parse()
        .context("NUM_WORKERS must be a positive integer")?;
    anyhow::ensure!(num_workers > 0, "NUM_WORKERS must be a positive integer");
    let base_file_path = env::var("BASE_FILE_PATH").unwrap_or_else(|_| ".".to_string());

    let database = Database::new(&database_url, num_workers.max(2));
    let queue = TaskQueue::connect(&amqp_url).await?;
    let store: Arc<dyn WorkerStore> = Arc::new(DAL::new(database));

    let mut registry = HandlerRegistry::new();
    registry.register("send_email", Arc::new(EmailHandler::from_env(&base_file_path)?));
    registry.register("process_image", Arc::new(ImageHandler));
    registry.register(
        "download_files",
        Arc::new(DownloadHandler::new(&base_file_path)?),
    );
    let registry = Arc::new(registry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(num_workers);
    for id in 1..=num_workers {
        let worker = Worker::new(id, &queue, store.clone(), registry.clone()).await?;
        handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }
    info!(num_workers, "worker pool started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received; draining workers");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
