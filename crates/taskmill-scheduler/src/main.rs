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

mod config;
mod scheduler;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskmill::{Database, TaskQueue, DAL};

use config::SchedulerConfig;
use scheduler::Scheduler;

/// The scheduler's sweep is a single statement per tick; a small pool is
/// plenty.
const DB_POOL_SIZE: usize = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SchedulerConfig::load(None).context("failed to load scheduler config")?;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let amqp_url = env::var("AMQP_URL").context("AMQP_URL must be set")?;

    let database = Database::new(&database_url, DB_POOL_SIZE);
    database.run_migrations().await?;

    let queue = TaskQueue::connect(&amqp_url).await?;
    let dal = DAL::new(database);

    let scheduler = Scheduler::new(config.interval(), Arc::new(dal), Arc::new(queue));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
