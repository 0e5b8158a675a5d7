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

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskmill::{Database, TaskQueue, DAL};
use taskmill_api::auth::TokenManager;
use taskmill_api::store::PostgresStore;
use taskmill_api::{router, AppState};

/// Connections in the API's database pool.
const DB_POOL_SIZE: usize = 10;

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
    let secret = env::var("SECRET_KEY").context("SECRET_KEY must be set")?;
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let database = Database::new(&database_url, DB_POOL_SIZE);
    database.run_migrations().await?;

    let queue = TaskQueue::connect(&amqp_url).await?;
    let dal = DAL::new(database);

    let state = AppState {
        store: Arc::new(PostgresStore::new(dal)),
        publisher: Arc::new(queue),
        tokens: TokenManager::new(secret.as_bytes()),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "task API listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
