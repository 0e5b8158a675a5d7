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

//! Shared application state handed to every request handler.

use std::sync::Arc;

use taskmill::TaskPublisher;

use crate::auth::TokenManager;
use crate::store::ApiStore;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ApiStore>,
    pub publisher: Arc<dyn TaskPublisher>,
    pub tokens: TokenManager,
}
