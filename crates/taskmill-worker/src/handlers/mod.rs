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

//! Concrete task handlers, registered at worker boot.
//!
//! All handlers are functions of the payload alone and tolerate repeated
//! execution (delivery is at-least-once).

pub mod download;
pub mod email;
pub mod image;

pub use self::download::DownloadHandler;
pub use self::email::EmailHandler;
pub use self::image::ImageHandler;
