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

//! Typed payload schemas and per-type validators.
//!
//! Every task type has a distinct payload schema. Submitted payloads arrive
//! as free-form JSON; the validator for the type re-serializes them into the
//! typed schema and checks its domain rules, so invariants stay local to the
//! type. The table below is the extension point: registering a new task
//! type means adding a schema, a validator row here, and a handler in the
//! worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::SubmitError;

/// Default retry budget applied when a submission omits `max_retries`.
pub const DEFAULT_MAX_RETRIES: i16 = 3;

type Validator = fn(&Value) -> Result<(), String>;

/// Registered task types and their payload validators.
const VALIDATORS: &[(&str, Validator)] = &[
    ("send_email", validate_send_email),
    ("process_image", validate_process_image),
    ("download_files", validate_download_files),
];

/// Whether a task type is known to the platform.
pub fn is_registered_type(task_type: &str) -> bool {
    VALIDATORS.iter().any(|(name, _)| *name == task_type)
}

/// Validates a payload against the schema of its task type.
///
/// Rejects unknown types before looking at the payload at all, matching the
/// submission pipeline's validation order.
pub fn validate(task_type: &str, payload: &Value) -> Result<(), SubmitError> {
    let validator = VALIDATORS
        .iter()
        .find(|(name, _)| *name == task_type)
        .map(|(_, validator)| validator)
        .ok_or_else(|| SubmitError::UnknownType(task_type.to_string()))?;

    validator(payload).map_err(SubmitError::InvalidPayload)
}

/// Structural check for a mailbox address (`local@domain.tld`).
///
/// The worker's mail transport performs the authoritative parse at
/// execution time; this keeps obviously broken addresses out of the queue.
pub fn is_mailbox_address(address: &str) -> bool {
    static ADDRESS_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ADDRESS_RE
        .get_or_init(|| regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
    re.is_match(address)
}

/// Payload for the `send_email` task type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendEmailPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attached_files: Vec<String>,
}

fn validate_send_email(payload: &Value) -> Result<(), String> {
    let payload: SendEmailPayload =
        serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

    if payload.to.is_empty() {
        return Err("field 'to' cannot be empty".to_string());
    }
    if !is_mailbox_address(&payload.to) {
        return Err("field 'to' is not a valid email address".to_string());
    }
    if payload.subject.is_empty() && payload.body.is_empty() && payload.attached_files.is_empty() {
        return Err(
            "at least one of 'subject', 'body', 'attached_files' must be non-empty".to_string(),
        );
    }

    Ok(())
}

/// Payload for the `process_image` task type.
///
/// Adjustment semantics: `blur`, `sharpen` and `gamma` are intensities
/// (applied when positive); `contrast`, `brightness` and `saturation` are
/// percentage shifts in `[-100, 100]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessImagePayload {
    pub path: String,
    pub grayscale: bool,
    pub invert: bool,
    pub blur: f32,
    pub sharpen: f32,
    pub gamma: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub saturation: f32,
}

fn validate_process_image(payload: &Value) -> Result<(), String> {
    let payload: ProcessImagePayload =
        serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

    if payload.path.is_empty() {
        return Err("field 'path' cannot be empty".to_string());
    }
    for (name, value) in [
        ("blur", payload.blur),
        ("sharpen", payload.sharpen),
        ("gamma", payload.gamma),
    ] {
        if value < 0.0 {
            return Err(format!("field '{}' cannot be negative", name));
        }
    }
    for (name, value) in [
        ("contrast", payload.contrast),
        ("brightness", payload.brightness),
        ("saturation", payload.saturation),
    ] {
        if !(-100.0..=100.0).contains(&value) {
            return Err(format!("field '{}' must be between -100 and 100", name));
        }
    }

    Ok(())
}

/// Payload for the `download_files` task type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadFilesPayload {
    pub urls: Vec<String>,
}

fn validate_download_files(payload: &Value) -> Result<(), String> {
    let payload: DownloadFilesPayload =
        serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

    if payload.urls.is_empty() {
        return Err("field 'urls' cannot be empty".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registered_types() {
        assert!(is_registered_type("send_email"));
        assert!(is_registered_type("process_image"));
        assert!(is_registered_type("download_files"));
        assert!(!is_registered_type("noop"));
    }

    #[test]
    fn unknown_type_rejected_before_payload() {
        let err = validate("noop", &json!({})).unwrap_err();
        assert_eq!(err, SubmitError::UnknownType("noop".to_string()));
    }

    #[test]
    fn send_email_accepts_minimal_payload() {
        let payload = json!({"to": "a@b.com", "subject": "s"});
        assert!(validate("send_email", &payload).is_ok());
    }

    #[test]
    fn send_email_requires_recipient() {
        let err = validate("send_email", &json!({"subject": "s"})).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidPayload(_)));
    }

    #[test]
    fn send_email_rejects_malformed_address() {
        for to in ["not-an-address", "a@b", "a b@c.com", "@c.com"] {
            let payload = json!({"to": to, "subject": "s"});
            assert!(
                validate("send_email", &payload).is_err(),
                "accepted '{}'",
                to
            );
        }
    }

    #[test]
    fn send_email_requires_some_content() {
        let err = validate("send_email", &json!({"to": "a@b.com"})).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidPayload(_)));

        // any one of the three is enough
        for payload in [
            json!({"to": "a@b.com", "subject": "s"}),
            json!({"to": "a@b.com", "body": "<p>hi</p>"}),
            json!({"to": "a@b.com", "attached_files": ["report.pdf"]}),
        ] {
            assert!(validate("send_email", &payload).is_ok());
        }
    }

    #[test]
    fn process_image_validates_ranges() {
        assert!(validate("process_image", &json!({"path": "in.png"})).is_ok());
        assert!(validate(
            "process_image",
            &json!({"path": "in.png", "blur": 1.5, "contrast": -100.0, "saturation": 100.0})
        )
        .is_ok());

        assert!(validate("process_image", &json!({})).is_err());
        assert!(validate("process_image", &json!({"path": "in.png", "blur": -0.1})).is_err());
        assert!(validate("process_image", &json!({"path": "in.png", "gamma": -1.0})).is_err());
        assert!(
            validate("process_image", &json!({"path": "in.png", "brightness": 100.5})).is_err()
        );
    }

    #[test]
    fn download_files_requires_urls() {
        assert!(validate("download_files", &json!({"urls": ["http://x/y.bin"]})).is_ok());
        assert!(validate("download_files", &json!({"urls": []})).is_err());
        assert!(validate("download_files", &json!({})).is_err());
    }

    #[test]
    fn payload_type_mismatch_is_invalid() {
        let err = validate("download_files", &json!({"urls": "not-a-list"})).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidPayload(_)));
    }
}
