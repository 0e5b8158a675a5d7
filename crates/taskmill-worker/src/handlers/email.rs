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

//! `send_email` handler: SMTP delivery via lettre.

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;
use std::env;
use std::path::PathBuf;
use tracing::info;

use taskmill::payload::SendEmailPayload;
use taskmill::TaskHandler;

/// Sends `send_email` tasks through a configured SMTP relay.
pub struct EmailHandler {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_path: PathBuf,
}

impl EmailHandler {
    /// Builds the handler from `MAIL_HOST`, `MAIL_PORT`, `MAIL_USERNAME`
    /// and `MAIL_PASSWORD`. Attachment names in payloads are resolved under
    /// `base_path`.
    pub fn from_env(base_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let host = env::var("MAIL_HOST").context("MAIL_HOST must be set")?;
        let port: u16 = env::var("MAIL_PORT")
            .context("MAIL_PORT must be set")?
            .parse()
            .context("MAIL_PORT must be a port number")?;
        let username = env::var("MAIL_USERNAME").context("MAIL_USERNAME must be set")?;
        let password = env::var("MAIL_PASSWORD").context("MAIL_PASSWORD must be set")?;

        let from: Mailbox = username
            .parse()
            .context("MAIL_USERNAME is not a valid mailbox address")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("failed to configure SMTP relay")?
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self {
            transport,
            from,
            base_path: base_path.into(),
        })
    }

    async fn build_message(&self, payload: &SendEmailPayload) -> anyhow::Result<Message> {
        let to: Mailbox = payload
            .to
            .parse()
            .with_context(|| format!("'{}' is not a valid mailbox address", payload.to))?;

        let mut builder = Message::builder().from(self.from.clone()).to(to);
        if !payload.subject.is_empty() {
            builder = builder.subject(payload.subject.clone());
        }

        if payload.attached_files.is_empty() {
            return builder
                .header(ContentType::TEXT_HTML)
                .body(payload.body.clone())
                .context("failed to build message");
        }

        let mut multipart = MultiPart::mixed().build();
        if !payload.body.is_empty() {
            multipart = multipart.singlepart(SinglePart::html(payload.body.clone()));
        }
        for name in &payload.attached_files {
            let path = self.base_path.join(name);
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read attachment {}", path.display()))?;
            let content_type = ContentType::parse("application/octet-stream")
                .context("failed to parse attachment content type")?;
            multipart = multipart.singlepart(Attachment::new(name.clone()).body(content, content_type));
        }

        builder.multipart(multipart).context("failed to build message")
    }
}

#[async_trait]
impl TaskHandler for EmailHandler {
    async fn execute(&self, payload: &Value) -> anyhow::Result<()> {
        let payload: SendEmailPayload =
            serde_json::from_value(payload.clone()).context("payload does not match schema")?;

        let message = self.build_message(&payload).await?;
        self.transport
            .send(message)
            .await
            .context("failed to send mail")?;

        info!(to = %payload.to, "sent mail");
        Ok(())
    }
}
