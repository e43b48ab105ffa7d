//! 📡 HTTP mail relay notifier.
//!
//! We don't speak SMTP. A relay does. We POST it a JSON envelope and it
//! takes it from there: `{from, to, subject, content_type, body}`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::notify::{NotificationMessage, Notifier};

/// 🔧 Where the relay lives and who the mail is from.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpNotifierConfig {
    /// 📡 The relay's send endpoint.
    pub url: String,
    /// ✉️ Sender address.
    pub from: String,
    /// 🔒 Bearer token for the relay, if it wants one.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Serialize)]
struct MailEnvelope<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    content_type: &'static str,
    body: &'a str,
}

/// 📡 Posts each message to the relay. No buffering, no retries.
#[derive(Debug)]
pub struct HttpNotifier {
    client: reqwest::Client,
    config: HttpNotifierConfig,
}

impl HttpNotifier {
    pub fn new(config: HttpNotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The mail relay client refused to be born. TLS, probably. It's always TLS.")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&mut self, message: &NotificationMessage) -> Result<()> {
        let envelope = MailEnvelope {
            from: &self.config.from,
            to: &message.recipients,
            subject: &message.subject,
            content_type: message.content_type.mime(),
            body: &message.body,
        };

        let mut request = self.client.post(&self.config.url).json(&envelope);
        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        trace!("📡 Posting '{}' to the mail relay", message.subject);
        let response = request.send().await.with_context(|| {
            format!(
                "💀 The mail relay at {} never heard from us. The message '{}' is still in our hands.",
                self.config.url, message.subject
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The mail relay looked at '{}' and said {status}. It also said: '{body}'",
                message.subject
            );
        }

        debug!(
            "📬 '{}' handed to the relay for {} recipient(s) ({} audience)",
            message.subject,
            message.recipients.len(),
            message.audience
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // -- 🗑️ nothing buffered, nothing to flush. the client drops with us.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Audience, ContentType};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> NotificationMessage {
        NotificationMessage {
            audience: Audience::Full,
            recipients: vec!["a@example.org".into(), "b@example.org".into()],
            subject: "Story Map Usage Report for March 2026".into(),
            body: "<p>hi</p>".into(),
            content_type: ContentType::Html,
        }
    }

    fn config(server: &MockServer, api_key: Option<&str>) -> HttpNotifierConfig {
        HttpNotifierConfig {
            url: format!("{}/send", server.uri()),
            from: "storymaps@example.org".into(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn the_one_where_the_envelope_reaches_the_relay() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer shh"))
            .and(body_json(json!({
                "from": "storymaps@example.org",
                "to": ["a@example.org", "b@example.org"],
                "subject": "Story Map Usage Report for March 2026",
                "content_type": "text/html; charset=utf-8",
                "body": "<p>hi</p>"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut notifier = HttpNotifier::new(config(&server, Some("shh")))?;
        notifier.send(&message()).await?;
        notifier.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_relay_says_no() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(503).set_body_string("relay on lunch break"))
            .mount(&server)
            .await;

        let mut notifier = HttpNotifier::new(config(&server, None))?;
        let err = notifier
            .send(&message())
            .await
            .expect_err("💀 a 503 is not a delivery");
        assert!(format!("{err:#}").contains("relay on lunch break"));
        Ok(())
    }
}
