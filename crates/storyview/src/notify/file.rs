//! 📁 File outbox notifier -- for dry runs, and for the paranoid.
//!
//! Appends each message to a file with mail-ish headers, so a human can read
//! exactly what would have gone out. Append, not truncate: last month's
//! outbox is evidence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::{File, OpenOptions},
    io::{self, AsyncWriteExt},
};
use tracing::trace;

use crate::notify::{NotificationMessage, Notifier};

/// 🔧 Where the outbox lives.
#[derive(Debug, Deserialize, Clone)]
pub struct FileNotifierConfig {
    pub file_name: String,
    /// ✉️ Cosmetic sender for the `From:` header.
    #[serde(default)]
    pub from: Option<String>,
}

/// 📁 Writes messages to a BufWriter, flushed on `close`.
#[derive(Debug)]
pub struct FileNotifier {
    file_buf: io::BufWriter<File>,
    config: FileNotifierConfig,
}

impl FileNotifier {
    pub async fn new(config: FileNotifierConfig) -> Result<Self> {
        let file_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file_name)
            .await
            .with_context(|| {
                format!(
                    "💀 The outbox '{}' could not be opened. The parent directory probably doesn't exist. It was us. It was always us.",
                    config.file_name
                )
            })?;
        Ok(Self {
            file_buf: io::BufWriter::new(file_handle),
            config,
        })
    }

    fn render(&self, message: &NotificationMessage) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nContent-Type: {}\nX-Storyview-Audience: {}\n\n{}\n\n",
            self.config.from.as_deref().unwrap_or("storyview"),
            message.recipients.join(", "),
            message.subject,
            message.content_type.mime(),
            message.audience,
            message.body
        )
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn send(&mut self, message: &NotificationMessage) -> Result<()> {
        let rendered = self.render(message);
        trace!("📬 '{}' walked into the outbox ({} bytes)", message.subject, rendered.len());
        self.file_buf
            .write_all(rendered.as_bytes())
            .await
            .with_context(|| format!("💀 Couldn't write '{}' to the outbox", message.subject))
    }

    async fn close(&mut self) -> Result<()> {
        self.file_buf
            .flush()
            .await
            .context("💀 The outbox wouldn't flush. The message is in memory. The disk remains unwritten.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Audience, ContentType};

    #[tokio::test]
    async fn the_one_where_the_outbox_keeps_everything_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let outbox = dir.path().join("outbox.txt");
        let config = FileNotifierConfig {
            file_name: outbox.display().to_string(),
            from: Some("storymaps@example.org".into()),
        };

        let mut notifier = FileNotifier::new(config.clone()).await?;
        notifier
            .send(&NotificationMessage {
                audience: Audience::Full,
                recipients: vec!["a@example.org".into(), "b@example.org".into()],
                subject: "first".into(),
                body: "<table></table>".into(),
                content_type: ContentType::Html,
            })
            .await?;
        notifier.close().await?;

        // -- 🔄 second run appends, it doesn't clobber
        let mut notifier = FileNotifier::new(config).await?;
        notifier
            .send(&NotificationMessage {
                audience: Audience::Troubleshooting,
                recipients: vec!["admin@example.org".into()],
                subject: "second".into(),
                body: "it broke".into(),
                content_type: ContentType::Plain,
            })
            .await?;
        notifier.close().await?;

        let written = tokio::fs::read_to_string(&outbox).await?;
        assert!(written.contains("From: storymaps@example.org"));
        assert!(written.contains("To: a@example.org, b@example.org"));
        assert!(written.contains("X-Storyview-Audience: troubleshooting"));
        let first = written.find("Subject: first").expect("💀 first message missing");
        let second = written.find("Subject: second").expect("💀 second message missing");
        assert!(first < second);
        Ok(())
    }
}
