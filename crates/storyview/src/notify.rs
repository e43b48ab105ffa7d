//! 📮 Notifiers -- where finished reports (and bad news) leave the building.
//!
//! 🎭 Same casting agency as always: a [`Notifier`] trait, a couple of concrete
//! backends, and a [`NotifierBackend`] enum so the pipeline never has to know
//! whether its mail goes to a relay over HTTP or into a file on disk.
//!
//! # Contract 📜
//! - `send` delivers one message. Fire and forget: a 2xx (or a successful write)
//!   is all the confirmation we get, and all we ask for.
//! - `close` flushes and releases. MUST be called, on every exit path. Skipping
//!   `close` is a bug. It is also considered rude.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod file;
pub mod http;

pub use file::{FileNotifier, FileNotifierConfig};
pub use http::{HttpNotifier, HttpNotifierConfig};

/// 👥 Who a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// 📬 Everybody who gets the monthly report.
    Full,
    /// 🔧 The few who get paged when it breaks.
    Troubleshooting,
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::Full => write!(f, "full"),
            Audience::Troubleshooting => write!(f, "troubleshooting"),
        }
    }
}

/// 📄 Body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Plain,
    Html,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain; charset=utf-8",
            ContentType::Html => "text/html; charset=utf-8",
        }
    }
}

/// ✉️ One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub audience: Audience,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub content_type: ContentType,
}

/// 📬 The two mailing lists.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Recipients {
    pub full: Vec<String>,
    pub troubleshooting: Vec<String>,
}

impl Recipients {
    pub fn for_audience(&self, audience: Audience) -> &[String] {
        match audience {
            Audience::Full => &self.full,
            Audience::Troubleshooting => &self.troubleshooting,
        }
    }
}

/// 🔧 Which notifier to build. Externally tagged, so TOML reads `[notifier.Http]`.
#[derive(Debug, Deserialize, Clone)]
pub enum NotifierConfig {
    Http(HttpNotifierConfig),
    File(FileNotifierConfig),
}

/// 📮 Sends notification messages somewhere meaningful.
#[async_trait]
pub trait Notifier: std::fmt::Debug + Send {
    /// 📡 Deliver one message.
    async fn send(&mut self, message: &NotificationMessage) -> Result<()>;
    /// 🗑️ Flush, finalize, release. Call this. Always.
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Notifier.
#[derive(Debug)]
pub enum NotifierBackend {
    Http(HttpNotifier),
    File(FileNotifier),
}

impl NotifierBackend {
    /// 🏗️ Build the configured backend.
    pub async fn from_config(config: &NotifierConfig) -> Result<Self> {
        Ok(match config {
            NotifierConfig::Http(http) => NotifierBackend::Http(HttpNotifier::new(http.clone())?),
            NotifierConfig::File(file) => NotifierBackend::File(FileNotifier::new(file.clone()).await?),
        })
    }
}

#[async_trait]
impl Notifier for NotifierBackend {
    async fn send(&mut self, message: &NotificationMessage) -> Result<()> {
        match self {
            NotifierBackend::Http(notifier) => notifier.send(message).await,
            NotifierBackend::File(notifier) => notifier.send(message).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            NotifierBackend::Http(notifier) => notifier.close().await,
            NotifierBackend::File(notifier) => notifier.close().await,
        }
    }
}
