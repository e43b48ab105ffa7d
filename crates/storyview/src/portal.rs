//! 📡 Portal -- the content service on the other end of the wire.
//!
//! 🚰 Everything storyview knows about story maps, it learned from a portal.
//! This module is the seam: a [`ContentService`] trait the pipeline talks to,
//! the config for reaching it, and the errors it can throw at us.
//!
//! The real implementation speaks ArcGIS REST ([`arcgis::ArcGisPortal`]).
//! Tests bring their own portal and it is much better behaved. 🦆

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::common::{ContentItem, ReportMonth, UsageSeries};
use crate::session::{Credentials, Session, SessionError};

pub mod arcgis;

pub use arcgis::ArcGisPortal;

// ============================================================
//  🔧 PortalConfig
// ============================================================

/// 🔧 Where the portal is, which group to read, and how hard to poke it.
#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    /// 📡 Portal root, e.g. `https://www.arcgis.com`. Scheme included. Yes, all of it.
    pub url: String,
    /// 🗂️ The group whose story maps we report on.
    pub group_id: String,
    /// 🔒 Name of the env var holding the username. The username itself never touches TOML.
    #[serde(default = "default_username_env")]
    pub username_env: String,
    /// 🔒 Name of the env var holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// 📅 How far back the usage series reaches.
    #[serde(default = "default_usage_window_days")]
    pub usage_window_days: u32,
    /// 🧵 How many usage requests may be in flight at once. 1 = strictly one at a time.
    #[serde(default = "default_usage_parallelism")]
    pub usage_parallelism: usize,
    /// 📄 Items per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_username_env() -> String {
    "AGOL_USER".to_string()
}

fn default_password_env() -> String {
    "AGOL_PASS".to_string()
}

// -- 📅 60 days: always holds the whole previous month, whatever today is
fn default_usage_window_days() -> u32 {
    60
}

fn default_usage_parallelism() -> usize {
    1
}

// -- 📄 the portal caps search pages at 100 anyway
fn default_page_size() -> u32 {
    100
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

// ============================================================
//  📅 LookbackWindow
// ============================================================

/// 📅 The usage window: `days` days ending at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    /// 📅 The window for reporting on `month`: `days` days ending at the month's
    /// end, or at `now` if the month isn't over yet.
    ///
    /// Anchoring on the month (not on `now`) keeps a late-month run and a
    /// `--month` override looking at the days they are actually about.
    pub fn for_month(month: ReportMonth, now: DateTime<Utc>, days: u32) -> Self {
        let end = month.ends_at().map_or(now, |month_end| month_end.min(now));
        Self::ending_at(end, days)
    }

    /// 🎯 Does the window hold every day of `month`?
    pub fn covers(&self, month: ReportMonth) -> bool {
        match (month.starts_at(), month.ends_at()) {
            (Some(first), Some(after_last)) => self.start <= first && self.end >= after_last,
            _ => false,
        }
    }

    /// 🐣 Was this item born after the window opened? Then it has no full series.
    pub fn is_younger_than_window(&self, created: Option<DateTime<Utc>>) -> bool {
        created.is_some_and(|created| created > self.start)
    }
}

// ============================================================
//  💀 UsageError
// ============================================================

/// 💀 Ways a single item's usage request can go wrong.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// 🐣 Item created after the window opened. Non-fatal: becomes a sentinel row.
    #[error("🐣 item {item_id} was created at {created}, after the usage window opened at {window_start}")]
    TooYoung {
        item_id: String,
        created: DateTime<Utc>,
        window_start: DateTime<Utc>,
    },
    /// 📡 Anything else. Fatal for the batch.
    #[error("📡 usage request for item {item_id} failed")]
    Request {
        item_id: String,
        #[source]
        source: anyhow::Error,
    },
}

// ============================================================
//  🎭 ContentService
// ============================================================

/// 🎭 The content service, as far as the pipeline is concerned.
///
/// # Contract 📜
/// - `authenticate` returns a [`Session`] even when the portal let us in
///   anonymously. Deciding that anonymous is not good enough is the
///   caller's job.
/// - `group_content` returns the raw item JSON, untouched, so the filter can
///   shrug at items that aren't shaped like items.
/// - `usage` returns [`UsageError::TooYoung`] for items created after
///   `window.start`, and [`UsageError::Request`] for everything else.
#[async_trait]
pub trait ContentService: std::fmt::Debug + Send + Sync {
    /// 🔑 Sign in (or don't, if there are no credentials) and describe the session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, SessionError>;

    /// 🗂️ Every item shared with `group_id`, in portal order, as raw JSON.
    async fn group_content(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Vec<serde_json::Value>>;

    /// 📈 The per-day view series for one item over `window`.
    async fn usage(
        &self,
        session: &Session,
        item: &ContentItem,
        window: LookbackWindow,
    ) -> Result<UsageSeries, UsageError>;
}
