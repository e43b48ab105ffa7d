//! # 📡 THE ARCGIS PORTAL CLIENT
//!
//! 🎬 COLD OPEN -- INT. COUNTY GIS OFFICE -- 6:58 AM
//!
//! The cron job wakes up before anyone else. It has one token to generate,
//! one group to search, and one usage request per story map. It does not
//! get coffee. It gets JSON. Sometimes the JSON says `{"error": ...}` with a
//! 200 status, because the portal believes in feelings over HTTP semantics.
//!
//! 🚀 This module speaks just enough ArcGIS REST to do the job:
//! - `POST sharing/rest/generateToken` -- trade a password for a token
//! - `GET  sharing/rest/portals/self` -- who are we, and which portal is this
//! - `GET  sharing/rest/search?q=group:<id>` -- the group's items, page by page
//! - `GET  sharing/rest/portals/<id>/usage` -- the per-day view series
//!
//! 🦆 (mandatory duck, it has a portal account, it is anonymous)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::common::{ContentItem, UsagePoint, UsageSeries};
use crate::portal::{ContentService, LookbackWindow, PortalConfig, UsageError};
use crate::session::{Credentials, Session, SessionError};

// -- 🎟️ minutes. a monthly batch job does not need a week-long token.
const TOKEN_EXPIRATION_MINUTES: u32 = 60;

/// 💀 The error object the portal tucks into a 200 response when it's upset.
#[derive(Debug, Deserialize)]
struct PortalErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct PortalSelf {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    user: Option<PortalUser>,
}

#[derive(Debug, Deserialize)]
struct PortalUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    // -- 🏁 -1 means "that was the last page"
    #[serde(default = "last_page")]
    next_start: i64,
}

fn last_page() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    data: Vec<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    /// 📈 `[[epoch_millis, count], ...]`, values as strings or numbers depending on the portal's mood
    #[serde(default)]
    num: Vec<Vec<serde_json::Value>>,
}

/// 📡 The ArcGIS-flavored [`ContentService`].
///
/// Holds one `reqwest::Client` for the whole run. Spinning up a client per
/// request is the networking equivalent of buying a new car for every grocery run.
#[derive(Debug)]
pub struct ArcGisPortal {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl ArcGisPortal {
    /// 🚀 Build the client. No network traffic yet, that's `authenticate`'s job.
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS thing. It's usually a TLS thing.")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/sharing/rest/{}", self.base_url, path)
    }

    /// 📡 GET a REST resource as JSON, token attached if we have one.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<T> {
        let url = self.rest_url(path);
        let mut request = self.client.get(&url).query(&[("f", "json")]).query(query);
        if let Some(token) = token {
            request = request.query(&[("token", token)]);
        }

        trace!("📡 GET {url}");
        let response = request
            .send()
            .await
            .with_context(|| format!("💀 GET {url} never made it to the portal. Check connectivity, check the URL, check your feelings."))?;
        Self::read_json(&url, response).await
    }

    /// 📦 Status check, body parse, and the `{"error": ...}`-on-200 check.
    async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("💀 The portal started answering {url} and then trailed off."))?;

        if !status.is_success() {
            anyhow::bail!("💀 The portal answered {url} with {status}. The body read: '{body}'");
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!("💀 The portal's answer to {url} is not JSON. It read: '{body}'"))?;

        if let Some(error) = value.get("error") {
            let error: PortalErrorBody = serde_json::from_value(error.clone()).unwrap_or(PortalErrorBody {
                code: None,
                message: Some(error.to_string()),
                details: Vec::new(),
            });
            anyhow::bail!(
                "💀 The portal returned error {} for {url}: {} {}",
                error.code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
                error.message.unwrap_or_default(),
                error.details.join("; ")
            );
        }

        serde_json::from_value(value)
            .with_context(|| format!("💀 The portal's answer to {url} was JSON, just not the JSON we expected."))
    }

    /// 🎟️ Trade username + password for a token.
    async fn generate_token(&self, username: &str, password: &str) -> Result<String> {
        let url = self.rest_url("generateToken");
        let expiration = TOKEN_EXPIRATION_MINUTES.to_string();
        let form = [
            ("username", username),
            ("password", password),
            ("client", "referer"),
            ("referer", self.base_url.as_str()),
            ("expiration", expiration.as_str()),
            ("f", "json"),
        ];
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("💀 Couldn't reach {url} to sign in."))?;
        let token: TokenResponse = Self::read_json(&url, response).await?;
        Ok(token.token)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let token = match (&credentials.username, &credentials.password) {
            (Some(username), Some(password)) => {
                debug!("🔑 Generating a portal token for {username}");
                Some(self.generate_token(username, password).await?)
            }
            // -- 🤷 no credentials, no token. the portal will greet us as "anonymous".
            _ => None,
        };

        let portal_self: PortalSelf = self
            .get_json("portals/self", &[], token.as_deref())
            .await
            .context("💀 Couldn't ask the portal to describe itself.")?;

        Ok(Session {
            url: self.base_url.clone(),
            portal_id: portal_self.id,
            token,
            username: portal_self.user.and_then(|user| user.username),
        })
    }
}

/// 🔢 Portal numbers arrive as numbers or as strings of numbers. Take both.
///
/// Floats are fine if they are whole (`4.0`). `4.7` views is not a thing we round.
fn value_as_i64(value: &serde_json::Value) -> Option<i64> {
    // -- 📏 2^63 as f64; anything at or past it doesn't fit an i64
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= -I64_BOUND && *f < I64_BOUND)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 📈 `[[millis, count], ...]` into dated points.
fn parse_usage_points(rows: &[Vec<serde_json::Value>]) -> Result<Vec<UsagePoint>> {
    rows.iter()
        .map(|row| {
            let (millis, count) = match row.as_slice() {
                [millis, count, ..] => (millis, count),
                _ => anyhow::bail!("💀 A usage row should be [time, count], got {row:?}"),
            };
            let millis = value_as_i64(millis)
                .with_context(|| format!("💀 Usage timestamp {millis} is not a number"))?;
            let views = value_as_i64(count)
                .and_then(|c| u64::try_from(c).ok())
                .with_context(|| format!("💀 Usage count {count} is not a non-negative number"))?;
            let date = DateTime::<Utc>::from_timestamp_millis(millis)
                .with_context(|| format!("💀 Usage timestamp {millis} is outside the calendar"))?
                .date_naive();
            Ok(UsagePoint { date, views })
        })
        .collect()
}

#[async_trait]
impl ContentService for ArcGisPortal {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        self.sign_in(credentials)
            .await
            .map_err(|source| SessionError::Connection {
                url: self.base_url.clone(),
                source,
            })
    }

    async fn group_content(
        &self,
        session: &Session,
        group_id: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mut items = Vec::new();
        let mut start: i64 = 1;
        loop {
            let page: SearchPage = self
                .get_json(
                    "search",
                    &[
                        ("q", format!("group:{group_id}")),
                        ("start", start.to_string()),
                        ("num", self.page_size.to_string()),
                    ],
                    session.token.as_deref(),
                )
                .await
                .with_context(|| format!("💀 Couldn't list the content of group {group_id}"))?;

            debug!(
                "📄 Group {group_id}: page at {start} brought {} items",
                page.results.len()
            );
            let page_was_empty = page.results.is_empty();
            items.extend(page.results);

            // -- 🏁 -1 is the portal's "fin". an empty page with a next_start is a portal bug; stop anyway.
            if page.next_start <= 0 || page_was_empty {
                break;
            }
            start = page.next_start;
        }
        Ok(items)
    }

    async fn usage(
        &self,
        session: &Session,
        item: &ContentItem,
        window: LookbackWindow,
    ) -> Result<UsageSeries, UsageError> {
        // -- 🐣 the portal has no full series for an item born inside the window
        match item.created {
            Some(created) if window.is_younger_than_window(Some(created)) => {
                return Err(UsageError::TooYoung {
                    item_id: item.id.clone(),
                    created,
                    window_start: window.start,
                });
            }
            _ => {}
        }

        let request_failed = |source: anyhow::Error| UsageError::Request {
            item_id: item.id.clone(),
            source,
        };

        let portal_id = session.portal_id.as_deref().unwrap_or("self");
        let response: UsageResponse = self
            .get_json(
                &format!("portals/{portal_id}/usage"),
                &[
                    ("startTime", window.start.timestamp_millis().to_string()),
                    ("endTime", window.end.timestamp_millis().to_string()),
                    ("period", "1d".to_string()),
                    ("vars", "num".to_string()),
                    ("groupby", "name".to_string()),
                    ("etype", "svcusg".to_string()),
                    ("name", item.id.clone()),
                ],
                session.token.as_deref(),
            )
            .await
            .map_err(request_failed)?;

        let mut points = Vec::new();
        for data in &response.data {
            points.extend(parse_usage_points(&data.num).map_err(request_failed)?);
        }
        trace!("📈 {} usage points for {}", points.len(), item.id);
        Ok(UsageSeries::new(points))
    }
}
