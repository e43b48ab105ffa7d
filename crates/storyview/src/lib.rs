//! 🗺️ storyview -- the monthly "did anybody look at our story maps?" report.
//!
//! 🎬 *[narrator voice]* "Once a month, a batch job wakes up, signs in to an
//! ArcGIS portal, counts the views, and writes home."
//!
//! Stages live in their own modules and run in [`pipeline`]; [`run`] wires
//! the real portal and the configured notifier into it.

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info};

pub mod app_config;
pub mod collection;
pub mod common;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod portal;
mod progress;
pub mod report;
pub mod session;
pub mod usage;

use crate::app_config::AppConfig;
use crate::common::ReportMonth;
use crate::notify::{Notifier, NotifierBackend};
use crate::pipeline::{RunError, RunPlan, RunSummary, report_failure, run_report};
use crate::portal::{ArcGisPortal, LookbackWindow};
use crate::session::Credentials;
use crate::usage::UsagePlan;

/// 🚀 Run the report once. `month` overrides "the month before today".
///
/// The usage window is anchored on the month's end, so an override or a
/// late-month run still sees the whole month. A month that hasn't finished
/// yet fails the window check and pages the troubleshooting list.
///
/// The notifier comes up first, so that everything after it, including a
/// portal client that refuses to build, can still page the troubleshooting list.
pub async fn run(app_config: AppConfig, month: Option<ReportMonth>) -> anyhow::Result<RunSummary> {
    let now = Utc::now();
    // -- 🌍 "today" in UTC, the same clock the month filter and the window use
    let month = month.unwrap_or_else(|| ReportMonth::previous_to(now.date_naive()));
    let window = LookbackWindow::for_month(month, now, app_config.portal.usage_window_days);
    info!(
        "🗓️ Reporting on {month}, usage window {} → {}",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d")
    );

    let mut notifier = NotifierBackend::from_config(&app_config.notifier)
        .await
        .context("💀 The notifier couldn't be built, so nobody can be told anything. Check [notifier].")?;

    let portal = match ArcGisPortal::new(&app_config.portal) {
        Ok(portal) => portal,
        Err(err) => {
            let err = RunError::Unexpected(err);
            report_failure(&mut notifier, month, &app_config.recipients, &err).await;
            // -- 🗑️ the run is over either way; a close failure here is just one more log line
            if let Err(close_err) = notifier.close().await {
                error!("💀 The notifier wouldn't close: {close_err:#}");
            }
            return Err(err.into());
        }
    };

    let plan = RunPlan {
        group_id: app_config.portal.group_id.clone(),
        credentials: Credentials::from_env(
            &app_config.portal.username_env,
            &app_config.portal.password_env,
        ),
        recipients: app_config.recipients.clone(),
        usage: UsagePlan {
            month,
            window,
            parallelism: app_config.portal.usage_parallelism,
        },
    };

    Ok(run_report(&portal, &mut notifier, &plan).await?)
}
