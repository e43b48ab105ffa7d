//! 🚂 The pipeline -- four stages, one direction, no U-turns.
//!
//! ```text
//!   session ──▶ collection ──▶ usage ──▶ report ──▶ 📬 full list
//!      │            │            │          │
//!      └────────────┴────────────┴──────────┴──▶ 🔧 troubleshooting list
//! ```
//!
//! Any stage can end the run. When one does, the troubleshooting list hears
//! about it (with the whole error chain) and the full list hears nothing.
//! The notifier is closed on every path out of [`run_report`].

use std::error::Error as StdError;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info};

use crate::collection::fetch_story_maps;
use crate::common::ReportMonth;
use crate::notify::{Audience, Notifier, Recipients};
use crate::portal::ContentService;
use crate::report::{Validation, failure_message, render_text, report_message, validate};
use crate::session::{Credentials, SessionError, establish_session};
use crate::usage::{UsagePlan, aggregate_usage};

/// 💀 Every way a run can end without a report going out.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("🔒 no usable portal session")]
    Session(#[from] SessionError),
    #[error(
        "📅 the usage window {} to {} does not hold all of {month}; its {} would be undercounted",
        .start.format("%Y-%m-%d %H:%M UTC"),
        .end.format("%Y-%m-%d %H:%M UTC"),
        .month.views_column()
    )]
    UsageWindow {
        month: ReportMonth,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("🗂️ the story map listing failed")]
    Collection(#[source] anyhow::Error),
    #[error("📈 usage aggregation failed")]
    Aggregation(#[source] anyhow::Error),
    #[error("🗂️ group {group_id} produced no story maps, so there is nothing to report")]
    EmptyReport { group_id: String },
    #[error(
        "🐣 all {rows} story maps are too new for a full {month} of usage; not one {} value could be computed",
        .month.views_column()
    )]
    AllTooYoung { rows: usize, month: ReportMonth },
    #[error("📮 the report could not be delivered")]
    Dispatch(#[source] anyhow::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// 🎯 Everything one run needs to know that isn't a portal or a notifier.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub group_id: String,
    pub credentials: Credentials,
    pub recipients: Recipients,
    pub usage: UsagePlan,
}

/// ✅ What went out, for the log and the exit banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub month: ReportMonth,
    pub rows: usize,
    pub too_young: usize,
    pub audience: Audience,
    pub recipients: usize,
    pub finished_at: DateTime<Local>,
}

/// 🧅 The error and everything underneath it, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> Vec<String> {
    std::iter::successors(Some(err), |&err| err.source())
        .map(|err| err.to_string())
        .collect()
}

/// 🔧 Log the failure and tell the troubleshooting list. Never fails itself:
/// if the bad news can't be delivered, the log is all that's left.
pub async fn report_failure<N>(
    notifier: &mut N,
    month: ReportMonth,
    recipients: &Recipients,
    err: &(dyn StdError + 'static),
) where
    N: Notifier + ?Sized,
{
    let causes = error_chain(err);
    for (depth, cause) in causes.iter().enumerate() {
        if depth == 0 {
            error!("💀 The {month} report failed: {cause}");
        } else {
            error!("⚠️  cause: {cause}");
        }
    }

    let message = failure_message(month, &causes, recipients);
    match notifier.send(&message).await {
        Ok(()) => info!(
            "🔧 Troubleshooting list notified ({} recipient(s))",
            message.recipients.len()
        ),
        Err(send_err) => error!(
            "💀 Couldn't even tell the troubleshooting list. Nobody knows but this log: {send_err:#}"
        ),
    }
}

/// 🚀 One whole run: report to the full list, or bad news to the admins.
///
/// The notifier is closed before returning, whatever happened.
pub async fn run_report<P, N>(
    portal: &P,
    notifier: &mut N,
    plan: &RunPlan,
) -> Result<RunSummary, RunError>
where
    P: ContentService + ?Sized,
    N: Notifier + ?Sized,
{
    let outcome = execute(portal, notifier, plan).await;

    if let Err(ref err) = outcome {
        report_failure(notifier, plan.usage.month, &plan.recipients, err).await;
    }

    match (notifier.close().await, outcome) {
        (Ok(()), outcome) => outcome,
        (Err(close_err), Ok(_)) => Err(RunError::Dispatch(
            close_err.context("💀 The report was sent, but the notifier wouldn't close cleanly"),
        )),
        (Err(close_err), Err(err)) => {
            error!("💀 The notifier wouldn't close either: {close_err:#}");
            Err(err)
        }
    }
}

async fn execute<P, N>(portal: &P, notifier: &mut N, plan: &RunPlan) -> Result<RunSummary, RunError>
where
    P: ContentService + ?Sized,
    N: Notifier + ?Sized,
{
    let month = plan.usage.month;
    info!("🗺️ Building the story map usage report for {month}");

    // -- 📅 a month the window can't see would come back as a column of honest-looking zeros
    let window = plan.usage.window;
    if !window.covers(month) {
        return Err(RunError::UsageWindow {
            month,
            start: window.start,
            end: window.end,
        });
    }

    let session = establish_session(portal, &plan.credentials).await?;

    let items = fetch_story_maps(portal, &session, &plan.group_id)
        .await
        .map_err(RunError::Collection)?;

    let table = aggregate_usage(portal, &session, &items, &plan.usage)
        .await
        .map_err(RunError::Aggregation)?;

    let caveat = match validate(&table) {
        Validation::Empty => {
            return Err(RunError::EmptyReport {
                group_id: plan.group_id.clone(),
            });
        }
        Validation::AllTooYoung { rows } => return Err(RunError::AllTooYoung { rows, month }),
        Validation::Ready { caveat } => caveat,
    };

    info!("📋 {month}:\n{}", render_text(&table, &session.url));

    let message = report_message(&table, caveat, &plan.recipients, &session.url);
    notifier.send(&message).await.map_err(RunError::Dispatch)?;

    let summary = RunSummary {
        month,
        rows: table.len(),
        too_young: table.too_young_count(),
        audience: message.audience,
        recipients: message.recipients.len(),
        finished_at: Local::now(),
    };
    info!(
        "📬 '{}' sent to the {} list: {} rows, {} too young{}",
        message.subject,
        summary.audience,
        summary.rows,
        summary.too_young,
        if caveat { ", caveat attached" } else { "" }
    );
    Ok(summary)
}
