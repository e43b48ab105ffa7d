//! 📈 Usage aggregation -- stage three. Count the views, one story map at a time.
//!
//! For every story map: ask the portal for its daily views over the lookback
//! window, keep only the days in the target month, add them up. Story maps
//! too young for the window get a sentinel instead of a number, and the batch
//! carries on. Anything else going wrong stops the batch.
//!
//! 🧵 Requests may overlap (`usage_parallelism`), but `buffered` hands results
//! back in input order, so the table reads the same as the group listing.

use anyhow::Result;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::common::{ContentItem, MonthlyViews, ReportMonth, ReportTable, UsageRecord};
use crate::portal::{ContentService, LookbackWindow, UsageError};
use crate::progress::UsageProgress;
use crate::session::Session;

/// 🎯 What to count and how.
#[derive(Debug, Clone, Copy)]
pub struct UsagePlan {
    pub month: ReportMonth,
    pub window: LookbackWindow,
    /// 🧵 In-flight usage requests. Clamped to at least 1.
    pub parallelism: usize,
}

/// 📈 One story map, one record.
///
/// `TooYoung` becomes a sentinel row. Every other failure bubbles up.
pub async fn usage_record<P>(
    portal: &P,
    session: &Session,
    item: &ContentItem,
    plan: &UsagePlan,
) -> Result<UsageRecord>
where
    P: ContentService + ?Sized,
{
    match portal.usage(session, item, plan.window).await {
        Ok(series) => {
            let views = series.views_in(plan.month);
            debug!(
                "📈 '{}' ({}): {views} views in {} from {} days of data",
                item.title,
                item.id,
                plan.month,
                series.points.len()
            );
            Ok(UsageRecord::new(item, MonthlyViews::Computed(views)))
        }
        Err(UsageError::TooYoung { created, .. }) => {
            warn!(
                "🐣 '{}' ({}) was created {created}, too recently for a full {} of usage; it needs a manual lookup",
                item.title, item.id, plan.month
            );
            Ok(UsageRecord::new(
                item,
                MonthlyViews::TooYoung {
                    item_id: item.id.clone(),
                },
            ))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!(
            "💀 Couldn't count the views of '{}' ({}). One bad apple, whole batch.",
            item.title, item.id
        ))),
    }
}

/// 🚀 Stage three: every story map in, one [`ReportTable`] out.
///
/// Records are gathered first, the table is built once at the end.
pub async fn aggregate_usage<P>(
    portal: &P,
    session: &Session,
    items: &[ContentItem],
    plan: &UsagePlan,
) -> Result<ReportTable>
where
    P: ContentService + ?Sized,
{
    let progress = UsageProgress::new(items.len() as u64);
    let table = aggregate_with_progress(portal, session, items, plan, &progress).await;
    let elapsed = progress.finish();
    let table = table?;
    info!(
        "📊 Counted {} story maps for {} in {elapsed} ({} too young for the window)",
        table.len(),
        plan.month,
        table.too_young_count()
    );
    Ok(table)
}

async fn aggregate_with_progress<P>(
    portal: &P,
    session: &Session,
    items: &[ContentItem],
    plan: &UsagePlan,
    progress: &UsageProgress,
) -> Result<ReportTable>
where
    P: ContentService + ?Sized,
{
    let records: Vec<UsageRecord> = stream::iter(items)
        .map(|item| async move {
            let record = usage_record(portal, session, item, plan).await;
            progress.tick(&item.title);
            record
        })
        .buffered(plan.parallelism.max(1))
        .try_collect()
        .await?;

    Ok(ReportTable::new(plan.month, records))
}
