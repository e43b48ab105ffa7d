//! 🗂️ Collection fetching -- stage two. Which of these things are story maps?
//!
//! A group holds all sorts: web maps, feature layers, PDFs somebody shared in
//! 2017 and forgot about. We want exactly one kind: `"Web Mapping Application"`.
//!
//! ⚠️ The filter never raises. An item that isn't shaped like an item is simply
//! not a story map. It does not get to ruin the run for everybody else.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::common::{ContentItem, WEB_MAPPING_APPLICATION};
use crate::portal::ContentService;
use crate::session::Session;

/// 🎯 Is this raw portal item a story map?
///
/// Exact type match. Non-objects, missing `type`, non-string `type`: all `false`.
pub fn is_web_app(raw: &Value) -> bool {
    raw.get("type").and_then(Value::as_str) == Some(WEB_MAPPING_APPLICATION)
}

/// 🔄 Keep the story maps, in order, as typed items.
///
/// Something that claims to be a story map but can't be read as one (no `id`,
/// say) gets a warning and is left out.
pub fn story_maps_from(raw_items: Vec<Value>) -> Vec<ContentItem> {
    raw_items
        .into_iter()
        .filter(is_web_app)
        .filter_map(|raw| match serde_json::from_value::<ContentItem>(raw.clone()) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!("⚠️ Skipping a story map the portal described oddly ({err}): {raw}");
                None
            }
        })
        .collect()
}

/// 🚀 Stage two: list the group, keep the story maps.
///
/// A failed listing is an error, not an empty group. An expired token and a
/// group with nothing in it deserve different emails.
pub async fn fetch_story_maps<P>(
    portal: &P,
    session: &Session,
    group_id: &str,
) -> Result<Vec<ContentItem>>
where
    P: ContentService + ?Sized,
{
    let raw_items = portal
        .group_content(session, group_id)
        .await
        .with_context(|| format!("💀 Couldn't fetch the content of group {group_id}"))?;

    let total = raw_items.len();
    let story_maps = story_maps_from(raw_items);
    debug!("🗂️ {} of {total} group items are story maps", story_maps.len());
    info!("📦 Found {} story maps in group {group_id}", story_maps.len());
    Ok(story_maps)
}
