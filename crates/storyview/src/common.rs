//! 📦 Common data structures -- the building blocks of storyview.
//!
//! 🎬 COLD OPEN -- INT. GIS OFFICE -- FIRST MONDAY OF THE MONTH -- 7:02 AM
//!
//! Somebody in parks & rec wants to know how many people looked at the
//! "Historic Mill Trail" story map last month. Nobody knows. The portal knows.
//! The portal is not talking. Not without a token, anyway.
//!
//! This module holds the humble structs that carry the answer from the portal
//! to somebody's inbox: a [`ContentItem`] goes in, a [`UsageRecord`] comes out,
//! and a [`ReportTable`] gathers them up for the trip. 🦆

use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 🏷️ The one true type tag of a story map. Exact match. No fuzzy feelings.
pub const WEB_MAPPING_APPLICATION: &str = "Web Mapping Application";

// ============================================================
//  📅 ReportMonth
// ============================================================

/// 📅 The calendar month a report is about. Year included, because "March"
/// alone has burned us before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportMonth {
    year: i32,
    month: u32,
}

impl ReportMonth {
    /// 🏗️ Build a month, refusing month 13 and friends.
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        if !(1..=12).contains(&month) {
            anyhow::bail!("💀 Month {month} is not a month. We checked the calendar. It has twelve.");
        }
        Ok(Self { year, month })
    }

    /// 🔄 The last full calendar month before `today`.
    ///
    /// January rolls back to December of the previous year. Naive `month - 1`
    /// gives you month zero, which is a vibe, not a date.
    pub fn previous_to(today: NaiveDate) -> Self {
        if today.month() == 1 {
            Self {
                year: today.year() - 1,
                month: 12,
            }
        } else {
            Self {
                year: today.year(),
                month: today.month() - 1,
            }
        }
    }

    /// 🔍 Parse `YYYY-MM`, the one format humans and machines both tolerate.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (year, month) = raw.trim().split_once('-').ok_or_else(|| {
            anyhow::anyhow!("💀 Expected a month like '2026-03', got '{raw}'. The dash is not optional.")
        })?;
        let year: i32 = year
            .parse()
            .map_err(|_| anyhow::anyhow!("💀 '{year}' is not a year we recognize in '{raw}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| anyhow::anyhow!("💀 '{month}' is not a month we recognize in '{raw}'"))?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 📛 English month name, e.g. "March".
    pub fn name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// 🎯 Does this date fall in this month? Year AND month, both must agree.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// ⏭️ The month after this one. December rolls into January.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// 🕛 Midnight UTC on the 1st. `None` only for years chrono can't hold.
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|first| first.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc())
    }

    /// 🕛 Midnight UTC on the 1st of the following month. Exclusive.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.next().starts_at()
    }

    /// 🏷️ The monthly-count column header, e.g. `MarchViews`.
    ///
    /// Derived here and nowhere else, so the table header and the validation
    /// messages can never drift apart.
    pub fn views_column(&self) -> String {
        format!("{}Views", self.name())
    }
}

impl std::fmt::Display for ReportMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name(), self.year)
    }
}

// ============================================================
//  🗺️ ContentItem
// ============================================================

/// 🗺️ One item in the portal catalog, as much of it as we care about.
///
/// Deserialized straight from the portal's item JSON. `numViews` and `created`
/// are defaulted because portals have been known to forget things.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_views: u64,
    /// ⏱️ Creation time. The portal speaks epoch millis, we speak chrono.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created: Option<DateTime<Utc>>,
}

/// 🕳️ `null` reads as the default, same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================
//  📈 Usage series
// ============================================================

/// 📈 One day of views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsagePoint {
    pub date: NaiveDate,
    pub views: u64,
}

/// 📈 A per-day series of views for a lookback window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSeries {
    pub points: Vec<UsagePoint>,
}

impl UsageSeries {
    pub fn new(points: Vec<UsagePoint>) -> Self {
        Self { points }
    }

    /// ➕ Total views whose date falls in `month`.
    ///
    /// No matching days means `0`. A real, honest zero. Not a sentinel.
    pub fn views_in(&self, month: ReportMonth) -> u64 {
        self.points
            .iter()
            .filter(|point| month.contains(point.date))
            .map(|point| point.views)
            .sum()
    }
}

// ============================================================
//  🧾 UsageRecord / ReportTable
// ============================================================

/// 🧾 The monthly views of one item, or the reason we don't have them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonthlyViews {
    /// ✅ We counted. This is the count.
    Computed(u64),
    /// 🐣 The item is younger than the lookback window, the portal won't give
    /// us a series. Somebody has to look it up by hand.
    TooYoung { item_id: String },
}

impl MonthlyViews {
    pub fn is_computed(&self) -> bool {
        matches!(self, MonthlyViews::Computed(_))
    }
}

/// 🧾 One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub title: String,
    pub item_id: String,
    pub total_views: u64,
    pub monthly_views: MonthlyViews,
}

impl UsageRecord {
    /// 🏗️ Title, id and lifetime views come from the item no matter what
    /// happened with the monthly number.
    pub fn new(item: &ContentItem, monthly_views: MonthlyViews) -> Self {
        Self {
            title: item.title.clone(),
            item_id: item.id.clone(),
            total_views: item.num_views,
            monthly_views,
        }
    }
}

/// 📋 The full report: every record, in item order, for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTable {
    pub month: ReportMonth,
    pub rows: Vec<UsageRecord>,
}

impl ReportTable {
    /// 🏗️ Built once, from a finished list of records. No appending after the fact.
    pub fn new(month: ReportMonth, rows: Vec<UsageRecord>) -> Self {
        Self { month, rows }
    }

    /// 📐 Column order, identifier included. Rendering drops `ItemId`.
    pub fn columns(&self) -> [String; 4] {
        [
            "Title".to_string(),
            "ItemId".to_string(),
            self.month.views_column(),
            "TotalViews".to_string(),
        ]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 🐣 How many rows carry the too-young sentinel.
    pub fn too_young_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| !row.monthly_views.is_computed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("💀 test date should exist")
    }

    #[test]
    fn the_one_where_january_remembers_december_was_last_year() {
        let month = ReportMonth::previous_to(date(2026, 1, 5));
        assert_eq!(month.year(), 2025);
        assert_eq!(month.month(), 12);
        assert_eq!(month.views_column(), "DecemberViews");
        assert_eq!(month.to_string(), "December 2025");
    }

    #[test]
    fn the_one_where_mid_year_just_subtracts_one() {
        let month = ReportMonth::previous_to(date(2026, 4, 1));
        assert_eq!((month.year(), month.month()), (2026, 3));
        assert_eq!(month.views_column(), "MarchViews");
    }

    #[test]
    fn the_one_where_month_strings_get_parsed_or_rejected() {
        let month = ReportMonth::parse("2024-02").expect("💀 valid month should parse");
        assert_eq!((month.year(), month.month()), (2024, 2));
        assert!(ReportMonth::parse("2024-13").is_err());
        assert!(ReportMonth::parse("February").is_err());
        assert!(ReportMonth::parse("2024-xx").is_err());
    }

    #[test]
    fn the_one_where_only_the_target_month_gets_summed() {
        let march = ReportMonth::new(2026, 3).expect("💀 march exists");
        let series = UsageSeries::new(vec![
            UsagePoint { date: date(2026, 2, 28), views: 100 },
            UsagePoint { date: date(2026, 3, 1), views: 2 },
            UsagePoint { date: date(2026, 3, 15), views: 3 },
            UsagePoint { date: date(2026, 3, 31), views: 4 },
            UsagePoint { date: date(2025, 3, 10), views: 1000 },
            UsagePoint { date: date(2026, 4, 1), views: 50 },
        ]);
        assert_eq!(series.views_in(march), 9);
    }

    #[test]
    fn the_one_where_no_matching_days_is_an_honest_zero() {
        let march = ReportMonth::new(2026, 3).expect("💀 march exists");
        let series = UsageSeries::new(vec![UsagePoint { date: date(2026, 4, 2), views: 8 }]);
        assert_eq!(series.views_in(march), 0);
        assert_eq!(UsageSeries::default().views_in(march), 0);
    }

    #[test]
    fn the_one_where_items_deserialize_from_portal_json() -> anyhow::Result<()> {
        let item: ContentItem = serde_json::from_value(serde_json::json!({
            "id": "abc123",
            "title": "Historic Mill Trail",
            "type": "Web Mapping Application",
            "numViews": 4242,
            "created": 1_700_000_000_000_i64,
            "owner": "someone_who_left_the_company"
        }))?;
        assert_eq!(item.id, "abc123");
        assert_eq!(item.item_type, WEB_MAPPING_APPLICATION);
        assert_eq!(item.num_views, 4242);
        assert_eq!(item.created.map(|c| c.timestamp_millis()), Some(1_700_000_000_000));
        Ok(())
    }

    #[test]
    fn the_one_where_december_knows_where_it_ends() {
        let december = ReportMonth::new(2025, 12).expect("💀 december exists");
        assert_eq!(december.next(), ReportMonth::new(2026, 1).expect("💀 january exists"));
        assert_eq!(
            december.starts_at(),
            Some(Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            december.ends_at(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn the_one_where_a_null_title_still_gets_a_row() -> anyhow::Result<()> {
        let item: ContentItem = serde_json::from_value(serde_json::json!({
            "id": "untitled",
            "title": null,
            "type": "Web Mapping Application",
            "numViews": null,
        }))?;
        assert_eq!(item.id, "untitled");
        assert_eq!(item.title, "");
        assert_eq!(item.num_views, 0);
        assert!(item.created.is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_the_table_counts_its_too_young_rows() {
        let month = ReportMonth::new(2026, 3).expect("💀 march exists");
        let item = ContentItem {
            id: "x".into(),
            title: "X".into(),
            item_type: WEB_MAPPING_APPLICATION.into(),
            num_views: 1,
            created: None,
        };
        let table = ReportTable::new(
            month,
            vec![
                UsageRecord::new(&item, MonthlyViews::Computed(0)),
                UsageRecord::new(&item, MonthlyViews::TooYoung { item_id: "x".into() }),
            ],
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.too_young_count(), 1);
        assert_eq!(table.columns()[2], "MarchViews");
    }
}
