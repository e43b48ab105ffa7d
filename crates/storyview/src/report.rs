//! 📋 Reporting -- stage four. Validate, render, address the envelope.
//!
//! Validation decides whether there is anything worth sending at all:
//! - no rows → nothing to report, page the admins
//! - every row too young → a table of sentinels, page the admins
//! - otherwise → send it, with a caveat if some rows are sentinels
//!
//! Rendering is the only place the too-young sentinel turns into words. The
//! item id column stays internal and never reaches the human-facing table.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};

use crate::common::{MonthlyViews, ReportMonth, ReportTable, UsageRecord};
use crate::notify::{Audience, ContentType, NotificationMessage, Recipients};

/// 📝 Appended to the report when at least one story map was too young.
pub const CAVEAT: &str = "Some story maps are too new to have a full month of usage data. \
    If you need views for a very new story map, reply to this email to request a manual lookup.";

/// ✅ / 💀 What the report is fit for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// 💀 No rows at all.
    Empty,
    /// 💀 Rows, but every one of them is a sentinel.
    AllTooYoung { rows: usize },
    /// ✅ Sendable. `caveat` when some (not all) rows are sentinels.
    Ready { caveat: bool },
}

/// 🔍 Judge the table.
pub fn validate(table: &ReportTable) -> Validation {
    if table.is_empty() {
        return Validation::Empty;
    }
    match table.too_young_count() {
        0 => Validation::Ready { caveat: false },
        too_young if too_young == table.len() => Validation::AllTooYoung { rows: too_young },
        _ => Validation::Ready { caveat: true },
    }
}

/// 🔢 View counts with thousands separators, the way the parks department
/// expects to read them: `12345` is "12,345".
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    // -- 📐 a comma lands before every digit whose index matches the leading group's width
    let lead = digits.len() % 3;
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.char_indices() {
        if i != 0 && i % 3 == lead {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// 🐣 The sentinel, in words, with a link for the manual lookup.
pub fn too_young_text(portal_url: &str, item_id: &str) -> String {
    format!(
        "Too new for a full month of data (manual lookup: {}/home/item.html?id={})",
        portal_url.trim_end_matches('/'),
        item_id
    )
}

fn monthly_cell(record: &UsageRecord, portal_url: &str) -> String {
    match &record.monthly_views {
        MonthlyViews::Computed(views) => format_number(*views),
        MonthlyViews::TooYoung { item_id } => too_young_text(portal_url, item_id),
    }
}

/// 📐 The human-facing header: everything but `ItemId`.
fn visible_header(table: &ReportTable) -> [String; 3] {
    let [title, _item_id, monthly, total] = table.columns();
    [title, monthly, total]
}

/// 🖥️ Plain-text table, for the log and for plain-text mail.
pub fn render_text(table: &ReportTable, portal_url: &str) -> String {
    let mut rendered = Table::new();
    rendered.load_preset(UTF8_FULL);
    rendered.set_content_arrangement(ContentArrangement::Disabled);
    rendered.set_header(visible_header(table).to_vec());
    for record in &table.rows {
        rendered.add_row(vec![
            Cell::new(&record.title),
            Cell::new(monthly_cell(record, portal_url)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(record.total_views)).set_alignment(CellAlignment::Right),
        ]);
    }
    rendered.to_string()
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// 🌐 HTML table, for the mail body.
pub fn render_html(table: &ReportTable, portal_url: &str) -> String {
    let mut html = String::from("<table border=\"1\" cellpadding=\"4\" style=\"border-collapse: collapse;\">\n<thead><tr>");
    for column in visible_header(table) {
        html.push_str(&format!("<th>{}</th>", escape_html(&column)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for record in &table.rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td style=\"text-align: right;\">{}</td><td style=\"text-align: right;\">{}</td></tr>\n",
            escape_html(&record.title),
            escape_html(&monthly_cell(record, portal_url)),
            escape_html(&format_number(record.total_views)),
        ));
    }
    html.push_str("</tbody>\n</table>");
    html
}

/// 🏷️ "Story Map Usage Report for March 2026"
pub fn report_subject(month: ReportMonth) -> String {
    format!("Story Map Usage Report for {month}")
}

/// ✉️ The monthly report, addressed to everybody.
pub fn report_message(
    table: &ReportTable,
    caveat: bool,
    recipients: &Recipients,
    portal_url: &str,
) -> NotificationMessage {
    let mut body = format!(
        "<p>Hello,</p>\n<p>Here are the story map views for {}, along with total views since each story map was published.</p>\n{}\n",
        escape_html(&table.month.to_string()),
        render_html(table, portal_url)
    );
    if caveat {
        body.push_str(&format!("<p>{}</p>\n", escape_html(CAVEAT)));
    }
    body.push_str("<p>This report is generated automatically once a month.</p>\n");

    NotificationMessage {
        audience: Audience::Full,
        recipients: recipients.for_audience(Audience::Full).to_vec(),
        subject: report_subject(table.month),
        body,
        content_type: ContentType::Html,
    }
}

/// 🔧 The bad-news message, addressed to the troubleshooting list.
///
/// `causes` is the error chain, outermost first.
pub fn failure_message(
    month: ReportMonth,
    causes: &[String],
    recipients: &Recipients,
) -> NotificationMessage {
    let mut body = format!(
        "The story map usage report for {month} was not sent to the full list.\n\nWhat went wrong:\n"
    );
    for cause in causes {
        body.push_str(&format!("  - {cause}\n"));
    }
    body.push_str("\nSee the storyview log file for the full trace.\n");

    NotificationMessage {
        audience: Audience::Troubleshooting,
        recipients: recipients.for_audience(Audience::Troubleshooting).to_vec(),
        subject: format!("FAILED: {}", report_subject(month)),
        body,
        content_type: ContentType::Plain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTAL: &str = "https://wake.maps.arcgis.com";

    fn march() -> ReportMonth {
        ReportMonth::new(2026, 3).expect("💀 march exists")
    }

    fn record(id: &str, monthly_views: MonthlyViews) -> UsageRecord {
        UsageRecord {
            title: "Historic Mill Trail".into(),
            item_id: id.into(),
            total_views: 12345,
            monthly_views,
        }
    }

    fn too_young(id: &str) -> MonthlyViews {
        MonthlyViews::TooYoung { item_id: id.into() }
    }

    fn recipients() -> Recipients {
        Recipients {
            full: vec!["everyone@example.org".into()],
            troubleshooting: vec!["gis-admin@example.org".into()],
        }
    }

    #[test]
    fn the_one_where_validation_sorts_tables_into_four_piles() {
        assert_eq!(validate(&ReportTable::new(march(), vec![])), Validation::Empty);
        assert_eq!(
            validate(&ReportTable::new(march(), vec![record("a", too_young("a")), record("b", too_young("b"))])),
            Validation::AllTooYoung { rows: 2 }
        );
        assert_eq!(
            validate(&ReportTable::new(
                march(),
                vec![record("a", MonthlyViews::Computed(0)), record("b", too_young("b"))]
            )),
            Validation::Ready { caveat: true }
        );
        assert_eq!(
            validate(&ReportTable::new(
                march(),
                vec![record("a", MonthlyViews::Computed(0)), record("b", MonthlyViews::Computed(9))]
            )),
            Validation::Ready { caveat: false }
        );
    }

    #[test]
    fn the_one_where_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(123456), "123,456");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_the_item_id_stays_backstage() {
        let table = ReportTable::new(
            march(),
            vec![record("secret-id-1", MonthlyViews::Computed(1500))],
        );
        let text = render_text(&table, PORTAL);
        assert!(text.contains("MarchViews"));
        assert!(text.contains("1,500"));
        assert!(text.contains("12,345"));
        assert!(!text.contains("ItemId"));
        assert!(!text.contains("secret-id-1"));

        let html = render_html(&table, PORTAL);
        assert!(html.contains("<th>MarchViews</th>"));
        assert!(!html.contains("ItemId"));
        assert!(!html.contains("secret-id-1"));
    }

    #[test]
    fn the_one_where_titles_cannot_inject_markup() {
        let mut sneaky = record("x", MonthlyViews::Computed(1));
        sneaky.title = "Tour <x> & friends".into();
        let table = ReportTable::new(march(), vec![sneaky]);
        let html = render_html(&table, PORTAL);
        assert!(html.contains("Tour &lt;x&gt; &amp; friends"));
        assert!(!html.contains("<x>"));
    }

    #[test]
    fn the_one_where_the_sentinel_becomes_words_with_a_link() {
        let table = ReportTable::new(march(), vec![record("baby", too_young("baby"))]);
        let text = render_text(&table, PORTAL);
        assert!(text.contains("Too new for a full month of data"));
        assert!(text.contains("https://wake.maps.arcgis.com/home/item.html?id=baby"));
    }

    #[test]
    fn the_one_where_the_caveat_only_shows_up_when_invited() {
        let table = ReportTable::new(
            march(),
            vec![record("a", MonthlyViews::Computed(7)), record("b", too_young("b"))],
        );
        let with = report_message(&table, true, &recipients(), PORTAL);
        let without = report_message(&table, false, &recipients(), PORTAL);

        assert!(with.body.contains(&escape_html(CAVEAT)));
        assert!(!without.body.contains(&escape_html(CAVEAT)));
        assert_eq!(with.subject, "Story Map Usage Report for March 2026");
        assert_eq!(with.audience, Audience::Full);
        assert_eq!(with.recipients, vec!["everyone@example.org".to_string()]);
        assert_eq!(with.content_type, ContentType::Html);
    }

    #[test]
    fn the_one_where_bad_news_goes_to_the_admins() {
        let message = failure_message(
            march(),
            &["outer".to_string(), "inner".to_string()],
            &recipients(),
        );
        assert_eq!(message.audience, Audience::Troubleshooting);
        assert_eq!(message.recipients, vec!["gis-admin@example.org".to_string()]);
        assert!(message.subject.starts_with("FAILED"));
        assert!(message.subject.contains("March 2026"));
        assert!(message.body.contains("  - outer\n  - inner\n"));
    }
}
