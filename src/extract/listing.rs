use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::clean::{absolute_link, normalize_listing_date, sentence_case, strip_quotes};

pub const MAX_TITLE_CHARS: usize = 65;

static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TITLE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.views-field.views-field-title").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static BODY_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.views-field.views-field-body").unwrap());
static DATE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.views-field.views-field-field-fecha--1").unwrap());
static DATE_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.date-display-single").unwrap());

/// One usable row of the regulations listing table.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub title: String,
    pub external_link: String,
    pub summary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NoTitleCell,
    NoLink,
    TitleTooLong,
    NoDate,
}

/// Parse a listing page. Rows that cannot produce a complete entry are skipped.
pub fn parse_listing(html: &str, site_root: &str) -> Vec<ListingEntry> {
    let doc = Html::parse_document(html);
    let Some(tbody) = doc.select(&TBODY).next() else {
        debug!("No listing table on page");
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (i, row) in tbody.select(&ROW).enumerate() {
        match parse_row(row, site_root) {
            Ok(entry) => entries.push(entry),
            Err(reason) => debug!(row = i + 1, ?reason, "Skipping listing row"),
        }
    }
    entries
}

fn parse_row(row: ElementRef, site_root: &str) -> Result<ListingEntry, SkipReason> {
    let title_cell = row.select(&TITLE_CELL).next().ok_or(SkipReason::NoTitleCell)?;
    let link = title_cell.select(&LINK).next().ok_or(SkipReason::NoLink)?;

    let title = strip_quotes(&stripped_text(link));
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(SkipReason::TitleTooLong);
    }

    let external_link = link
        .value()
        .attr("href")
        .filter(|h| !h.trim().is_empty())
        .map(|h| absolute_link(h.trim(), site_root))
        .ok_or(SkipReason::NoLink)?;

    let summary = row
        .select(&BODY_CELL)
        .next()
        .map(|cell| sentence_case(&strip_quotes(&stripped_text(cell))));

    let created_at = row
        .select(&DATE_CELL)
        .next()
        .map(date_text)
        .filter(|d| !d.trim().is_empty())
        .ok_or(SkipReason::NoDate)?;

    Ok(ListingEntry {
        title,
        external_link,
        summary,
        created_at,
    })
}

fn date_text(cell: ElementRef) -> String {
    match cell.select(&DATE_SPAN).next() {
        Some(span) => {
            let raw = span
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| stripped_text(span));
            normalize_listing_date(&raw)
        }
        None => stripped_text(cell),
    }
}

/// Text nodes trimmed and concatenated.
fn stripped_text(el: ElementRef) -> String {
    el.text().map(str::trim).collect()
}
