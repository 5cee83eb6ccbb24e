pub mod clean;
pub mod fetch;
pub mod listing;

use chrono::{Local, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::parse_created_at;
use crate::error::{ExtractError, StoreError};
use crate::validate::Record;
use clean::rtype_for_title;
use fetch::PageSource;
use listing::{parse_listing, ListingEntry};

pub const CLASSIFICATION_ID: i64 = 13;
/// Pages inspected by the novelty check, at most.
pub const NOVELTY_PAGES: u32 = 3;
pub const DEFAULT_PAGES: u32 = 9;

/// Previously persisted state the novelty check compares against.
pub trait SeenState {
    fn latest_created_at(&self, entity: &str) -> Result<Option<NaiveDateTime>, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Proceed(Vec<Record>),
    /// Nothing newer than what is stored; downstream steps should not run.
    Skip,
}

pub struct Extractor<S> {
    source: S,
    entity: String,
    site_root: String,
}

impl<S: PageSource> Extractor<S> {
    pub fn new(source: S, entity: impl Into<String>, site_root: impl Into<String>) -> Self {
        Self {
            source,
            entity: entity.into(),
            site_root: site_root.into(),
        }
    }

    /// Scrape the newest `num_pages` listing pages. Unless `force` is set, first
    /// check whether the listing has anything newer than `seen`, and skip if not.
    pub fn extract(
        &self,
        num_pages: u32,
        force: bool,
        seen: &dyn SeenState,
    ) -> Result<ExtractOutcome, ExtractError> {
        let num_pages = num_pages.max(1);

        if force {
            info!(pages = num_pages, "Forced scrape, skipping novelty check");
        } else if !self.has_new_content(seen, num_pages.min(NOVELTY_PAGES)) {
            return Ok(ExtractOutcome::Skip);
        }

        self.scrape_pages(num_pages).map(ExtractOutcome::Proceed)
    }

    /// True when any of the first `pages` pages lists a date later than the newest
    /// stored one. Failures lean towards scraping.
    pub fn has_new_content(&self, seen: &dyn SeenState, pages: u32) -> bool {
        let latest = match seen.latest_created_at(&self.entity) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Cannot read latest stored date, assuming new content");
                return true;
            }
        };
        info!(pages, latest = ?latest, "Checking listing for new content");

        let mut loaded = 0;
        for page in 0..pages {
            let html = match self.source.fetch_page(page) {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, error = %e, "Novelty check could not load page");
                    continue;
                }
            };
            loaded += 1;

            for entry in parse_listing(&html, &self.site_root) {
                let Some(listed) = parse_created_at(&entry.created_at) else {
                    continue;
                };
                if latest.map_or(true, |stored| listed > stored) {
                    info!(listed = %listed, stored = ?latest, "New content detected");
                    return true;
                }
            }
        }

        if loaded == 0 {
            warn!(pages, "Novelty check loaded no pages, assuming new content");
            return true;
        }

        info!("No new content detected");
        false
    }

    pub fn scrape_pages(&self, num_pages: u32) -> Result<Vec<Record>, ExtractError> {
        let pb = ProgressBar::new(num_pages as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let update_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut records = Vec::new();
        let mut failed = 0;

        for page in 0..num_pages {
            match self.source.fetch_page(page) {
                Ok(html) => {
                    let entries = parse_listing(&html, &self.site_root);
                    debug!(page, entries = entries.len(), "Parsed listing page");
                    records.extend(entries.into_iter().map(|e| self.to_record(e, &update_at)));
                }
                Err(e) => {
                    failed += 1;
                    warn!(page, error = %e, "Skipping listing page");
                }
            }
            pb.set_message(format!("{} records", records.len()));
            pb.inc(1);
        }
        pb.finish_and_clear();

        if failed == num_pages {
            return Err(ExtractError::AllPagesFailed(num_pages));
        }
        info!(pages = num_pages, failed, records = records.len(), "Scraping finished");
        Ok(records)
    }

    fn to_record(&self, entry: ListingEntry, update_at: &str) -> Record {
        let rtype_id = rtype_for_title(&entry.title);
        let mut r = Record::new();
        r.insert("created_at".into(), Value::from(entry.created_at));
        r.insert("update_at".into(), Value::from(update_at));
        r.insert("is_active".into(), Value::Bool(true));
        r.insert("title".into(), Value::from(entry.title));
        r.insert("gtype".into(), Value::from("link"));
        r.insert("entity".into(), Value::from(self.entity.as_str()));
        r.insert("external_link".into(), Value::from(entry.external_link));
        r.insert("rtype_id".into(), Value::from(rtype_id));
        r.insert(
            "summary".into(),
            entry.summary.map_or(Value::Null, Value::from),
        );
        r.insert("classification_id".into(), Value::from(CLASSIFICATION_ID));
        r
    }
}
