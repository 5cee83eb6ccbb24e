use serde::Serialize;
use tracing::info;

use crate::db::{Store, WriteReport};
use crate::error::PipelineError;
use crate::extract::fetch::PageSource;
use crate::extract::{ExtractOutcome, Extractor};
use crate::rules::RuleSet;
use crate::validate::{validate, InvalidCellPolicy, ValidationStats};
use crate::writer::write_records;

/// Scheduler exit code meaning "intentionally skipped".
pub const SKIP_EXIT_CODE: u8 = 99;

#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    pub num_pages: u32,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCheck {
    NewContentFound,
    ForcedScrape,
    NoNewContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub content_check: ContentCheck,
    pub pages_processed: String,
    pub records_scraped: usize,
    pub records_validated: usize,
    pub validation: ValidationStats,
    #[serde(flatten)]
    pub write: WriteReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Skipped {
        /// Absent when the skip did not come from the novelty check.
        #[serde(skip_serializing_if = "Option::is_none")]
        content_check: Option<ContentCheck>,
        message: String,
    },
    Completed(RunReport),
}

/// Extract, validate and write in sequence against one open store.
pub fn run<S: PageSource>(
    extractor: &Extractor<S>,
    rules: &RuleSet,
    policy: InvalidCellPolicy,
    store: &Store,
    params: RunParams,
) -> Result<RunOutcome, PipelineError> {
    let num_pages = params.num_pages.max(1);
    info!(
        pages = num_pages,
        force = params.force,
        rules = rules.len(),
        rule_source = ?rules.source(),
        "Starting regulations run"
    );

    let records = match extractor.extract(num_pages, params.force, store)? {
        ExtractOutcome::Skip => {
            return Ok(RunOutcome::Skipped {
                content_check: Some(ContentCheck::NoNewContent),
                message: "no new content in the first listing pages".into(),
            })
        }
        ExtractOutcome::Proceed(records) => records,
    };
    let records_scraped = records.len();

    let validation = validate(records, rules, policy);
    let write = if validation.accepted.is_empty() {
        info!("No valid records, nothing to write");
        WriteReport::default()
    } else {
        write_records(store, &validation.accepted)?
    };

    Ok(RunOutcome::Completed(RunReport {
        content_check: if params.force {
            ContentCheck::ForcedScrape
        } else {
            ContentCheck::NewContentFound
        },
        pages_processed: format!("0-{}", num_pages - 1),
        records_scraped,
        records_validated: validation.accepted.len(),
        validation: validation.stats,
        write,
    }))
}
