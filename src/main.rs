mod db;
mod error;
mod extract;
mod pipeline;
mod rules;
mod settings;
mod validate;
mod writer;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use db::Store;
use extract::fetch::HttpPageSource;
use extract::{ExtractOutcome, Extractor, DEFAULT_PAGES};
use pipeline::{ContentCheck, RunOutcome, RunParams, SKIP_EXIT_CODE};
use settings::Settings;
use validate::Record;
use writer::Writer;

#[derive(Parser)]
#[command(name = "ani_regulations", about = "ANI regulations scraper: extract, validate, write")]
struct Cli {
    /// Settings file (default: ani_pipeline.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Validation rule file, overrides the configured path
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the regulations tables
    Init,
    /// Scrape listing pages into a JSON array of records
    Extract {
        /// Listing pages to scrape, newest first
        #[arg(short = 'n', long = "pages", default_value_t = DEFAULT_PAGES)]
        pages: u32,
        /// Scrape even when nothing new is listed
        #[arg(long)]
        force: bool,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate extracted records against the field rules
    Validate {
        #[arg(short, long)]
        input: PathBuf,
        /// Accepted records (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Insert validated records, skipping ones already stored
    Write {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Extract + validate + write in one go
    Run {
        #[arg(short = 'n', long = "pages", default_value_t = DEFAULT_PAGES)]
        pages: u32,
        #[arg(long)]
        force: bool,
    },
    /// Row counts in the store
    Stats,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(rules) = cli.rules {
        settings.rules_path = rules;
    }

    let code = match cli.command {
        Commands::Init => {
            let store = Store::open(&settings.store_config())?;
            store.init_schema()?;
            println!("Schema ready in {}", settings.db_path.display());
            ExitCode::SUCCESS
        }
        Commands::Extract {
            pages,
            force,
            output,
        } => {
            let extractor = http_extractor(&settings)?;
            let store = Store::open(&settings.store_config())?;
            store.init_schema()?;
            let outcome = extractor.extract(pages, force, &store)?;
            drop(store);

            match outcome {
                ExtractOutcome::Skip => skipped(
                    "no new content in the first listing pages",
                    Some(ContentCheck::NoNewContent),
                )?,
                ExtractOutcome::Proceed(records) => {
                    info!(records = records.len(), "Extracted records");
                    write_json(output.as_deref(), &records)?;
                    ExitCode::SUCCESS
                }
            }
        }
        Commands::Validate { input, output } => {
            let records = read_records(&input)?;
            if records.is_empty() {
                skipped("no records to validate", None)?
            } else {
                let rules = rules::load_rules(Some(&settings.rules_path));
                let validation =
                    validate::validate(records, &rules, settings.invalid_cell_policy);
                let stats = serde_json::to_string(&validation.stats)?;
                info!(stats = %stats, "Validation stats");
                if validation.accepted.is_empty() {
                    skipped("every record was discarded by validation", None)?
                } else {
                    write_json(output.as_deref(), &validation.accepted)?;
                    ExitCode::SUCCESS
                }
            }
        }
        Commands::Write { input } => {
            let records = read_records(&input)?;
            if records.is_empty() {
                skipped("no validated records to write", None)?
            } else {
                let report = Writer::new(settings.store_config()).write(&records)?;
                write_json(None, &report)?;
                ExitCode::SUCCESS
            }
        }
        Commands::Run { pages, force } => {
            let extractor = http_extractor(&settings)?;
            let rules = rules::load_rules(Some(&settings.rules_path));
            let store = Store::open(&settings.store_config())?;
            store.init_schema()?;

            let outcome = pipeline::run(
                &extractor,
                &rules,
                settings.invalid_cell_policy,
                &store,
                RunParams {
                    num_pages: pages,
                    force,
                },
            )?;
            write_json(None, &outcome)?;
            match outcome {
                RunOutcome::Skipped { .. } => ExitCode::from(SKIP_EXIT_CODE),
                RunOutcome::Completed(_) => ExitCode::SUCCESS,
            }
        }
        Commands::Stats => {
            let store = Store::open(&settings.store_config())?;
            store.init_schema()?;
            write_json(None, &store.stats()?)?;
            ExitCode::SUCCESS
        }
    };

    info!(elapsed = %format_duration(t0.elapsed()), "Done");
    Ok(code)
}

fn http_extractor(settings: &Settings) -> anyhow::Result<Extractor<HttpPageSource>> {
    let source = HttpPageSource::new(settings.listing_url.clone(), settings.request_timeout())?;
    Ok(Extractor::new(
        source,
        settings.entity.clone(),
        settings.site_root.clone(),
    ))
}

/// Print the skip report and hand the scheduler its skip exit code.
fn skipped(message: &str, content_check: Option<ContentCheck>) -> anyhow::Result<ExitCode> {
    info!(reason = message, "Skipping");
    write_json(
        None,
        &RunOutcome::Skipped {
            content_check,
            message: message.to_string(),
        },
    )?;
    Ok(ExitCode::from(SKIP_EXIT_CODE))
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{:?} is not a JSON array of records", path))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let mut out: Box<dyn Write> = match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Failed to create {:?}", p))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
