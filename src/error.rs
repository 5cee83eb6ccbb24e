use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid table name {0:?}: expected letters, digits and underscores")]
    TableName(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("all {0} listing pages failed to load")]
    AllPagesFailed(u32),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open database {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create database directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record {index} has no usable value for column {field:?}")]
    MissingField { index: usize, field: &'static str },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Failure of a whole pipeline run. A skip is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("write failed: {0}")]
    Store(#[from] StoreError),
}
