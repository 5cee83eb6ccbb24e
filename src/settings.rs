use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use config::{Config, Environment, File};
use regex::Regex;
use serde::Deserialize;

use crate::db::StoreConfig;
use crate::error::ConfigError;
use crate::validate::InvalidCellPolicy;

/// Looked up next to the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ani_pipeline.toml";
pub const ENV_PREFIX: &str = "ANI";

pub const LISTING_URL: &str = "https://www.ani.gov.co/informacion-de-la-ani/normatividad?\
field_tipos_de_normas__tid=12&title=&body_value=&field_fecha__value%5Bvalue%5D%5Byear%5D=";
pub const SITE_ROOT: &str = "https://www.ani.gov.co";
pub const ENTITY: &str = "Agencia Nacional de Infraestructura";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Everything the pipeline reads from its environment, resolved once in `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub regulations_table: String,
    pub regulations_component_table: String,
    pub component_id: i64,
    pub rules_path: PathBuf,
    pub listing_url: String,
    pub site_root: String,
    pub entity: String,
    pub request_timeout_secs: u64,
    pub invalid_cell_policy: InvalidCellPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/ani.sqlite"),
            regulations_table: "regulations".into(),
            regulations_component_table: "regulations_component".into(),
            component_id: 7,
            rules_path: PathBuf::from("configs/validation_rules.json"),
            listing_url: LISTING_URL.into(),
            site_root: SITE_ROOT.into(),
            entity: ENTITY.into(),
            request_timeout_secs: 15,
            invalid_cell_policy: InvalidCellPolicy::default(),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (optional unless named explicitly), then `ANI_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.check_tables()?;
        Ok(settings)
    }

    fn check_tables(&self) -> Result<(), ConfigError> {
        for name in [&self.regulations_table, &self.regulations_component_table] {
            if !IDENTIFIER_RE.is_match(name) {
                return Err(ConfigError::TableName(name.clone()));
            }
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            db_path: self.db_path.clone(),
            regulations_table: self.regulations_table.clone(),
            component_table: self.regulations_component_table.clone(),
            component_id: self.component_id,
            entity: self.entity.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
