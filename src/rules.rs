use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Shipped copy of `configs/validation_rules.json`; used whenever the file on disk is unusable.
const BUILTIN_RULES_JSON: &str = include_str!("../configs/validation_rules.json");

static BUILTIN: LazyLock<RuleSet> =
    LazyLock::new(|| RuleSet::from_json(BUILTIN_RULES_JSON).expect("built-in rule set is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field {field:?}: bad regex: {source}")]
    Pattern {
        field: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Deserialize)]
struct RuleFile {
    fields: BTreeMap<String, RuleSpec>,
}

#[derive(Deserialize)]
struct RuleSpec {
    #[serde(rename = "type")]
    field_type: Option<FieldType>,
    regex: Option<String>,
    max_length: Option<usize>,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub field_type: Option<FieldType>,
    /// Anchored at both ends: a value must match in full.
    pub pattern: Option<Regex>,
    pub max_length: Option<usize>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    File(PathBuf),
    Builtin,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    fields: BTreeMap<String, Rule>,
    source: RuleSource,
}

impl RuleSet {
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        let file: RuleFile = serde_json::from_str(text)?;
        let mut fields = BTreeMap::new();

        for (name, spec) in file.fields {
            let pattern = match spec.regex {
                Some(p) => Some(Regex::new(&format!("^(?:{})$", p)).map_err(|source| {
                    RuleError::Pattern {
                        field: name.clone(),
                        source,
                    }
                })?),
                None => None,
            };
            fields.insert(
                name,
                Rule {
                    field_type: spec.field_type,
                    pattern,
                    max_length: spec.max_length,
                    required: spec.required,
                },
            );
        }

        Ok(RuleSet {
            fields,
            source: RuleSource::Builtin,
        })
    }

    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&Rule> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }
}

/// Load field rules from `path`, or the built-in set when there is no path or the
/// file cannot be used. Never fails.
pub fn load_rules(path: Option<&Path>) -> RuleSet {
    let Some(path) = path else {
        info!("No rule file configured, using built-in rules");
        return RuleSet::builtin();
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Rule file not found, using built-in rules");
            return RuleSet::builtin();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read rule file, using built-in rules");
            return RuleSet::builtin();
        }
    };

    match RuleSet::from_json(&text) {
        Ok(mut rules) => {
            rules.source = RuleSource::File(path.to_path_buf());
            info!(path = %path.display(), fields = rules.len(), "Loaded validation rules");
            rules
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed rule file, using built-in rules");
            RuleSet::builtin()
        }
    }
}
