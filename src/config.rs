use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::clean::CleanColumns;
use crate::error::HarvestError;
use crate::sparql::WIKIDATA_ENDPOINT;

pub const DEFAULT_CONFIG_FILE: &str = "np-harvest.json";
pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub genera_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub query_template: Option<Utf8PathBuf>,
    #[serde(default)]
    pub output_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub log_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub failure_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub genus_column: Option<String>,
    #[serde(default)]
    pub clean_columns: Option<CleanColumnsEntry>,
    #[serde(default)]
    pub scaffolds: Vec<ScaffoldEntry>,
    #[serde(default)]
    pub scaffold_output_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CleanColumnsEntry {
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub structure: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScaffoldEntry {
    Shorthand(Utf8PathBuf),
    Detailed(ScaffoldEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ScaffoldEntryObject {
    pub name: String,
    pub query: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldQuery {
    pub name: String,
    pub query_path: Utf8PathBuf,
}

/// Run configuration, built once per process and passed by reference.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub schema_version: u32,
    pub endpoint: String,
    pub genera_file: Utf8PathBuf,
    pub query_template: Utf8PathBuf,
    pub output_file: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
    pub failure_dir: Utf8PathBuf,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub genus_column: String,
    pub clean_columns: CleanColumns,
    pub scaffolds: Vec<ScaffoldQuery>,
    pub scaffold_output_dir: Utf8PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let log_dir = Utf8PathBuf::from("logs");
        Self {
            schema_version: 1,
            endpoint: WIKIDATA_ENDPOINT.to_string(),
            genera_file: Utf8PathBuf::from("data/genera.txt"),
            query_template: Utf8PathBuf::from("queries/nps_in_genera.rq"),
            output_file: Utf8PathBuf::from("data/wikidata/nps_in_genera.csv"),
            failure_dir: log_dir.clone(),
            log_dir,
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(120),
            genus_column: "genus_name".to_string(),
            clean_columns: CleanColumns::default(),
            scaffolds: Vec::new(),
            scaffold_output_dir: Utf8PathBuf::from("data/wikidata"),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub genera_file: Option<Utf8PathBuf>,
    pub query_template: Option<Utf8PathBuf>,
    pub output_file: Option<Utf8PathBuf>,
    pub log_dir: Option<Utf8PathBuf>,
    pub concurrency: Option<usize>,
    pub max_attempts: Option<u32>,
}

impl HarvestConfig {
    pub fn apply(mut self, overrides: ConfigOverrides) -> Result<Self, HarvestError> {
        if let Some(path) = overrides.genera_file {
            self.genera_file = path;
        }
        if let Some(path) = overrides.query_template {
            self.query_template = path;
        }
        if let Some(path) = overrides.output_file {
            self.output_file = path;
        }
        if let Some(path) = overrides.log_dir {
            self.log_dir = path;
        }
        if let Some(value) = overrides.concurrency {
            self.concurrency = value;
        }
        if let Some(value) = overrides.max_attempts {
            self.max_attempts = value;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), HarvestError> {
        if self.concurrency == 0 {
            return Err(HarvestError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.genus_column.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "genus_column must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config at `path`, or `np-harvest.json` in the current
    /// directory. Without an explicit path a missing default file yields the
    /// built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<HarvestConfig, HarvestError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        Self::resolve_config(Self::read(&config_path)?)
    }

    pub fn read(path: &Utf8Path) -> Result<Config, HarvestError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| HarvestError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| HarvestError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<HarvestConfig, HarvestError> {
        let defaults = HarvestConfig::default();
        let log_dir = config.log_dir.unwrap_or(defaults.log_dir);
        let failure_dir = config.failure_dir.unwrap_or_else(|| log_dir.clone());

        let clean_columns = match config.clean_columns {
            Some(entry) => {
                let base = CleanColumns::default();
                CleanColumns {
                    genus: entry.genus.unwrap_or(base.genus),
                    structure: entry.structure.unwrap_or(base.structure),
                    reference: entry.reference.unwrap_or(base.reference),
                }
            }
            None => CleanColumns::default(),
        };

        let scaffolds = config
            .scaffolds
            .into_iter()
            .map(|entry| match entry {
                ScaffoldEntry::Shorthand(path) => {
                    let name = path
                        .file_stem()
                        .filter(|stem| !stem.is_empty())
                        .ok_or_else(|| {
                            HarvestError::InvalidConfig(format!(
                                "cannot derive scaffold name from {path}"
                            ))
                        })?
                        .to_string();
                    Ok(ScaffoldQuery {
                        name,
                        query_path: path,
                    })
                }
                ScaffoldEntry::Detailed(obj) => Ok(ScaffoldQuery {
                    name: obj.name,
                    query_path: obj.query,
                }),
            })
            .collect::<Result<Vec<_>, HarvestError>>()?;

        let resolved = HarvestConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            endpoint: config.endpoint.unwrap_or(defaults.endpoint),
            genera_file: config.genera_file.unwrap_or(defaults.genera_file),
            query_template: config.query_template.unwrap_or(defaults.query_template),
            output_file: config.output_file.unwrap_or(defaults.output_file),
            log_dir,
            failure_dir,
            concurrency: config.concurrency.unwrap_or(defaults.concurrency),
            max_attempts: config.max_attempts.unwrap_or(defaults.max_attempts),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            genus_column: config.genus_column.unwrap_or(defaults.genus_column),
            clean_columns,
            scaffolds,
            scaffold_output_dir: config
                .scaffold_output_dir
                .unwrap_or(defaults.scaffold_output_dir),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}
