// ⚙️ Import Configuration - JSON config file + column map file

use crate::calculated::CalculatedColumn;
use crate::columns::ColumnSpec;
use crate::error::ImportError;
use crate::import::{Credentials, ImportPlan};
use crate::sync::DEFAULT_BATCH_SIZE;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

fn default_import_csv() -> PathBuf {
    PathBuf::from("import.csv")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Deserialize)]
pub struct ImportConfig {
    /// Base URI of the remote service
    pub uri: String,

    pub key: String,

    pub secret: String,

    /// Prefix for console lines, to tell runs apart in shared output
    #[serde(default)]
    pub identifier: Option<String>,

    /// Column map file, relative to the config file
    pub import_map: PathBuf,

    /// CSV to import, relative to the working directory
    #[serde(default = "default_import_csv")]
    pub import_csv: PathBuf,

    #[serde(default)]
    pub import_csv_header: bool,

    #[serde(default)]
    pub calculated_import_columns: Vec<CalculatedColumn>,

    #[serde(default)]
    pub deactivate_missing_residents: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Static parameters sent with every batch
    #[serde(default)]
    pub import_params: Map<String, JsonValue>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("uri", &self.uri)
            .field("key", &self.key)
            .field("secret", &"***")
            .field("identifier", &self.identifier)
            .field("import_map", &self.import_map)
            .field("import_csv", &self.import_csv)
            .field("import_csv_header", &self.import_csv_header)
            .field("deactivate_missing_residents", &self.deactivate_missing_residents)
            .field("batch_size", &self.batch_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ImportConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self::from_json(&content, base_dir)
    }

    pub fn from_json(content: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: ImportConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.base_dir = base_dir;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ImportError> {
        if self.uri.trim().is_empty() {
            return Err(ImportError::InvalidConfig("'uri' must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ImportError::InvalidConfig(
                "'batch_size' must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn import_map_path(&self) -> PathBuf {
        self.base_dir.join(&self.import_map)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.base_dir.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load the column map file
    pub fn load_columns(&self) -> Result<Vec<ColumnSpec>> {
        let path = self.import_map_path();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read column map: {:?}", path))?;

        serde_json::from_str(&content).context("Failed to parse column map JSON")
    }

    pub fn plan(&self) -> Result<ImportPlan> {
        Ok(ImportPlan {
            credentials: Credentials {
                key: self.key.clone(),
                secret: self.secret.clone(),
            },
            columns: self.load_columns()?,
            calculated: self.calculated_import_columns.clone(),
            batch_size: self.batch_size,
            deactivate_missing: self.deactivate_missing_residents,
            params: self.import_params.clone(),
        })
    }
}
