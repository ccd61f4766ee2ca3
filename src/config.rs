//! Application settings, read from an optional YAML file and overridden by
//! command-line flags.
//!
//! ```yaml
//! database: onboarding.db
//! page_size: 10
//! sanitize_identifiers: true
//! second_table_suffix: "2"
//! csv_delimiter: ";"
//! input_encoding: windows-1252
//! ```

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    io_utils,
    naming::is_valid_table_name,
    session::{DEFAULT_SECOND_TABLE_SUFFIX, OnboardingOptions},
    sheet::ParseOptions,
    store::SqliteStore,
};

pub const DEFAULT_DATABASE: &str = "sheet-onboard.db";
pub const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: PathBuf,
    pub page_size: usize,
    pub sanitize_identifiers: bool,
    pub second_table_suffix: String,
    pub csv_delimiter: String,
    pub input_encoding: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            page_size: DEFAULT_PAGE_SIZE,
            sanitize_identifiers: true,
            second_table_suffix: DEFAULT_SECOND_TABLE_SUFFIX.to_string(),
            csv_delimiter: ",".to_string(),
            input_encoding: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: AppConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.validate()?;
        debug!("Loaded configuration from {path:?}");
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line overrides and re-validates.
    pub fn with_overrides(
        mut self,
        database: Option<PathBuf>,
        page_size: Option<usize>,
    ) -> Result<Self> {
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(page_size) = page_size {
            self.page_size = page_size;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }
        if !is_valid_table_name(&self.second_table_suffix) {
            bail!(
                "second_table_suffix '{}' must be non-empty and use only letters, digits, or '_'",
                self.second_table_suffix
            );
        }
        parse_delimiter(&self.csv_delimiter)
            .map_err(|err| anyhow::anyhow!("csv_delimiter: {err}"))?;
        io_utils::resolve_encoding(self.input_encoding.as_deref())?;
        Ok(())
    }

    pub fn parse_options(&self) -> Result<ParseOptions> {
        self.parse_options_with(None, None)
    }

    /// Parse options with per-command delimiter and encoding overrides.
    pub fn parse_options_with(
        &self,
        delimiter: Option<u8>,
        encoding: Option<&str>,
    ) -> Result<ParseOptions> {
        let delimiter = match delimiter {
            Some(delimiter) => delimiter,
            None => parse_delimiter(&self.csv_delimiter)
                .map_err(|err| anyhow::anyhow!("csv_delimiter: {err}"))?,
        };
        let encoding = io_utils::resolve_encoding(encoding.or(self.input_encoding.as_deref()))?;
        Ok(ParseOptions {
            delimiter,
            encoding,
        })
    }

    pub fn onboarding_options(&self, parse: ParseOptions) -> OnboardingOptions {
        OnboardingOptions {
            parse,
            sanitize_identifiers: self.sanitize_identifiers,
            second_table_suffix: self.second_table_suffix.clone(),
        }
    }

    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.database)
            .with_context(|| format!("Opening database {:?}", self.database))
    }
}
