use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::infer::{ColumnOverride, StorageType};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Onboard spreadsheet uploads into typed tables",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database file (overrides the configuration)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    /// Rows per page in table views (overrides the configuration)
    #[arg(long = "page-size", global = true)]
    pub page_size: Option<usize>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a CSV/XLS/XLSX file and show the inferred column types
    Infer(InferArgs),
    /// Run the onboarding flow: profile, first upload, second upload
    Onboard(OnboardArgs),
    /// Show a user's profile and uploaded tables
    Dashboard(DashboardArgs),
    /// Show one page of an uploaded table
    View(ViewArgs),
    /// Upload an additional file from the dashboard
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
pub struct InferArgs {
    /// File to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Emit the column plan as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub read: ReadArgs,
}

// Delimited-text reading options shared by commands that parse uploads.
#[derive(Debug, Args, Clone, Default)]
pub struct ReadArgs {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

// Column adjustments applied after inference.
#[derive(Debug, Args, Clone, Default)]
pub struct ColumnArgs {
    /// Leave this column out of the created table
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,
    /// Force a storage type, written `column=TYPE`
    #[arg(long = "type", value_parser = parse_column_type, action = clap::ArgAction::Append)]
    pub types: Vec<(String, StorageType)>,
}

impl ColumnArgs {
    pub fn overrides(&self) -> Vec<ColumnOverride> {
        self.exclude
            .iter()
            .map(|name| ColumnOverride::Exclude(name.clone()))
            .chain(
                self.types
                    .iter()
                    .map(|(name, ty)| ColumnOverride::StorageType(name.clone(), *ty)),
            )
            .collect()
    }
}

#[derive(Debug, Args)]
pub struct OnboardArgs {
    #[arg(long = "first-name")]
    pub first_name: String,
    #[arg(long = "last-name")]
    pub last_name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub phone: String,
    /// File for the first table (the step is skipped when omitted)
    #[arg(long = "first-file")]
    pub first_file: Option<PathBuf>,
    /// File for the second table (the step is skipped when omitted)
    #[arg(long = "second-file")]
    pub second_file: Option<PathBuf>,
    /// Exclude a column of the first file
    #[arg(long = "first-exclude", action = clap::ArgAction::Append)]
    pub first_exclude: Vec<String>,
    /// Storage type override for the first file, written `column=TYPE`
    #[arg(long = "first-type", value_parser = parse_column_type, action = clap::ArgAction::Append)]
    pub first_types: Vec<(String, StorageType)>,
    /// Exclude a column of the second file
    #[arg(long = "second-exclude", action = clap::ArgAction::Append)]
    pub second_exclude: Vec<String>,
    /// Storage type override for the second file, written `column=TYPE`
    #[arg(long = "second-type", value_parser = parse_column_type, action = clap::ArgAction::Append)]
    pub second_types: Vec<(String, StorageType)>,
    #[command(flatten)]
    pub read: ReadArgs,
}

impl OnboardArgs {
    pub fn first_columns(&self) -> ColumnArgs {
        ColumnArgs {
            exclude: self.first_exclude.clone(),
            types: self.first_types.clone(),
        }
    }

    pub fn second_columns(&self) -> ColumnArgs {
        ColumnArgs {
            exclude: self.second_exclude.clone(),
            types: self.second_types.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    /// User identifier (lower-cased first name)
    #[arg(short, long)]
    pub user: String,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[arg(short, long)]
    pub user: String,
    /// Table name, with or without the user prefix
    #[arg(short, long)]
    pub table: String,
    /// 1-based page number (clamped to the last page)
    #[arg(long, default_value_t = 1)]
    pub page: usize,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(short, long)]
    pub user: String,
    /// File to upload
    #[arg(short = 'i', long = "file")]
    pub file: PathBuf,
    #[command(flatten)]
    pub columns: ColumnArgs,
    #[command(flatten)]
    pub read: ReadArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_column_type(value: &str) -> Result<(String, StorageType), String> {
    let (name, ty) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected column=TYPE, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("Column name cannot be empty".to_string());
    }
    let ty = ty.parse::<StorageType>().map_err(|err| err.to_string())?;
    Ok((name.to_string(), ty))
}
