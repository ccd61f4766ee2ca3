//! Additional uploads made from the dashboard after onboarding.
//!
//! A new file must have a fresh base name, must share its columns with one of
//! the user's existing tables, and must not repeat any stored row of those
//! tables.

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    cli::UploadArgs,
    config::AppConfig,
    error::UploadError,
    naming::{derive_table_name, display_name, sanitize_identifier},
    payload::build_payload,
    reconcile::{matching_tables, rows_overlap},
    sheet::ParseOptions,
    store::{TableCreator, TableReader, TableSnapshot},
    upload::{StagedUpload, UploadedFile, stage_file},
};

/// Snapshot of the user's tables taken when the upload dialog opens.
#[derive(Debug, Clone)]
pub struct UploadContext {
    user: String,
    tables: Vec<TableSnapshot>,
    sanitize: bool,
}

impl UploadContext {
    pub fn new(user: impl Into<String>, tables: Vec<TableSnapshot>) -> Self {
        Self {
            user: user.into(),
            tables,
            sanitize: true,
        }
    }

    /// Whether derived table names are mapped onto `[A-Za-z0-9_]`.
    pub fn sanitize_identifiers(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub async fn load(reader: &dyn TableReader, user: &str) -> Result<Self, UploadError> {
        let names = reader.list_tables(user).await?;
        let tables = if names.is_empty() {
            Vec::new()
        } else {
            reader.read_tables(&names).await?
        };
        debug!("Upload context for '{user}' holds {} table(s)", tables.len());
        Ok(Self::new(user, tables))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn tables(&self) -> &[TableSnapshot] {
        &self.tables
    }

    /// Rejects a file whose table name would repeat an existing table's name.
    /// Table names are compared ignoring ASCII case, as SQLite does.
    pub fn check_file_name(&self, file_name: &str) -> Result<(), UploadError> {
        let candidate = self.table_name(file_name);
        let taken = self
            .tables
            .iter()
            .any(|table| table.name.eq_ignore_ascii_case(&candidate));
        if taken {
            return Err(UploadError::NameTaken {
                name: display_name(&candidate, &self.user).to_string(),
            });
        }
        Ok(())
    }

    pub fn stage(
        &self,
        file: &UploadedFile,
        options: &ParseOptions,
    ) -> Result<StagedUpload, UploadError> {
        self.check_file_name(&file.file_name)?;
        let staged = stage_file(file, options)?.ok_or(UploadError::NoDataRows)?;
        if self.tables.is_empty() {
            return Ok(staged);
        }
        let matching = matching_tables(&staged.sheet.header, &self.tables).collect::<Vec<_>>();
        if matching.is_empty() {
            return Err(UploadError::HeaderMismatch);
        }
        if matching
            .iter()
            .any(|table| rows_overlap(&staged.sheet, table))
        {
            return Err(UploadError::DataOverlap);
        }
        Ok(staged)
    }

    pub fn table_name(&self, file_name: &str) -> String {
        let name = derive_table_name(&self.user, file_name, None);
        if self.sanitize {
            sanitize_identifier(&name)
        } else {
            name
        }
    }

    /// Sends the staged upload and returns the created table's name.
    pub async fn submit(
        &self,
        creator: &dyn TableCreator,
        staged: &StagedUpload,
    ) -> Result<String, UploadError> {
        let name = self.table_name(&staged.file_name);
        let payload = build_payload(&name, &staged.sheet, &staged.plan)?;
        creator.create_table(&payload).await?;
        info!(
            "Uploaded '{}' as '{name}' ({} row(s))",
            staged.file_name,
            payload.rows.len()
        );
        Ok(name)
    }
}

pub async fn execute(args: &UploadArgs, config: &AppConfig) -> Result<()> {
    let store = config.open_store()?;
    let options =
        config.parse_options_with(args.read.delimiter, args.read.input_encoding.as_deref())?;
    let user = args.user.trim().to_lowercase();
    let file = UploadedFile::from_path(&args.file)?;
    let context = UploadContext::load(&store, &user)
        .await
        .with_context(|| format!("Loading existing tables for '{user}'"))?
        .sanitize_identifiers(config.sanitize_identifiers);
    let mut staged = context
        .stage(&file, &options)
        .with_context(|| format!("Checking upload {:?}", args.file))?;
    staged.apply_overrides(&args.columns.overrides())?;
    let name = context
        .submit(&store, &staged)
        .await
        .with_context(|| format!("Uploading {:?}", args.file))?;
    println!("Created table '{name}'");
    Ok(())
}
