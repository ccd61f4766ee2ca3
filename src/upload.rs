use std::path::Path;

use anyhow::Result;
use itertools::Itertools;
use log::info;

use crate::{
    error::{ParseError, PlanError},
    infer::{ColumnOverride, ColumnPlan},
    io_utils,
    naming::file_base_name,
    sheet::{self, ParseOptions, ParsedSheet},
};

/// A whole upload held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, declaring its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = io_utils::read_file_bytes(path)?;
        let file_name = io_utils::file_name_of(path)?;
        Ok(Self::new(file_name, io_utils::mime_for_path(path), bytes))
    }

    pub fn base_name(&self) -> &str {
        file_base_name(&self.file_name)
    }
}

/// A parsed upload with its editable column plan.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpload {
    pub file_name: String,
    pub sheet: ParsedSheet,
    pub plan: ColumnPlan,
}

impl StagedUpload {
    pub fn apply_overrides(&mut self, overrides: &[ColumnOverride]) -> Result<(), PlanError> {
        self.plan.apply_all(overrides)
    }
}

/// Parses and infers one upload. `Ok(None)` means the file has no data rows.
pub fn stage_file(
    file: &UploadedFile,
    options: &ParseOptions,
) -> Result<Option<StagedUpload>, ParseError> {
    let Some(sheet) = sheet::parse(&file.bytes, &file.mime, options)? else {
        info!("Upload '{}' has no data rows", file.file_name);
        return Ok(None);
    };
    let plan = ColumnPlan::infer(&sheet);
    info!(
        "Staged '{}': {} column(s), {} row(s), types [{}]",
        file.file_name,
        sheet.width(),
        sheet.rows.len(),
        plan.decisions()
            .iter()
            .map(|d| format!("{}: {}", d.column_name, d.storage_type))
            .join(", ")
    );
    Ok(Some(StagedUpload {
        file_name: file.file_name.clone(),
        sheet,
        plan,
    }))
}
