//! I/O helpers for reading uploads: encoding resolution, text decoding,
//! CSV reader construction, and extension-based MIME detection.
//!
//! Uploads are always read to completion before parsing starts; nothing in
//! this crate streams partial files.

use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::{error::ParseError, sheet::SourceFormat};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const FALLBACK_MIME: &str = "application/octet-stream";

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Decodes a whole upload. A byte-order mark overrides `encoding`.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> Result<String, ParseError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(ParseError::Encoding {
            encoding: used.name(),
        })
    } else {
        Ok(text.into_owned())
    }
}

/// Header-less, flexible reader: row 0 is returned like any other record so
/// the caller decides how to split header from data.
pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn mime_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(SourceFormat::from_extension)
        .map(|format| format.mime())
        .unwrap_or(FALLBACK_MIME)
}

pub fn read_file_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Reading upload {path:?}"))
}

pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Upload path {path:?} has no usable file name"))
}
