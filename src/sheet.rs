//! Tabular parsing of uploads into a header row plus data rows.
//!
//! Delimited text goes through the `csv` crate; legacy and modern
//! spreadsheet binaries go through `calamine`, first sheet only. Both paths
//! produce the same [`ParsedSheet`] shape:
//!
//! - row 0 becomes the header,
//! - every data row is padded or truncated to the header width,
//! - rows whose cells are all empty are dropped.
//!
//! A file without surviving data rows parses to `Ok(None)` rather than an
//! error so callers can disable submission without reporting a failure.

use std::{borrow::Cow, fmt, io::Cursor};

use calamine::{Data, DataType, Range, Reader, Xls, Xlsx};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

use crate::{
    data::{format_datetime, format_number},
    error::ParseError,
    io_utils,
};

pub const CSV_MIME: &str = "text/csv";
pub const XLS_MIME: &str = "application/vnd.ms-excel";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    LegacySpreadsheet,
    ModernSpreadsheet,
}

impl SourceFormat {
    /// Resolves a declared MIME type, ignoring case and parameters.
    pub fn from_mime(mime: &str) -> Result<Self, ParseError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            CSV_MIME => Ok(Self::DelimitedText),
            XLS_MIME => Ok(Self::LegacySpreadsheet),
            XLSX_MIME => Ok(Self::ModernSpreadsheet),
            _ => Err(ParseError::UnsupportedFormat {
                mime: mime.to_string(),
            }),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::DelimitedText),
            "xls" => Some(Self::LegacySpreadsheet),
            "xlsx" => Some(Self::ModernSpreadsheet),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::DelimitedText => CSV_MIME,
            Self::LegacySpreadsheet => XLS_MIME,
            Self::ModernSpreadsheet => XLSX_MIME,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DelimitedText => "csv",
            Self::LegacySpreadsheet => "xls",
            Self::ModernSpreadsheet => "xlsx",
        };
        f.write_str(label)
    }
}

/// Untyped scalar as decoded from the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            RawCell::Empty => Cow::Borrowed(""),
            RawCell::Text(text) => Cow::Borrowed(text.as_str()),
            RawCell::Number(number) => Cow::Owned(format_number(*number)),
            RawCell::Bool(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(value.to_string())
        }
    }
}

impl fmt::Display for RawCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl ParsedSheet {
    /// Splits a decoded matrix into header and rows, enforcing the width
    /// invariant and dropping empty rows. Returns `None` when no data row
    /// survives.
    pub fn from_matrix(matrix: Vec<Vec<RawCell>>) -> Option<Self> {
        let mut records = matrix.into_iter();
        let header = records
            .next()?
            .iter()
            .map(|cell| cell.as_text().into_owned())
            .collect::<Vec<_>>();
        let width = header.len();
        let mut truncated = 0usize;
        let rows = records
            .map(|mut row| {
                if row.len() > width {
                    truncated += 1;
                    row.truncate(width);
                }
                row.resize(width, RawCell::Empty);
                row
            })
            .filter(|row| !row.iter().all(RawCell::is_empty))
            .collect::<Vec<_>>();
        if truncated > 0 {
            warn!("Truncated {truncated} row(s) wider than the {width}-column header");
        }
        if rows.is_empty() {
            return None;
        }
        Some(Self { header, rows })
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Non-empty values of one column, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &RawCell> + '_ {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index))
            .filter(|cell| !cell.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
        }
    }
}

/// Parses an upload according to its declared MIME type.
pub fn parse(
    bytes: &[u8],
    declared_mime: &str,
    options: &ParseOptions,
) -> Result<Option<ParsedSheet>, ParseError> {
    let format = SourceFormat::from_mime(declared_mime)?;
    let matrix = match format {
        SourceFormat::DelimitedText => read_delimited(bytes, options)?,
        SourceFormat::LegacySpreadsheet => {
            let first = Xls::new(Cursor::new(bytes))
                .map_err(|err| undecodable(format, err))?
                .worksheet_range_at(0);
            sheet_matrix(first, format)?
        }
        SourceFormat::ModernSpreadsheet => {
            let first = Xlsx::new(Cursor::new(bytes))
                .map_err(|err| undecodable(format, err))?
                .worksheet_range_at(0);
            sheet_matrix(first, format)?
        }
    };
    let total = matrix.len();
    let sheet = ParsedSheet::from_matrix(matrix);
    match &sheet {
        Some(parsed) => debug!(
            "Parsed {format} upload: {} column(s), {} data row(s) from {total} record(s)",
            parsed.width(),
            parsed.rows.len()
        ),
        None => debug!("Parsed {format} upload with no data rows ({total} record(s))"),
    }
    Ok(sheet)
}

fn read_delimited(bytes: &[u8], options: &ParseOptions) -> Result<Vec<Vec<RawCell>>, ParseError> {
    let text = io_utils::decode_text(bytes, options.encoding)?;
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), options.delimiter);
    let mut matrix = Vec::new();
    for record in reader.records() {
        let record = record?;
        matrix.push(record.iter().map(RawCell::from).collect());
    }
    Ok(matrix)
}

/// Decodes the first sheet's used range; a workbook without sheets is empty.
fn sheet_matrix<E>(
    first: Option<Result<Range<Data>, E>>,
    format: SourceFormat,
) -> Result<Vec<Vec<RawCell>>, ParseError>
where
    E: fmt::Display,
{
    let range = match first {
        Some(Ok(range)) => range,
        Some(Err(err)) => return Err(undecodable(format, err)),
        None => Range::empty(),
    };
    Ok(range
        .rows()
        .map(|row| row.iter().map(raw_cell).collect())
        .collect())
}

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(text) => RawCell::from(text.as_str()),
        Data::Int(value) => RawCell::Number(*value as f64),
        Data::Float(value) => RawCell::Number(*value),
        Data::Bool(value) => RawCell::Bool(*value),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(value) => RawCell::Text(format_datetime(value)),
            None => RawCell::Text(cell.to_string()),
        },
        Data::DateTimeIso(text) | Data::DurationIso(text) => RawCell::Text(text.clone()),
        other => RawCell::Text(other.to_string()),
    }
}

fn undecodable(format: SourceFormat, err: impl fmt::Display) -> ParseError {
    ParseError::Undecodable {
        format,
        message: err.to_string(),
    }
}
