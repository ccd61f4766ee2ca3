//! Duplicate detection between a fresh upload and previously captured data.
//!
//! Within an onboarding session the check is exact: the header sequences are
//! compared, then the row sequences, and either match flags a duplicate.
//! Order and case matter. Dashboard uploads use the looser helpers at the
//! bottom of this module, which compare against stored tables.

use std::fmt;

use log::debug;
use serde_json::Value;

use crate::{
    data::{parse_boolean, parse_number},
    sheet::{ParsedSheet, RawCell},
    store::TableSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Header,
    Rows,
    Both,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DuplicateKind::Header => {
                "the file has the same columns as the first upload; choose a different file"
            }
            DuplicateKind::Rows => {
                "the file has the same rows as the first upload; choose a different file"
            }
            DuplicateKind::Both => "the file duplicates the first upload; choose a different file",
        };
        f.write_str(message)
    }
}

/// Classifies how a candidate duplicates a prior capture, if at all.
pub fn reconcile(
    candidate_header: &[String],
    candidate_rows: &[Vec<RawCell>],
    prior_header: &[String],
    prior_rows: &[Vec<RawCell>],
) -> Option<DuplicateKind> {
    let header_match = candidate_header == prior_header;
    let rows_match = candidate_rows == prior_rows;
    let verdict = match (header_match, rows_match) {
        (true, true) => Some(DuplicateKind::Both),
        (true, false) => Some(DuplicateKind::Header),
        (false, true) => Some(DuplicateKind::Rows),
        (false, false) => None,
    };
    debug!("Reconciliation verdict: header_match={header_match} rows_match={rows_match}");
    verdict
}

pub fn is_duplicate_of(
    candidate_header: &[String],
    candidate_rows: &[Vec<RawCell>],
    prior_header: &[String],
    prior_rows: &[Vec<RawCell>],
) -> bool {
    reconcile(candidate_header, candidate_rows, prior_header, prior_rows).is_some()
}

pub fn reconcile_sheets(candidate: &ParsedSheet, prior: &ParsedSheet) -> Option<DuplicateKind> {
    reconcile(&candidate.header, &candidate.rows, &prior.header, &prior.rows)
}

fn normalized_header<S: AsRef<str>>(header: &[S]) -> Vec<String> {
    let mut normalized = header
        .iter()
        .map(|name| name.as_ref().trim().to_lowercase())
        .collect::<Vec<_>>();
    normalized.sort();
    normalized
}

/// True when two headers hold the same names, ignoring order, case, and
/// surrounding whitespace.
pub fn headers_equivalent<A: AsRef<str>, B: AsRef<str>>(left: &[A], right: &[B]) -> bool {
    normalized_header(left) == normalized_header(right)
}

/// Existing tables whose columns are equivalent to `header`.
pub fn matching_tables<'a>(
    header: &[String],
    tables: &'a [TableSnapshot],
) -> impl Iterator<Item = &'a TableSnapshot> + 'a {
    let wanted = normalized_header(header);
    tables
        .iter()
        .filter(move |table| normalized_header(&table.columns) == wanted)
}

/// Compares an uploaded cell with a stored value on the stored value's own
/// terms: booleans by truth value, numbers numerically, text verbatim.
fn cell_matches(cell: &RawCell, stored: &Value) -> bool {
    match (cell, stored) {
        (cell, Value::Null) => cell.is_empty(),
        (RawCell::Bool(flag), Value::Bool(stored)) => flag == stored,
        (RawCell::Text(text), Value::Bool(stored)) => parse_boolean(text) == Some(*stored),
        (RawCell::Number(number), Value::Number(stored)) => stored.as_f64() == Some(*number),
        (RawCell::Text(text), Value::Number(stored)) => {
            parse_number(text).is_some_and(|number| stored.as_f64() == Some(number))
        }
        (cell, Value::String(text)) => cell.as_text() == text.as_str(),
        (cell, other) => cell.as_text() == other.to_string(),
    }
}

/// True when any candidate row equals a stored row of `table`, comparing
/// values column by column by name.
pub fn rows_overlap(sheet: &ParsedSheet, table: &TableSnapshot) -> bool {
    let lookup = sheet
        .header
        .iter()
        .map(|name| {
            let wanted = name.trim().to_lowercase();
            table
                .columns
                .iter()
                .find(|column| column.trim().to_lowercase() == wanted)
        })
        .collect::<Option<Vec<_>>>();
    let Some(columns) = lookup else {
        return false;
    };
    table.rows.iter().any(|stored| {
        sheet.rows.iter().any(|row| {
            row.iter().zip(&columns).all(|(cell, column)| {
                stored
                    .get(column.as_str())
                    .is_some_and(|value| cell_matches(cell, value))
            })
        })
    })
}
