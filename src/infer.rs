//! Column storage-type inference and the per-column plan users can override.
//!
//! Inference is a strict cascade evaluated over a column's non-empty values:
//! BOOLEAN, NUMERIC, REAL, DATE, TIMESTAMP, then VARCHAR. A type is chosen
//! only when every value satisfies it. Columns without values fall back to
//! VARCHAR.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    data::{is_boolean_token, is_clock_time, is_integer_valued, parse_calendar_date, parse_number},
    error::PlanError,
    sheet::{ParsedSheet, RawCell},
};

pub const VARCHAR_LENGTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Boolean,
    Numeric,
    Real,
    Date,
    Timestamp,
    Varchar,
}

impl StorageType {
    /// SQL token handed to the table-creation collaborator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            StorageType::Boolean => "BOOLEAN",
            StorageType::Numeric => "NUMERIC",
            StorageType::Real => "REAL",
            StorageType::Date => "DATE",
            StorageType::Timestamp => "TIMESTAMP",
            StorageType::Varchar => "VARCHAR(1000)",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, StorageType::Numeric | StorageType::Real)
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "BOOLEAN",
            "NUMERIC",
            "REAL",
            "DATE",
            "TIMESTAMP",
            "VARCHAR(1000)",
        ]
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for StorageType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "boolean" | "bool" => Ok(StorageType::Boolean),
            "numeric" | "int" | "integer" => Ok(StorageType::Numeric),
            "real" | "float" | "double" => Ok(StorageType::Real),
            "date" => Ok(StorageType::Date),
            "timestamp" | "time" => Ok(StorageType::Timestamp),
            "varchar" | "varchar(1000)" | "text" | "string" => Ok(StorageType::Varchar),
            _ => Err(anyhow!(
                "Unknown storage type '{value}'. Supported types: {}",
                StorageType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for StorageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_sql())
    }
}

impl<'de> Deserialize<'de> for StorageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        StorageType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    non_empty: usize,
    possible_boolean: bool,
    possible_integer: bool,
    possible_number: bool,
    possible_date: bool,
    possible_time: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            non_empty: 0,
            possible_boolean: true,
            possible_integer: true,
            possible_number: true,
            possible_date: true,
            possible_time: true,
        }
    }

    fn update(&mut self, cell: &RawCell) {
        if cell.is_empty() {
            return;
        }
        self.non_empty += 1;
        match cell {
            RawCell::Empty => {}
            // Typed spreadsheet cells only satisfy the rules of their own kind.
            RawCell::Bool(_) => {
                self.possible_integer = false;
                self.possible_number = false;
                self.possible_date = false;
                self.possible_time = false;
            }
            RawCell::Number(number) => {
                self.possible_boolean = false;
                self.possible_date = false;
                self.possible_time = false;
                if !is_integer_valued(*number) {
                    self.possible_integer = false;
                }
            }
            RawCell::Text(text) => self.update_text(text),
        }
    }

    fn update_text(&mut self, text: &str) {
        if self.possible_boolean && !is_boolean_token(text) {
            self.possible_boolean = false;
        }
        if self.possible_number {
            match parse_number(text) {
                Some(number) if !is_integer_valued(number) => self.possible_integer = false,
                Some(_) => {}
                None => {
                    self.possible_integer = false;
                    self.possible_number = false;
                }
            }
        }
        if self.possible_date && parse_calendar_date(text).is_none() {
            self.possible_date = false;
        }
        if self.possible_time && !is_clock_time(text) {
            self.possible_time = false;
        }
    }

    fn decide(&self) -> StorageType {
        if self.non_empty == 0 {
            StorageType::Varchar
        } else if self.possible_boolean {
            StorageType::Boolean
        } else if self.possible_integer {
            StorageType::Numeric
        } else if self.possible_number {
            StorageType::Real
        } else if self.possible_date {
            StorageType::Date
        } else if self.possible_time {
            StorageType::Timestamp
        } else {
            StorageType::Varchar
        }
    }
}

/// Decides the storage type for a column's textual values. Empty strings are
/// excluded from the sample.
pub fn infer_type<S: AsRef<str>>(values: &[S]) -> StorageType {
    let mut candidate = TypeCandidate::new();
    for value in values {
        candidate.update(&RawCell::from(value.as_ref()));
    }
    candidate.decide()
}

/// Same cascade over decoded cells, honoring typed spreadsheet scalars.
pub fn infer_cells<'a, I>(cells: I) -> StorageType
where
    I: IntoIterator<Item = &'a RawCell>,
{
    let mut candidate = TypeCandidate::new();
    for cell in cells {
        candidate.update(cell);
    }
    candidate.decide()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnTypeDecision {
    pub column_name: String,
    pub include: bool,
    pub storage_type: StorageType,
}

/// User adjustment to an inferred column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnOverride {
    Include(String),
    Exclude(String),
    StorageType(String, StorageType),
}

impl ColumnOverride {
    pub fn column(&self) -> &str {
        match self {
            ColumnOverride::Include(name)
            | ColumnOverride::Exclude(name)
            | ColumnOverride::StorageType(name, _) => name,
        }
    }
}

/// One decision per header entry, in header order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ColumnPlan {
    decisions: Vec<ColumnTypeDecision>,
}

impl ColumnPlan {
    pub fn infer(sheet: &ParsedSheet) -> Self {
        let decisions = sheet
            .header
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnTypeDecision {
                column_name: name.clone(),
                include: true,
                storage_type: infer_cells(sheet.column_values(idx)),
            })
            .collect();
        Self { decisions }
    }

    pub fn decisions(&self) -> &[ColumnTypeDecision] {
        &self.decisions
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn decision(&self, name: &str) -> Option<&ColumnTypeDecision> {
        self.decisions.iter().find(|d| d.column_name == name)
    }

    /// Included columns with their header positions.
    pub fn included(&self) -> impl Iterator<Item = (usize, &ColumnTypeDecision)> + '_ {
        self.decisions
            .iter()
            .enumerate()
            .filter(|(_, decision)| decision.include)
    }

    /// Applies an override to every column carrying that name.
    pub fn apply(&mut self, adjustment: &ColumnOverride) -> Result<(), PlanError> {
        let name = adjustment.column();
        let mut matched = false;
        for decision in self.decisions.iter_mut().filter(|d| d.column_name == name) {
            matched = true;
            match adjustment {
                ColumnOverride::Include(_) => decision.include = true,
                ColumnOverride::Exclude(_) => decision.include = false,
                ColumnOverride::StorageType(_, storage_type) => {
                    decision.storage_type = *storage_type
                }
            }
        }
        if matched {
            Ok(())
        } else {
            Err(PlanError::UnknownColumn {
                name: name.to_string(),
            })
        }
    }

    pub fn apply_all(&mut self, adjustments: &[ColumnOverride]) -> Result<(), PlanError> {
        adjustments
            .iter()
            .try_for_each(|adjustment| self.apply(adjustment))
    }
}
