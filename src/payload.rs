//! Table-creation payloads: the typed column list plus row values projected
//! onto included columns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    data::parse_number,
    error::PlanError,
    infer::{ColumnPlan, StorageType},
    sheet::{ParsedSheet, RawCell},
};

/// A value ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Converts a raw cell for a column of the given storage type. Numeric
    /// columns coerce to `f64`, anything unparseable becomes null.
    pub fn from_raw(cell: &RawCell, storage_type: StorageType) -> Self {
        if cell.is_empty() {
            return CellValue::Null;
        }
        if storage_type.is_numeric() {
            let number = match cell {
                RawCell::Number(number) => Some(*number),
                RawCell::Text(text) => parse_number(text),
                RawCell::Bool(_) | RawCell::Empty => None,
            };
            return number.map(CellValue::Number).unwrap_or(CellValue::Null);
        }
        CellValue::Text(cell.as_text().into_owned())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub name: String,
    pub storage_type: StorageType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCreationPayload {
    pub table_name: String,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TableCreationPayload {
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

pub fn build_payload(
    table_name: &str,
    sheet: &ParsedSheet,
    plan: &ColumnPlan,
) -> Result<TableCreationPayload, PlanError> {
    if plan.len() != sheet.width() {
        return Err(PlanError::HeaderMismatch {
            plan: plan.len(),
            header: sheet.width(),
        });
    }
    let selected = plan.included().collect::<Vec<_>>();
    if selected.is_empty() {
        return Err(PlanError::NoColumnsSelected);
    }
    let mut seen = HashSet::new();
    for (idx, decision) in &selected {
        if decision.column_name.trim().is_empty() {
            return Err(PlanError::EmptyColumnName { position: idx + 1 });
        }
        if !seen.insert(decision.column_name.as_str()) {
            return Err(PlanError::DuplicateColumn {
                name: decision.column_name.clone(),
            });
        }
    }

    let columns = selected
        .iter()
        .map(|(_, decision)| TableColumn {
            name: decision.column_name.clone(),
            storage_type: decision.storage_type,
        })
        .collect();
    let rows = sheet
        .rows
        .iter()
        .map(|row| {
            selected
                .iter()
                .map(|(idx, decision)| {
                    row.get(*idx)
                        .map(|cell| CellValue::from_raw(cell, decision.storage_type))
                        .unwrap_or(CellValue::Null)
                })
                .collect()
        })
        .collect();

    Ok(TableCreationPayload {
        table_name: table_name.to_string(),
        columns,
        rows,
    })
}
