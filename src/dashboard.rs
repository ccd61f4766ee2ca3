//! The per-user dashboard: profile, uploaded tables, and paginated table
//! views.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;

use crate::{
    cli::{DashboardArgs, ViewArgs},
    config::AppConfig,
    data::format_number,
    error::StoreError,
    naming::display_name,
    profile::RegistrationRecord,
    store::{TableReader, TableSnapshot, UserRegistry},
    table::{render_pairs, render_table},
};

pub const EMPTY_TABLE_MESSAGE: &str = "No data available in this table.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDashboard {
    pub profile: RegistrationRecord,
    pub tables: Vec<String>,
}

impl UserDashboard {
    pub fn user(&self) -> &str {
        self.profile.user_identifier()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.tables
            .iter()
            .map(|table| display_name(table, self.user()))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut output = render_pairs(&[
            ("First name", self.profile.first_name.clone()),
            ("Last name", self.profile.last_name.clone()),
            ("Email", self.profile.email.clone()),
            ("Phone", self.profile.phone.clone()),
            ("Tables", self.tables.len().to_string()),
        ]);
        if self.tables.is_empty() {
            output.push_str("\nNo tables uploaded yet.\n");
        } else {
            output.push_str("\nUploaded tables:\n");
            for name in self.display_names() {
                let _ = writeln!(output, "  {name}");
            }
        }
        output
    }
}

pub async fn load_dashboard(
    registry: &dyn UserRegistry,
    reader: &dyn TableReader,
    user: &str,
) -> Result<UserDashboard, StoreError> {
    let profile = registry
        .find_user(user)
        .await?
        .ok_or_else(|| StoreError::UserNotFound {
            name: user.to_string(),
        })?;
    let tables = reader.list_tables(user).await?;
    Ok(UserDashboard { profile, tables })
}

/// One page of a stored table, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePage {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 1-based.
    pub page: usize,
    pub page_count: usize,
    pub total_rows: usize,
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => integer.to_string(),
            None => number
                .as_f64()
                .map(format_number)
                .unwrap_or_else(|| number.to_string()),
        },
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl TablePage {
    /// Slices `snapshot` to `page`, clamped into the valid range.
    pub fn from_snapshot(
        snapshot: &TableSnapshot,
        user: &str,
        page: usize,
        page_size: usize,
    ) -> Self {
        let page_size = page_size.max(1);
        let total_rows = snapshot.rows.len();
        let page_count = total_rows.div_ceil(page_size).max(1);
        let page = page.clamp(1, page_count);
        let rows = snapshot
            .rows
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|row| {
                snapshot
                    .columns
                    .iter()
                    .map(|column| row.get(column).map(display_value).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self {
            title: display_name(&snapshot.name, user).to_string(),
            headers: snapshot.columns.iter().map(|c| capitalize(c)).collect(),
            rows,
            page,
            page_count,
            total_rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    pub fn render(&self) -> String {
        let mut output = format!("Table: {}\n\n", self.title);
        if self.is_empty() {
            output.push_str(EMPTY_TABLE_MESSAGE);
            output.push('\n');
            return output;
        }
        output.push_str(&render_table(&self.headers, &self.rows));
        let _ = writeln!(
            output,
            "\nPage {} of {} ({} row(s))",
            self.page, self.page_count, self.total_rows
        );
        output
    }
}

/// Resolves a display name to the stored table name.
pub fn qualified_table_name(user: &str, table: &str) -> String {
    let prefix = format!("{user}_");
    if table.starts_with(&prefix) {
        table.to_string()
    } else {
        format!("{prefix}{table}")
    }
}

pub async fn execute(args: &DashboardArgs, config: &AppConfig) -> Result<()> {
    let store = config.open_store()?;
    let user = args.user.trim().to_lowercase();
    let dashboard = load_dashboard(&store, &store, &user)
        .await
        .with_context(|| format!("Loading dashboard for '{user}'"))?;
    info!(
        "Loaded dashboard for '{user}' with {} table(s)",
        dashboard.tables.len()
    );
    print!("{}", dashboard.render());
    Ok(())
}

pub async fn execute_view(args: &ViewArgs, config: &AppConfig) -> Result<()> {
    let store = config.open_store()?;
    let user = args.user.trim().to_lowercase();
    let name = qualified_table_name(&user, args.table.trim());
    let snapshot = store
        .read_tables(std::slice::from_ref(&name))
        .await
        .with_context(|| format!("Reading table '{name}'"))?
        .into_iter()
        .next()
        .with_context(|| format!("Table '{name}' returned no snapshot"))?;
    let page = TablePage::from_snapshot(&snapshot, &user, args.page, config.page_size);
    info!(
        "Showing page {} of {} for '{name}'",
        page.page, page.page_count
    );
    print!("{}", page.render());
    Ok(())
}
