use std::sync::OnceLock;

use regex::Regex;

static TABLE_NAME: OnceLock<Regex> = OnceLock::new();

fn table_name_pattern() -> &'static Regex {
    TABLE_NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("table name pattern is valid"))
}

/// Strips everything from the final `.` onward. Names without a `.` are kept
/// whole.
pub fn file_base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

/// `user + "_" + base`, with `"_" + disambiguator` appended when given.
pub fn derive_table_name(user: &str, file_name: &str, disambiguator: Option<&str>) -> String {
    let base = file_base_name(file_name);
    match disambiguator {
        Some(tag) => format!("{user}_{base}_{tag}"),
        None => format!("{user}_{base}"),
    }
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn is_valid_table_name(name: &str) -> bool {
    table_name_pattern().is_match(name)
}

/// Table name without its owner prefix, as shown on the dashboard.
pub fn display_name<'a>(table: &'a str, user: &str) -> &'a str {
    table
        .strip_prefix(user)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(table)
}
