use std::{borrow::Cow, fmt::Write as _};

use crate::data::parse_number;

const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders a header, a dashed separator, and one line per row. Columns whose
/// non-empty cells are all numeric are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows);
    let alignments = (0..headers.len())
        .map(|idx| column_alignment(rows, idx))
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths, &[]));
    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths, &[]));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths, &alignments));
    }
    output
}

/// Two-column key/value listing used for profiles and summaries.
pub fn render_pairs(pairs: &[(&str, String)]) -> String {
    let width = pairs
        .iter()
        .map(|(key, _)| display_width(key))
        .max()
        .unwrap_or_default();
    let mut output = String::new();
    for (key, value) in pairs {
        let padding = width.saturating_sub(display_width(key));
        let _ = writeln!(
            output,
            "{key}:{}{COLUMN_GAP}{}",
            " ".repeat(padding),
            flatten_cell(value)
        );
    }
    output
}

fn column_widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths = headers
        .iter()
        .map(|header| display_width(header).max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(&flatten_cell(cell)));
        }
    }
    widths
}

fn column_alignment(rows: &[Vec<String>], idx: usize) -> Align {
    let mut cells = rows
        .iter()
        .filter_map(|row| row.get(idx))
        .filter(|cell| !cell.is_empty())
        .peekable();
    if cells.peek().is_none() {
        return Align::Left;
    }
    if cells.all(|cell| parse_number(cell).is_some()) {
        Align::Right
    } else {
        Align::Left
    }
}

fn format_line(values: &[String], widths: &[usize], alignments: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let cell = flatten_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            match alignments.get(idx).copied().unwrap_or(Align::Left) {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join(COLUMN_GAP).trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

/// Line breaks and tabs would split a row across lines.
fn flatten_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
