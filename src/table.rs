//! Plain-text and Markdown table rendering for terminal and context output.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Renders an aligned plain-text table. Columns whose every non-empty cell
/// parses as a number are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }
    let numeric = numeric_columns(column_count, rows);

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &vec![false; column_count]));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &numeric));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Renders a GitHub-flavoured Markdown table.
pub fn render_markdown_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut output = String::new();
    let escape = |cell: &str| sanitize_cell(cell).replace('|', "\\|");
    let _ = writeln!(
        output,
        "| {} |",
        headers.iter().map(|h| escape(h.as_str())).collect::<Vec<_>>().join(" | ")
    );
    let _ = writeln!(output, "|{}", "---|".repeat(headers.len()));
    for row in rows {
        let cells = (0..headers.len())
            .map(|idx| row.get(idx).map(|c| escape(c.as_str())).unwrap_or_default())
            .collect::<Vec<_>>();
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }
    output
}

fn numeric_columns(column_count: usize, rows: &[Vec<String>]) -> Vec<bool> {
    (0..column_count)
        .map(|idx| {
            let mut cells = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .filter(|cell| !cell.is_empty())
                .peekable();
            cells.peek().is_some()
                && cells.all(|cell| cell.replace(',', "").parse::<f64>().is_ok())
        })
        .collect()
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(widths[idx].saturating_sub(display_width(&sanitized)));
        if right_align.get(idx).copied().unwrap_or(false) {
            cells.push(format!("{padding}{sanitized}"));
        } else {
            cells.push(format!("{sanitized}{padding}"));
        }
    }
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn right_aligns_numeric_columns() {
        let rendered = render_table(
            &strings(&["product", "revenue"]),
            &[strings(&["Widget", "5"]), strings(&["Gadget", "1,250.5"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "product  revenue");
        assert_eq!(lines[1], "-------  -------");
        assert_eq!(lines[2], "Widget         5");
        assert_eq!(lines[3], "Gadget   1,250.5");
    }

    #[test]
    fn ignores_ansi_sequences_in_width() {
        assert_eq!(display_width("\u{1b}[31mred\u{1b}[0m"), 3);
    }

    #[test]
    fn markdown_escapes_pipes_and_newlines() {
        let rendered =
            render_markdown_table(&strings(&["a", "b"]), &[strings(&["x|y", "line\nbreak"])]);
        assert_eq!(rendered, "| a | b |\n|---|---|\n| x\\|y | line break |\n");
    }
}
