use std::borrow::Cow;
use std::fmt::Write as _;

/// Horizontal placement of a column's cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Columns beyond `alignment` are left aligned. Headers follow their
/// column's alignment.
pub fn render_aligned(headers: &[String], rows: &[Vec<String>], alignment: &[Align]) -> String {
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

    let mut output = String::new();

    let header_line = format_row(headers, &widths, alignment);
    let _ = writeln!(output, "{header_line}");

    let separator_cells = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let separator_line = format_row(&separator_cells, &widths, alignment);
    let _ = writeln!(output, "{separator_line}");

    for row in rows {
        let row_line = format_row(row, &widths, alignment);
        let _ = writeln!(output, "{row_line}");
    }

    output
}

pub fn print_aligned(headers: &[String], rows: &[Vec<String>], alignment: &[Align]) {
    let rendered = render_aligned(headers, rows, alignment);
    print!("{rendered}");
}

fn format_row(values: &[String], widths: &[usize], alignment: &[Align]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        if idx >= widths.len() {
            break;
        }
        let sanitized = sanitize_cell(value);
        let display = display_width(sanitized.as_ref());
        let padding = " ".repeat(widths[idx].saturating_sub(display));
        let cell = match alignment.get(idx).copied().unwrap_or_default() {
            Align::Left => format!("{sanitized}{padding}"),
            Align::Right => format!("{padding}{sanitized}"),
        };
        cells.push(cell);
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape sequence such as \x1b[31m
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
        Cow::Owned(
            value
                .chars()
                .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}
