use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders rows as whitespace-aligned columns. A column whose filled cells
/// all read as numbers (counts, percentages, statistics) is right-aligned,
/// header included.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells = rows
        .iter()
        .map(|row| {
            (0..headers.len())
                .map(|idx| flatten(row.get(idx).map(String::as_str).unwrap_or_default()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let layout = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let width = cells
                .iter()
                .map(|row| row[idx].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
                .max(3);
            let mut filled = cells.iter().map(|row| row[idx].as_str()).filter(|c| !c.is_empty());
            let align = match filled.next() {
                Some(first) if looks_numeric(first) && filled.all(looks_numeric) => Align::Right,
                _ => Align::Left,
            };
            (width, align)
        })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| flatten(h)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", join_line(&header_cells, &layout));
    let rule = layout
        .iter()
        .map(|(width, _)| "-".repeat(*width))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", join_line(&rule, &layout));
    for row in &cells {
        let _ = writeln!(output, "{}", join_line(row, &layout));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Prints a titled table preceded by a blank line; empty tables print a
/// one-line notice instead.
pub fn print_section(title: &str, headers: &[String], rows: &[Vec<String>]) {
    println!();
    println!("{title}");
    if rows.is_empty() {
        println!("(none)");
    } else {
        print_table(headers, rows);
    }
}

pub fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn join_line(cells: &[String], layout: &[(usize, Align)]) -> String {
    let line = cells
        .iter()
        .zip(layout)
        .map(|(cell, &(width, align))| match align {
            Align::Left => format!("{cell:<width$}"),
            Align::Right => format!("{cell:>width$}"),
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn looks_numeric(value: &str) -> bool {
    let body = value.strip_suffix('%').unwrap_or(value);
    !body.is_empty() && body.parse::<f64>().is_ok()
}

// Line breaks and tabs inside a cell would tear the grid apart.
fn flatten(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}
