//! Missing-value analysis per column and per row.

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::{
    cli::{CompletenessArgs, OutputFormat},
    export,
    ingest::{ColumnType, Table},
    report::{self, format_percent, percent},
    session::Session,
    table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingBand {
    None,
    Low,
    Moderate,
    High,
    Severe,
}

impl MissingBand {
    pub fn label(&self) -> &'static str {
        match self {
            MissingBand::None => "None",
            MissingBand::Low => "Low",
            MissingBand::Moderate => "Moderate",
            MissingBand::High => "High",
            MissingBand::Severe => "Severe",
        }
    }
}

pub fn band_for(missing_percent: f64) -> MissingBand {
    if missing_percent <= 0.0 {
        MissingBand::None
    } else if missing_percent <= 5.0 {
        MissingBand::Low
    } else if missing_percent <= 20.0 {
        MissingBand::Moderate
    } else if missing_percent <= 50.0 {
        MissingBand::High
    } else {
        MissingBand::Severe
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCompleteness {
    pub column: String,
    pub column_type: ColumnType,
    pub missing_count: usize,
    pub missing_percent: f64,
    pub band: MissingBand,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCompleteness {
    /// 1-based data row number.
    pub row: usize,
    pub filled: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub row_count: usize,
    pub column_count: usize,
    pub total_missing: usize,
    pub overall_missing_percent: f64,
    pub columns: Vec<ColumnCompleteness>,
    pub row_threshold: f64,
    pub median_row_completeness: Option<f64>,
    pub incomplete_rows: Vec<RowCompleteness>,
}

pub fn analyze(table: &Table, row_threshold: f64) -> CompletenessReport {
    let row_count = table.row_count();
    let column_count = table.column_count();

    let mut columns = if row_count == 0 {
        Vec::new()
    } else {
        table
            .columns()
            .iter()
            .map(|column| {
                let missing_count = column.missing_count();
                let missing_percent = percent(missing_count, row_count);
                ColumnCompleteness {
                    column: column.name.clone(),
                    column_type: column.column_type,
                    missing_count,
                    missing_percent,
                    band: band_for(missing_percent),
                }
            })
            .collect::<Vec<_>>()
    };
    // Stable sort keeps column order among equal percentages.
    columns.sort_by(|a, b| b.missing_percent.total_cmp(&a.missing_percent));

    let total_missing = columns.iter().map(|c| c.missing_count).sum::<usize>();
    let mut row_scores = (0..row_count)
        .map(|row| {
            let filled = (0..column_count)
                .filter(|col| !table.value(row, *col).is_missing())
                .count();
            RowCompleteness {
                row: row + 1,
                filled,
                percent: percent(filled, column_count),
            }
        })
        .collect::<Vec<_>>();

    let median_row_completeness = median(row_scores.iter().map(|r| r.percent).collect());
    // Judge the unrounded share; `percent` is rounded for display only.
    row_scores.retain(|r| (r.filled as f64 * 100.0) < row_threshold * column_count as f64);

    CompletenessReport {
        row_count,
        column_count,
        total_missing,
        overall_missing_percent: percent(total_missing, row_count * column_count),
        columns,
        row_threshold,
        median_row_completeness,
        incomplete_rows: row_scores,
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

pub fn execute(session: &Session, args: &CompletenessArgs) -> Result<()> {
    let threshold = args
        .threshold
        .unwrap_or(session.config().completeness.row_threshold);
    info!(
        "Checking completeness of '{}' (row threshold {threshold}%)",
        session.source_name()
    );
    let report = analyze(session.table(), threshold);

    if let Some(path) = &args.export_rows {
        let rows = report
            .incomplete_rows
            .iter()
            .map(|r| r.row - 1)
            .collect::<Vec<_>>();
        export::write_table_rows(path, session.table(), &rows, session.delimiter(), true)?;
    }

    match args.read.format {
        OutputFormat::Json => report::print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    info!(
        "{} missing cell(s) across {} column(s); {} row(s) below {threshold}%",
        report.total_missing,
        report.column_count,
        report.incomplete_rows.len()
    );
    Ok(())
}

fn print_report(report: &CompletenessReport) {
    println!(
        "Rows: {}  Columns: {}  Missing cells: {} ({})",
        report.row_count,
        report.column_count,
        report.total_missing,
        format_percent(report.overall_missing_percent)
    );
    let rows = report
        .columns
        .iter()
        .map(|c| {
            vec![
                c.column.clone(),
                c.column_type.friendly_name().to_string(),
                c.missing_count.to_string(),
                format_percent(c.missing_percent),
                c.band.label().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_section(
        "Missing values by column",
        &table::headers(&["column", "type", "missing", "missing_pct", "severity"]),
        &rows,
    );

    println!();
    if let Some(median) = report.median_row_completeness {
        println!("Median row completeness: {}", format_percent(median));
    }
    let rows = report
        .incomplete_rows
        .iter()
        .map(|r| {
            vec![
                r.row.to_string(),
                r.filled.to_string(),
                format_percent(r.percent),
            ]
        })
        .collect::<Vec<_>>();
    table::print_section(
        &format!("Rows below {}% complete", report.row_threshold),
        &table::headers(&["row", "filled", "complete_pct"]),
        &rows,
    );
}
