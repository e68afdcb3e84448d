use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::{
    cli::{OutputFormat, SummaryArgs},
    ingest::{Column, ColumnType, Table},
    report::{self, format_float, format_optional},
    session::Session,
    table,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub column_type: ColumnType,
    pub friendly_type: &'static str,
    pub unique: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub source: String,
    pub rows: usize,
    pub columns: usize,
    pub dropped_columns: Vec<String>,
    pub blank_rows: usize,
    pub conversions: Vec<(String, ColumnType)>,
    pub profile: Vec<ColumnSummary>,
}

pub fn summarize_column(column: &Column) -> ColumnSummary {
    let numbers = if column.column_type.is_numeric() {
        column.numeric_values()
    } else {
        Vec::new()
    };
    let (mean, min, max) = if numbers.is_empty() {
        (None, None, None)
    } else {
        (
            Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
            numbers.iter().copied().reduce(f64::min),
            numbers.iter().copied().reduce(f64::max),
        )
    };
    ColumnSummary {
        column: column.name.clone(),
        column_type: column.column_type,
        friendly_type: column.column_type.friendly_name(),
        unique: column.distinct_count(),
        missing: column.missing_count(),
        mean,
        min,
        max,
    }
}

pub fn summarize(session: &Session) -> DatasetSummary {
    let table = session.table();
    DatasetSummary {
        source: session.source_name(),
        rows: table.row_count(),
        columns: table.column_count(),
        dropped_columns: session.dropped_columns().to_vec(),
        blank_rows: session.blank_rows(),
        conversions: session.conversions(),
        profile: table.columns().iter().map(summarize_column).collect(),
    }
}

fn preview_rows(table: &Table, limit: usize) -> Vec<Vec<String>> {
    (0..table.row_count().min(limit))
        .map(|row| {
            (0..table.column_count())
                .map(|col| table.value(row, col).to_string())
                .collect()
        })
        .collect()
}

pub fn execute(session: &Session, args: &SummaryArgs) -> Result<()> {
    let summary = summarize(session);
    if args.read.format == OutputFormat::Json {
        report::print_json(&summary)?;
        return Ok(());
    }

    println!(
        "{}: {} row(s) x {} column(s)",
        summary.source, summary.rows, summary.columns
    );
    if !summary.dropped_columns.is_empty() {
        println!(
            "Dropped {} empty or unnamed column(s): {}",
            summary.dropped_columns.len(),
            summary.dropped_columns.join(", ")
        );
    }
    if summary.blank_rows > 0 {
        println!("Skipped {} blank row(s)", summary.blank_rows);
    }
    if !summary.conversions.is_empty() {
        let conversions = summary
            .conversions
            .iter()
            .map(|(column, ty)| format!("{column} -> {ty}"))
            .collect::<Vec<_>>();
        println!("Auto-conversions: {}", conversions.join(", "));
    }

    let table = session.table();
    table::print_section(
        &format!("First {} row(s)", args.rows.min(summary.rows)),
        &table.headers(),
        &preview_rows(table, args.rows),
    );

    let rows = summary
        .profile
        .iter()
        .map(|c| {
            vec![
                c.column.clone(),
                c.friendly_type.to_string(),
                c.unique.to_string(),
                c.missing.to_string(),
                format_optional(c.mean),
                c.min.map(format_float).unwrap_or_default(),
                c.max.map(format_float).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_section(
        "Profiling summary",
        &table::headers(&["column", "type", "unique", "missing", "mean", "min", "max"]),
        &rows,
    );
    info!(
        "Summarized {} column(s) of {:?}",
        summary.columns,
        session.source()
    );
    Ok(())
}
