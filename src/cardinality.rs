//! Distinct-value analysis, duplicate rows and the value-frequency explorer.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    cli::{CardinalityArgs, OutputFormat},
    data::MISSING_LABEL,
    export,
    ingest::{Column, ColumnType, Table},
    report::{self, format_percent, percent, round_to},
    session::Session,
    table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistinctBand {
    /// Nearly every value is unique; the column behaves like a key.
    High,
    Medium,
    /// Few values repeat often; the column behaves like a category.
    Low,
}

impl DistinctBand {
    pub fn label(&self) -> &'static str {
        match self {
            DistinctBand::High => "High (key-like)",
            DistinctBand::Medium => "Medium",
            DistinctBand::Low => "Low (category-like)",
        }
    }
}

pub fn band_for(distinct_ratio: f64) -> DistinctBand {
    if distinct_ratio >= 0.9 {
        DistinctBand::High
    } else if distinct_ratio >= 0.1 {
        DistinctBand::Medium
    } else {
        DistinctBand::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCardinality {
    pub column: String,
    pub column_type: ColumnType,
    pub distinct_count: usize,
    pub missing_count: usize,
    pub distinct_ratio: f64,
    pub band: DistinctBand,
    /// Every value tied at the highest frequency, in first-seen order.
    pub most_frequent: Vec<String>,
    pub top_frequency: usize,
    pub duplication_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardinalityReport {
    pub row_count: usize,
    pub columns: Vec<ColumnCardinality>,
    pub duplicate_row_count: usize,
}

pub fn analyze(table: &Table) -> CardinalityReport {
    let row_count = table.row_count();
    let mut columns = table
        .columns()
        .iter()
        .map(|column| profile_column(column, row_count))
        .collect::<Vec<_>>();
    columns.sort_by(|a, b| {
        b.distinct_ratio
            .total_cmp(&a.distinct_ratio)
            .then(b.distinct_count.cmp(&a.distinct_count))
    });
    CardinalityReport {
        row_count,
        columns,
        duplicate_row_count: duplicate_rows(table).len(),
    }
}

fn profile_column(column: &Column, row_count: usize) -> ColumnCardinality {
    let counts = count_in_order(column.values.iter().filter_map(|v| v.canonical()));
    let distinct_count = counts.len();
    let missing_count = column.missing_count();
    let non_missing = row_count - missing_count;
    let top_frequency = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let most_frequent = counts
        .iter()
        .filter(|(_, n)| *n == top_frequency && top_frequency > 0)
        .map(|(value, _)| value.clone())
        .collect();
    let distinct_ratio = if row_count == 0 {
        0.0
    } else {
        round_to(distinct_count as f64 / row_count as f64, 4)
    };
    let duplication_ratio = if non_missing == 0 {
        0.0
    } else {
        round_to((non_missing - distinct_count) as f64 / non_missing as f64, 4)
    };
    ColumnCardinality {
        column: column.name.clone(),
        column_type: column.column_type,
        distinct_count,
        missing_count,
        distinct_ratio,
        band: band_for(distinct_ratio),
        most_frequent,
        top_frequency,
        duplication_ratio,
    }
}

/// Counts occurrences, keeping values in the order they were first seen.
fn count_in_order<I>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = String>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match positions.get(&value) {
            Some(idx) => counts[*idx].1 += 1,
            None => {
                positions.insert(value.clone(), counts.len());
                counts.push((value, 1));
            }
        }
    }
    counts
}

/// Rows identical to an earlier row on every column; the first occurrence is
/// not included.
pub fn duplicate_rows(table: &Table) -> Vec<usize> {
    let all_columns = (0..table.column_count()).collect::<Vec<_>>();
    let mut seen = HashSet::new();
    (0..table.row_count())
        .filter(|row| !seen.insert(table.row_signature(*row, &all_columns)))
        .collect()
}

/// Indices of the first occurrence of every distinct row.
pub fn deduplicate(table: &Table) -> Vec<usize> {
    let duplicates = duplicate_rows(table).into_iter().collect::<HashSet<_>>();
    (0..table.row_count())
        .filter(|row| !duplicates.contains(row))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueFrequency {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

/// Every value of `column` (missing shown as `<NA>`) with its count and share
/// of rows, most frequent first; ties keep first-seen order.
pub fn value_frequencies(column: &Column, limit: usize) -> Vec<ValueFrequency> {
    let total = column.len();
    count_in_order(column.values.iter().map(|v| {
        v.canonical()
            .unwrap_or_else(|| MISSING_LABEL.to_string())
    }))
    .into_iter()
    .sorted_by(|a, b| b.1.cmp(&a.1))
    .take(limit)
    .map(|(value, count)| ValueFrequency {
        percent: percent(count, total),
        value,
        count,
    })
    .collect()
}

pub fn execute(session: &Session, args: &CardinalityArgs) -> Result<()> {
    let table = session.table();
    info!("Profiling cardinality of '{}'", session.source_name());
    let report = analyze(table);

    let frequencies = match &args.values {
        Some(name) => {
            let column = table
                .require_column(name)
                .with_context(|| format!("Listing values of '{name}'"))?;
            let limit = args
                .top
                .unwrap_or(session.config().cardinality.top_values);
            Some((name.clone(), value_frequencies(column, limit)))
        }
        None => None,
    };

    if let Some(path) = &args.export_duplicates {
        if report.duplicate_row_count == 0 {
            warn!("No duplicate rows found; writing header only to {path:?}");
        }
        export::write_table_rows(
            path,
            table,
            &duplicate_rows(table),
            session.delimiter(),
            true,
        )?;
    }
    if let Some(path) = &args.export_deduplicated {
        export::write_table_rows(path, table, &deduplicate(table), session.delimiter(), false)?;
    }

    match args.read.format {
        OutputFormat::Json => {
            let values = frequencies.as_ref().map(|(column, values)| {
                serde_json::json!({ "column": column, "values": values })
            });
            report::print_json(&serde_json::json!({
                "cardinality": report,
                "value_frequencies": values,
            }))?;
        }
        OutputFormat::Table => print_report(&report, frequencies.as_ref()),
    }
    info!(
        "{} column(s) profiled; {} duplicate row(s)",
        report.columns.len(),
        report.duplicate_row_count
    );
    Ok(())
}

fn print_report(report: &CardinalityReport, frequencies: Option<&(String, Vec<ValueFrequency>)>) {
    println!(
        "Rows: {}  Exact duplicate rows: {}",
        report.row_count, report.duplicate_row_count
    );
    let rows = report
        .columns
        .iter()
        .map(|c| {
            vec![
                c.column.clone(),
                c.distinct_count.to_string(),
                c.missing_count.to_string(),
                format!("{:.4}", c.distinct_ratio),
                c.band.label().to_string(),
                c.most_frequent.join(" | "),
                c.top_frequency.to_string(),
                format!("{:.4}", c.duplication_ratio),
            ]
        })
        .collect::<Vec<_>>();
    table::print_section(
        "Distinct values by column",
        &table::headers(&[
            "column",
            "distinct",
            "missing",
            "distinct_ratio",
            "cardinality",
            "most_frequent",
            "frequency",
            "duplication_ratio",
        ]),
        &rows,
    );

    if let Some((column, values)) = frequencies {
        let rows = values
            .iter()
            .map(|v| {
                vec![
                    v.value.clone(),
                    v.count.to_string(),
                    format_percent(v.percent),
                ]
            })
            .collect::<Vec<_>>();
        table::print_section(
            &format!("Value frequencies for '{column}'"),
            &table::headers(&["value", "count", "share"]),
            &rows,
        );
    }
}
