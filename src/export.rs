//! CSV exports of filtered subsets.
//!
//! Exports carry the cleaned source text of each cell (missing cells are
//! written empty) so they can be reloaded with the same options.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::{ingest::Table, io_utils};

pub const ROW_NUMBER_HEADER: &str = "row";

/// Writes the given rows of `table`. With `row_numbers`, a leading `row`
/// column holds the 1-based data row number.
pub fn write_table_rows(
    path: &Path,
    table: &Table,
    rows: &[usize],
    delimiter: u8,
    row_numbers: bool,
) -> Result<usize> {
    let mut headers = Vec::with_capacity(table.column_count() + 1);
    if row_numbers {
        headers.push(ROW_NUMBER_HEADER.to_string());
    }
    headers.extend(table.headers());
    let records = rows.iter().map(|row| {
        let mut record = Vec::with_capacity(headers.len());
        if row_numbers {
            record.push((row + 1).to_string());
        }
        record.extend(table.raw_row(*row));
        record
    });
    write_records(path, &headers, records, delimiter)
}

pub fn write_records<I>(path: &Path, headers: &[String], records: I, delimiter: u8) -> Result<usize>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = io_utils::open_csv_writer(Some(path), delimiter)?;
    writer
        .write_record(headers)
        .with_context(|| format!("Writing header to {path:?}"))?;
    let mut written = 0usize;
    for record in records {
        writer
            .write_record(&record)
            .with_context(|| format!("Writing row {} to {path:?}", written + 1))?;
        written += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    info!("Wrote {written} row(s) to {path:?}");
    Ok(written)
}
