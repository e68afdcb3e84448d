//! Table model, missing-value normalization and column type inference.
//!
//! Every upload becomes a [`Table`]: named [`Column`]s of equal length, each
//! holding the cleaned raw text of its cells alongside the typed [`Value`]
//! parsed under the column's inferred [`ColumnType`]. Cells that do not fit
//! the inferred type keep their text as [`Value::Text`], so inference never
//! discards data.
//!
//! Inference tries, in order: numeric, boolean, date, datetime, category,
//! text. Thresholds are fractions of the non-missing cells that must parse.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        IntegerText, Value, parse_boolean, parse_integer, parse_naive_date, parse_naive_datetime,
        parse_numeric,
    },
    error::ProfileError,
    io_utils,
};

pub const DEFAULT_MISSING_TOKENS: &[&str] = &[
    "", "NA", "N/A", "na", "n/a", "?", "-", "--", "null", "NULL", "None", "nan", "NaN",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Category,
    Text,
}

impl ColumnType {
    pub fn friendly_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "Whole number",
            ColumnType::Float => "Number (decimals)",
            ColumnType::Boolean => "Boolean",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "Date/Time",
            ColumnType::Category => "Category",
            ColumnType::Text => "Text",
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            ColumnType::Integer | ColumnType::Float => TypeFamily::Numeric,
            ColumnType::Boolean => TypeFamily::Boolean,
            ColumnType::Date | ColumnType::DateTime => TypeFamily::Temporal,
            ColumnType::Category => TypeFamily::Category,
            ColumnType::Text => TypeFamily::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Category => "category",
            ColumnType::Text => "text",
        };
        f.write_str(label)
    }
}

/// Coarse grouping used when comparing schemas, so that an integer column
/// picking up a decimal does not register as a type change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeFamily {
    Numeric,
    Boolean,
    #[serde(rename = "Date/Time")]
    Temporal,
    Category,
    Text,
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TypeFamily::Numeric => "Numeric",
            TypeFamily::Boolean => "Boolean",
            TypeFamily::Temporal => "Date/Time",
            TypeFamily::Category => "Category",
            TypeFamily::Text => "Text",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    pub numeric_threshold: f64,
    pub boolean_threshold: f64,
    pub temporal_threshold: f64,
    /// Minimum share of rows that must be filled before a column is
    /// considered numeric at all.
    pub min_filled_ratio: f64,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            numeric_threshold: 0.9,
            boolean_threshold: 0.9,
            temporal_threshold: 0.6,
            min_filled_ratio: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub missing_tokens: Vec<String>,
    pub inference: InferenceOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
            missing_tokens: DEFAULT_MISSING_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            inference: InferenceOptions::default(),
        }
    }
}

impl IngestOptions {
    fn is_missing_token(&self, value: &str) -> bool {
        self.missing_tokens.iter().any(|token| token == value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Trimmed source text; empty for missing cells.
    pub raw: Vec<String>,
    pub values: Vec<Value>,
}

impl Column {
    /// Normalizes missing tokens in `cells` and infers the column type.
    pub fn infer(name: impl Into<String>, cells: Vec<String>, options: &IngestOptions) -> Self {
        let row_count = cells.len();
        let raw = cells
            .into_iter()
            .map(|cell| {
                let trimmed = cell.trim();
                if options.is_missing_token(trimmed) {
                    String::new()
                } else {
                    trimmed.to_string()
                }
            })
            .collect::<Vec<_>>();
        let filled = raw
            .iter()
            .filter(|cell| !cell.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>();
        let column_type = infer_column_type(&filled, row_count, &options.inference);
        Self::typed(name, raw, column_type)
    }

    /// Builds a column from already-normalized raw text (empty = missing).
    pub fn typed(name: impl Into<String>, raw: Vec<String>, column_type: ColumnType) -> Self {
        let values = raw
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    Value::Missing
                } else {
                    parse_cell(cell, column_type)
                }
            })
            .collect();
        Self {
            name: name.into(),
            column_type,
            raw,
            values,
        }
    }

    pub fn retyped(&self, column_type: ColumnType) -> Self {
        if column_type == self.column_type {
            return self.clone();
        }
        Self::typed(self.name.clone(), self.raw.clone(), column_type)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter_map(Value::canonical)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> crate::error::Result<Self> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if column.len() != row_count {
                return Err(ProfileError::malformed(format!(
                    "Column '{}' has {} value(s), expected {row_count}",
                    column.name,
                    column.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ProfileError::malformed(format!(
                    "Duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> crate::error::Result<&Column> {
        self.column(name)
            .ok_or_else(|| ProfileError::ColumnNotFound(name.to_string()))
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.columns[column].values[row]
    }

    pub fn raw_row(&self, row: usize) -> Vec<String> {
        self.columns.iter().map(|c| c.raw[row].clone()).collect()
    }

    /// Canonical cell texts for `row` restricted to `columns`; used to
    /// compare rows for equality.
    pub fn row_signature(&self, row: usize, columns: &[usize]) -> Vec<Option<String>> {
        columns
            .iter()
            .map(|idx| self.columns[*idx].values[row].canonical())
            .collect()
    }

    /// Lossless cell texts for `row` restricted to `columns`; used where
    /// rows are matched by identity rather than by rounded value.
    pub fn exact_signature(&self, row: usize, columns: &[usize]) -> Vec<Option<String>> {
        columns
            .iter()
            .map(|idx| self.columns[*idx].values[row].exact())
            .collect()
    }

    pub fn column_types(&self) -> HashMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type))
            .collect()
    }

    /// Subset of rows, in the given order, keeping the column types.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|column| Column {
                name: column.name.clone(),
                column_type: column.column_type,
                raw: rows.iter().map(|r| column.raw[*r].clone()).collect(),
                values: rows.iter().map(|r| column.values[*r].clone()).collect(),
            })
            .collect();
        Table {
            columns,
            row_count: rows.len(),
        }
    }

    /// Re-parses columns named in `types` under the given type; other
    /// columns are left as inferred.
    pub fn coerce_to(&self, types: &HashMap<String, ColumnType>) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|column| match types.get(&column.name) {
                Some(ty) => column.retyped(*ty),
                None => column.clone(),
            })
            .collect();
        Table {
            columns,
            row_count: self.row_count,
        }
    }
}

/// Result of reading one upload.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: Table,
    pub dropped_columns: Vec<String>,
    pub blank_rows: usize,
    pub delimiter: u8,
}

pub fn read_table(path: &Path, options: &IngestOptions) -> Result<Ingested> {
    let text = io_utils::read_input_text(path, options.encoding)?;
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter, &text);
    debug!(
        "Reading {:?} with delimiter '{}'",
        path,
        crate::printable_delimiter(delimiter)
    );
    let ingested = parse_text(&text, delimiter, options)
        .with_context(|| format!("Reading table from {path:?}"))?;
    Ok(ingested)
}

pub fn parse_text(
    text: &str,
    delimiter: u8,
    options: &IngestOptions,
) -> crate::error::Result<Ingested> {
    if text.trim().is_empty() {
        return Err(ProfileError::malformed("input is empty"));
    }
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .map_err(|err| ProfileError::malformed(format!("unreadable header row: {err}")))?
        .iter()
        .map(clean_header)
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err(ProfileError::malformed("header row is missing"));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut blank_rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|err| ProfileError::malformed(err.to_string()))?;
        if record.len() != headers.len() {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(ProfileError::malformed(format!(
                "line {line} has {} field(s), expected {}",
                record.len(),
                headers.len()
            )));
        }
        let all_missing = record
            .iter()
            .all(|field| options.is_missing_token(field.trim()));
        if all_missing {
            blank_rows += 1;
            continue;
        }
        for (idx, field) in record.iter().enumerate() {
            cells[idx].push(field.to_string());
        }
    }

    let row_count = cells.first().map(Vec::len).unwrap_or(0);
    let mut dropped_columns = Vec::new();
    let mut columns = Vec::with_capacity(headers.len());
    for (name, column_cells) in headers.into_iter().zip(cells) {
        if is_unnamed_header(&name) {
            dropped_columns.push(name);
            continue;
        }
        let column = Column::infer(name, column_cells, options);
        if row_count > 0 && column.missing_count() == row_count {
            dropped_columns.push(column.name);
            continue;
        }
        columns.push(column);
    }
    if columns.is_empty() {
        return Err(ProfileError::malformed(
            "no usable columns after dropping empty and unnamed columns",
        ));
    }

    Ok(Ingested {
        table: Table::new(columns)?,
        dropped_columns,
        blank_rows,
        delimiter,
    })
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

/// Blank headers and spreadsheet placeholders such as `Unnamed: 3`.
fn is_unnamed_header(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let lowered = name.to_ascii_lowercase();
    let Some(rest) = lowered.strip_prefix("unnamed") else {
        return false;
    };
    let rest = rest.trim_start();
    if rest.is_empty() {
        return true;
    }
    match rest.strip_prefix(':') {
        Some(digits) => {
            let digits = digits.trim_start();
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

pub fn parse_cell(raw: &str, column_type: ColumnType) -> Value {
    let parsed = match column_type {
        ColumnType::Integer => match parse_integer(raw) {
            IntegerText::Fits(number) => Some(Value::Integer(number)),
            IntegerText::Overflows => None,
            IntegerText::NotInteger => parse_numeric(raw).map(|v| {
                if is_exact_whole(v) {
                    Value::Integer(v as i64)
                } else {
                    Value::Float(v)
                }
            }),
        },
        ColumnType::Float => parse_numeric(raw).map(Value::Float),
        ColumnType::Boolean => parse_boolean(raw).map(Value::Boolean),
        ColumnType::Date => parse_naive_date(raw).map(Value::Date),
        ColumnType::DateTime => parse_naive_datetime(raw)
            .or_else(|| parse_naive_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
            .map(Value::DateTime),
        ColumnType::Category | ColumnType::Text => None,
    };
    parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
}

// Whole floats below 2^53 convert to i64 without losing digits.
fn is_exact_whole(value: f64) -> bool {
    value.fract() == 0.0 && value.abs() < 9.0e15
}

pub fn infer_column_type(
    filled: &[&str],
    row_count: usize,
    options: &InferenceOptions,
) -> ColumnType {
    if filled.is_empty() {
        return ColumnType::Text;
    }
    let total = filled.len() as f64;
    let share = |hits: usize| hits as f64 / total;

    let numbers = filled
        .iter()
        .filter_map(|v| parse_numeric(v))
        .collect::<Vec<_>>();
    let filled_ratio = total / row_count.max(1) as f64;
    if share(numbers.len()) >= options.numeric_threshold
        && filled_ratio >= options.min_filled_ratio
    {
        let mut column_type = ColumnType::Integer;
        for raw in filled {
            match parse_integer(raw) {
                IntegerText::Fits(_) => {}
                // Identifiers wider than i64 keep their exact text.
                IntegerText::Overflows => return ColumnType::Text,
                IntegerText::NotInteger => {
                    if parse_numeric(raw).is_some_and(|v| !is_exact_whole(v)) {
                        column_type = ColumnType::Float;
                    }
                }
            }
        }
        return column_type;
    }

    let booleans = filled.iter().filter(|v| parse_boolean(v).is_some()).count();
    if share(booleans) >= options.boolean_threshold {
        return ColumnType::Boolean;
    }

    let dates = filled
        .iter()
        .filter(|v| parse_naive_date(v).is_some())
        .count();
    if share(dates) >= options.temporal_threshold {
        return ColumnType::Date;
    }
    let datetimes = filled
        .iter()
        .filter(|v| parse_naive_datetime(v).is_some() || parse_naive_date(v).is_some())
        .count();
    if share(datetimes) >= options.temporal_threshold {
        return ColumnType::DateTime;
    }

    if looks_categorical(filled, row_count) {
        ColumnType::Category
    } else {
        ColumnType::Text
    }
}

/// A text column is a category when it mostly repeats a small set of short
/// labels rather than carrying identifiers or free text.
pub fn looks_categorical(filled: &[&str], row_count: usize) -> bool {
    if row_count == 0 || filled.is_empty() {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in filled {
        *counts.entry(value).or_insert(0) += 1;
    }
    let distinct = counts.len();
    let distinct_ratio = distinct as f64 / row_count as f64;
    if distinct_ratio > 0.5 {
        return false;
    }
    let id_like = filled.iter().filter(|v| looks_like_identifier(v)).count();
    if id_like as f64 / filled.len() as f64 > 0.3 {
        return false;
    }

    let mut lengths = filled
        .iter()
        .map(|v| v.chars().count())
        .collect::<Vec<_>>();
    lengths.sort_unstable();
    let mid = lengths.len() / 2;
    let median_len = if lengths.len() % 2 == 0 {
        (lengths[mid - 1] + lengths[mid]) as f64 / 2.0
    } else {
        lengths[mid] as f64
    };

    let mut frequencies = counts.values().copied().collect::<Vec<_>>();
    frequencies.sort_unstable_by(|a, b| b.cmp(a));
    let top_coverage =
        frequencies.iter().take(10).sum::<usize>() as f64 / filled.len() as f64;

    let signals = [
        median_len <= 25.0,
        distinct <= 50,
        distinct_ratio <= 0.2,
        top_coverage >= 0.8,
    ];
    signals.iter().filter(|s| **s).count() >= 3
}

fn looks_like_identifier(value: &str) -> bool {
    value.len() >= 6
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(text: &str) -> Ingested {
        parse_text(text, b',', &IngestOptions::default()).expect("parse table")
    }

    #[test]
    fn infers_types_in_fixed_order() {
        let ingested = ingest(
            "id,price,active,joined,seen_at,note\n\
             1,£1.50,yes,2024-01-02,2024-01-02 10:00:00,alpha\n\
             2,$2,no,2024-02-03,2024-02-03 11:30:00,beta\n\
             3,3.25,y,2024-03-04,2024-03-04 12:45:00,gamma\n",
        );
        let types = ingested
            .table
            .columns()
            .iter()
            .map(|c| c.column_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::DateTime,
                ColumnType::Text,
            ]
        );
    }

    #[test]
    fn missing_tokens_normalize_to_missing() {
        let ingested = ingest("a,b\n1,NA\n2, n/a \n3,?\n4,x\n");
        let column = ingested.table.column("b").unwrap();
        assert_eq!(column.missing_count(), 3);
        assert_eq!(column.values[3], Value::Text("x".to_string()));
    }

    #[test]
    fn cells_that_do_not_fit_keep_their_text() {
        let text = (1..=10)
            .map(|i| format!("{i}\n"))
            .chain(std::iter::once("oops\n".to_string()))
            .collect::<String>();
        let ingested = ingest(&format!("n\n{text}"));
        let column = ingested.table.column("n").unwrap();
        assert_eq!(column.column_type, ColumnType::Integer);
        assert_eq!(column.values[10], Value::Text("oops".to_string()));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let err = parse_text("a,b\n1,2\n3\n", b',', &IngestOptions::default()).unwrap_err();
        match err {
            ProfileError::MalformedInput { message } => assert!(message.contains("line 3")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(
            parse_text("  \n", b',', &IngestOptions::default()),
            Err(ProfileError::MalformedInput { .. })
        ));
    }

    #[test]
    fn header_only_input_yields_empty_table() {
        let ingested = ingest("a,b\n");
        assert_eq!(ingested.table.row_count(), 0);
        assert_eq!(ingested.table.column_count(), 2);
    }

    #[test]
    fn drops_unnamed_and_empty_columns_and_blank_rows() {
        let ingested = ingest("\u{feff} id ,Unnamed: 2,empty,\n1,x,,\n,,,\n2,y,NA,z\n");
        assert_eq!(ingested.table.headers(), vec!["id".to_string()]);
        assert_eq!(ingested.dropped_columns.len(), 3);
        assert_eq!(ingested.blank_rows, 1);
        assert_eq!(ingested.table.row_count(), 2);
    }

    #[test]
    fn duplicate_headers_are_malformed() {
        assert!(matches!(
            parse_text("a,a\n1,2\n", b',', &IngestOptions::default()),
            Err(ProfileError::MalformedInput { .. })
        ));
    }

    #[test]
    fn repeated_short_labels_are_categorical() {
        let mut text = String::from("colour\n");
        for i in 0..40 {
            text.push_str(["red\n", "green\n", "blue\n"][i % 3]);
        }
        let ingested = ingest(&text);
        assert_eq!(
            ingested.table.column("colour").unwrap().column_type,
            ColumnType::Category
        );
    }

    #[test]
    fn identifiers_are_not_categorical() {
        let filled = ["AB12CD34", "AB12CD34", "XY98ZZ11", "XY98ZZ11"];
        assert!(!looks_categorical(&filled, 4));
    }

    #[test]
    fn coerce_to_reparses_under_baseline_types() {
        let ingested = ingest("code\n001\n002\n");
        assert_eq!(ingested.table.value(0, 0), &Value::Integer(1));
        let types = HashMap::from([("code".to_string(), ColumnType::Text)]);
        let coerced = ingested.table.coerce_to(&types);
        assert_eq!(coerced.value(0, 0), &Value::Text("001".to_string()));
    }
}
