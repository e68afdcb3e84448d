//! Numeric spread summaries with fixed-bucket histograms, and categorical
//! frequency tables.

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    cli::{DistributionArgs, DistributionView, OutputFormat},
    data::MISSING_LABEL,
    error::ProfileError,
    ingest::{Column, ColumnType, Table},
    report::{self, format_float, format_optional, format_percent, percent},
    session::Session,
    table,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub lower: f64,
    pub upper: f64,
    /// The last bucket includes its upper edge.
    pub closed: bool,
    pub count: usize,
}

impl Bucket {
    pub fn label(&self) -> String {
        let close = if self.closed { ']' } else { ')' };
        format!(
            "[{}, {}{close}",
            format_float(self.lower),
            format_float(self.upper)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub column_type: ColumnType,
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub p5: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub p95: f64,
    pub max: f64,
    pub iqr: f64,
    pub outlier_count: usize,
    pub outlier_percent: f64,
    pub histogram: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub column_type: ColumnType,
    pub distinct: usize,
    pub top: Vec<CategoryCount>,
    /// Rows outside the top categories; absent when nothing remains.
    pub other: Option<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DistributionReport {
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DistributionOptions {
    pub columns: Vec<String>,
    pub bucket_count: usize,
    pub top_n: usize,
    pub view: DistributionView,
}

impl Default for DistributionOptions {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            bucket_count: 10,
            top_n: 10,
            view: DistributionView::All,
        }
    }
}

/// Linear-interpolation quantile of already sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Splits `[min, upper]` into `bucket_count` equal buckets. Integer columns
/// use `max + 1` as the upper edge so each integer covers a unit interval;
/// float columns use `max`, widened to one unit when every value is equal.
pub fn histogram(values: &[f64], bucket_count: usize, integer: bool) -> Vec<Bucket> {
    if values.is_empty() || bucket_count == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let upper = if integer {
        max + 1.0
    } else if max > min {
        max
    } else {
        min + 1.0
    };
    let width = (upper - min) / bucket_count as f64;
    let edge = |idx: usize| {
        if idx == bucket_count {
            upper
        } else {
            min + width * idx as f64
        }
    };

    let mut counts = vec![0usize; bucket_count];
    for value in values {
        let mut idx = (((value - min) / width).floor() as usize).min(bucket_count - 1);
        if idx > 0 && *value < edge(idx) {
            idx -= 1;
        } else if idx + 1 < bucket_count && *value >= edge(idx + 1) {
            idx += 1;
        }
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| Bucket {
            lower: edge(idx),
            upper: edge(idx + 1),
            closed: idx + 1 == bucket_count,
            count,
        })
        .collect()
}

pub fn summarize_numeric(column: &Column, bucket_count: usize) -> Option<NumericSummary> {
    let mut values = column.numeric_values();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    let (low_fence, high_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let outlier_count = values
        .iter()
        .filter(|v| **v < low_fence || **v > high_fence)
        .count();

    Some(NumericSummary {
        column: column.name.clone(),
        column_type: column.column_type,
        count,
        missing: column.missing_count(),
        mean,
        std,
        min: values[0],
        p5: quantile(&values, 0.05),
        q1,
        median: quantile(&values, 0.5),
        q3,
        p95: quantile(&values, 0.95),
        max: values[count - 1],
        iqr,
        outlier_count,
        outlier_percent: percent(outlier_count, count),
        histogram: histogram(
            &values,
            bucket_count,
            column.column_type == ColumnType::Integer,
        ),
    })
}

pub fn summarize_categorical(column: &Column, top_n: usize) -> CategoricalSummary {
    let total = column.len();
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in &column.values {
        let label = value
            .canonical()
            .unwrap_or_else(|| MISSING_LABEL.to_string());
        match order.get(&label) {
            Some(idx) => counts[*idx].1 += 1,
            None => {
                order.insert(label.clone(), counts.len());
                counts.push((label, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let distinct = counts.len();
    let remainder = counts.split_off(top_n.min(distinct));
    let other_count = remainder.iter().map(|(_, n)| *n).sum::<usize>();
    CategoricalSummary {
        column: column.name.clone(),
        column_type: column.column_type,
        distinct,
        top: counts
            .into_iter()
            .map(|(value, count)| CategoryCount {
                value,
                count,
                percent: percent(count, total),
            })
            .collect(),
        other: (other_count > 0).then(|| CategoryCount {
            value: "Other".to_string(),
            count: other_count,
            percent: percent(other_count, total),
        }),
    }
}

pub fn analyze(table: &Table, options: &DistributionOptions) -> crate::error::Result<DistributionReport> {
    let selected = if options.columns.is_empty() {
        table.columns().iter().collect::<Vec<_>>()
    } else {
        options
            .columns
            .iter()
            .map(|name| table.require_column(name))
            .collect::<crate::error::Result<Vec<_>>>()?
    };
    if options.bucket_count == 0 {
        return Err(ProfileError::malformed("bucket count must be at least 1"));
    }

    let want_numeric = matches!(options.view, DistributionView::Numeric | DistributionView::All);
    let want_categorical = matches!(
        options.view,
        DistributionView::Categorical | DistributionView::All
    );
    let explicit = !options.columns.is_empty();

    let mut report = DistributionReport::default();
    for column in selected {
        let ty = column.column_type;
        if ty.is_numeric() {
            if !want_numeric {
                continue;
            }
            match summarize_numeric(column, options.bucket_count) {
                Some(summary) => report.numeric.push(summary),
                None => report.skipped.push(column.name.clone()),
            }
        } else if ty.is_temporal() {
            if explicit {
                report.skipped.push(column.name.clone());
            }
        } else if want_categorical {
            report
                .categorical
                .push(summarize_categorical(column, options.top_n));
        }
    }
    Ok(report)
}

pub fn execute(session: &Session, args: &DistributionArgs) -> Result<()> {
    let config = &session.config().distribution;
    let options = DistributionOptions {
        columns: args
            .columns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        bucket_count: args.buckets.unwrap_or(config.bucket_count),
        top_n: args.top.unwrap_or(config.top_n),
        view: args.view,
    };
    info!(
        "Summarizing distributions of '{}' ({} bucket(s), top {})",
        session.source_name(),
        options.bucket_count,
        options.top_n
    );
    debug!("Selected columns: {:?}", options.columns);
    let report = analyze(session.table(), &options)?;
    for column in &report.skipped {
        warn!("Column '{column}' has no numeric or categorical values to summarize");
    }

    match args.read.format {
        OutputFormat::Json => report::print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    info!(
        "Summarized {} numeric and {} categorical column(s)",
        report.numeric.len(),
        report.categorical.len()
    );
    Ok(())
}

fn print_report(report: &DistributionReport) {
    if !report.numeric.is_empty() {
        let rows = report
            .numeric
            .iter()
            .map(|s| {
                vec![
                    s.column.clone(),
                    s.count.to_string(),
                    format_float(s.mean),
                    format_optional(s.std),
                    format_float(s.min),
                    format_float(s.p5),
                    format_float(s.q1),
                    format_float(s.median),
                    format_float(s.q3),
                    format_float(s.p95),
                    format_float(s.max),
                    format_percent(s.outlier_percent),
                ]
            })
            .collect::<Vec<_>>();
        table::print_section(
            "Numeric summary",
            &table::headers(&[
                "column", "count", "mean", "std", "min", "p5", "q1", "median", "q3", "p95",
                "max", "outliers",
            ]),
            &rows,
        );
        for summary in &report.numeric {
            let rows = summary
                .histogram
                .iter()
                .map(|b| vec![b.label(), b.count.to_string()])
                .collect::<Vec<_>>();
            table::print_section(
                &format!("Histogram for '{}'", summary.column),
                &table::headers(&["bucket", "count"]),
                &rows,
            );
        }
    }

    for summary in &report.categorical {
        let rows = summary
            .top
            .iter()
            .chain(summary.other.iter())
            .map(|c| {
                vec![
                    c.value.clone(),
                    c.count.to_string(),
                    format_percent(c.percent),
                ]
            })
            .collect::<Vec<_>>();
        table::print_section(
            &format!(
                "Top categories for '{}' ({} distinct)",
                summary.column, summary.distinct
            ),
            &table::headers(&["value", "count", "share"]),
            &rows,
        );
    }

    if report.numeric.is_empty() && report.categorical.is_empty() {
        println!("No columns to summarize.");
    }
}
