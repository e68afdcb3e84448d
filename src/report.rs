//! Formatting helpers shared by the command reports.

use anyhow::{Context, Result};
use serde::Serialize;

pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(report).context("Serializing report to JSON")?;
    println!("{rendered}");
    Ok(())
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `part` as a percentage of `whole`, rounded to two decimals; 0 when
/// `whole` is 0.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 * 100.0 / whole as f64, 2)
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}
