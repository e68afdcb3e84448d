//! Column validation rules and the custom row expression check.
//!
//! Rules are declared as [`RuleSpec`] values (from the config file or
//! `--rule` flags), compiled per column into a [`Rule`], and applied by the
//! single [`evaluate`] dispatch. A rule that fails to compile disables only
//! its own column; the rest of the report is still produced.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    cli::{CorrectnessArgs, OutputFormat},
    data::{MISSING_LABEL, Value, parse_naive_date, parse_numeric},
    error::{self, ProfileError},
    export,
    expr::{EXPRESSION_LABEL, ExpressionRule, anchored_regex},
    ingest::{Column, Table},
    report::{self, format_percent, percent},
    session::Session,
    table,
};

/// Declarative form of a column rule. Range bounds are inclusive and either
/// may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    Pattern(String),
    Preset(String),
    NumericRange {
        min: Option<f64>,
        max: Option<f64>,
    },
    DateRange {
        min: Option<String>,
        max: Option<String>,
    },
}

impl RuleSpec {
    pub fn describe(&self) -> String {
        match self {
            RuleSpec::Pattern(pattern) => format!("pattern {pattern}"),
            RuleSpec::Preset(name) => format!("preset {name}"),
            RuleSpec::NumericRange { min, max } => format!(
                "range {}..{}",
                min.map(|v| v.to_string()).unwrap_or_default(),
                max.map(|v| v.to_string()).unwrap_or_default()
            ),
            RuleSpec::DateRange { min, max } => format!(
                "date range {}..{}",
                min.as_deref().unwrap_or_default(),
                max.as_deref().unwrap_or_default()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub pattern: &'static str,
    pub example: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "email",
        pattern: r"^[\w.%+\-]+@[\w.\-]+\.[A-Za-z]{2,}$",
        example: "name.surname@nhs.uk",
    },
    Preset {
        name: "uk_postcode",
        pattern: r"^[A-Z]{1,2}\d[A-Z\d]?\s?\d[A-Z]{2}$",
        example: "SW1A 2AA",
    },
    Preset {
        name: "uk_mobile",
        pattern: r"^07\d{8,10}$",
        example: "07123456789",
    },
    Preset {
        name: "iso_date",
        pattern: r"^\d{4}-\d{2}-\d{2}$",
        example: "2025-10-30",
    },
    Preset {
        name: "uk_date",
        pattern: r"^\d{2}/\d{2}/\d{4}$",
        example: "30/10/2025",
    },
    Preset {
        name: "time_24h",
        pattern: r"^(?:[01]\d|2[0-3]):[0-5]\d$",
        example: "23:59",
    },
    Preset {
        name: "url",
        pattern: r"^(https?://)?[\w\-]+(\.[\w\-]+)+[/\w\-.~:?#\[\]@!$&'()*+,;=%]*$",
        example: "https://example.com/path",
    },
    Preset {
        name: "integer",
        pattern: r"^-?\d+$",
        example: "-7",
    },
    Preset {
        name: "decimal",
        pattern: r"^-?\d+(\.\d+)?$",
        example: "3.14",
    },
    Preset {
        name: "percentage",
        pattern: r"^\d+(\.\d+)?%$",
        example: "99.5%",
    },
    Preset {
        name: "uppercase",
        pattern: r"^[A-Z]+$",
        example: "NHS",
    },
    Preset {
        name: "alphanumeric_code",
        pattern: r"^[A-Za-z0-9]{6,12}$",
        example: "user007",
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    let wanted = name.trim().to_ascii_lowercase().replace('-', "_");
    PRESETS.iter().find(|p| p.name == wanted)
}

/// A rule ready to be applied to cells.
#[derive(Debug, Clone)]
pub enum Rule {
    Pattern(Regex),
    NumericRange {
        min: Option<f64>,
        max: Option<f64>,
    },
    DateRange {
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
    },
}

pub fn compile_rule(column: &str, spec: &RuleSpec) -> error::Result<Rule> {
    match spec {
        RuleSpec::Pattern(pattern) => compile_pattern(column, pattern),
        RuleSpec::Preset(name) => {
            let preset = find_preset(name).ok_or_else(|| {
                ProfileError::invalid_rule(column, format!("unknown preset '{name}'"))
            })?;
            compile_pattern(column, preset.pattern)
        }
        RuleSpec::NumericRange { min, max } => {
            if let (Some(lo), Some(hi)) = (min, max)
                && lo > hi
            {
                return Err(ProfileError::invalid_rule(
                    column,
                    format!("minimum {lo} is greater than maximum {hi}"),
                ));
            }
            Ok(Rule::NumericRange {
                min: *min,
                max: *max,
            })
        }
        RuleSpec::DateRange { min, max } => {
            let parse_bound = |bound: &Option<String>| -> error::Result<Option<NaiveDate>> {
                bound
                    .as_deref()
                    .map(|raw| {
                        parse_naive_date(raw.trim()).ok_or_else(|| {
                            ProfileError::invalid_rule(column, format!("'{raw}' is not a date"))
                        })
                    })
                    .transpose()
            };
            let (min, max) = (parse_bound(min)?, parse_bound(max)?);
            if let (Some(lo), Some(hi)) = (min, max)
                && lo > hi
            {
                return Err(ProfileError::invalid_rule(
                    column,
                    format!("start {lo} is after end {hi}"),
                ));
            }
            Ok(Rule::DateRange { min, max })
        }
    }
}

/// Patterns match from the start of the cell text; add `$` to anchor the end.
fn compile_pattern(column: &str, pattern: &str) -> error::Result<Rule> {
    anchored_regex(pattern)
        .map(Rule::Pattern)
        .map_err(|err| ProfileError::invalid_rule(column, err.to_string()))
}

/// Whether one cell satisfies `rule`. `raw` is the cell's source text.
pub fn evaluate(rule: &Rule, value: &Value, raw: &str, treat_blank_valid: bool) -> bool {
    if value.is_missing() {
        return treat_blank_valid;
    }
    match rule {
        Rule::Pattern(regex) => regex.is_match(raw),
        Rule::NumericRange { min, max } => {
            match value.as_f64().or_else(|| parse_numeric(raw)) {
                Some(number) => {
                    min.is_none_or(|lo| number >= lo) && max.is_none_or(|hi| number <= hi)
                }
                None => false,
            }
        }
        Rule::DateRange { min, max } => {
            let date = match value {
                Value::Date(d) => Some(*d),
                Value::DateTime(dt) => Some(dt.date()),
                _ => parse_naive_date(raw),
            };
            match date {
                Some(date) => {
                    min.is_none_or(|lo| date >= lo) && max.is_none_or(|hi| date <= hi)
                }
                None => false,
            }
        }
    }
}

/// Parses a `--rule` argument: `column=pattern:REGEX`, `column=preset:NAME`,
/// `column=range:MIN..MAX` or `column=date-range:START..END`.
pub fn parse_rule_argument(argument: &str) -> error::Result<(String, RuleSpec)> {
    let (column, rule) = argument.split_once('=').ok_or_else(|| {
        ProfileError::invalid_rule(argument, "expected `column=kind:argument`")
    })?;
    let column = column.trim();
    if column.is_empty() {
        return Err(ProfileError::invalid_rule(argument, "column name is empty"));
    }
    let (kind, value) = rule
        .split_once(':')
        .ok_or_else(|| ProfileError::invalid_rule(column, "expected `kind:argument`"))?;
    let spec = match kind.trim().to_ascii_lowercase().as_str() {
        "pattern" | "regex" => RuleSpec::Pattern(value.to_string()),
        "preset" => RuleSpec::Preset(value.trim().to_string()),
        "range" | "numeric-range" => {
            let (min, max) = split_range(column, value)?;
            let parse = |bound: Option<&str>| -> error::Result<Option<f64>> {
                bound
                    .map(|raw| {
                        parse_numeric(raw).ok_or_else(|| {
                            ProfileError::invalid_rule(column, format!("'{raw}' is not a number"))
                        })
                    })
                    .transpose()
            };
            RuleSpec::NumericRange {
                min: parse(min)?,
                max: parse(max)?,
            }
        }
        "date-range" | "dates" => {
            let (min, max) = split_range(column, value)?;
            RuleSpec::DateRange {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
            }
        }
        other => {
            return Err(ProfileError::invalid_rule(
                column,
                format!("unknown rule kind '{other}'"),
            ));
        }
    };
    Ok((column.to_string(), spec))
}

fn split_range<'a>(column: &str, value: &'a str) -> error::Result<(Option<&'a str>, Option<&'a str>)> {
    let (lo, hi) = value
        .split_once("..")
        .ok_or_else(|| ProfileError::invalid_rule(column, "expected `MIN..MAX`"))?;
    let bound = |raw: &'a str| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    };
    let (lo, hi) = (bound(lo), bound(hi));
    if lo.is_none() && hi.is_none() {
        return Err(ProfileError::invalid_rule(column, "range has no bounds"));
    }
    Ok((lo, hi))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    /// 1-based data row number.
    pub row: usize,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCheck {
    pub column: String,
    pub rule: String,
    pub checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub failure_percent: f64,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisabledRule {
    pub column: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionCheck {
    pub expression: String,
    pub checked: usize,
    pub passed: usize,
    pub failed: usize,
    /// Rows the expression could not be evaluated for; they count as failed.
    pub errors: usize,
    pub failure_percent: f64,
    pub failing_rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CorrectnessReport {
    pub row_count: usize,
    pub checks: Vec<ColumnCheck>,
    pub disabled: Vec<DisabledRule>,
    /// Rules naming columns that are not in the table.
    pub skipped: Vec<String>,
    pub expression: Option<ExpressionCheck>,
}

impl CorrectnessReport {
    /// 0-based indices of rows failing any check, ascending.
    pub fn failing_rows(&self) -> Vec<usize> {
        let mut rows = BTreeSet::new();
        for check in &self.checks {
            rows.extend(check.failures.iter().map(|f| f.row - 1));
        }
        if let Some(expression) = &self.expression {
            rows.extend(expression.failing_rows.iter().map(|r| r - 1));
        }
        rows.into_iter().collect()
    }
}

pub fn check_column(column: &Column, spec: &RuleSpec, rule: &Rule, treat_blank_valid: bool) -> ColumnCheck {
    let failures = column
        .values
        .iter()
        .zip(&column.raw)
        .enumerate()
        .filter(|(_, (value, raw))| !evaluate(rule, value, raw, treat_blank_valid))
        .map(|(row, (value, raw))| Failure {
            row: row + 1,
            value: if value.is_missing() {
                MISSING_LABEL.to_string()
            } else {
                raw.clone()
            },
        })
        .collect::<Vec<_>>();
    let checked = column.len();
    let failed = failures.len();
    ColumnCheck {
        column: column.name.clone(),
        rule: spec.describe(),
        checked,
        passed: checked - failed,
        failed,
        failure_percent: percent(failed, checked),
        failures,
    }
}

pub fn check_expression(table: &Table, rule: &ExpressionRule) -> error::Result<ExpressionCheck> {
    let results = rule.evaluate_rows(table);
    let errors = results.iter().filter(|r| r.is_err()).count();
    if errors > 0 && errors == results.len() {
        let message = results
            .into_iter()
            .find_map(|r| r.err())
            .unwrap_or_default();
        return Err(ProfileError::invalid_rule(EXPRESSION_LABEL, message));
    }
    let failing_rows = results
        .iter()
        .enumerate()
        .filter(|(_, r)| !matches!(r, Ok(true)))
        .map(|(row, _)| row + 1)
        .collect::<Vec<_>>();
    let checked = results.len();
    let failed = failing_rows.len();
    Ok(ExpressionCheck {
        expression: rule.source().to_string(),
        checked,
        passed: checked - failed,
        failed,
        errors,
        failure_percent: percent(failed, checked),
        failing_rows,
    })
}

pub fn check_table(
    table: &Table,
    rules: &BTreeMap<String, RuleSpec>,
    treat_blank_valid: bool,
    expression: Option<&str>,
) -> CorrectnessReport {
    let mut report = CorrectnessReport {
        row_count: table.row_count(),
        ..CorrectnessReport::default()
    };
    for (name, spec) in rules {
        let Some(column) = table.column(name) else {
            report.skipped.push(name.clone());
            continue;
        };
        match compile_rule(name, spec) {
            Ok(rule) => report
                .checks
                .push(check_column(column, spec, &rule, treat_blank_valid)),
            Err(err) => report.disabled.push(disabled(name, err)),
        }
    }
    if let Some(source) = expression {
        match ExpressionRule::compile(source).and_then(|rule| check_expression(table, &rule)) {
            Ok(check) => report.expression = Some(check),
            Err(err) => report.disabled.push(disabled(EXPRESSION_LABEL, err)),
        }
    }
    report
}

fn disabled(column: &str, err: ProfileError) -> DisabledRule {
    let reason = match err {
        ProfileError::InvalidRule { message, .. } => message,
        other => other.to_string(),
    };
    DisabledRule {
        column: column.to_string(),
        reason,
    }
}

pub fn execute(session: &Session, args: &CorrectnessArgs) -> Result<()> {
    if args.list_presets {
        let rows = PRESETS
            .iter()
            .map(|p| vec![p.name.to_string(), p.pattern.to_string(), p.example.to_string()])
            .collect::<Vec<_>>();
        match args.read.format {
            OutputFormat::Json => report::print_json(&PRESETS)?,
            OutputFormat::Table => {
                table::print_table(&table::headers(&["preset", "pattern", "example"]), &rows)
            }
        }
        return Ok(());
    }

    let config = &session.config().correctness;
    let mut rules = config.rules.clone();
    let mut report_disabled = Vec::new();
    for argument in &args.rules {
        match parse_rule_argument(argument) {
            Ok((column, spec)) => {
                rules.insert(column, spec);
            }
            Err(err) => {
                warn!("Ignoring rule '{argument}': {err}");
                report_disabled.push(disabled(argument, err));
            }
        }
    }
    let treat_blank_valid = config.treat_blank_valid && !args.blank_invalid;
    let expression = args.expression.as_deref().or(config.expression.as_deref());
    if rules.is_empty() && expression.is_none() && report_disabled.is_empty() {
        warn!("No rules configured; pass --rule, --expr or a config file with correctness.rules");
    }
    info!(
        "Validating '{}' with {} column rule(s){}",
        session.source_name(),
        rules.len(),
        if expression.is_some() { " and a row expression" } else { "" }
    );

    let mut report = check_table(session.table(), &rules, treat_blank_valid, expression);
    report_disabled.append(&mut report.disabled);
    report.disabled = report_disabled;
    for rule in &report.disabled {
        warn!("Rule for '{}' disabled: {}", rule.column, rule.reason);
    }
    for column in &report.skipped {
        warn!("Rule for '{column}' skipped: column not found");
    }

    if let Some(path) = &args.export {
        export::write_table_rows(
            path,
            session.table(),
            &report.failing_rows(),
            session.delimiter(),
            true,
        )?;
    }

    match args.read.format {
        OutputFormat::Json => report::print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    info!(
        "{} check(s) run; {} row(s) failing at least one",
        report.checks.len() + usize::from(report.expression.is_some()),
        report.failing_rows().len()
    );
    Ok(())
}

const FAILURE_PREVIEW: usize = 50;

fn print_report(report: &CorrectnessReport) {
    let rows = report
        .checks
        .iter()
        .map(|c| {
            vec![
                c.column.clone(),
                c.rule.clone(),
                c.checked.to_string(),
                c.passed.to_string(),
                c.failed.to_string(),
                format_percent(c.failure_percent),
            ]
        })
        .chain(report.expression.iter().map(|e| {
            vec![
                EXPRESSION_LABEL.to_string(),
                e.expression.clone(),
                e.checked.to_string(),
                e.passed.to_string(),
                e.failed.to_string(),
                format_percent(e.failure_percent),
            ]
        }))
        .collect::<Vec<_>>();
    table::print_section(
        "Checks",
        &table::headers(&["column", "rule", "checked", "passed", "failed", "failed_pct"]),
        &rows,
    );

    for check in report.checks.iter().filter(|c| c.failed > 0) {
        let rows = check
            .failures
            .iter()
            .take(FAILURE_PREVIEW)
            .map(|f| vec![f.row.to_string(), f.value.clone()])
            .collect::<Vec<_>>();
        let title = if check.failed > FAILURE_PREVIEW {
            format!(
                "Failures for '{}' (first {FAILURE_PREVIEW} of {})",
                check.column, check.failed
            )
        } else {
            format!("Failures for '{}'", check.column)
        };
        table::print_section(&title, &table::headers(&["row", "value"]), &rows);
    }

    if !report.disabled.is_empty() {
        let rows = report
            .disabled
            .iter()
            .map(|d| vec![d.column.clone(), d.reason.clone()])
            .collect::<Vec<_>>();
        table::print_section("Disabled rules", &table::headers(&["column", "reason"]), &rows);
    }
    if !report.skipped.is_empty() {
        println!();
        println!("Skipped (column not found): {}", report.skipped.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestOptions, parse_text};

    fn table(text: &str) -> Table {
        parse_text(text, b',', &IngestOptions::default())
            .unwrap()
            .table
    }

    #[test]
    fn five_digit_pattern_flags_two_rows() {
        let t = table("zip\n12345\nabcd\n1234\n");
        let rules = BTreeMap::from([(
            "zip".to_string(),
            RuleSpec::Pattern(r"^\d{5}$".to_string()),
        )]);
        let report = check_table(&t, &rules, true, None);
        let check = &report.checks[0];
        assert_eq!((check.passed, check.failed), (1, 2));
        assert_eq!(
            check.failures.iter().map(|f| f.row).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(report.failing_rows(), vec![1, 2]);
    }

    #[test]
    fn patterns_are_anchored_at_start_only() {
        let rule = compile_rule("c", &RuleSpec::Pattern("ab".to_string())).unwrap();
        assert!(evaluate(&rule, &Value::Text("abc".into()), "abc", true));
        assert!(!evaluate(&rule, &Value::Text("cab".into()), "cab", true));
    }

    #[test]
    fn blanks_follow_treat_blank_valid() {
        let rule = compile_rule("c", &RuleSpec::Preset("email".to_string())).unwrap();
        assert!(evaluate(&rule, &Value::Missing, "", true));
        assert!(!evaluate(&rule, &Value::Missing, "", false));
    }

    #[test]
    fn ranges_are_inclusive_and_reject_non_numbers() {
        let rule = compile_rule(
            "age",
            &RuleSpec::NumericRange {
                min: Some(0.0),
                max: Some(120.0),
            },
        )
        .unwrap();
        assert!(evaluate(&rule, &Value::Integer(0), "0", true));
        assert!(evaluate(&rule, &Value::Integer(120), "120", true));
        assert!(!evaluate(&rule, &Value::Integer(121), "121", true));
        assert!(!evaluate(&rule, &Value::Text("old".into()), "old", true));
    }

    #[test]
    fn date_ranges_compare_calendar_dates() {
        let rule = compile_rule(
            "joined",
            &RuleSpec::DateRange {
                min: Some("2020-01-01".to_string()),
                max: None,
            },
        )
        .unwrap();
        let date = |s: &str| Value::Date(parse_naive_date(s).unwrap());
        assert!(evaluate(&rule, &date("2020-01-01"), "2020-01-01", true));
        assert!(!evaluate(&rule, &date("2019-12-31"), "2019-12-31", true));
        assert!(evaluate(&rule, &Value::Text("01/02/2021".into()), "01/02/2021", true));
    }

    #[test]
    fn invalid_rules_disable_only_their_column() {
        let t = table("a,b\nx,1\ny,2\n");
        let rules = BTreeMap::from([
            ("a".to_string(), RuleSpec::Pattern("(".to_string())),
            (
                "b".to_string(),
                RuleSpec::NumericRange {
                    min: Some(5.0),
                    max: Some(1.0),
                },
            ),
            ("c".to_string(), RuleSpec::Pattern("x".to_string())),
        ]);
        let report = check_table(&t, &rules, true, None);
        assert!(report.checks.is_empty());
        assert_eq!(
            report
                .disabled
                .iter()
                .map(|d| d.column.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(report.skipped, vec!["c".to_string()]);
    }

    #[test]
    fn unbalanced_patterns_are_invalid_not_rewritten() {
        for pattern in ["a)|(b", "x)(?:y"] {
            let err = compile_rule("c", &RuleSpec::Pattern(pattern.to_string())).unwrap_err();
            assert!(matches!(err, ProfileError::InvalidRule { .. }), "{pattern}");
        }
    }

    #[test]
    fn parses_rule_arguments() {
        assert_eq!(
            parse_rule_argument(r"zip=pattern:^\d{5}$").unwrap(),
            ("zip".to_string(), RuleSpec::Pattern(r"^\d{5}$".to_string()))
        );
        assert_eq!(
            parse_rule_argument("age=range:..120").unwrap().1,
            RuleSpec::NumericRange {
                min: None,
                max: Some(120.0)
            }
        );
        assert_eq!(
            parse_rule_argument("joined=date-range:2020-01-01..").unwrap().1,
            RuleSpec::DateRange {
                min: Some("2020-01-01".to_string()),
                max: None
            }
        );
        assert!(parse_rule_argument("age=range:..").is_err());
        assert!(parse_rule_argument("age").is_err());
        assert!(parse_rule_argument("age=between:1..2").is_err());
    }

    #[test]
    fn expression_failures_and_errors_count_against_rows() {
        let t = table("age,limit\n30,100\n150,100\n,100\n");
        let report = check_table(&t, &BTreeMap::new(), true, Some("age <= limit"));
        let check = report.expression.unwrap();
        assert_eq!(check.failing_rows, vec![2, 3]);
        assert_eq!(check.errors, 1);
        assert_eq!(check.passed, 1);
    }

    #[test]
    fn expression_that_never_evaluates_is_disabled() {
        let t = table("age\n30\n40\n");
        let report = check_table(&t, &BTreeMap::new(), true, Some("unknown_column > 1"));
        assert!(report.expression.is_none());
        assert_eq!(report.disabled[0].column, EXPRESSION_LABEL);
    }

    #[test]
    fn every_preset_compiles() {
        for preset in PRESETS {
            let rule = compile_rule(preset.name, &RuleSpec::Preset(preset.name.to_string()))
                .unwrap_or_else(|err| panic!("{}: {err}", preset.name));
            assert!(
                evaluate(&rule, &Value::Text(preset.example.into()), preset.example, false),
                "{} should accept {}",
                preset.name,
                preset.example
            );
        }
    }
}
