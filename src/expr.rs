use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, DefaultNumericTypes, EvalexprError,
    Function, HashMapContext, Node, Value as EvalValue, build_operator_tree,
};
use heck::ToSnakeCase;
use regex::Regex;

use crate::{
    data::{Value, parse_naive_date},
    error::{ProfileError, Result},
    ingest::Table,
};

type EvalResult<T> = std::result::Result<T, EvalexprError<DefaultNumericTypes>>;

/// Column label used when an expression failure is reported.
pub const EXPRESSION_LABEL: &str = "<expression>";

/// A compiled row-level boolean expression.
///
/// Columns are bound under their snake_case name (`Order Date` becomes
/// `order_date`) and positionally as `c0`, `c1`, ... Missing cells are bound
/// as the empty value, which `is_missing(x)` detects.
#[derive(Debug)]
pub struct ExpressionRule {
    source: String,
    tree: Node<DefaultNumericTypes>,
}

impl ExpressionRule {
    pub fn compile(source: &str) -> Result<Self> {
        let tree = build_operator_tree::<DefaultNumericTypes>(source)
            .map_err(|err| ProfileError::invalid_rule(EXPRESSION_LABEL, err.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression for every row. `Err` entries carry the
    /// evaluation message for rows the expression could not be applied to.
    pub fn evaluate_rows(&self, table: &Table) -> Vec<std::result::Result<bool, String>> {
        let bindings = column_bindings(&table.headers());
        (0..table.row_count())
            .map(|row| {
                let context = build_context(table, row, &bindings).map_err(|e| e.to_string())?;
                self.tree
                    .eval_with_context(&context)
                    .map(eval_value_truthy)
                    .map_err(|e| e.to_string())
            })
            .collect()
    }
}

/// Pairs each column index with the snake_case identifier it is bound to;
/// later columns whose identifier collides are only reachable as `cN`.
fn column_bindings(headers: &[String]) -> Vec<(usize, Option<String>)> {
    let mut taken = std::collections::HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let canon = header.to_snake_case();
            let name = (!canon.is_empty() && taken.insert(canon.clone())).then_some(canon);
            (idx, name)
        })
        .collect()
}

fn build_context(
    table: &Table,
    row: usize,
    bindings: &[(usize, Option<String>)],
) -> EvalResult<HashMapContext<DefaultNumericTypes>> {
    let mut context = HashMapContext::<DefaultNumericTypes>::new();
    register_functions(&mut context)?;
    for (idx, name) in bindings {
        let value = value_to_evalexpr(table.value(row, *idx));
        if let Some(name) = name {
            context.set_value(name.clone(), value.clone())?;
        }
        context.set_value(format!("c{idx}"), value)?;
    }
    context.set_value("row_number".to_string(), EvalValue::Int(row as i64 + 1))?;
    Ok(context)
}

fn register_functions(context: &mut HashMapContext<DefaultNumericTypes>) -> EvalResult<()> {
    context.set_function(
        "is_missing".into(),
        Function::new(|argument| Ok(EvalValue::Boolean(matches!(argument, EvalValue::Empty)))),
    )?;

    context.set_function(
        "matches".into(),
        Function::new(|arguments| {
            let args = expect_args(arguments, 2, "matches")?;
            let value = match &args[0] {
                EvalValue::Empty => return Ok(EvalValue::Boolean(false)),
                EvalValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            let pattern = expect_string(&args[1], "pattern")?;
            let regex = anchored_regex(pattern)
                .map_err(|err| eval_error(&format!("Invalid regex: {err}")))?;
            Ok(EvalValue::Boolean(regex.is_match(&value)))
        }),
    )?;

    context.set_function(
        "date_diff_days".into(),
        Function::new(|arguments| {
            let args = expect_args(arguments, 2, "date_diff_days")?;
            let end = parse_date_arg(&args[0])?;
            let start = parse_date_arg(&args[1])?;
            Ok(EvalValue::Int((end - start).num_days()))
        }),
    )?;

    Ok(())
}

fn expect_args(
    arguments: &EvalValue,
    expected: usize,
    name: &str,
) -> EvalResult<Vec<EvalValue>> {
    match arguments {
        EvalValue::Tuple(values) => {
            if values.len() != expected {
                return Err(EvalexprError::wrong_function_argument_amount(
                    values.len(),
                    expected,
                ));
            }
            Ok(values.clone())
        }
        value if expected == 1 => Ok(vec![value.clone()]),
        _ => Err(eval_error(&format!(
            "{name} expects {expected} arguments provided as a tuple"
        ))),
    }
}

fn eval_error(message: &str) -> EvalexprError<DefaultNumericTypes> {
    EvalexprError::CustomMessage(message.to_string())
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> EvalResult<&'a str> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("Expected string for {name}")))
    }
}

fn parse_date_arg(value: &EvalValue) -> EvalResult<chrono::NaiveDate> {
    let raw = expect_string(value, "date")?;
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    parse_naive_date(date_part).ok_or_else(|| eval_error(&format!("Invalid date '{raw}'")))
}

pub fn value_to_evalexpr(value: &Value) -> EvalValue {
    match value {
        Value::Missing => EvalValue::Empty,
        Value::Integer(i) => EvalValue::Int(*i),
        Value::Float(f) => EvalValue::Float(*f),
        Value::Boolean(b) => EvalValue::Boolean(*b),
        Value::Date(d) => EvalValue::String(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => EvalValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Text(s) => EvalValue::String(s.clone()),
    }
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}

/// Compiles `pattern` to match from the start of a cell. The pattern is
/// validated on its own first: wrapping an unbalanced pattern such as
/// `a)|(b` in a group would otherwise yield a different, valid regex.
pub(crate) fn anchored_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(pattern)?;
    Regex::new(&format!(r"\A(?:{pattern})"))
}
