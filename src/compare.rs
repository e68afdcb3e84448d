//! Snapshot comparison: schema changes plus a keyed or key-free row diff.
//!
//! The newer table is always re-read under the baseline's column types
//! before rows are compared, so `7` and `7.0` or `001` read as text in the
//! baseline compare the way the baseline sees them.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
};

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Serialize, Serializer};

use crate::{
    cli::{DiffArgs, OutputFormat},
    data::MISSING_LABEL,
    error::{self, ProfileError, Side},
    export,
    ingest::{ColumnType, Table},
    report,
    session::Session,
    table,
};

/// Exact texts of the key columns for one row; `None` is a missing cell
/// and compares as a value of its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub Vec<Option<String>>);

impl RowKey {
    pub fn parts(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|part| part.clone().unwrap_or_else(|| MISSING_LABEL.to_string()))
            .collect()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts().join(", "))
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedRow {
    pub key: RowKey,
    /// Row index in the table the key came from.
    #[serde(skip)]
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub column: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedRow {
    pub key: RowKey,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub key_columns: Vec<String>,
    pub compared_columns: Vec<String>,
    pub added: Vec<KeyedRow>,
    pub removed: Vec<KeyedRow>,
    pub updated: Vec<UpdatedRow>,
    pub unchanged: Vec<RowKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultisetDiff {
    pub compared_columns: Vec<String>,
    /// Row indices in the new table with no counterpart in the old one.
    pub added: Vec<usize>,
    /// Row indices in the old table with no counterpart in the new one.
    pub removed: Vec<usize>,
    pub unchanged_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeChange {
    pub column: String,
    pub before: ColumnType,
    pub after: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SchemaChanges {
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub type_changes: Vec<TypeChange>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.type_changes.is_empty()
    }
}

/// Column additions and removals, and common columns whose type family
/// differs (a whole-number column gaining decimals is not a change).
pub fn schema_changes(old: &Table, new: &Table) -> SchemaChanges {
    let old_names = old.headers();
    let new_names = new.headers();
    let type_changes = old
        .columns()
        .iter()
        .filter_map(|before| {
            let after = new.column(&before.name)?;
            (before.column_type.family() != after.column_type.family()).then(|| TypeChange {
                column: before.name.clone(),
                before: before.column_type,
                after: after.column_type,
            })
        })
        .collect();
    SchemaChanges {
        added_columns: new_names
            .iter()
            .filter(|name| !old_names.contains(name))
            .cloned()
            .collect(),
        removed_columns: old_names
            .iter()
            .filter(|name| !new_names.contains(name))
            .cloned()
            .collect(),
        type_changes,
    }
}

fn resolve_key_columns(table: &Table, key_columns: &[String], side: Side) -> error::Result<Vec<usize>> {
    key_columns
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                ProfileError::malformed(format!("key column '{name}' is missing from the {side} table"))
            })
        })
        .collect()
}

/// Maps each row key to its row index; a repeated key is an error.
pub fn index_by_key(table: &Table, key_indices: &[usize], side: Side) -> error::Result<BTreeMap<RowKey, usize>> {
    let mut index = BTreeMap::new();
    for row in 0..table.row_count() {
        let key = RowKey(table.exact_signature(row, key_indices));
        if index.contains_key(&key) {
            return Err(ProfileError::DuplicateKey {
                side,
                key: key.to_string(),
            });
        }
        index.insert(key, row);
    }
    Ok(index)
}

/// Columns present in both tables, in the old table's order.
fn common_columns(old: &Table, new: &Table, exclude: &[String]) -> Vec<String> {
    old.headers()
        .into_iter()
        .filter(|name| new.column(name).is_some() && !exclude.contains(name))
        .collect()
}

pub fn diff_by_key(old: &Table, new: &Table, key_columns: &[String]) -> error::Result<RowDiff> {
    if key_columns.is_empty() {
        return Err(ProfileError::malformed("no row key columns given"));
    }
    let new = new.coerce_to(&old.column_types());
    let old_key = resolve_key_columns(old, key_columns, Side::Old)?;
    let new_key = resolve_key_columns(&new, key_columns, Side::New)?;
    let old_index = index_by_key(old, &old_key, Side::Old)?;
    let new_index = index_by_key(&new, &new_key, Side::New)?;

    let compared_columns = common_columns(old, &new, key_columns);
    let pairs = compared_columns
        .iter()
        .filter_map(|name| Some((old.column(name)?, new.column(name)?)))
        .collect::<Vec<_>>();

    let mut diff = RowDiff {
        key_columns: key_columns.to_vec(),
        compared_columns: compared_columns.clone(),
        added: Vec::new(),
        removed: Vec::new(),
        updated: Vec::new(),
        unchanged: Vec::new(),
    };
    for (key, old_row) in &old_index {
        let Some(new_row) = new_index.get(key) else {
            diff.removed.push(KeyedRow {
                key: key.clone(),
                row: *old_row,
            });
            continue;
        };
        let changes = pairs
            .iter()
            .filter_map(|(before, after)| {
                let old_value = before.values[*old_row].exact();
                let new_value = after.values[*new_row].exact();
                (old_value != new_value).then(|| FieldChange {
                    column: before.name.clone(),
                    before: old_value,
                    after: new_value,
                })
            })
            .collect::<Vec<_>>();
        if changes.is_empty() {
            diff.unchanged.push(key.clone());
        } else {
            diff.updated.push(UpdatedRow {
                key: key.clone(),
                changes,
            });
        }
    }
    diff.added = new_index
        .iter()
        .filter(|(key, _)| !old_index.contains_key(*key))
        .map(|(key, row)| KeyedRow {
            key: key.clone(),
            row: *row,
        })
        .collect();
    Ok(diff)
}

/// Key-free comparison: rows are matched by their values on the common
/// columns, one-for-one, so repeated rows must be repeated in both tables.
pub fn diff_multiset(old: &Table, new: &Table) -> MultisetDiff {
    let new = new.coerce_to(&old.column_types());
    let compared_columns = common_columns(old, &new, &[]);
    let old_idx = compared_columns
        .iter()
        .filter_map(|name| old.column_index(name))
        .collect::<Vec<_>>();
    let new_idx = compared_columns
        .iter()
        .filter_map(|name| new.column_index(name))
        .collect::<Vec<_>>();

    let mut pending: HashMap<Vec<Option<String>>, VecDeque<usize>> = HashMap::new();
    for row in 0..old.row_count() {
        pending
            .entry(old.row_signature(row, &old_idx))
            .or_default()
            .push_back(row);
    }

    let mut added = Vec::new();
    let mut matched = HashSet::new();
    for row in 0..new.row_count() {
        let signature = new.row_signature(row, &new_idx);
        match pending.get_mut(&signature).and_then(VecDeque::pop_front) {
            Some(old_row) => {
                matched.insert(old_row);
            }
            None => added.push(row),
        }
    }
    let removed = (0..old.row_count())
        .filter(|row| !matched.contains(row))
        .collect();

    MultisetDiff {
        compared_columns,
        added,
        removed,
        unchanged_count: matched.len(),
    }
}

#[derive(Debug, Serialize)]
struct DiffReport<'a> {
    old_rows: usize,
    new_rows: usize,
    schema: &'a SchemaChanges,
    #[serde(skip_serializing_if = "Option::is_none")]
    keyed: Option<&'a RowDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multiset: Option<&'a MultisetDiff>,
}

pub fn execute(session: &Session, args: &DiffArgs) -> Result<()> {
    let old = session.table();
    let companion = session.load_companion(&args.new)?;
    let new = &companion.table;
    let key_columns = if args.key.is_empty() {
        session.config().compare.row_key.clone()
    } else {
        args.key
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    };
    info!(
        "Comparing {:?} against baseline {:?}{}",
        args.new,
        session.source(),
        if key_columns.is_empty() {
            " without a row key".to_string()
        } else {
            format!(" on key {key_columns:?}")
        }
    );

    let schema = schema_changes(old, new);
    debug!("Schema changes: {schema:?}");
    let delimiter = session.delimiter();

    if key_columns.is_empty() {
        let diff = diff_multiset(old, new);
        if let Some(path) = &args.export_added {
            export::write_table_rows(path, new, &diff.added, delimiter, false)?;
        }
        if let Some(path) = &args.export_removed {
            export::write_table_rows(path, old, &diff.removed, delimiter, false)?;
        }
        if args.export_updated.is_some() {
            warn!("--export-updated needs a row key; nothing written");
        }
        let report = DiffReport {
            old_rows: old.row_count(),
            new_rows: new.row_count(),
            schema: &schema,
            keyed: None,
            multiset: Some(&diff),
        };
        match args.read.format {
            OutputFormat::Json => report::print_json(&report)?,
            OutputFormat::Table => {
                print_schema(&schema);
                print_multiset(&diff, old, new);
            }
        }
        info!(
            "{} added, {} removed, {} unchanged row(s)",
            diff.added.len(),
            diff.removed.len(),
            diff.unchanged_count
        );
        return Ok(());
    }

    let diff = diff_by_key(old, new, &key_columns)?;
    if let Some(path) = &args.export_added {
        let rows = diff.added.iter().map(|r| r.row).collect::<Vec<_>>();
        export::write_table_rows(path, new, &rows, delimiter, false)?;
    }
    if let Some(path) = &args.export_removed {
        let rows = diff.removed.iter().map(|r| r.row).collect::<Vec<_>>();
        export::write_table_rows(path, old, &rows, delimiter, false)?;
    }
    if let Some(path) = &args.export_updated {
        let mut headers = key_columns.clone();
        headers.extend(["column", "before", "after"].map(String::from));
        let records = diff.updated.iter().flat_map(|updated| {
            updated.changes.iter().map(move |change| {
                let mut record = updated
                    .key
                    .0
                    .iter()
                    .map(|part| part.clone().unwrap_or_default())
                    .collect::<Vec<_>>();
                record.push(change.column.clone());
                record.push(change.before.clone().unwrap_or_default());
                record.push(change.after.clone().unwrap_or_default());
                record
            })
        });
        export::write_records(path, &headers, records, delimiter)?;
    }

    let report = DiffReport {
        old_rows: old.row_count(),
        new_rows: new.row_count(),
        schema: &schema,
        keyed: Some(&diff),
        multiset: None,
    };
    match args.read.format {
        OutputFormat::Json => report::print_json(&report)?,
        OutputFormat::Table => {
            print_schema(&schema);
            print_keyed(&diff);
        }
    }
    info!(
        "{} added, {} removed, {} updated, {} unchanged row(s)",
        diff.added.len(),
        diff.removed.len(),
        diff.updated.len(),
        diff.unchanged.len()
    );
    Ok(())
}

fn display(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| MISSING_LABEL.to_string())
}

fn print_schema(schema: &SchemaChanges) {
    println!("Schema changes");
    if schema.is_empty() {
        println!("(none)");
        return;
    }
    if !schema.added_columns.is_empty() {
        println!("Added columns: {}", schema.added_columns.join(", "));
    }
    if !schema.removed_columns.is_empty() {
        println!("Removed columns: {}", schema.removed_columns.join(", "));
    }
    if !schema.type_changes.is_empty() {
        let rows = schema
            .type_changes
            .iter()
            .map(|c| {
                vec![
                    c.column.clone(),
                    c.before.friendly_name().to_string(),
                    c.after.friendly_name().to_string(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&table::headers(&["column", "before", "after"]), &rows);
    }
}

fn print_keyed(diff: &RowDiff) {
    println!();
    println!(
        "Added: {}  Removed: {}  Updated: {}  Unchanged: {}",
        diff.added.len(),
        diff.removed.len(),
        diff.updated.len(),
        diff.unchanged.len()
    );
    let keys = |rows: &[KeyedRow]| {
        rows.iter()
            .map(|r| r.key.parts())
            .collect::<Vec<_>>()
    };
    table::print_section("Added keys", &diff.key_columns, &keys(&diff.added));
    table::print_section("Removed keys", &diff.key_columns, &keys(&diff.removed));

    let mut headers = diff.key_columns.clone();
    headers.extend(["column", "before", "after"].map(String::from));
    let rows = diff
        .updated
        .iter()
        .flat_map(|updated| {
            updated.changes.iter().map(|change| {
                let mut row = updated.key.parts();
                row.push(change.column.clone());
                row.push(display(&change.before));
                row.push(display(&change.after));
                row
            })
        })
        .collect::<Vec<_>>();
    table::print_section("Updated cells", &headers, &rows);
}

fn print_multiset(diff: &MultisetDiff, old: &Table, new: &Table) {
    println!();
    println!(
        "Added rows: {}  Removed rows: {}  Unchanged rows: {}",
        diff.added.len(),
        diff.removed.len(),
        diff.unchanged_count
    );
    let rows_of = |table: &Table, rows: &[usize]| {
        rows.iter()
            .map(|row| {
                diff.compared_columns
                    .iter()
                    .filter_map(|name| table.column(name))
                    .map(|column| column.values[*row].to_string())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };
    table::print_section("Added rows", &diff.compared_columns, &rows_of(new, &diff.added));
    table::print_section(
        "Removed rows",
        &diff.compared_columns,
        &rows_of(old, &diff.removed),
    );
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

    fn key(parts: &[&str]) -> RowKey {
        RowKey(parts.iter().map(|p| Some(p.to_string())).collect())
    }

    #[test]
    fn classifies_added_removed_and_updated_keys() {
        let old = table("id,name\n1,A\n2,B\n");
        let new = table("id,name\n1,A2\n3,C\n");
        let diff = diff_by_key(&old, &new, &["id".to_string()]).unwrap();
        assert_eq!(diff.added.iter().map(|r| &r.key).collect::<Vec<_>>(), vec![&key(&["3"])]);
        assert_eq!(diff.removed.iter().map(|r| &r.key).collect::<Vec<_>>(), vec![&key(&["2"])]);
        assert_eq!(
            diff.updated,
            vec![UpdatedRow {
                key: key(&["1"]),
                changes: vec![FieldChange {
                    column: "name".to_string(),
                    before: Some("A".to_string()),
                    after: Some("A2".to_string()),
                }],
            }]
        );
        assert!(diff.unchanged.is_empty());
    }

    #[test]
    fn numeric_representations_compare_equal_after_coercion() {
        let old = table("id,amount\n1,7\n2,8.5\n");
        let new = table("id,amount\n1,7.0\n2,8.50\n");
        let diff = diff_by_key(&old, &new, &["id".to_string()]).unwrap();
        assert!(diff.updated.is_empty());
        assert_eq!(diff.unchanged.len(), 2);
    }

    #[test]
    fn missing_is_compared_as_a_value() {
        let old = table("id,note\n1,x\n2,y\n");
        let new = table("id,note\n1,\n2,y\n");
        let diff = diff_by_key(&old, &new, &["id".to_string()]).unwrap();
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].changes[0].after, None);
    }

    #[test]
    fn duplicate_keys_name_the_side() {
        let old = table("id,name\n1,A\n1,B\n");
        let new = table("id,name\n1,A\n");
        assert_eq!(
            diff_by_key(&old, &new, &["id".to_string()]),
            Err(ProfileError::DuplicateKey {
                side: Side::Old,
                key: "1".to_string()
            })
        );
        assert!(matches!(
            diff_by_key(&new, &old, &["id".to_string()]),
            Err(ProfileError::DuplicateKey { side: Side::New, .. })
        ));
    }

    #[test]
    fn missing_key_column_is_malformed() {
        let old = table("id,name\n1,A\n");
        let new = table("code,name\n1,A\n");
        assert!(matches!(
            diff_by_key(&old, &new, &["id".to_string()]),
            Err(ProfileError::MalformedInput { .. })
        ));
    }

    #[test]
    fn composite_keys_sort_deterministically() {
        let old = table("region,id,v\nb,1,x\na,2,y\n");
        let new = table("region,id,v\na,2,y\nb,1,x\nc,1,z\n");
        let keys = ["region".to_string(), "id".to_string()];
        let diff = diff_by_key(&old, &new, &keys).unwrap();
        assert_eq!(diff.unchanged, vec![key(&["a", "2"]), key(&["b", "1"])]);
        assert_eq!(diff.added[0].key.to_string(), "c, 1");
    }

    #[test]
    fn schema_changes_group_numeric_types() {
        let old = table("id,amount,flag,gone\n1,2,yes,x\n2,3,no,y\n");
        let new = table("id,amount,flag,extra\n1,2.5,maybe,z\n2,3.5,nope,w\n");
        let changes = schema_changes(&old, &new);
        assert_eq!(changes.added_columns, vec!["extra".to_string()]);
        assert_eq!(changes.removed_columns, vec!["gone".to_string()]);
        assert_eq!(changes.type_changes.len(), 1);
        assert_eq!(changes.type_changes[0].column, "flag");
        assert_eq!(changes.type_changes[0].before, ColumnType::Boolean);
    }

    #[test]
    fn multiset_matches_duplicates_one_for_one() {
        let old = table("a,b\n1,x\n1,x\n2,y\n");
        let new = table("a,b\n1,x\n3,z\n2,y\n");
        let diff = diff_multiset(&old, &new);
        assert_eq!(diff.added, vec![1]);
        assert_eq!(diff.removed, vec![1]);
        assert_eq!(diff.unchanged_count, 2);
    }
}
