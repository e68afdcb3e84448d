mod common;

use std::collections::BTreeSet;

use common::TestWorkspace;
use csv_quality::{
    compare::{RowKey, diff_by_key, diff_multiset, schema_changes},
    error::{ProfileError, Side},
    ingest::{IngestOptions, Table, parse_text},
};
use proptest::prelude::*;

fn table(text: &str) -> Table {
    parse_text(text, b',', &IngestOptions::default())
        .expect("parse table")
        .table
}

fn id_key() -> Vec<String> {
    vec!["id".to_string()]
}

#[test]
fn snapshot_files_diff_by_key() {
    let workspace = TestWorkspace::new();
    let old = workspace.open("old.csv", "id,name,score\n1,A,10\n2,B,20\n3,C,30\n");
    let new = old
        .load_companion(&workspace.write("new.csv", "id,name,score,grade\n1,A,10.0,x\n2,B,25,y\n4,D,40,z\n"))
        .unwrap();

    let diff = diff_by_key(old.table(), &new.table, &id_key()).unwrap();
    let keys = |rows: &[csv_quality::compare::KeyedRow]| {
        rows.iter().map(|r| r.key.to_string()).collect::<Vec<_>>()
    };
    assert_eq!(keys(&diff.added), vec!["4"]);
    assert_eq!(keys(&diff.removed), vec!["3"]);
    assert_eq!(diff.updated.len(), 1);
    assert_eq!(diff.updated[0].key.to_string(), "2");
    assert_eq!(diff.updated[0].changes[0].column, "score");
    assert_eq!(diff.unchanged.len(), 1);
    assert_eq!(diff.compared_columns, vec!["name", "score"]);

    let schema = schema_changes(old.table(), &new.table);
    assert_eq!(schema.added_columns, vec!["grade"]);
    assert!(schema.type_changes.is_empty());
}

#[test]
fn repeated_key_in_new_snapshot_is_rejected() {
    let old = table("id,v\n1,a\n2,b\n");
    let new = table("id,v\n1,a\n2,b\n2,c\n");
    match diff_by_key(&old, &new, &id_key()) {
        Err(ProfileError::DuplicateKey { side, key }) => {
            assert_eq!(side, Side::New);
            assert_eq!(key, "2");
        }
        other => panic!("expected duplicate key error, got {other:?}"),
    }
}

#[test]
fn baseline_types_decide_equality() {
    let old = table("id,code\n1,A01\n2,B02\n3,007\n");
    let new = table("id,code\n1,A01\n2,B02\n3,7\n");
    let diff = diff_by_key(&old, &new, &id_key()).unwrap();
    assert_eq!(diff.updated.len(), 1);
    assert_eq!(diff.updated[0].changes[0].before.as_deref(), Some("007"));
    assert_eq!(diff.updated[0].changes[0].after.as_deref(), Some("7"));
}

#[test]
fn key_free_diff_reports_row_counts() {
    let old = table("name,city\nAnn,Leeds\nBob,York\n");
    let new = table("city,name\nYork,Bob\nHull,Cy\n");
    let diff = diff_multiset(&old, &new);
    assert_eq!(diff.compared_columns, vec!["name", "city"]);
    assert_eq!(diff.added, vec![1]);
    assert_eq!(diff.removed, vec![0]);
    assert_eq!(diff.unchanged_count, 1);
}

#[test]
fn adjacent_wide_identifiers_are_distinct_keys() {
    let old = table("id,v\n12345678901234567,a\n12345678901234568,b\n");
    let new = table("id,v\n12345678901234568,b\n12345678901234569,c\n");
    let diff = diff_by_key(&old, &new, &id_key()).unwrap();
    assert_eq!(diff.removed[0].key.to_string(), "12345678901234567");
    assert_eq!(diff.added[0].key.to_string(), "12345678901234569");
    assert_eq!(diff.unchanged.len(), 1);
}

#[test]
fn tiny_float_changes_are_updates() {
    let old = table("id,v\n1,0.0000001\n2,1.5\n");
    let new = table("id,v\n1,0.0000002\n2,1.50\n");
    let diff = diff_by_key(&old, &new, &id_key()).unwrap();
    assert_eq!(diff.updated.len(), 1);
    let change = &diff.updated[0].changes[0];
    assert_eq!(change.before.as_deref(), Some("0.0000001"));
    assert_eq!(change.after.as_deref(), Some("0.0000002"));
    assert_eq!(diff.unchanged.len(), 1);
}

// Small ids plus ids just past 2^53, where f64 stops telling neighbours apart.
fn row_id() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..30, 9_007_199_254_740_992u64..9_007_199_254_741_000]
}

fn snapshot() -> impl Strategy<Value = Vec<(u64, String)>> {
    prop::collection::btree_map(row_id(), "[a-d]{0,2}", 0..20)
        .prop_map(|rows| rows.into_iter().collect())
}

fn render(rows: &[(u64, String)]) -> Table {
    let mut text = String::from("id,name,marker\n");
    for (id, name) in rows {
        text.push_str(&format!("{id},{name},m\n"));
    }
    table(&text)
}

proptest! {
    #[test]
    fn keyed_diff_partitions_all_keys(old_rows in snapshot(), new_rows in snapshot()) {
        let old = render(&old_rows);
        let new = render(&new_rows);
        let diff = diff_by_key(&old, &new, &id_key()).unwrap();

        let added = diff.added.iter().map(|r| r.key.clone()).collect::<BTreeSet<_>>();
        let removed = diff.removed.iter().map(|r| r.key.clone()).collect::<BTreeSet<_>>();
        let updated = diff.updated.iter().map(|r| r.key.clone()).collect::<BTreeSet<_>>();
        let unchanged = diff.unchanged.iter().cloned().collect::<BTreeSet<_>>();
        prop_assert!(added.is_disjoint(&removed));
        prop_assert!(updated.is_disjoint(&unchanged));
        prop_assert!(added.is_disjoint(&updated) && removed.is_disjoint(&unchanged));

        let expected = old_rows
            .iter()
            .chain(new_rows.iter())
            .map(|(id, _)| RowKey(vec![Some(id.to_string())]))
            .collect::<BTreeSet<_>>();
        let mut covered = added;
        covered.extend(removed);
        covered.extend(updated);
        covered.extend(unchanged);
        prop_assert_eq!(covered, expected);
    }

    #[test]
    fn diff_against_itself_is_empty(rows in snapshot()) {
        let snapshot = render(&rows);
        let diff = diff_by_key(&snapshot, &snapshot, &id_key()).unwrap();
        prop_assert!(diff.added.is_empty());
        prop_assert!(diff.removed.is_empty());
        prop_assert!(diff.updated.is_empty());
        prop_assert_eq!(diff.unchanged.len(), rows.len());

        let multiset = diff_multiset(&snapshot, &snapshot);
        prop_assert!(multiset.added.is_empty() && multiset.removed.is_empty());
    }
}
