use granary::buffer::BufferManager;
use granary::catalog::{Attribute, DataType, TableSchema};
use granary::error::GranaryError;
use granary::execution::{
    GraceHashJoinOperator, JoinOperator, NestedLoopJoinOperator, OnePassJoinOperator, TableScanner,
};
use granary::storage::heap::HeapFileManager;
use granary::storage::tuple::{TupleCodec, Value};
use granary::storage::HeapFile;
use std::sync::Arc;
use tempfile::TempDir;

fn int_schema(table: &str, columns: &[&str]) -> TableSchema {
    TableSchema::new(
        table,
        columns
            .iter()
            .map(|name| Attribute::new(*name, DataType::Int, false, false))
            .collect(),
        false,
    )
}

fn fill_table(
    dir: &TempDir,
    name: &str,
    schema: &TableSchema,
    rows: &[Vec<Value>],
    buffer: &BufferManager,
) -> Arc<HeapFile> {
    let file = Arc::new(HeapFile::create(dir.path().join(name)).unwrap());
    for row in rows {
        let tuple = TupleCodec::encode(schema, row).unwrap();
        HeapFileManager::insert_tuple(&tuple, &file, buffer).unwrap();
    }
    file
}

fn result_rows(
    file: &Arc<HeapFile>,
    schema: &TableSchema,
    buffer: &Arc<BufferManager>,
) -> Vec<Vec<Value>> {
    let mut rows = TableScanner::new(file.clone(), schema.clone(), buffer.clone())
        .rows()
        .unwrap();
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

#[test]
fn one_pass_join_small() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(32));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);
    let r = fill_table(
        &temp_dir,
        "r.tbl",
        &r_schema,
        &[ints(&[1, 10]), ints(&[2, 20])],
        &buffer,
    );
    let s = fill_table(
        &temp_dir,
        "s.tbl",
        &s_schema,
        &[ints(&[1, 100]), ints(&[3, 300])],
        &buffer,
    );
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut join = OnePassJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(join.execute(5, &result).unwrap());
    assert!(join.is_complete());
    assert_eq!(join.stats().num_result_tuples, 1);
    join.print_running_stats();

    let result_schema = r_schema.natural_join(&s_schema);
    assert_eq!(
        result_rows(&result, &result_schema, &buffer),
        vec![ints(&[1, 10, 100])]
    );

    // no pin leaks: the inputs flush cleanly after the run
    buffer.flush_file(&r).unwrap();
    buffer.flush_file(&s).unwrap();
}

#[test]
fn second_execute_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(32));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &[ints(&[1, 10])], &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &[ints(&[1, 100])], &buffer);
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut join =
        OnePassJoinOperator::new(r, s, r_schema.clone(), s_schema.clone(), buffer.clone());
    assert!(join.execute(5, &result).unwrap());
    let stats_after_first = join.stats().clone();

    assert!(join.execute(5, &result).unwrap());
    assert_eq!(join.stats(), &stats_after_first);

    let result_schema = r_schema.natural_join(&s_schema);
    assert_eq!(result_rows(&result, &result_schema, &buffer).len(), 1);
}

#[test]
fn nested_loop_matches_one_pass() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(32));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);
    let rows_r = [ints(&[1, 10]), ints(&[2, 20])];
    let rows_s = [ints(&[1, 100]), ints(&[3, 300])];
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &rows_r, &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &rows_s, &buffer);

    let result_nl = Arc::new(HeapFile::create(temp_dir.path().join("nl.tbl")).unwrap());
    let mut nested = NestedLoopJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(nested.execute(3, &result_nl).unwrap());

    let result_op = Arc::new(HeapFile::create(temp_dir.path().join("op.tbl")).unwrap());
    let mut one_pass = OnePassJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(one_pass.execute(5, &result_op).unwrap());

    let result_schema = r_schema.natural_join(&s_schema);
    assert_eq!(
        result_rows(&result_nl, &result_schema, &buffer),
        result_rows(&result_op, &result_schema, &buffer)
    );
    assert_eq!(nested.stats().num_result_tuples, 1);
}

/// All three operators agree on a workload with duplicate keys on both
/// sides and a mixed-type join key.
#[test]
fn all_operators_produce_the_same_multiset() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(64));

    let r_schema = TableSchema::new(
        "r",
        vec![
            Attribute::new("k", DataType::Int, false, false),
            Attribute::new("tag", DataType::Varchar(8), false, false),
            Attribute::new("b", DataType::Int, false, false),
        ],
        false,
    );
    let s_schema = TableSchema::new(
        "s",
        vec![
            Attribute::new("tag", DataType::Varchar(8), false, false),
            Attribute::new("k", DataType::Int, false, false),
            Attribute::new("c", DataType::Char(4), false, false),
        ],
        false,
    );

    let mut rows_r = Vec::new();
    let mut rows_s = Vec::new();
    for i in 0..200 {
        rows_r.push(vec![
            Value::Int(i % 20),
            Value::Varchar(format!("t{}", i % 5)),
            Value::Int(i),
        ]);
        rows_s.push(vec![
            Value::Varchar(format!("t{}", i % 7)),
            Value::Int(i % 20),
            Value::Char(format!("c{}", i % 3)),
        ]);
    }
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &rows_r, &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &rows_s, &buffer);
    let result_schema = r_schema.natural_join(&s_schema);

    let result_op = Arc::new(HeapFile::create(temp_dir.path().join("op.tbl")).unwrap());
    let mut one_pass = OnePassJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(one_pass.execute(10, &result_op).unwrap());

    let result_nl = Arc::new(HeapFile::create(temp_dir.path().join("nl.tbl")).unwrap());
    let mut nested = NestedLoopJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(nested.execute(3, &result_nl).unwrap());

    let result_gh = Arc::new(HeapFile::create(temp_dir.path().join("gh.tbl")).unwrap());
    let mut grace = GraceHashJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(grace.execute(10, &result_gh).unwrap());

    let expected = result_rows(&result_op, &result_schema, &buffer);
    assert!(!expected.is_empty());
    assert_eq!(result_rows(&result_nl, &result_schema, &buffer), expected);
    assert_eq!(result_rows(&result_gh, &result_schema, &buffer), expected);
}

#[test]
fn one_pass_rejects_oversized_right_relation() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(64));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);

    let rows_s: Vec<Vec<Value>> = (0..2000).map(|i| ints(&[i, i * 2])).collect();
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &[ints(&[1, 1])], &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &rows_s, &buffer);
    assert!(s.page_count() > 1);

    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());
    let mut join = OnePassJoinOperator::new(r.clone(), s.clone(), r_schema, s_schema, buffer.clone());
    let err = join.execute(3, &result).unwrap_err();
    assert!(matches!(err, GranaryError::BufferExceeded(_)));
    assert!(!join.is_complete());

    // the failed run released every pin it took
    buffer.flush_file(&r).unwrap();
    buffer.flush_file(&s).unwrap();
}

#[test]
fn grace_hash_join_large_workload() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(64));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);

    // 10k rows each side, keys overlapping on exactly 1000 values
    let rows_r: Vec<Vec<Value>> = (0..10_000).map(|i| ints(&[i, i * 2])).collect();
    let rows_s: Vec<Vec<Value>> = (9_000..19_000).map(|i| ints(&[i, i + 7])).collect();
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &rows_r, &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &rows_s, &buffer);
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut grace = GraceHashJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(grace.execute(40, &result).unwrap());
    assert_eq!(grace.stats().num_result_tuples, 1000);

    let result_schema = r_schema.natural_join(&s_schema);
    let rows = result_rows(&result, &result_schema, &buffer);
    assert_eq!(rows.len(), 1000);
    assert!(rows.contains(&ints(&[9000, 18000, 9007])));

    // partition files are gone; only the three table files remain
    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["r.tbl", "result.tbl", "s.tbl"]);
}

/// A bucket that cannot fit the inner one-pass budget surfaces
/// `BufferExceeded` and leaves the operator incomplete.
#[test]
fn grace_hash_join_skewed_bucket_exceeds_budget() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(64));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);

    let rows_r: Vec<Vec<Value>> = (0..10_000).map(|i| ints(&[i, i * 2])).collect();
    let rows_s: Vec<Vec<Value>> = (9_000..19_000).map(|i| ints(&[i, i + 7])).collect();
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &rows_r, &buffer);
    let s = fill_table(&temp_dir, "s.tbl", &s_schema, &rows_s, &buffer);
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut grace = GraceHashJoinOperator::new(r, s, r_schema, s_schema, buffer);
    let err = grace.execute(5, &result).unwrap_err();
    assert!(matches!(err, GranaryError::BufferExceeded(_)));
    assert!(!grace.is_complete());
}

#[test]
fn joins_with_empty_inputs_produce_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(16));
    let r_schema = int_schema("r", &["a", "b"]);
    let s_schema = int_schema("s", &["a", "c"]);
    let r = fill_table(&temp_dir, "r.tbl", &r_schema, &[ints(&[1, 10])], &buffer);
    let s = Arc::new(HeapFile::create(temp_dir.path().join("s.tbl")).unwrap());
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut join = OnePassJoinOperator::new(
        r.clone(),
        s.clone(),
        r_schema.clone(),
        s_schema.clone(),
        buffer.clone(),
    );
    assert!(join.execute(3, &result).unwrap());
    assert_eq!(join.stats().num_result_tuples, 0);

    let mut nested = NestedLoopJoinOperator::new(s, r, s_schema, r_schema, buffer);
    assert!(nested.execute(3, &result).unwrap());
    assert_eq!(nested.stats().num_result_tuples, 0);
}

/// Disjoint column sets degenerate to a cross product.
#[test]
fn join_without_common_attributes_is_a_cross_product() {
    let temp_dir = TempDir::new().unwrap();
    let buffer = Arc::new(BufferManager::new(16));
    let r_schema = int_schema("r", &["a"]);
    let s_schema = int_schema("s", &["b"]);
    let r = fill_table(
        &temp_dir,
        "r.tbl",
        &r_schema,
        &[ints(&[1]), ints(&[2])],
        &buffer,
    );
    let s = fill_table(
        &temp_dir,
        "s.tbl",
        &s_schema,
        &[ints(&[10]), ints(&[20]), ints(&[30])],
        &buffer,
    );
    let result = Arc::new(HeapFile::create(temp_dir.path().join("result.tbl")).unwrap());

    let mut join = OnePassJoinOperator::new(r, s, r_schema.clone(), s_schema.clone(), buffer.clone());
    assert!(join.execute(5, &result).unwrap());
    assert_eq!(join.stats().num_result_tuples, 6);

    let result_schema = r_schema.natural_join(&s_schema);
    assert_eq!(result_rows(&result, &result_schema, &buffer).len(), 6);
}
