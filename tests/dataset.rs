//! Data-set parsing, application and export.

use pgrider::{
    dataset::{export_tables, DataSet},
    error::Error,
    mem::MemStore,
    query::{SqlValue, TableStore},
};

const TABLE: &str = "example.pet";

#[test]
fn parses_typed_scalars_in_declaration_order() {
    let ds = DataSet::parse(
        "pets",
        "example.pet:
  - name: buttons
    age: 3
    weight: 4.5
    vaccinated: true
    chip: null
",
    )
    .unwrap();

    assert_eq!(ds.name(), "pets");
    assert_eq!(ds.tables().collect::<Vec<_>>(), ["example.pet"]);
    let rows = ds.rows(TABLE).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0],
        vec![
            ("name".to_string(), SqlValue::Text("buttons".to_string())),
            ("age".to_string(), SqlValue::Int(3)),
            ("weight".to_string(), SqlValue::Float(4.5)),
            ("vaccinated".to_string(), SqlValue::Bool(true)),
            ("chip".to_string(), SqlValue::Null),
        ]
    );
}

#[test]
fn null_table_body_declares_zero_rows() {
    let ds = DataSet::parse("empty", "example.pet:\n").unwrap();
    assert!(ds.rows(TABLE).unwrap().is_empty());
    assert_eq!(ds.rows("example.ghost"), None);
}

#[test]
fn rejects_documents_of_the_wrong_shape() {
    for text in [
        "just a string\n",
        "example.pet: 3\n",
        "example.pet:\n  - just a string\n",
        "example.pet:\n  - name: [nested, list]\n",
    ] {
        match DataSet::parse("bad", text) {
            Err(Error::FixtureShape { name, .. }) => assert_eq!(name, "bad"),
            other => panic!("expected FixtureShape for {text:?}, got {other:?}"),
        }
    }
}

#[test]
fn rejects_invalid_yaml() {
    match DataSet::parse("bad", "example.pet: [unclosed\n") {
        Err(Error::FixtureParse { .. }) => (),
        other => panic!("expected FixtureParse, got {other:?}"),
    }
}

#[test]
fn missing_file_is_a_read_error() {
    match DataSet::load("tests/fixtures/absent.yml") {
        Err(Error::FixtureRead { .. }) => (),
        other => panic!("expected FixtureRead, got {other:?}"),
    }
}

#[tokio::test]
async fn apply_replaces_existing_rows_then_clean_truncates() {
    let mut store = MemStore::with_tables([TABLE]);
    store
        .insert_row(
            TABLE,
            &[("name".to_string(), SqlValue::Text("junk".to_string()))],
        )
        .await
        .unwrap();

    let ds = DataSet::parse("pets", "example.pet:\n  - name: one\n  - name: two\n").unwrap();
    ds.apply(&mut store).await.unwrap();

    let snapshot = store.snapshot(TABLE).await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot.rows[0],
        vec![("name".to_string(), SqlValue::Text("one".to_string()))]
    );

    ds.clean(&mut store).await.unwrap();
    assert_eq!(store.count_rows(TABLE).await.unwrap(), 0);
}

#[tokio::test]
async fn export_writes_a_loadable_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.yml");

    let mut store = MemStore::with_tables([TABLE]);
    store
        .insert_row(
            TABLE,
            &[
                ("name".to_string(), SqlValue::Text("buttons".to_string())),
                ("age".to_string(), SqlValue::Int(3)),
            ],
        )
        .await
        .unwrap();

    export_tables(&mut store, &[TABLE.to_string()], &path)
        .await
        .unwrap();

    let artifact = DataSet::load(&path).unwrap();
    let snapshot = store.snapshot(TABLE).await.unwrap();
    assert_eq!(artifact.rows(TABLE), Some(snapshot.rows.as_slice()));
}

#[tokio::test]
async fn unwritable_export_path_is_an_export_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("out.yml");

    let mut store = MemStore::with_tables([TABLE]);
    match export_tables(&mut store, &[TABLE.to_string()], &path).await {
        Err(Error::ExportWrite { .. }) => (),
        other => panic!("expected ExportWrite, got {other:?}"),
    }
}
