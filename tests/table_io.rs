// End-to-end coverage over real table files: create, append, reopen, memo
// resolution, and typed record conversion.
use foxfile::api::{
    Column, FieldType, FieldValue, FileType, RowsOptions, Table, TableOptions, TableRecordsExt,
    EOF_MARKER,
};
use serde::{Deserialize, Serialize};
use std::io::Read;

fn item_columns() -> Vec<Column> {
    vec![
        Column::new("NAME", FieldType::Character, 10, 0).expect("column"),
        Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
        Column::new("PRICE", FieldType::Numeric, 8, 2).expect("column"),
    ]
}

#[test]
fn create_reopen_and_read_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("items.dbf");

    {
        let mut table =
            Table::create(&path, FileType::VisualFoxPro, item_columns(), TableOptions::new())
                .expect("create");
        assert_eq!(table.rows_count(), 0);

        let mut row = table.new_row();
        row.set_value(0, FieldValue::Character("WIDGET".to_string()))
            .expect("set");
        row.set_value(1, FieldValue::Integer(3)).expect("set");
        row.set_value(2, FieldValue::Float(9.99)).expect("set");
        table.append(&mut row).expect("append");

        let mut row = table.new_row();
        row.set_value(0, FieldValue::Character("BOLT".to_string()))
            .expect("set");
        row.set_value(1, FieldValue::Integer(250)).expect("set");
        row.set_value(2, FieldValue::Float(0.05)).expect("set");
        table.append(&mut row).expect("append");

        assert_eq!(table.rows_count(), 2);
    }

    let mut table = Table::open(&path, TableOptions::new()).expect("open");
    assert_eq!(table.rows_count(), 2);
    assert_eq!(table.column_names(), vec!["NAME", "QTY", "PRICE"]);
    assert_eq!(
        table.header().modified().expect("date"),
        time::OffsetDateTime::now_utc().date()
    );

    table.seek(1);
    let row = table.row().expect("row");
    assert_eq!(
        row.value(0).expect("value"),
        &FieldValue::Character("BOLT      ".to_string())
    );
    assert_eq!(row.value(1).expect("value"), &FieldValue::Integer(250));
    assert_eq!(row.value(2).expect("value"), &FieldValue::Float(0.05));
}

#[test]
fn append_law_over_a_real_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("items.dbf");
    let mut table =
        Table::create(&path, FileType::VisualFoxPro, item_columns(), TableOptions::new())
            .expect("create");

    for qty in 0..3 {
        let mut row = table.new_row();
        row.set_value(1, FieldValue::Integer(qty)).expect("set");
        let before = table.rows_count();
        table.append(&mut row).expect("append");
        assert_eq!(table.rows_count(), before + 1);
        assert_eq!(row.position, before);

        table.seek(row.position);
        let read_back = table.row().expect("row");
        assert_eq!(read_back.value(1).expect("value"), &FieldValue::Integer(qty));
    }
}

#[test]
fn eof_marker_is_written_and_tolerated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("items.dbf");
    {
        let mut table =
            Table::create(&path, FileType::VisualFoxPro, item_columns(), TableOptions::new())
                .expect("create");
        let mut row = table.new_row();
        row.set_value(0, FieldValue::Character("LAST".to_string()))
            .expect("set");
        table.append(&mut row).expect("append");
    }

    let mut bytes = Vec::new();
    std::fs::File::open(&path)
        .expect("open")
        .read_to_end(&mut bytes)
        .expect("read");
    assert_eq!(bytes.last(), Some(&EOF_MARKER));

    let mut table = Table::open(&path, TableOptions::new()).expect("reopen");
    let rows = table
        .rows(RowsOptions {
            skip_invalid: false,
            skip_deleted: false,
        })
        .expect("rows");
    assert_eq!(rows.len(), 1);
}

#[test]
fn deleted_rows_survive_reopen_and_filter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("items.dbf");
    {
        let mut table =
            Table::create(&path, FileType::VisualFoxPro, item_columns(), TableOptions::new())
                .expect("create");
        for name in ["KEEP", "DROP", "ALSO"] {
            let mut row = table.new_row();
            row.set_value(0, FieldValue::Character(name.to_string()))
                .expect("set");
            table.append(&mut row).expect("append");
        }
        table.seek(1);
        let mut doomed = table.row().expect("row");
        table.delete(&mut doomed).expect("delete");
    }

    let mut table = Table::open(&path, TableOptions::new()).expect("open");
    let survivors = table
        .rows(RowsOptions {
            skip_invalid: false,
            skip_deleted: true,
        })
        .expect("rows");
    let names: Vec<_> = survivors
        .iter()
        .map(|row| row.value(0).expect("value").clone())
        .collect();
    assert_eq!(
        names,
        vec![
            FieldValue::Character("KEEP      ".to_string()),
            FieldValue::Character("ALSO      ".to_string()),
        ]
    );
}

#[test]
fn memo_content_round_trips_through_the_companion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.dbf");
    let note = "a note long enough to span several memo blocks ".repeat(5);
    {
        let mut table = Table::create(
            &path,
            FileType::VisualFoxPro,
            vec![
                Column::new("TITLE", FieldType::Character, 8, 0).expect("column"),
                Column::new("BODY", FieldType::Memo, 4, 0).expect("column"),
            ],
            TableOptions::new(),
        )
        .expect("create");
        assert!(table.header().has_memo());

        let mut row = table.new_row();
        row.set_value(0, FieldValue::Character("FIRST".to_string()))
            .expect("set");
        row.set_value(1, FieldValue::Memo(note.clone())).expect("set");
        table.append(&mut row).expect("append");
    }
    assert!(path.with_extension("fpt").exists());

    let mut table = Table::open(&path, TableOptions::new()).expect("open");
    let row = table.row().expect("row");
    assert_eq!(row.value(1).expect("value"), &FieldValue::Memo(note));
}

#[test]
fn typed_records_round_trip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    struct Item {
        name: String,
        qty: i64,
        price: f64,
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("items.dbf");
    let mut table =
        Table::create(&path, FileType::VisualFoxPro, item_columns(), TableOptions::new())
            .expect("create");
    table.set_trim_spaces_default(true);

    let mut row = table
        .row_from_record(&Item {
            name: "GEAR".to_string(),
            qty: 11,
            price: 2.50,
        })
        .expect("row");
    table.append(&mut row).expect("append");

    table.seek(0);
    let read_back = table.row().expect("row");
    let item: Item = table.record(&read_back).expect("record");
    assert_eq!(
        item,
        Item {
            name: "GEAR".to_string(),
            qty: 11,
            price: 2.50,
        }
    );
}
