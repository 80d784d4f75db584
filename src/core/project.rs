//! Purpose: Project rows to ordered key/value maps and a JSON-equivalent tree, and back.
//! Exports: projection methods on `Table` plus the host-value/tree mapping.
//! Role: Read/write boundary between typed fields and generic consumers.
//! Invariants: Trim composes as OR between the table default and the column rule;
//! Invariants: convert runs after trim; external keys replace column names last.
//! Invariants: Dates, datetimes, and memo content are lossy in the tree; strict
//! Invariants: projection rejects them instead of stringifying.
use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Number, Value};
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::store::RowStore;
use crate::core::table::Table;
use crate::core::value::FieldValue;

impl<S: RowStore> Table<S> {
    /// Projects a row to an ordered map, applying trim, convert, and key
    /// remapping per the installed modifications.
    pub fn to_map(&self, row: &Row) -> Result<Vec<(String, FieldValue)>, Error> {
        let mut out = Vec::with_capacity(row.values().len());
        for (index, field) in row.fields().enumerate() {
            let modification = self.get_column_modification(index);
            let key = modification
                .and_then(|m| m.external_key.clone())
                .unwrap_or_else(|| field.name().to_string());

            let mut value = field.value.clone();
            let trim = self.options.trim_spaces_default
                || modification.is_some_and(|m| m.trim_spaces);
            if trim {
                value = trim_string_value(value);
            }
            if let Some(convert) = modification.and_then(|m| m.convert.as_ref()) {
                value = convert(value).map_err(|err| {
                    Error::new(ErrorKind::Projection)
                        .with_message("column conversion failed")
                        .with_column(index)
                        .with_key(&key)
                        .with_source(err)
                })?;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    /// Rebuilds a row from a map, resolving each column through its external
    /// key when one is installed. Missing keys stay at the field default;
    /// values are taken as-is and only checked by the codec on encode.
    pub fn row_from_map(&self, map: &[(String, FieldValue)]) -> Result<Row, Error> {
        let mut row = self.new_row();
        for (index, column) in self.schema.columns().iter().enumerate() {
            let key = self
                .get_column_modification(index)
                .and_then(|m| m.external_key.as_deref())
                .unwrap_or_else(|| column.name());
            if let Some((_, value)) = map.iter().find(|(candidate, _)| candidate.as_str() == key) {
                row.set_value(index, value.clone())?;
            }
        }
        Ok(row)
    }

    pub fn to_json(&self, row: &Row) -> Result<Value, Error> {
        let mut tree = Map::new();
        for (key, value) in self.to_map(row)? {
            let node = tree_from_value(value, self.options.strict_projection)
                .map_err(|err| err.with_key(&key))?;
            tree.insert(key, node);
        }
        Ok(Value::Object(tree))
    }

    pub fn row_from_json(&self, tree: &Value) -> Result<Row, Error> {
        let object = tree.as_object().ok_or_else(|| {
            Error::new(ErrorKind::Projection).with_message("row tree must be an object")
        })?;
        let mut map = Vec::with_capacity(object.len());
        for (key, node) in object {
            let value = value_from_tree(node).map_err(|err| err.with_key(key))?;
            map.push((key.clone(), value));
        }
        self.row_from_map(&map)
    }
}

fn trim_string_value(value: FieldValue) -> FieldValue {
    let trim = |text: String| {
        text.trim_matches(|c: char| c.is_ascii_whitespace())
            .to_string()
    };
    match value {
        FieldValue::Character(text) => FieldValue::Character(trim(text)),
        FieldValue::Memo(text) => FieldValue::Memo(trim(text)),
        other => other,
    }
}

fn tree_from_value(value: FieldValue, strict: bool) -> Result<Value, Error> {
    let lossy = |what: &str| {
        Error::new(ErrorKind::Projection)
            .with_message(format!("{what} does not survive a tree round trip"))
    };
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Character(text) => Ok(Value::String(text)),
        FieldValue::Integer(n) => Ok(Value::Number(Number::from(n))),
        FieldValue::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| {
                Error::new(ErrorKind::Projection).with_message("non-finite float in projection")
            }),
        FieldValue::Logical(flag) => Ok(Value::Bool(flag)),
        FieldValue::Date(_) if strict => Err(lossy("date")),
        FieldValue::Date(date) => Ok(Value::String(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ))),
        FieldValue::DateTime(_) if strict => Err(lossy("datetime")),
        FieldValue::DateTime(stamp) => stamp
            .assume_utc()
            .format(&Rfc3339)
            .map(Value::String)
            .map_err(|err| {
                Error::new(ErrorKind::Projection)
                    .with_message("datetime rendering failed")
                    .with_source(err)
            }),
        FieldValue::Memo(_) if strict => Err(lossy("memo content")),
        FieldValue::Memo(text) => Ok(Value::String(text)),
        FieldValue::Binary(_) if strict => Err(lossy("binary content")),
        FieldValue::Binary(data) => Ok(Value::String(general_purpose::STANDARD.encode(data))),
        FieldValue::BlockId(_) if strict => Err(lossy("memo block id")),
        FieldValue::BlockId(id) => Ok(Value::Number(Number::from(id))),
    }
}

fn value_from_tree(node: &Value) -> Result<FieldValue, Error> {
    match node {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(flag) => Ok(FieldValue::Logical(*flag)),
        Value::String(text) => Ok(FieldValue::Character(text.clone())),
        Value::Number(number) => {
            if let Some(n) = number.as_i64() {
                Ok(FieldValue::Integer(n))
            } else if let Some(f) = number.as_f64() {
                Ok(FieldValue::Float(f))
            } else {
                Err(Error::new(ErrorKind::Projection)
                    .with_message(format!("unrepresentable number {number}")))
            }
        }
        Value::Array(_) | Value::Object(_) => Err(Error::new(ErrorKind::Projection)
            .with_message("nested trees do not map to row fields")),
    }
}

#[cfg(test)]
mod tests {
    use super::{tree_from_value, value_from_tree};
    use crate::core::column::{Column, FieldType, Schema};
    use crate::core::error::ErrorKind;
    use crate::core::header::{FileType, Header, DESCRIPTOR_LEN};
    use crate::core::row::Row;
    use crate::core::store::MemStore;
    use crate::core::table::{Table, TableOptions};
    use crate::core::value::FieldValue;
    use serde_json::json;
    use std::sync::Arc;
    use time::macros::{date, datetime};

    fn table_over(columns: Vec<Column>, options: TableOptions) -> Table<MemStore> {
        let schema = Schema::new(columns).expect("schema");
        let header = Header {
            file_type: FileType::VisualFoxPro,
            year: 26,
            month: 1,
            day: 1,
            rows_count: 0,
            first_row: 296 + (schema.len() * DESCRIPTOR_LEN) as u16,
            row_length: schema.row_length(),
            reserved: [0; 16],
            table_flags: 0,
            code_page: 0x03,
        };
        Table::new(MemStore::new(), header, schema, options).expect("table")
    }

    #[test]
    fn external_key_and_trim() {
        let mut table = table_over(
            vec![Column::new("FIRSTNAME", FieldType::Character, 9, 0).expect("column")],
            TableOptions::new(),
        );
        table.set_column_modification(0, true, Some("first"), None);

        let frame = b"\x20  Bob    ";
        let row = Row::decode(frame, table.schema(), 0, None).expect("decode");
        let map = table.to_map(&row).expect("map");
        assert_eq!(
            map,
            vec![("first".to_string(), FieldValue::Character("Bob".to_string()))]
        );
    }

    #[test]
    fn map_round_trip_without_modifications() {
        let table = table_over(
            vec![
                Column::new("NAME", FieldType::Character, 5, 0).expect("column"),
                Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
                Column::new("OK", FieldType::Logical, 1, 0).expect("column"),
            ],
            TableOptions::new(),
        );
        let row = Row::decode(b"\x20EVE     8T", table.schema(), 0, None).expect("decode");
        let map = table.to_map(&row).expect("map");
        let rebuilt = table.row_from_map(&map).expect("rebuild");
        assert_eq!(rebuilt.values(), row.values());
    }

    #[test]
    fn default_trim_composes_with_column_trim() {
        let mut table = table_over(
            vec![
                Column::new("A", FieldType::Character, 4, 0).expect("column"),
                Column::new("B", FieldType::Character, 4, 0).expect("column"),
            ],
            TableOptions::new(),
        );
        table.set_column_modification(1, true, None, None);

        let row = Row::decode(b"\x20 a   b  ", table.schema(), 0, None).expect("decode");
        let untrimmed = table.to_map(&row).expect("map");
        assert_eq!(untrimmed[0].1, FieldValue::Character(" a  ".to_string()));
        assert_eq!(untrimmed[1].1, FieldValue::Character("b".to_string()));

        table.set_trim_spaces_default(true);
        let trimmed = table.to_map(&row).expect("map");
        assert_eq!(trimmed[0].1, FieldValue::Character("a".to_string()));
        assert_eq!(trimmed[1].1, FieldValue::Character("b".to_string()));
    }

    #[test]
    fn convert_runs_after_trim_and_errors_carry_the_key() {
        let mut table = table_over(
            vec![Column::new("NAME", FieldType::Character, 6, 0).expect("column")],
            TableOptions::new(),
        );
        table.set_column_modification(
            0,
            true,
            Some("who"),
            Some(Arc::new(|value| match value {
                FieldValue::Character(text) => {
                    assert_eq!(text, text.trim());
                    Ok(FieldValue::Character(text.to_uppercase()))
                }
                other => Ok(other),
            })),
        );

        let row = Row::decode(b"\x20 carl ", table.schema(), 0, None).expect("decode");
        let map = table.to_map(&row).expect("map");
        assert_eq!(map[0].1, FieldValue::Character("CARL".to_string()));

        table.set_column_modification(
            0,
            false,
            Some("who"),
            Some(Arc::new(|_| {
                Err(crate::core::error::Error::new(ErrorKind::ValueDecode)
                    .with_message("refused"))
            })),
        );
        let err = table.to_map(&row).expect_err("convert error");
        assert_eq!(err.kind(), ErrorKind::Projection);
        assert!(err.to_string().contains("who"));
    }

    #[test]
    fn json_tree_mapping() {
        let mut table = table_over(
            vec![
                Column::new("NAME", FieldType::Character, 5, 0).expect("column"),
                Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
                Column::new("BORN", FieldType::Date, 8, 0).expect("column"),
                Column::new("OK", FieldType::Logical, 1, 0).expect("column"),
            ],
            TableOptions::new(),
        );
        table.set_column_modification(0, true, None, None);

        let row = Row::decode(b"\x20ALICE  1220260802T", table.schema(), 0, None)
            .expect("decode");
        let tree = table.to_json(&row).expect("tree");
        assert_eq!(
            tree,
            json!({
                "NAME": "ALICE",
                "QTY": 12,
                "BORN": "2026-08-02",
                "OK": true,
            })
        );
    }

    #[test]
    fn json_round_trip_for_lossless_types() {
        let table = table_over(
            vec![
                Column::new("NAME", FieldType::Character, 5, 0).expect("column"),
                Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
            ],
            TableOptions::new(),
        );
        let row = Row::decode(b"\x20FAY     3", table.schema(), 0, None).expect("decode");
        let tree = table.to_json(&row).expect("tree");
        let rebuilt = table.row_from_json(&tree).expect("rebuild");
        assert_eq!(rebuilt.values(), row.values());
    }

    #[test]
    fn strict_projection_rejects_lossy_values() {
        let table = table_over(
            vec![Column::new("BORN", FieldType::Date, 8, 0).expect("column")],
            TableOptions {
                trim_spaces_default: false,
                strict_projection: true,
            },
        );
        let mut row = table.new_row();
        row.set_value(0, FieldValue::Date(date!(2026 - 08 - 02)))
            .expect("set");
        let err = table.to_json(&row).expect_err("strict");
        assert_eq!(err.kind(), ErrorKind::Projection);
    }

    #[test]
    fn tree_values_cover_the_tag_set() {
        assert_eq!(
            tree_from_value(FieldValue::DateTime(datetime!(2026-08-02 10:30:00)), false)
                .expect("tree"),
            json!("2026-08-02T10:30:00Z")
        );
        assert_eq!(
            tree_from_value(FieldValue::Binary(vec![1, 2, 3]), false).expect("tree"),
            json!("AQID")
        );
        assert_eq!(
            tree_from_value(FieldValue::BlockId(7), false).expect("tree"),
            json!(7)
        );
        assert_eq!(
            tree_from_value(FieldValue::Memo("note".into()), false).expect("tree"),
            json!("note")
        );

        assert_eq!(
            value_from_tree(&json!(2.5)).expect("value"),
            FieldValue::Float(2.5)
        );
        assert_eq!(
            value_from_tree(&json!(null)).expect("value"),
            FieldValue::Null
        );
        let err = value_from_tree(&json!([1])).expect_err("nested");
        assert_eq!(err.kind(), ErrorKind::Projection);
    }

    #[test]
    fn missing_map_keys_stay_null() {
        let table = table_over(
            vec![
                Column::new("NAME", FieldType::Character, 5, 0).expect("column"),
                Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
            ],
            TableOptions::new(),
        );
        let map = vec![(
            "QTY".to_string(),
            FieldValue::Integer(4),
        )];
        let row = table.row_from_map(&map).expect("row");
        assert_eq!(row.value(0).expect("value"), &FieldValue::Null);
        assert_eq!(row.value(1).expect("value"), &FieldValue::Integer(4));
    }
}
