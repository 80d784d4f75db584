//! Purpose: Frame one table row (status byte plus column slots) and expose typed field access.
//! Exports: `Row`, `FieldRef`, `STATUS_ACTIVE`, `STATUS_DELETED`.
//! Role: Detached row value produced and consumed by the table façade.
//! Invariants: The field count always equals the schema length.
//! Invariants: Field access is bounds-checked; there is no one-past-the-end read.
use crate::core::column::{Column, Schema};
use crate::core::error::{Error, ErrorKind};
use crate::core::memo::MemoStore;
use crate::core::value::{self, FieldValue};

pub const STATUS_ACTIVE: u8 = 0x20;
pub const STATUS_DELETED: u8 = 0x2A;

/// Borrowed (column, value) view over one field of a row.
#[derive(Debug, PartialEq)]
pub struct FieldRef<'a> {
    pub column: &'a Column,
    pub value: &'a FieldValue,
}

impl<'a> FieldRef<'a> {
    pub fn name(&self) -> &'a str {
        self.column.name()
    }
}

/// One logical row. Rows hold a schema handle, not the table, so they stay
/// usable after the table is gone without extending its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    schema: Schema,
    pub position: u32,
    pub deleted: bool,
    values: Vec<FieldValue>,
}

impl Row {
    /// A fresh row with every field at its type-dependent null.
    pub fn new(schema: Schema, position: u32) -> Self {
        let values = vec![FieldValue::Null; schema.len()];
        Self {
            schema,
            position,
            deleted: false,
            values,
        }
    }

    pub fn decode(
        bytes: &[u8],
        schema: &Schema,
        position: u32,
        mut memo: Option<&mut dyn MemoStore>,
    ) -> Result<Self, Error> {
        let row_length = usize::from(schema.row_length());
        if bytes.len() < row_length {
            return Err(Error::new(ErrorKind::ShortRow)
                .with_message(format!(
                    "row frame is {} bytes, expected {row_length}",
                    bytes.len()
                ))
                .with_row(position));
        }
        let deleted = match bytes[0] {
            STATUS_ACTIVE => false,
            STATUS_DELETED => true,
            byte => {
                return Err(Error::new(ErrorKind::MalformedRow)
                    .with_message(format!("invalid status byte 0x{byte:02X}"))
                    .with_row(position))
            }
        };

        let mut values = Vec::with_capacity(schema.len());
        let mut offset = 1usize;
        for (index, column) in schema.columns().iter().enumerate() {
            let slot = &bytes[offset..offset + usize::from(column.length)];
            let value = value::decode(
                slot,
                column,
                match memo {
                    Some(ref mut inner) => Some(&mut **inner),
                    None => None,
                },
            )
            .map_err(|err| err.with_column(index).with_row(position))?;
            values.push(value);
            offset += usize::from(column.length);
        }

        Ok(Self {
            schema: schema.clone(),
            position,
            deleted,
            values,
        })
    }

    pub fn encode(&self, mut memo: Option<&mut dyn MemoStore>) -> Result<Vec<u8>, Error> {
        if self.values.len() != self.schema.len() {
            return Err(Error::new(ErrorKind::MalformedRow)
                .with_message(format!(
                    "row has {} fields but the schema has {}",
                    self.values.len(),
                    self.schema.len()
                ))
                .with_row(self.position));
        }

        let mut buf = vec![0u8; usize::from(self.schema.row_length())];
        buf[0] = if self.deleted {
            STATUS_DELETED
        } else {
            STATUS_ACTIVE
        };
        let mut offset = 1usize;
        for (index, (column, value)) in self
            .schema
            .columns()
            .iter()
            .zip(&self.values)
            .enumerate()
        {
            let slot = value::encode(
                value,
                column,
                match memo {
                    Some(ref mut inner) => Some(&mut **inner),
                    None => None,
                },
            )
            .map_err(|err| err.with_column(index).with_row(self.position))?;
            buf[offset..offset + usize::from(column.length)].copy_from_slice(&slot);
            offset += usize::from(column.length);
        }
        Ok(buf)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn field(&self, position: usize) -> Result<FieldRef<'_>, Error> {
        match (self.schema.column(position), self.values.get(position)) {
            (Some(column), Some(value)) => Ok(FieldRef { column, value }),
            _ => Err(Error::new(ErrorKind::InvalidPosition)
                .with_message(format!(
                    "field {position} is out of range for {} columns",
                    self.values.len()
                ))
                .with_row(self.position)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        self.schema
            .columns()
            .iter()
            .zip(&self.values)
            .map(|(column, value)| FieldRef { column, value })
    }

    pub fn value(&self, position: usize) -> Result<&FieldValue, Error> {
        Ok(self.field(position)?.value)
    }

    pub fn set_value(&mut self, position: usize, value: FieldValue) -> Result<(), Error> {
        if position >= self.values.len() {
            return Err(Error::new(ErrorKind::InvalidPosition)
                .with_message(format!(
                    "field {position} is out of range for {} columns",
                    self.values.len()
                ))
                .with_row(self.position));
        }
        self.values[position] = value;
        Ok(())
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::{Row, STATUS_ACTIVE, STATUS_DELETED};
    use crate::core::column::{Column, FieldType, Schema};
    use crate::core::error::ErrorKind;
    use crate::core::value::FieldValue;

    fn name_schema() -> Schema {
        Schema::new(vec![
            Column::new("NAME", FieldType::Character, 5, 0).expect("column")
        ])
        .expect("schema")
    }

    #[test]
    fn minimal_read() {
        let schema = name_schema();
        let row = Row::decode(b"\x20ALICE", &schema, 0, None).expect("decode");
        assert!(!row.deleted);
        assert_eq!(
            row.value(0).expect("value"),
            &FieldValue::Character("ALICE".to_string())
        );
    }

    #[test]
    fn deleted_flag_is_surfaced() {
        let schema = name_schema();
        let row = Row::decode(b"\x2A     ", &schema, 3, None).expect("decode");
        assert!(row.deleted);
        assert_eq!(row.position, 3);
    }

    #[test]
    fn short_frame_is_rejected() {
        let schema = name_schema();
        let err = Row::decode(b"\x20ALI", &schema, 0, None).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::ShortRow);
    }

    #[test]
    fn bad_status_byte_is_rejected() {
        let schema = name_schema();
        let err = Row::decode(b"\x00ALICE", &schema, 0, None).expect_err("status");
        assert_eq!(err.kind(), ErrorKind::MalformedRow);
    }

    #[test]
    fn frame_round_trip() {
        let schema = Schema::new(vec![
            Column::new("NAME", FieldType::Character, 5, 0).expect("column"),
            Column::new("QTY", FieldType::Numeric, 4, 0).expect("column"),
            Column::new("OK", FieldType::Logical, 1, 0).expect("column"),
        ])
        .expect("schema");
        let frame = b"\x20BOB    12T";
        let row = Row::decode(frame, &schema, 1, None).expect("decode");
        let encoded = row.encode(None).expect("encode");
        assert_eq!(encoded, frame.to_vec());
        let again = Row::decode(&encoded, &schema, 1, None).expect("decode");
        assert_eq!(row, again);
    }

    #[test]
    fn status_byte_tracks_deleted_flag() {
        let schema = name_schema();
        let mut row = Row::new(schema, 0);
        row.set_value(0, FieldValue::Character("EVE".to_string()))
            .expect("set");
        let active = row.encode(None).expect("encode");
        assert_eq!(active[0], STATUS_ACTIVE);
        row.deleted = true;
        let deleted = row.encode(None).expect("encode");
        assert_eq!(deleted[0], STATUS_DELETED);
    }

    #[test]
    fn field_access_is_bounds_checked() {
        let schema = name_schema();
        let mut row = Row::new(schema, 0);
        assert!(row.field(0).is_ok());
        let err = row.field(1).expect_err("one past the end");
        assert_eq!(err.kind(), ErrorKind::InvalidPosition);
        let err = row
            .set_value(1, FieldValue::Null)
            .expect_err("one past the end");
        assert_eq!(err.kind(), ErrorKind::InvalidPosition);
    }

    #[test]
    fn new_row_defaults_to_nulls() {
        let schema = name_schema();
        let row = Row::new(schema, 7);
        assert_eq!(row.values(), &[FieldValue::Null]);
        assert!(!row.deleted);
        assert_eq!(row.position, 7);
    }
}
