//! Purpose: Convert rows to and from caller-defined serde types via the JSON projection.
//! Exports: `TableRecordsExt`.
//! Role: Convenience layer over `to_json`/`row_from_json` for typed consumers.
//! Invariants: Conversion shares the projection's lossiness rules; strict
//! Invariants: projection applies here too.
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::row::Row;
use crate::core::store::RowStore;
use crate::core::table::Table;

pub trait TableRecordsExt {
    /// Deserializes a row into a caller-defined record type.
    fn record<T: DeserializeOwned>(&self, row: &Row) -> Result<T, Error>;

    /// Builds a row from a serializable record; field names (or external
    /// keys) select the target columns.
    fn row_from_record<T: Serialize>(&self, record: &T) -> Result<Row, Error>;
}

impl<S: RowStore> TableRecordsExt for Table<S> {
    fn record<T: DeserializeOwned>(&self, row: &Row) -> Result<T, Error> {
        let tree = self.to_json(row)?;
        serde_json::from_value(tree).map_err(|err| {
            Error::new(ErrorKind::Projection)
                .with_message("record deserialization failed")
                .with_source(err)
        })
    }

    fn row_from_record<T: Serialize>(&self, record: &T) -> Result<Row, Error> {
        let tree = serde_json::to_value(record).map_err(|err| {
            Error::new(ErrorKind::Projection)
                .with_message("record serialization failed")
                .with_source(err)
        })?;
        self.row_from_json(&tree)
    }
}
