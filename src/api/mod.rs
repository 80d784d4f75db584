//! Purpose: Define the stable public Rust API boundary for foxfile.
//! Exports: Core types and operations needed by applications and tests.
//! Role: Public, additive-only surface; hides internal codec modules.
//! Invariants: This module is the only public path to storage primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

mod record;

pub use crate::core::column::{Column, FieldType, Schema, MAX_NAME_LEN};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::header::{
    FileType, Header, DESCRIPTOR_LEN, EOF_MARKER, HEADER_LEN, SCHEMA_TERMINATOR,
};
pub use crate::core::memo::{FptFile, MemoBlock, MemoKind, MemoStore, FPT_HEADER_LEN};
pub use crate::core::row::{FieldRef, Row, STATUS_ACTIVE, STATUS_DELETED};
pub use crate::core::store::{FileStore, MemStore, RowStore};
pub use crate::core::table::{Convert, Modification, RowsOptions, Table, TableOptions};
pub use crate::core::value::FieldValue;
pub use record::TableRecordsExt;
