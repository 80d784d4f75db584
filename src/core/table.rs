//! Purpose: Own the table state (header, schema, cursor, modifications) and its storage seams.
//! Exports: `Table`, `TableOptions`, `RowsOptions`, `Modification`, `Convert`.
//! Role: Single entry point for reading, writing, and configuring a table.
//! Invariants: The row pointer stays within `[0, rows_count]`.
//! Invariants: Appends write the row frame before the header count that exposes it.
//! Invariants: One cursor per table; sharing across workers needs external synchronization.
use std::fmt;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use time::OffsetDateTime;

use crate::core::column::{Column, Schema};
use crate::core::error::{Error, ErrorKind};
use crate::core::header::{FileType, Header, EOF_MARKER, HEADER_LEN};
use crate::core::memo::{FptFile, MemoStore};
use crate::core::row::Row;
use crate::core::store::{FileStore, RowStore};
use crate::core::value::FieldValue;

/// Fallible, pure per-column conversion applied during map projection.
pub type Convert = Arc<dyn Fn(FieldValue) -> Result<FieldValue, Error>>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TableOptions {
    pub trim_spaces_default: bool,
    pub strict_projection: bool,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RowsOptions {
    pub skip_invalid: bool,
    pub skip_deleted: bool,
}

/// Per-column projection rule: rename, trim, and/or convert. Never touches
/// the on-disk bytes.
#[derive(Clone, Default)]
pub struct Modification {
    pub trim_spaces: bool,
    pub external_key: Option<String>,
    pub convert: Option<Convert>,
}

impl fmt::Debug for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modification")
            .field("trim_spaces", &self.trim_spaces)
            .field("external_key", &self.external_key)
            .field("convert", &self.convert.is_some())
            .finish()
    }
}

pub struct Table<S: RowStore> {
    pub(crate) store: S,
    pub(crate) memo: Option<Box<dyn MemoStore>>,
    pub(crate) header: Header,
    pub(crate) schema: Schema,
    pub(crate) mods: Vec<Option<Modification>>,
    pub(crate) row_pointer: u32,
    pub(crate) options: TableOptions,
}

impl<S: RowStore> Table<S> {
    /// Wires a table over an already-loaded header and schema. The schema
    /// must agree with the header's row length.
    pub fn new(
        store: S,
        header: Header,
        schema: Schema,
        options: TableOptions,
    ) -> Result<Self, Error> {
        header.validate()?;
        if schema.row_length() != header.row_length {
            return Err(Error::new(ErrorKind::MalformedSchema).with_message(format!(
                "schema implies row length {} but the header says {}",
                schema.row_length(),
                header.row_length
            )));
        }
        let mods = vec![None; schema.len()];
        Ok(Self {
            store,
            memo: None,
            header,
            schema,
            mods,
            row_pointer: 0,
            options,
        })
    }

    pub fn attach_memo(&mut self, memo: Box<dyn MemoStore>) {
        self.memo = Some(memo);
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn pointer(&self) -> u32 {
        self.row_pointer
    }

    pub fn bof(&self) -> bool {
        self.row_pointer == 0
    }

    pub fn eof(&self) -> bool {
        self.row_pointer >= self.header.rows_count
    }

    pub fn rows_count(&self) -> u32 {
        self.header.rows_count
    }

    pub fn columns(&self) -> &[Column] {
        self.schema.columns()
    }

    pub fn columns_count(&self) -> u16 {
        self.schema.len() as u16
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.names()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.schema.position_of(name)
    }

    pub fn column_index(&self, column: &Column) -> Option<usize> {
        self.schema
            .columns()
            .iter()
            .position(|candidate| candidate == column)
    }

    /// Moves the cursor by `n` rows, clamped to `[0, rows_count]`.
    pub fn skip(&mut self, n: i32) {
        let target = i64::from(self.row_pointer) + i64::from(n);
        self.row_pointer = target.clamp(0, i64::from(self.header.rows_count)) as u32;
    }

    pub fn seek(&mut self, position: u32) {
        self.row_pointer = position.min(self.header.rows_count);
    }

    /// Reads and decodes the row under the cursor without advancing it.
    pub fn row(&mut self) -> Result<Row, Error> {
        if self.eof() {
            return Err(Error::new(ErrorKind::InvalidPosition)
                .with_message("cursor is at end of file")
                .with_row(self.row_pointer));
        }
        let frame = self.store.read_row(self.row_pointer)?;
        Row::decode(
            &frame,
            &self.schema,
            self.row_pointer,
            match self.memo {
                Some(ref mut inner) => Some(&mut **inner),
                None => None,
            },
        )
    }

    /// Collects rows from the cursor to EOF, advancing past each one.
    /// Decode errors abort unless `skip_invalid`; the offending row is
    /// dropped when they are skipped.
    pub fn rows(&mut self, options: RowsOptions) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        while !self.eof() {
            let row = self.row();
            self.skip(1);
            match row {
                Ok(row) => {
                    if row.deleted && options.skip_deleted {
                        continue;
                    }
                    rows.push(row);
                }
                Err(err) => {
                    if !options.skip_invalid {
                        return Err(err);
                    }
                    debug!("skipping undecodable row: {err}");
                }
            }
        }
        Ok(rows)
    }

    /// A fresh row positioned at the would-be append slot. The position is
    /// re-pinned by `append`, which is the authoritative append path.
    pub fn new_row(&self) -> Row {
        Row::new(self.schema.clone(), self.header.rows_count)
    }

    /// Writes the row at its position; positions at or past the current row
    /// count become appends.
    pub fn write_row(&mut self, row: &mut Row) -> Result<(), Error> {
        if row.position >= self.header.rows_count {
            return self.append(row);
        }
        let frame = row.encode(match self.memo {
            Some(ref mut inner) => Some(&mut **inner),
            None => None,
        })?;
        self.store.write_row(row.position, &frame)
    }

    /// Appends the row at the end of the table, then publishes the new row
    /// count and modified date through the header.
    pub fn append(&mut self, row: &mut Row) -> Result<(), Error> {
        row.position = self.header.rows_count;
        let frame = row.encode(match self.memo {
            Some(ref mut inner) => Some(&mut **inner),
            None => None,
        })?;
        self.store.write_row(row.position, &frame)?;

        self.header.rows_count += 1;
        self.header.set_modified(OffsetDateTime::now_utc().date());
        self.store.update_header(&self.header.encode())?;
        debug!(
            "appended row {}; table now holds {} rows",
            row.position, self.header.rows_count
        );
        Ok(())
    }

    pub fn delete(&mut self, row: &mut Row) -> Result<(), Error> {
        row.deleted = true;
        self.write_row(row)
    }

    pub fn recall(&mut self, row: &mut Row) -> Result<(), Error> {
        row.deleted = false;
        self.write_row(row)
    }

    /// Installs a projection rule for the column at `position`. Out-of-range
    /// positions are ignored so callers can configure optimistically.
    pub fn set_column_modification(
        &mut self,
        position: usize,
        trim_spaces: bool,
        external_key: Option<&str>,
        convert: Option<Convert>,
    ) {
        let Some(slot) = self.mods.get_mut(position) else {
            return;
        };
        *slot = Some(Modification {
            trim_spaces,
            external_key: external_key
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            convert,
        });
    }

    pub fn get_column_modification(&self, position: usize) -> Option<&Modification> {
        self.mods.get(position).and_then(Option::as_ref)
    }

    pub fn set_trim_spaces_default(&mut self, trim: bool) {
        self.options.trim_spaces_default = trim;
    }
}

impl Table<FileStore> {
    /// Opens a table file, loading header and schema and attaching the
    /// sibling memo file when the header declares one.
    pub fn open(path: impl AsRef<Path>, options: TableOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        let mut head = [0u8; HEADER_LEN];
        file.read_exact(&mut head)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;
        let header = Header::decode(&head).map_err(|err| err.with_path(&path))?;

        let mut descriptors = vec![0u8; usize::from(header.first_row) - HEADER_LEN];
        file.read_exact(&mut descriptors)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;
        let schema = Schema::decode(&descriptors, &header).map_err(|err| err.with_path(&path))?;

        let memo = if header.has_memo() {
            open_sibling_memo(&path)?
        } else {
            None
        };

        let store = FileStore::new(&path, file, header.first_row, header.row_length);
        let mut table = Table::new(store, header, schema, options)?;
        table.memo = memo;
        debug!(
            "opened {} with {} columns and {} rows",
            path.display(),
            table.columns_count(),
            table.rows_count()
        );
        Ok(table)
    }

    /// Creates a fresh table file (and a memo companion when the schema
    /// needs one), truncating any previous file at the path.
    pub fn create(
        path: impl AsRef<Path>,
        file_type: FileType,
        columns: Vec<Column>,
        options: TableOptions,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let schema = Schema::new(columns)?;
        if schema.is_empty() {
            return Err(Error::new(ErrorKind::MalformedSchema)
                .with_message("a table needs at least one column")
                .with_path(&path));
        }

        let descriptor_bytes = schema.len() * crate::core::header::DESCRIPTOR_LEN;
        let first_row = usize::from(file_type.fixed_prelude()) + descriptor_bytes;
        let first_row = u16::try_from(first_row).map_err(|_| {
            Error::new(ErrorKind::MalformedSchema)
                .with_message("descriptor region overflows the 16-bit first-row field")
                .with_path(&path)
        })?;

        let has_memo = schema
            .columns()
            .iter()
            .any(|column| column.field_type.is_memo());
        let mut header = Header {
            file_type,
            year: 0,
            month: 1,
            day: 1,
            rows_count: 0,
            first_row,
            row_length: schema.row_length(),
            reserved: [0; 16],
            table_flags: if has_memo {
                crate::core::header::FLAG_MEMO
            } else {
                0
            },
            code_page: 0x03,
        };
        header.set_modified(OffsetDateTime::now_utc().date());
        header.validate()?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        use std::io::Write;
        let backlink = usize::from(first_row)
            - HEADER_LEN
            - descriptor_bytes
            - 1;
        file.write_all(&header.encode())
            .and_then(|()| file.write_all(&schema.encode()))
            .and_then(|()| file.write_all(&vec![0u8; backlink]))
            .and_then(|()| file.write_all(&[EOF_MARKER]))
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        let memo: Option<Box<dyn MemoStore>> = if has_memo {
            Some(Box::new(FptFile::create(memo_path(&path))?))
        } else {
            None
        };

        let store = FileStore::new(&path, file, header.first_row, header.row_length);
        let mut table = Table::new(store, header, schema, options)?;
        table.memo = memo;
        debug!("created {} with {} columns", path.display(), table.columns_count());
        Ok(table)
    }
}

fn memo_path(table_path: &Path) -> PathBuf {
    table_path.with_extension("fpt")
}

fn open_sibling_memo(table_path: &Path) -> Result<Option<Box<dyn MemoStore>>, Error> {
    for candidate in [
        table_path.with_extension("fpt"),
        table_path.with_extension("FPT"),
    ] {
        if candidate.exists() {
            return Ok(Some(Box::new(FptFile::open(&candidate)?)));
        }
    }
    warn!(
        "{} declares a memo file but no .fpt sibling was found; memo columns decode to block ids",
        table_path.display()
    );
    Ok(None)
}
