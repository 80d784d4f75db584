//! Purpose: Provide random-access row frame storage beneath the table façade.
//! Exports: `RowStore`, `FileStore`, `MemStore`.
//! Role: Seam between the codec layers and physical storage; the table only
//! Role: ever addresses whole row frames and the 32-byte header.
//! Invariants: Write paths hold the advisory file lock for the whole call and
//! Invariants: release it on every exit path.
//! Invariants: Row bytes are written before the header count that exposes them.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;
use libc::{EACCES, EPERM};
use log::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::header::{EOF_MARKER, HEADER_LEN};

/// Random-access block store for row frames, indexed by 0-based row position.
pub trait RowStore {
    fn read_row(&mut self, position: u32) -> Result<Vec<u8>, Error>;
    fn write_row(&mut self, position: u32, frame: &[u8]) -> Result<(), Error>;
    fn update_header(&mut self, header: &[u8; HEADER_LEN]) -> Result<(), Error>;
}

/// File-backed store over the data region of a table file.
pub struct FileStore {
    path: PathBuf,
    file: File,
    first_row: u64,
    row_length: usize,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, file: File, first_row: u16, row_length: u16) -> Self {
        Self {
            path: path.into(),
            file,
            first_row: u64::from(first_row),
            row_length: usize::from(row_length),
        }
    }

    fn row_offset(&self, position: u32) -> u64 {
        self.first_row + u64::from(position) * self.row_length as u64
    }

    fn write_lock(&self) -> Result<WriteLock, Error> {
        self.file.lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(lock_error_message(&err))
                .with_path(&self.path)
                .with_source(err)
        })?;
        let file = self.file.try_clone().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to duplicate file handle for lock guard")
                .with_path(&self.path)
                .with_source(err)
        })?;
        Ok(WriteLock { file })
    }

    fn io_error(&self, position: Option<u32>, err: io::Error) -> Error {
        let mut error = Error::new(ErrorKind::Io)
            .with_path(&self.path)
            .with_source(err);
        if let Some(position) = position {
            error = error.with_row(position);
        }
        error
    }
}

impl RowStore for FileStore {
    fn read_row(&mut self, position: u32) -> Result<Vec<u8>, Error> {
        self.file
            .seek(SeekFrom::Start(self.row_offset(position)))
            .map_err(|err| self.io_error(Some(position), err))?;
        let mut frame = vec![0u8; self.row_length];
        self.file
            .read_exact(&mut frame)
            .map_err(|err| self.io_error(Some(position), err))?;
        Ok(frame)
    }

    fn write_row(&mut self, position: u32, frame: &[u8]) -> Result<(), Error> {
        let _lock = self.write_lock()?;
        let offset = self.row_offset(position);
        let end = offset + frame.len() as u64;
        let file_len = self
            .file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| self.io_error(Some(position), err))?;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| self.io_error(Some(position), err))?;
        self.file
            .write_all(frame)
            .map_err(|err| self.io_error(Some(position), err))?;
        // Keep the end-of-file marker behind the last row when the file grew.
        if end >= file_len.max(1) - 1 {
            self.file
                .write_all(&[EOF_MARKER])
                .map_err(|err| self.io_error(Some(position), err))?;
        }
        self.file
            .flush()
            .map_err(|err| self.io_error(Some(position), err))?;
        debug!("wrote row {position} at offset {offset}");
        Ok(())
    }

    fn update_header(&mut self, header: &[u8; HEADER_LEN]) -> Result<(), Error> {
        let _lock = self.write_lock()?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|err| self.io_error(None, err))?;
        self.file
            .write_all(header)
            .map_err(|err| self.io_error(None, err))?;
        self.file
            .flush()
            .map_err(|err| self.io_error(None, err))?;
        Ok(())
    }
}

struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn lock_error_message(err: &io::Error) -> &'static str {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return "file lock permission denied";
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => "file lock busy",
        io::ErrorKind::PermissionDenied => "file lock permission denied",
        _ => "file lock failed",
    }
}

/// In-memory store for tests and embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemStore {
    header: [u8; HEADER_LEN],
    rows: Vec<Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_bytes(&self) -> &[u8; HEADER_LEN] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.rows.push(frame);
    }
}

impl RowStore for MemStore {
    fn read_row(&mut self, position: u32) -> Result<Vec<u8>, Error> {
        self.rows
            .get(position as usize)
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::Io)
                    .with_message("row position past the stored frames")
                    .with_row(position)
            })
    }

    fn write_row(&mut self, position: u32, frame: &[u8]) -> Result<(), Error> {
        let position = position as usize;
        if position < self.rows.len() {
            self.rows[position] = frame.to_vec();
            Ok(())
        } else if position == self.rows.len() {
            self.rows.push(frame.to_vec());
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Io)
                .with_message("write would leave a gap in the row region")
                .with_row(position as u32))
        }
    }

    fn update_header(&mut self, header: &[u8; HEADER_LEN]) -> Result<(), Error> {
        self.header = *header;
        Ok(())
    }
}
