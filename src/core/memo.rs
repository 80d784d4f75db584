//! Purpose: Resolve and allocate variable-length memo blocks in the .FPT companion.
//! Exports: `MemoStore`, `MemoBlock`, `MemoKind`, `FptFile`, `FPT_HEADER_LEN`.
//! Role: Optional collaborator consumed by the value codec for memo-typed slots.
//! Invariants: The .FPT header and block headers are big-endian, unlike the table file.
//! Invariants: Blocks are append-only; ids are block indexes scaled by the block size.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

pub const FPT_HEADER_LEN: usize = 512;
pub const DEFAULT_BLOCK_SIZE: u16 = 64;

const BLOCK_HEADER_LEN: usize = 8;
const BLOCK_TYPE_BINARY: u32 = 0;
const BLOCK_TYPE_TEXT: u32 = 1;

/// Upper bound on a single memo payload; anything larger is corruption.
const MAX_BLOCK_PAYLOAD: u32 = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoKind {
    Text,
    Binary,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoBlock {
    pub kind: MemoKind,
    pub data: Vec<u8>,
}

impl MemoBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MemoKind::Text,
            data: text.into().into_bytes(),
        }
    }

    pub fn binary(data: Vec<u8>) -> Self {
        Self {
            kind: MemoKind::Binary,
            data,
        }
    }
}

/// Block-level access to the memo companion. When a table has no memo store
/// attached, memo-typed columns decode to raw block ids instead.
pub trait MemoStore {
    fn read_block(&mut self, id: u32) -> Result<MemoBlock, Error>;
    fn write_block(&mut self, block: &MemoBlock) -> Result<u32, Error>;
}

pub struct FptFile {
    path: PathBuf,
    file: File,
    block_size: u16,
    next_free: u32,
}

impl FptFile {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        let block_size = DEFAULT_BLOCK_SIZE;
        let next_free = first_block(block_size);
        let header = encode_fpt_header(next_free, block_size);
        file.write_all(&header)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        Ok(Self {
            path,
            file,
            block_size,
            next_free,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        let mut header = [0u8; FPT_HEADER_LEN];
        file.read_exact(&mut header)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        let next_free = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let block_size = u16::from_be_bytes([header[6], header[7]]);
        if block_size == 0 {
            return Err(Error::new(ErrorKind::MalformedHeader)
                .with_message("memo block size is zero")
                .with_path(&path));
        }
        let next_free = next_free.max(first_block(block_size));

        Ok(Self {
            path,
            file,
            block_size,
            next_free,
        })
    }

    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    fn block_offset(&self, id: u32) -> u64 {
        u64::from(id) * u64::from(self.block_size)
    }

    fn io_error(&self, err: std::io::Error) -> Error {
        Error::new(ErrorKind::Io).with_path(&self.path).with_source(err)
    }
}

impl MemoStore for FptFile {
    fn read_block(&mut self, id: u32) -> Result<MemoBlock, Error> {
        let offset = self.block_offset(id);
        if id == 0 || offset < FPT_HEADER_LEN as u64 {
            return Err(Error::new(ErrorKind::Io)
                .with_message(format!("memo block id {id} points into the header"))
                .with_path(&self.path));
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| self.io_error(err))?;
        let mut head = [0u8; BLOCK_HEADER_LEN];
        self.file
            .read_exact(&mut head)
            .map_err(|err| self.io_error(err))?;

        let block_type = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let length = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        if length > MAX_BLOCK_PAYLOAD {
            return Err(Error::new(ErrorKind::Io)
                .with_message(format!("memo block {id} claims {length} bytes"))
                .with_path(&self.path));
        }

        let mut data = vec![0u8; length as usize];
        self.file
            .read_exact(&mut data)
            .map_err(|err| self.io_error(err))?;

        let kind = if block_type == BLOCK_TYPE_TEXT {
            MemoKind::Text
        } else {
            MemoKind::Binary
        };
        Ok(MemoBlock { kind, data })
    }

    fn write_block(&mut self, block: &MemoBlock) -> Result<u32, Error> {
        let id = self.next_free;
        let offset = self.block_offset(id);

        let block_type = match block.kind {
            MemoKind::Text => BLOCK_TYPE_TEXT,
            MemoKind::Binary => BLOCK_TYPE_BINARY,
        };
        let mut frame = Vec::with_capacity(BLOCK_HEADER_LEN + block.data.len());
        frame.extend_from_slice(&block_type.to_be_bytes());
        frame.extend_from_slice(&(block.data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&block.data);

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| self.io_error(err))?;
        self.file
            .write_all(&frame)
            .map_err(|err| self.io_error(err))?;

        let consumed = frame.len().div_ceil(usize::from(self.block_size)) as u32;
        self.next_free = id + consumed.max(1);

        let header = encode_fpt_header(self.next_free, self.block_size);
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|err| self.io_error(err))?;
        self.file
            .write_all(&header)
            .map_err(|err| self.io_error(err))?;
        self.file.flush().map_err(|err| self.io_error(err))?;

        Ok(id)
    }
}

fn first_block(block_size: u16) -> u32 {
    (FPT_HEADER_LEN as u32).div_ceil(u32::from(block_size))
}

fn encode_fpt_header(next_free: u32, block_size: u16) -> [u8; FPT_HEADER_LEN] {
    let mut buf = [0u8; FPT_HEADER_LEN];
    buf[0..4].copy_from_slice(&next_free.to_be_bytes());
    buf[6..8].copy_from_slice(&block_size.to_be_bytes());
    buf
}
