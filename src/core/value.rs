//! Purpose: Convert length-bounded row slots to host values and back, per column type code.
//! Exports: `FieldValue`, `decode`, `encode`.
//! Role: Shared codec invoked by the row layer for every column slot.
//! Invariants: Decoding never reads past the slot; encoding never writes past it.
//! Invariants: Character data is treated as a Latin-1 view of the declared code page,
//! Invariants: so byte values above 0x7F survive a decode/encode round trip.
use crate::core::column::{Column, FieldType};
use crate::core::error::{Error, ErrorKind};
use crate::core::memo::{MemoBlock, MemoKind, MemoStore};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const MSECS_PER_DAY: u32 = 86_400_000;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Character(String),
    Integer(i64),
    Float(f64),
    Logical(bool),
    Date(Date),
    DateTime(PrimitiveDateTime),
    /// Resolved text memo content.
    Memo(String),
    /// Resolved binary memo content, varbinary, or an opaque slot.
    Binary(Vec<u8>),
    /// Unresolved memo reference when no memo store is attached.
    BlockId(u32),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Character(_) => "character",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Logical(_) => "logical",
            FieldValue::Date(_) => "date",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Memo(_) => "memo",
            FieldValue::Binary(_) => "binary",
            FieldValue::BlockId(_) => "block id",
        }
    }
}

pub fn decode(
    slot: &[u8],
    column: &Column,
    memo: Option<&mut dyn MemoStore>,
) -> Result<FieldValue, Error> {
    if slot.len() != usize::from(column.length) {
        return Err(decode_error(column, "slot width disagrees with the descriptor"));
    }

    match column.field_type {
        FieldType::Character => Ok(FieldValue::Character(latin1_to_string(slot))),
        FieldType::Numeric | FieldType::Float => decode_numeric(slot, column),
        FieldType::Integer => {
            if slot.len() != 4 {
                return Err(decode_error(column, "integer slot must be 4 bytes"));
            }
            let raw = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            Ok(FieldValue::Integer(i64::from(raw)))
        }
        FieldType::Logical => match slot[0] {
            b'T' | b't' | b'Y' | b'y' => Ok(FieldValue::Logical(true)),
            b'F' | b'f' | b'N' | b'n' => Ok(FieldValue::Logical(false)),
            b'?' | b' ' => Ok(FieldValue::Null),
            byte => Err(decode_error(
                column,
                format!("invalid logical byte 0x{byte:02X}"),
            )),
        },
        FieldType::Date => decode_date(slot, column),
        FieldType::DateTime => decode_datetime(slot, column),
        FieldType::Memo | FieldType::General | FieldType::Picture | FieldType::Blob => {
            let id = match decode_block_id(slot, column)? {
                None => return Ok(FieldValue::Null),
                Some(id) => id,
            };
            match memo {
                Some(store) => {
                    let block = store
                        .read_block(id)
                        .map_err(|err| err.with_column_name(column.name()))?;
                    match block.kind {
                        MemoKind::Text => Ok(FieldValue::Memo(latin1_to_string(&block.data))),
                        MemoKind::Binary => Ok(FieldValue::Binary(block.data)),
                    }
                }
                None => Ok(FieldValue::BlockId(id)),
            }
        }
        FieldType::Currency => {
            if slot.len() != 8 {
                return Err(decode_error(column, "currency slot must be 8 bytes"));
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(slot);
            Ok(FieldValue::Float(i64::from_le_bytes(raw) as f64 / 10_000.0))
        }
        FieldType::Varchar | FieldType::Varbinary | FieldType::NullFlags => {
            Ok(FieldValue::Binary(slot.to_vec()))
        }
    }
}

pub fn encode(
    value: &FieldValue,
    column: &Column,
    memo: Option<&mut dyn MemoStore>,
) -> Result<Vec<u8>, Error> {
    let length = usize::from(column.length);
    match column.field_type {
        FieldType::Character => {
            let text = match value {
                FieldValue::Null => "",
                FieldValue::Character(text) => text.as_str(),
                other => return Err(mismatch(column, other)),
            };
            let bytes = string_to_latin1(text, column)?;
            if bytes.len() > length {
                return Err(too_long(column));
            }
            let mut slot = vec![b' '; length];
            slot[..bytes.len()].copy_from_slice(&bytes);
            Ok(slot)
        }
        FieldType::Numeric | FieldType::Float => encode_numeric(value, column),
        FieldType::Integer => {
            if length != 4 {
                return Err(encode_error(column, "integer slot must be 4 bytes"));
            }
            let raw = match value {
                FieldValue::Null => 0,
                FieldValue::Integer(n) => i32::try_from(*n).map_err(|_| {
                    encode_error(column, format!("{n} does not fit a 32-bit integer"))
                })?,
                other => return Err(mismatch(column, other)),
            };
            Ok(raw.to_le_bytes().to_vec())
        }
        FieldType::Logical => {
            let flag = match value {
                FieldValue::Null => b'?',
                FieldValue::Logical(true) => b'T',
                FieldValue::Logical(false) => b'F',
                other => return Err(mismatch(column, other)),
            };
            let mut slot = vec![b' '; length];
            slot[0] = flag;
            Ok(slot)
        }
        FieldType::Date => encode_date(value, column),
        FieldType::DateTime => encode_datetime(value, column),
        FieldType::Memo | FieldType::General | FieldType::Picture | FieldType::Blob => {
            encode_memo(value, column, memo)
        }
        FieldType::Currency => {
            if length != 8 {
                return Err(encode_error(column, "currency slot must be 8 bytes"));
            }
            let scaled: i64 = match value {
                FieldValue::Null => 0,
                FieldValue::Integer(n) => n
                    .checked_mul(10_000)
                    .ok_or_else(|| encode_error(column, "currency value out of range"))?,
                FieldValue::Float(f) => {
                    if !f.is_finite() {
                        return Err(encode_error(column, "non-finite currency value"));
                    }
                    let scaled = (f * 10_000.0).round();
                    if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                        return Err(encode_error(column, "currency value out of range"));
                    }
                    scaled as i64
                }
                other => return Err(mismatch(column, other)),
            };
            Ok(scaled.to_le_bytes().to_vec())
        }
        FieldType::Varchar | FieldType::Varbinary | FieldType::NullFlags => {
            let bytes = match value {
                FieldValue::Null => Vec::new(),
                FieldValue::Binary(data) => data.clone(),
                FieldValue::Character(text) if column.field_type == FieldType::Varchar => {
                    string_to_latin1(text, column)?
                }
                other => return Err(mismatch(column, other)),
            };
            if bytes.len() > length {
                return Err(too_long(column));
            }
            let mut slot = vec![0u8; length];
            slot[..bytes.len()].copy_from_slice(&bytes);
            Ok(slot)
        }
    }
}

fn decode_numeric(slot: &[u8], column: &Column) -> Result<FieldValue, Error> {
    let text = ascii_slot(slot, column)?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(FieldValue::Null);
    }
    if column.field_type == FieldType::Numeric && column.decimals == 0 {
        let parsed = text
            .parse::<i64>()
            .map_err(|err| decode_error(column, format!("bad integer literal: {err}")))?;
        Ok(FieldValue::Integer(parsed))
    } else {
        let parsed = text
            .parse::<f64>()
            .map_err(|err| decode_error(column, format!("bad numeric literal: {err}")))?;
        Ok(FieldValue::Float(parsed))
    }
}

fn encode_numeric(value: &FieldValue, column: &Column) -> Result<Vec<u8>, Error> {
    let decimals = usize::from(column.decimals);
    let fractional = column.decimals > 0 || column.field_type == FieldType::Float;
    let text = match value {
        FieldValue::Null => String::new(),
        FieldValue::Integer(n) => {
            if fractional {
                format!("{:.decimals$}", *n as f64)
            } else {
                n.to_string()
            }
        }
        FieldValue::Float(f) => {
            if !f.is_finite() {
                return Err(encode_error(column, "non-finite numeric value"));
            }
            if fractional {
                format!("{f:.decimals$}")
            } else if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                return Err(encode_error(
                    column,
                    "fractional value in a zero-decimal column",
                ));
            }
        }
        other => return Err(mismatch(column, other)),
    };

    let length = usize::from(column.length);
    if text.len() > length {
        return Err(too_long(column));
    }
    let mut slot = vec![b' '; length];
    slot[length - text.len()..].copy_from_slice(text.as_bytes());
    Ok(slot)
}

fn decode_date(slot: &[u8], column: &Column) -> Result<FieldValue, Error> {
    if slot.len() != 8 {
        return Err(decode_error(column, "date slot must be 8 bytes"));
    }
    let text = ascii_slot(slot, column)?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(FieldValue::Null);
    }
    if text.len() != 8 {
        return Err(decode_error(column, "date slot is not YYYYMMDD"));
    }
    let year = text[0..4]
        .parse::<i32>()
        .map_err(|err| decode_error(column, format!("bad date year: {err}")))?;
    let month = text[4..6]
        .parse::<u8>()
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(|| decode_error(column, "bad date month"))?;
    let day = text[6..8]
        .parse::<u8>()
        .map_err(|err| decode_error(column, format!("bad date day: {err}")))?;
    let date = Date::from_calendar_date(year, month, day)
        .map_err(|err| decode_error(column, format!("invalid calendar date: {err}")))?;
    Ok(FieldValue::Date(date))
}

fn encode_date(value: &FieldValue, column: &Column) -> Result<Vec<u8>, Error> {
    if column.length != 8 {
        return Err(encode_error(column, "date slot must be 8 bytes"));
    }
    let date = match value {
        FieldValue::Null => return Ok(vec![b' '; 8]),
        FieldValue::Date(date) => *date,
        // The ISO rendering produced by the JSON projection is accepted back.
        FieldValue::Character(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(vec![b' '; 8]);
            }
            Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
                .map_err(|err| encode_error(column, format!("unparseable date string: {err}")))?
        }
        other => return Err(mismatch(column, other)),
    };
    if !(0..=9999).contains(&date.year()) {
        return Err(encode_error(column, "date year outside 0000..=9999"));
    }
    Ok(format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
    .into_bytes())
}

fn decode_datetime(slot: &[u8], column: &Column) -> Result<FieldValue, Error> {
    if slot.len() != 8 {
        return Err(decode_error(column, "datetime slot must be 8 bytes"));
    }
    let julian = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
    let msecs = u32::from_le_bytes([slot[4], slot[5], slot[6], slot[7]]);
    if julian == 0 && msecs == 0 {
        return Ok(FieldValue::Null);
    }
    if julian > i32::MAX as u32 {
        return Err(decode_error(column, "julian day out of range"));
    }
    if msecs >= MSECS_PER_DAY {
        return Err(decode_error(column, "milliseconds past midnight overflow a day"));
    }
    let date = Date::from_julian_day(julian as i32)
        .map_err(|err| decode_error(column, format!("invalid julian day: {err}")))?;
    let time = Time::from_hms_milli(
        (msecs / 3_600_000) as u8,
        (msecs / 60_000 % 60) as u8,
        (msecs / 1_000 % 60) as u8,
        (msecs % 1_000) as u16,
    )
    .map_err(|err| decode_error(column, format!("invalid time of day: {err}")))?;
    Ok(FieldValue::DateTime(PrimitiveDateTime::new(date, time)))
}

fn encode_datetime(value: &FieldValue, column: &Column) -> Result<Vec<u8>, Error> {
    if column.length != 8 {
        return Err(encode_error(column, "datetime slot must be 8 bytes"));
    }
    let stamp = match value {
        FieldValue::Null => return Ok(vec![0u8; 8]),
        FieldValue::DateTime(stamp) => *stamp,
        // The RFC 3339 rendering produced by the JSON projection is accepted back.
        FieldValue::Character(text) => {
            let parsed = OffsetDateTime::parse(text.trim(), &Rfc3339)
                .map_err(|err| encode_error(column, format!("unparseable datetime: {err}")))?
                .to_offset(UtcOffset::UTC);
            PrimitiveDateTime::new(parsed.date(), parsed.time())
        }
        other => return Err(mismatch(column, other)),
    };
    let julian = stamp.date().to_julian_day();
    if julian < 0 {
        return Err(encode_error(column, "date precedes the julian epoch"));
    }
    let time = stamp.time();
    let msecs = u32::from(time.hour()) * 3_600_000
        + u32::from(time.minute()) * 60_000
        + u32::from(time.second()) * 1_000
        + u32::from(time.millisecond());
    let mut slot = Vec::with_capacity(8);
    slot.extend_from_slice(&(julian as u32).to_le_bytes());
    slot.extend_from_slice(&msecs.to_le_bytes());
    Ok(slot)
}

fn encode_memo(
    value: &FieldValue,
    column: &Column,
    memo: Option<&mut dyn MemoStore>,
) -> Result<Vec<u8>, Error> {
    let block = match value {
        FieldValue::Null => return encode_block_id(None, column),
        FieldValue::BlockId(id) => return encode_block_id(Some(*id), column),
        FieldValue::Memo(text) | FieldValue::Character(text) => MemoBlock {
            kind: MemoKind::Text,
            data: string_to_latin1(text, column)?,
        },
        FieldValue::Binary(data) => MemoBlock {
            kind: MemoKind::Binary,
            data: data.clone(),
        },
        other => return Err(mismatch(column, other)),
    };
    let store = memo.ok_or_else(|| encode_error(column, "no memo store attached"))?;
    let id = store
        .write_block(&block)
        .map_err(|err| err.with_column_name(column.name()))?;
    encode_block_id(Some(id), column)
}

fn decode_block_id(slot: &[u8], column: &Column) -> Result<Option<u32>, Error> {
    if slot.len() == 4 {
        let id = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
        return Ok((id != 0).then_some(id));
    }
    let text = ascii_slot(slot, column)?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(None);
    }
    let id = text
        .parse::<u32>()
        .map_err(|err| decode_error(column, format!("bad memo block id: {err}")))?;
    Ok((id != 0).then_some(id))
}

fn encode_block_id(id: Option<u32>, column: &Column) -> Result<Vec<u8>, Error> {
    let length = usize::from(column.length);
    if length == 4 {
        return Ok(id.unwrap_or(0).to_le_bytes().to_vec());
    }
    let Some(id) = id else {
        return Ok(vec![b' '; length]);
    };
    let digits = id.to_string();
    if digits.len() > length {
        return Err(too_long(column));
    }
    let mut slot = vec![b' '; length];
    slot[length - digits.len()..].copy_from_slice(digits.as_bytes());
    Ok(slot)
}

fn ascii_slot<'a>(slot: &'a [u8], column: &Column) -> Result<&'a str, Error> {
    std::str::from_utf8(slot).map_err(|_| decode_error(column, "slot holds non-ASCII bytes"))
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

fn string_to_latin1(text: &str, column: &Column) -> Result<Vec<u8>, Error> {
    text.chars()
        .map(|ch| {
            u8::try_from(u32::from(ch))
                .map_err(|_| encode_error(column, format!("character {ch:?} is outside the code page")))
        })
        .collect()
}

fn decode_error(column: &Column, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ValueDecode)
        .with_message(message)
        .with_column_name(column.name())
}

fn encode_error(column: &Column, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ValueEncode)
        .with_message(message)
        .with_column_name(column.name())
}

fn too_long(column: &Column) -> Error {
    Error::new(ErrorKind::ValueTooLong)
        .with_message("encoded value exceeds the column length")
        .with_column_name(column.name())
}

fn mismatch(column: &Column, value: &FieldValue) -> Error {
    encode_error(
        column,
        format!(
            "cannot encode a {} value into a {:?} column",
            value.type_name(),
            column.field_type
        ),
    )
}
