use crate::catalog::types::{DataType, Date, Numeric, Truth, Value};
use crate::error::FormatError;
use compact_str::CompactString;

/// Kind byte at the start of every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    Timestamp = 1,
    Integer = 2,
    Numeric = 3,
    String = 4,
    Date = 5,
    TimeSpan = 6,
    Boolean = 7,
    Table = 9,
    Column = 10,
    Record = 11,
    Update = 12,
    Delete = 13,
    Alter = 14,
    Drop = 15,
    View = 16,
    Index = 17,
    /// Closes the records of one commit.
    CommitEnd = 18,
}

impl Tag {
    pub fn from_u8(byte: u8) -> Option<Tag> {
        Some(match byte {
            0 => Tag::Null,
            1 => Tag::Timestamp,
            2 => Tag::Integer,
            3 => Tag::Numeric,
            4 => Tag::String,
            5 => Tag::Date,
            6 => Tag::TimeSpan,
            7 => Tag::Boolean,
            9 => Tag::Table,
            10 => Tag::Column,
            11 => Tag::Record,
            12 => Tag::Update,
            13 => Tag::Delete,
            14 => Tag::Alter,
            15 => Tag::Drop,
            16 => Tag::View,
            17 => Tag::Index,
            18 => Tag::CommitEnd,
            _ => return None,
        })
    }

    pub fn is_scalar(self) -> bool {
        (self as u8) <= Tag::Boolean as u8
    }
}

pub fn data_type_tag(data_type: DataType) -> u8 {
    let tag = match data_type {
        DataType::Timestamp => Tag::Timestamp,
        DataType::Integer => Tag::Integer,
        DataType::Numeric => Tag::Numeric,
        DataType::String => Tag::String,
        DataType::Date => Tag::Date,
        DataType::TimeSpan => Tag::TimeSpan,
        DataType::Boolean => Tag::Boolean,
    };
    tag as u8
}

pub fn data_type_from_tag(byte: u8) -> Result<DataType, FormatError> {
    match Tag::from_u8(byte) {
        Some(Tag::Timestamp) => Ok(DataType::Timestamp),
        Some(Tag::Integer) => Ok(DataType::Integer),
        Some(Tag::Numeric) => Ok(DataType::Numeric),
        Some(Tag::String) => Ok(DataType::String),
        Some(Tag::Date) => Ok(DataType::Date),
        Some(Tag::TimeSpan) => Ok(DataType::TimeSpan),
        Some(Tag::Boolean) => Ok(DataType::Boolean),
        _ => Err(FormatError::InvalidDataType { tag: byte }),
    }
}

/// Sequential byte input for the decoder. `position` is the absolute log
/// offset of the next byte, whatever the underlying storage.
pub trait ByteSource {
    fn read_u8(&mut self) -> Result<u8, FormatError>;

    fn position(&self) -> u64;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FormatError> {
        for b in buf.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(())
    }
}

/// Reads an in-memory slice that begins at log offset `base`.
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> SliceReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    pub fn at(bytes: &'a [u8], base: u64) -> Self {
        Self { bytes, pos: 0, base }
    }

    pub fn seek(&mut self, offset: u64) {
        self.pos = offset.saturating_sub(self.base) as usize;
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

impl ByteSource for SliceReader<'_> {
    fn read_u8(&mut self) -> Result<u8, FormatError> {
        let b = *self.bytes.get(self.pos).ok_or(FormatError::Truncated {
            offset: self.position(),
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FormatError> {
        let end = self.pos + buf.len();
        let src = self.bytes.get(self.pos..end).ok_or(FormatError::Truncated {
            offset: self.position(),
        })?;
        buf.copy_from_slice(src);
        self.pos = end;
        Ok(())
    }
}

pub fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_i32(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

pub fn get_u8(src: &mut dyn ByteSource) -> Result<u8, FormatError> {
    src.read_u8()
}

pub fn get_i32(src: &mut dyn ByteSource) -> Result<i32, FormatError> {
    let mut b = [0u8; 4];
    src.read_exact(&mut b)?;
    Ok(i32::from_be_bytes(b))
}

pub fn get_i64(src: &mut dyn ByteSource) -> Result<i64, FormatError> {
    let mut b = [0u8; 8];
    src.read_exact(&mut b)?;
    Ok(i64::from_be_bytes(b))
}

/// Reads an `i32` element count and rejects anything negative or above `max`.
pub fn get_len(src: &mut dyn ByteSource, max: usize) -> Result<usize, FormatError> {
    let offset = src.position();
    let len = get_i32(src)?;
    match usize::try_from(len) {
        Ok(n) if n <= max => Ok(n),
        _ => Err(FormatError::Oversized {
            len: len as i64,
            max,
            offset,
        }),
    }
}

pub fn get_string(src: &mut dyn ByteSource, max: usize) -> Result<CompactString, FormatError> {
    let len = get_len(src, max)?;
    let offset = src.position();
    let mut bytes = vec![0u8; len];
    src.read_exact(&mut bytes)?;
    let s = String::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8 { offset })?;
    Ok(CompactString::from(s))
}

pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => put_u8(buf, Tag::Null as u8),
        Value::Timestamp(t) => {
            put_u8(buf, Tag::Timestamp as u8);
            put_i64(buf, *t);
        }
        Value::Integer(i) => {
            put_u8(buf, Tag::Integer as u8);
            put_i64(buf, *i);
        }
        Value::Numeric(n) => {
            put_u8(buf, Tag::Numeric as u8);
            put_i64(buf, n.mantissa);
            put_i32(buf, n.precision);
            put_i32(buf, n.scale);
        }
        Value::String(s) => {
            put_u8(buf, Tag::String as u8);
            put_string(buf, s);
        }
        Value::Date(d) => {
            put_u8(buf, Tag::Date as u8);
            put_i32(buf, d.year);
            put_i32(buf, d.month);
            put_i64(buf, d.rest);
        }
        Value::TimeSpan(t) => {
            put_u8(buf, Tag::TimeSpan as u8);
            put_i64(buf, *t);
        }
        Value::Boolean(b) => {
            put_u8(buf, Tag::Boolean as u8);
            put_u8(
                buf,
                match b {
                    Truth::Unknown => 0,
                    Truth::True => 1,
                    Truth::False => 2,
                },
            );
        }
    }
}

pub fn decode_value(src: &mut dyn ByteSource, max: usize) -> Result<Value, FormatError> {
    let offset = src.position();
    let byte = src.read_u8()?;
    let tag = Tag::from_u8(byte).ok_or(FormatError::UnknownTag { tag: byte, offset })?;
    Ok(match tag {
        Tag::Null => Value::Null,
        Tag::Timestamp => Value::Timestamp(get_i64(src)?),
        Tag::Integer => Value::Integer(get_i64(src)?),
        Tag::Numeric => Value::Numeric(Numeric {
            mantissa: get_i64(src)?,
            precision: get_i32(src)?,
            scale: get_i32(src)?,
        }),
        Tag::String => Value::String(get_string(src, max)?),
        Tag::Date => Value::Date(Date {
            year: get_i32(src)?,
            month: get_i32(src)?,
            rest: get_i64(src)?,
        }),
        Tag::TimeSpan => Value::TimeSpan(get_i64(src)?),
        Tag::Boolean => Value::Boolean(match get_u8(src)? {
            0 => Truth::Unknown,
            1 => Truth::True,
            2 => Truth::False,
            value => return Err(FormatError::InvalidTruth { value }),
        }),
        _ => return Err(FormatError::NotAScalar { tag: byte, offset }),
    })
}
