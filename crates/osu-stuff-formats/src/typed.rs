//! Tagged values (.NET `SerializationWriter.WriteObject` encoding)
//!
//! A typed value is a one-byte type tag followed by a payload whose shape
//! the tag decides. Newer catalogs store star-rating pairs this way.

use crate::binary::{ByteCursor, ByteWriter};
use crate::error::{CodecError, Result};

/// A value read through its type tag
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Tag 1
    Bool(bool),
    /// Tag 2
    U8(u8),
    /// Tag 3
    U16(u16),
    /// Tag 4
    U32(u32),
    /// Tag 5
    U64(u64),
    /// Tag 6
    I8(i8),
    /// Tag 7
    I16(i16),
    /// Tag 8
    I32(i32),
    /// Tag 9
    I64(i64),
    /// Tag 10, a UTF-16 code unit
    Char(u16),
    /// Tag 11
    String(Option<String>),
    /// Tag 12
    F32(f32),
    /// Tag 13
    F64(f64),
    /// Tag 14, a decimal stored as a double
    Decimal(f64),
    /// Tag 15, .NET ticks
    DateTime(i64),
    /// Tag 16, i32 length with -1 meaning none
    Bytes(Option<Vec<u8>>),
    /// Tag 17, ULEB128 length
    Chars(Vec<u8>),
}

impl TypedValue {
    /// Read a tag byte and its payload
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.offset();
        let tag = cursor.read_u8()?;
        let value = match tag {
            1 => Self::Bool(cursor.read_bool()?),
            2 => Self::U8(cursor.read_u8()?),
            3 => Self::U16(cursor.read_u16()?),
            4 => Self::U32(cursor.read_u32()?),
            5 => Self::U64(cursor.read_u64()?),
            6 => Self::I8(cursor.read_i8()?),
            7 => Self::I16(cursor.read_i16()?),
            8 => Self::I32(cursor.read_i32()?),
            9 => Self::I64(cursor.read_i64()?),
            10 => Self::Char(cursor.read_u16()?),
            11 => Self::String(cursor.read_string()?),
            12 => Self::F32(cursor.read_f32()?),
            13 => Self::F64(cursor.read_f64()?),
            14 => Self::Decimal(cursor.read_f64()?),
            15 => Self::DateTime(cursor.read_i64()?),
            16 => {
                let at = cursor.offset();
                let length = cursor.read_i32()?;
                if length == -1 {
                    Self::Bytes(None)
                } else {
                    let length = usize::try_from(length)
                        .map_err(|_| CodecError::InvalidEncoding { offset: at })?;
                    Self::Bytes(Some(cursor.take(length)?.to_vec()))
                }
            }
            17 => {
                let length = cursor.read_length()?;
                Self::Chars(cursor.take(length)?.to_vec())
            }
            tag => return Err(CodecError::UnknownTypeTag { tag, offset: start }),
        };
        Ok(value)
    }

    /// Write the tag byte and payload
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.tag());
        match self {
            Self::Bool(v) => writer.write_bool(*v),
            Self::U8(v) => writer.write_u8(*v),
            Self::U16(v) | Self::Char(v) => writer.write_u16(*v),
            Self::U32(v) => writer.write_u32(*v),
            Self::U64(v) => writer.write_u64(*v),
            Self::I8(v) => writer.write_i8(*v),
            Self::I16(v) => writer.write_i16(*v),
            Self::I32(v) => writer.write_i32(*v),
            Self::I64(v) | Self::DateTime(v) => writer.write_i64(*v),
            Self::String(v) => writer.write_string(v.as_deref()),
            Self::F32(v) => writer.write_f32(*v),
            Self::F64(v) | Self::Decimal(v) => writer.write_f64(*v),
            Self::Bytes(None) => writer.write_i32(-1),
            Self::Bytes(Some(bytes)) => {
                writer.write_i32(bytes.len() as i32);
                writer.write_bytes(bytes);
            }
            Self::Chars(bytes) => {
                writer.write_uleb128(bytes.len() as u64);
                writer.write_bytes(bytes);
            }
        }
    }

    /// The type tag this value is written with
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 1,
            Self::U8(_) => 2,
            Self::U16(_) => 3,
            Self::U32(_) => 4,
            Self::U64(_) => 5,
            Self::I8(_) => 6,
            Self::I16(_) => 7,
            Self::I32(_) => 8,
            Self::I64(_) => 9,
            Self::Char(_) => 10,
            Self::String(_) => 11,
            Self::F32(_) => 12,
            Self::F64(_) => 13,
            Self::Decimal(_) => 14,
            Self::DateTime(_) => 15,
            Self::Bytes(_) => 16,
            Self::Chars(_) => 17,
        }
    }

    /// Numeric view of the value, `None` for strings and arrays
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Bool(v) => f64::from(u8::from(*v)),
            Self::U8(v) => f64::from(*v),
            Self::U16(v) | Self::Char(v) => f64::from(*v),
            Self::U32(v) => f64::from(*v),
            Self::U64(v) => *v as f64,
            Self::I8(v) => f64::from(*v),
            Self::I16(v) => f64::from(*v),
            Self::I32(v) => f64::from(*v),
            Self::I64(v) | Self::DateTime(v) => *v as f64,
            Self::F32(v) => f64::from(*v),
            Self::F64(v) | Self::Decimal(v) => *v,
            Self::String(_) | Self::Bytes(_) | Self::Chars(_) => return None,
        };
        Some(value)
    }

    /// Build a numeric value of the given tag from a double
    ///
    /// Fails with [`CodecError::UnknownTypeTag`] for tags that are not
    /// numeric.
    #[allow(clippy::cast_possible_wrap)]
    pub fn numeric(tag: u8, value: f64) -> Result<Self> {
        let typed = match tag {
            1 => Self::Bool(value != 0.0),
            2 => Self::U8(value as u8),
            3 => Self::U16(value as u16),
            4 => Self::U32(value as u32),
            5 => Self::U64(value as u64),
            6 => Self::I8(value as i8),
            7 => Self::I16(value as i16),
            8 => Self::I32(value as i32),
            9 => Self::I64(value as i64),
            10 => Self::Char(value as u16),
            12 => Self::F32(value as f32),
            13 => Self::F64(value),
            14 => Self::Decimal(value),
            15 => Self::DateTime(value as i64),
            tag => return Err(CodecError::UnknownTypeTag { tag, offset: 0 }),
        };
        Ok(typed)
    }

    /// Character view of a tag-10 value
    pub fn as_char(&self) -> Option<char> {
        match self {
            Self::Char(unit) => char::from_u32(u32::from(*unit)),
            _ => None,
        }
    }
}
