//! Little-endian byte cursor and writer shared by every codec
//!
//! osu! stable writes its databases with .NET's `BinaryWriter`: fixed-width
//! little-endian integers and floats, one-byte booleans, ULEB128 lengths and
//! a one-byte marker in front of every string (`0x00` absent, `0x0B`
//! present). [`ByteCursor`] and [`ByteWriter`] are the two halves of that
//! encoding.

use crate::error::{CodecError, Result};

/// Marker byte written in front of a present string
pub const STRING_PRESENT: u8 = 0x0B;

/// Marker byte for an absent string
pub const STRING_ABSENT: u8 = 0x00;

/// Read position over an immutable byte buffer
///
/// Every read checks the remaining length first and fails with
/// [`CodecError::Truncated`] instead of reading past the end. The offset
/// only advances on success.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

macro_rules! read_le {
    ($(#[$doc:meta] $name:ident => $ty:ty),* $(,)?) => {
        $(
            #[$doc]
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.take(std::mem::size_of::<$ty>())?;
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(buf))
            }
        )*
    };
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read position
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether the cursor has consumed the whole buffer
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Underlying buffer
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Consume `count` bytes and return them as a slice
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if count > available {
            return Err(CodecError::truncated(self.offset, count, available));
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    /// Advance the position by `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    read_le! {
        /// Read an unsigned byte
        read_u8 => u8,
        /// Read a little-endian u16
        read_u16 => u16,
        /// Read a little-endian u32
        read_u32 => u32,
        /// Read a little-endian u64
        read_u64 => u64,
        /// Read a signed byte
        read_i8 => i8,
        /// Read a little-endian i16
        read_i16 => i16,
        /// Read a little-endian i32
        read_i32 => i32,
        /// Read a little-endian i64
        read_i64 => i64,
        /// Read an IEEE-754 single
        read_f32 => f32,
        /// Read an IEEE-754 double
        read_f64 => f64,
    }

    /// Read a one-byte boolean (any nonzero byte is true)
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read an unsigned LEB128 integer
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let start = self.offset;
        let mut result = 0u64;
        let mut shift = 0u32;

        loop {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7F) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
            if shift >= 64 {
                self.offset = start;
                return Err(CodecError::InvalidEncoding { offset: start });
            }
        }
    }

    /// Read a ULEB128 length and check it fits in the remaining buffer
    pub fn read_length(&mut self) -> Result<usize> {
        let at = self.offset;
        let length = self.read_uleb128()?;
        usize::try_from(length).map_err(|_| CodecError::InvalidEncoding { offset: at })
    }

    /// Read a marker-prefixed string; `None` when the marker is `0x00`
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let start = self.offset;
        let marker = self.read_u8()?;
        if marker == STRING_ABSENT {
            return Ok(None);
        }

        match self.read_bare_string() {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                self.offset = start;
                Err(err)
            }
        }
    }

    /// Read a ULEB128-prefixed UTF-8 string with no marker byte
    pub fn read_bare_string(&mut self) -> Result<String> {
        let start = self.offset;
        let length = self.read_length()?;
        let payload_at = self.offset;
        let bytes = match self.take(length) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.offset = start;
                return Err(err);
            }
        };
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            self.offset = start;
            CodecError::InvalidEncoding { offset: payload_at }
        })
    }
}

/// Growable little-endian output buffer
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($(#[$doc:meta] $name:ident => $ty:ty),* $(,)?) => {
        $(
            #[$doc]
            pub fn $name(&mut self, value: $ty) {
                self.buf.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ByteWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Take the written bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    write_le! {
        /// Write an unsigned byte
        write_u8 => u8,
        /// Write a little-endian u16
        write_u16 => u16,
        /// Write a little-endian u32
        write_u32 => u32,
        /// Write a little-endian u64
        write_u64 => u64,
        /// Write a signed byte
        write_i8 => i8,
        /// Write a little-endian i16
        write_i16 => i16,
        /// Write a little-endian i32
        write_i32 => i32,
        /// Write a little-endian i64
        write_i64 => i64,
        /// Write an IEEE-754 single
        write_f32 => f32,
        /// Write an IEEE-754 double
        write_f64 => f64,
    }

    /// Write a boolean as `0x00` or `0x01`
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write an unsigned LEB128 integer
    pub fn write_uleb128(&mut self, value: u64) {
        let mut value = value;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Write a marker-prefixed string
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.buf.push(STRING_ABSENT),
            Some(value) => {
                self.buf.push(STRING_PRESENT);
                self.write_bare_string(value);
            }
        }
    }

    /// Write a ULEB128-prefixed string without a marker byte
    pub fn write_bare_string(&mut self, value: &str) {
        self.write_uleb128(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }
}

/// Number of bytes `value` occupies as ULEB128
pub fn uleb128_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}
