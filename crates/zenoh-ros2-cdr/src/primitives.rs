//! Low-level CDR primitive read/write operations.
//!
//! `CdrWriter` and `CdrReader` handle alignment relative to the position they
//! were created at, which for ROS 2 payloads is the first byte after the
//! encapsulation header.

use std::marker::PhantomData;

use byteorder::ByteOrder;

use crate::error::{CdrError, Result};

/// CDR writer appending to a byte vector.
pub struct CdrWriter<'a, BO> {
    buffer: &'a mut Vec<u8>,
    start_offset: usize,
    _phantom: PhantomData<BO>,
}

macro_rules! write_aligned {
    ($($method:ident, $ty:ty, $size:expr, $bo_fn:ident);* $(;)?) => {
        $(
            #[inline]
            pub fn $method(&mut self, v: $ty) {
                self.align($size);
                let mut buf = [0u8; $size];
                BO::$bo_fn(&mut buf, v);
                self.buffer.extend_from_slice(&buf);
            }
        )*
    };
}

impl<'a, BO: ByteOrder> CdrWriter<'a, BO> {
    #[inline]
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        let start_offset = buffer.len();
        Self {
            buffer,
            start_offset,
            _phantom: PhantomData,
        }
    }

    /// Current position relative to start.
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.buffer.len() - self.start_offset
    }

    /// Add zero padding up to the next multiple of `alignment`.
    #[inline(always)]
    pub fn align(&mut self, alignment: usize) {
        let modulo = self.position() % alignment;
        if modulo != 0 {
            const ZEROS: [u8; 8] = [0; 8];
            self.buffer.extend_from_slice(&ZEROS[..alignment - modulo]);
        }
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.buffer.push(u8::from(v));
    }

    #[inline]
    pub fn write_i8(&mut self, v: i8) {
        self.buffer.push(v as u8);
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    write_aligned! {
        write_i16, i16, 2, write_i16;
        write_u16, u16, 2, write_u16;
        write_i32, i32, 4, write_i32;
        write_u32, u32, 4, write_u32;
        write_i64, i64, 8, write_i64;
        write_u64, u64, 8, write_u64;
        write_f32, f32, 4, write_f32;
        write_f64, f64, 8, write_f64;
    }

    /// Length (including the terminator), bytes, then a NUL.
    #[inline]
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32 + 1);
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Raw bytes without prefix or alignment.
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    #[inline]
    pub fn write_sequence_length(&mut self, len: usize) {
        self.write_u32(len as u32);
    }
}

/// CDR reader over a borrowed byte slice.
pub struct CdrReader<'a, BO> {
    input: &'a [u8],
    position: usize,
    _phantom: PhantomData<BO>,
}

macro_rules! read_aligned {
    ($($method:ident, $ty:ty, $size:expr, $bo_fn:ident);* $(;)?) => {
        $(
            #[inline]
            pub fn $method(&mut self) -> Result<$ty> {
                self.align($size)?;
                Ok(BO::$bo_fn(self.read_bytes($size)?))
            }
        )*
    };
}

impl<'a, BO: ByteOrder> CdrReader<'a, BO> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.input.len() - self.position
    }

    fn truncated(&self, needed: usize) -> CdrError {
        CdrError::TruncatedPayload {
            offset: self.position,
            needed: needed - self.remaining(),
        }
    }

    /// Skip padding up to the next multiple of `alignment`.
    #[inline]
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let modulo = self.position % alignment;
        if modulo != 0 {
            let padding = alignment - modulo;
            if self.remaining() < padding {
                return Err(self.truncated(padding));
            }
            self.position += padding;
        }
        Ok(())
    }

    /// Raw bytes without alignment.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(self.truncated(count));
        }
        let bytes = &self.input[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        let offset = self.position;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => Err(CdrError::InvalidData {
                offset,
                reason: format!("invalid boolean value {x}"),
            }),
        }
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    read_aligned! {
        read_i16, i16, 2, read_i16;
        read_u16, u16, 2, read_u16;
        read_i32, i32, 4, read_i32;
        read_u32, u32, 4, read_u32;
        read_i64, i64, 8, read_i64;
        read_u64, u64, 8, read_u64;
        read_f32, f32, 4, read_f32;
        read_f64, f64, 8, read_f64;
    }

    /// Read a CDR string, stripping the NUL terminator.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let offset = self.position;
        let bytes = self.read_bytes(len)?;
        let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        std::str::from_utf8(text)
            .map(str::to_owned)
            .map_err(|e| CdrError::InvalidData {
                offset,
                reason: e.to_string(),
            })
    }

    /// Read a sequence length, refusing counts the remaining input cannot hold
    /// given at least `min_element_size` bytes per element.
    pub fn read_sequence_length(&mut self, min_element_size: usize) -> Result<usize> {
        let len = self.read_u32()? as usize;
        let needed = len.saturating_mul(min_element_size.max(1));
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        Ok(len)
    }
}
