//! Little-endian byte cursor used by every codec in the crate.
//!
//! Atom framing validates the tag/length structure, but leaf payloads carry
//! their own internal counts (pool point counts, command operand lists), so
//! every read is bounds-checked: a count that overstates its payload
//! surfaces as a `Format` error instead of a panic.

use crate::error::{DsfError, DsfResult};

/// A scalar that can be read from / written to a cursor as little-endian
/// bytes. Lets the pool codec stay generic over u16 (POOL) and u32 (PO32).
pub trait Scalar: Copy {
    fn read(reader: &mut DataReader) -> DsfResult<Self>;
    fn write(self, writer: &mut DataWriter);
}

impl Scalar for u16 {
    fn read(reader: &mut DataReader) -> DsfResult<u16> {
        reader.read_u16()
    }
    fn write(self, writer: &mut DataWriter) {
        writer.put_u16(self);
    }
}

impl Scalar for u32 {
    fn read(reader: &mut DataReader) -> DsfResult<u32> {
        reader.read_u32()
    }
    fn write(self, writer: &mut DataWriter) {
        writer.put_u32(self);
    }
}

/// A read cursor over a byte slice.
pub struct DataReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8]) -> DataReader<'a> {
        DataReader { data, pos: 0 }
    }

    /// Claims the next `n` bytes, or fails with a truncation error.
    fn take(&mut self, n: usize) -> DsfResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DsfError::Format(format!(
                "payload truncated: wanted {} bytes at offset {} but only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> DsfResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> DsfResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> DsfResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> DsfResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read<T: Scalar>(&mut self) -> DsfResult<T> {
        T::read(self)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn done(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// A growable write cursor, the mirror of [`DataReader`].
#[derive(Default)]
pub struct DataWriter {
    out: Vec<u8>,
}

impl DataWriter {
    pub fn new() -> DataWriter {
        DataWriter { out: Vec::new() }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.out.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put<T: Scalar>(&mut self, v: T) {
        v.write(self);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}
