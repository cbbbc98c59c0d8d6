//! Position-tracked byte cursors and CompactSize varints
//!
//! Every on-wire structure in the crate (inputs, outputs, transactions,
//! block headers, merkle blocks) is read through [`BufferReader`] and
//! written through [`BufferWriter`]. Cursors are created per call and
//! never shared.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::constants::MAX_SAFE_INTEGER;
use crate::error::{Result, SignerError};

/// Number of bytes needed to encode `n` as a varint
#[inline]
pub fn varint_size(n: u64) -> usize {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// CompactSize encoding of `n`
pub fn encode_varint(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_size(n));
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, n as u16);
        out.push(0xfd);
        out.extend_from_slice(&buf);
    } else if n <= 0xffff_ffff {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, n as u32);
        out.push(0xfe);
        out.extend_from_slice(&buf);
    } else {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, n);
        out.push(0xff);
        out.extend_from_slice(&buf);
    }
    out
}

/// Read-side byte cursor over a borrowed buffer
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BufferReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True once the cursor has consumed the whole buffer
    pub fn finished(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Next `n` bytes, advancing the cursor
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(SignerError::OutOfBounds {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Everything left in the buffer
    pub fn read_all(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    /// Next `n` bytes in reversed order (wire hash → display order)
    pub fn read_reverse(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = self.read(n)?.to_vec();
        out.reverse();
        Ok(out)
    }

    /// Next 32 bytes as a fixed array, wire order
    pub fn read_hash(&mut self) -> Result<[u8; 32]> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.read(32)?);
        Ok(hash)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    /// Next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(SignerError::OutOfBounds {
            requested: 1,
            remaining: 0,
        })
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read(2)?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read(2)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read(4)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read(4)?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read(4)?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.read(8)?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read(8)?))
    }

    /// Full-range varint; never fails on value size
    pub fn read_varint_u64(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        match first {
            0xfd => self.read_u16_le().map(u64::from),
            0xfe => self.read_u32_le().map(u64::from),
            0xff => self.read_u64_le(),
            n => Ok(u64::from(n)),
        }
    }

    /// Varint as a "native number"
    ///
    /// Values at or above 2^53 are rejected with `PrecisionLoss`.
    pub fn read_varint_num(&mut self) -> Result<u64> {
        let n = self.read_varint_u64()?;
        if n > MAX_SAFE_INTEGER {
            return Err(SignerError::PrecisionLoss(n));
        }
        Ok(n)
    }

    /// The raw encoded bytes of the next varint
    pub fn read_varint_buf(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let first = self.read_u8()?;
        let extra = match first {
            0xfd => 2,
            0xfe => 4,
            0xff => 8,
            _ => 0,
        };
        self.read(extra)?;
        Ok(&self.buf[start..self.pos])
    }

    /// Varint length prefix followed by exactly that many bytes
    pub fn read_var_length_buffer(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint_num()?;
        let len = usize::try_from(len).map_err(|_| SignerError::OutOfBounds {
            requested: usize::MAX,
            remaining: self.remaining(),
        })?;
        self.read(len)
    }

    /// Varint count, checked against the bytes left given a per-item size
    pub fn read_count(&mut self, item_size: usize) -> Result<usize> {
        let count = self.read_varint_num()?;
        let needed = count.saturating_mul(item_size as u64);
        if needed > self.remaining() as u64 {
            return Err(SignerError::OutOfBounds {
                requested: usize::try_from(needed).unwrap_or(usize::MAX),
                remaining: self.remaining(),
            });
        }
        Ok(count as usize)
    }
}

/// Write-side accumulator
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    buf: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        BufferWriter { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_reverse(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend(bytes.iter().rev());
        self
    }

    pub fn write_u8(&mut self, n: u8) -> &mut Self {
        self.buf.push(n);
        self
    }

    pub fn write_u16_be(&mut self, n: u16) -> &mut Self {
        let mut b = [0u8; 2];
        BigEndian::write_u16(&mut b, n);
        self.write(&b)
    }

    pub fn write_u16_le(&mut self, n: u16) -> &mut Self {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, n);
        self.write(&b)
    }

    pub fn write_u32_be(&mut self, n: u32) -> &mut Self {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, n);
        self.write(&b)
    }

    pub fn write_u32_le(&mut self, n: u32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, n);
        self.write(&b)
    }

    pub fn write_i32_le(&mut self, n: i32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, n);
        self.write(&b)
    }

    pub fn write_u64_be(&mut self, n: u64) -> &mut Self {
        let mut b = [0u8; 8];
        BigEndian::write_u64(&mut b, n);
        self.write(&b)
    }

    pub fn write_u64_le(&mut self, n: u64) -> &mut Self {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, n);
        self.write(&b)
    }

    pub fn write_varint(&mut self, n: u64) -> &mut Self {
        let encoded = encode_varint(n);
        self.write(&encoded)
    }

    pub fn write_var_length_buffer(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_varint(bytes.len() as u64);
        self.write(bytes)
    }

    /// Concatenation of everything written so far
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Types with a canonical wire encoding
pub trait Serializable: Sized {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self>;

    fn write(&self, writer: &mut BufferWriter);

    /// Decode from a buffer that must be consumed entirely
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = BufferReader::new(bytes);
        let value = Self::read(&mut reader)?;
        if !reader.finished() {
            return Err(SignerError::InvalidEncoding(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(value)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BufferWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // READER
    // ============================================================================

    #[test]
    fn test_read_out_of_bounds() {
        let mut reader = BufferReader::new(&[1, 2, 3]);
        assert_eq!(reader.read(2).unwrap(), &[1, 2]);
        assert_eq!(
            reader.read(2),
            Err(SignerError::OutOfBounds { requested: 2, remaining: 1 })
        );
        // a failed read does not move the cursor
        assert_eq!(reader.peek_u8().unwrap(), 3);
        assert_eq!(reader.read_u8().unwrap(), 3);
        assert!(reader.finished());
        assert!(reader.peek_u8().is_err());
    }

    #[test]
    fn test_read_integers_both_endians() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(BufferReader::new(&bytes).read_u32_le().unwrap(), 0x0403_0201);
        assert_eq!(BufferReader::new(&bytes).read_u32_be().unwrap(), 0x0102_0304);
        assert_eq!(BufferReader::new(&bytes).read_u16_le().unwrap(), 0x0201);
        assert_eq!(BufferReader::new(&bytes).read_u16_be().unwrap(), 0x0102);
        assert_eq!(BufferReader::new(&[0xff; 4]).read_i32_le().unwrap(), -1);
    }

    #[test]
    fn test_read_reverse() {
        let mut reader = BufferReader::new(&[1, 2, 3, 4]);
        assert_eq!(reader.read_reverse(3).unwrap(), vec![3, 2, 1]);
        assert_eq!(reader.read_all(), &[4]);
        assert!(reader.finished());
    }

    #[test]
    fn test_read_var_length_buffer_short() {
        let mut reader = BufferReader::new(&[0x05, 0xaa, 0xbb]);
        assert!(matches!(
            reader.read_var_length_buffer(),
            Err(SignerError::OutOfBounds { requested: 5, remaining: 2 })
        ));
    }

    #[test]
    fn test_read_varint_buf_returns_raw_encoding() {
        let mut reader = BufferReader::new(&[0xfd, 0x00, 0x01, 0x07]);
        assert_eq!(reader.read_varint_buf().unwrap(), &[0xfd, 0x00, 0x01]);
        assert_eq!(reader.read_varint_buf().unwrap(), &[0x07]);
    }

    #[test]
    fn test_read_count_rejects_impossible_lengths() {
        let mut reader = BufferReader::new(&[0x03, 0, 0, 0]);
        assert!(reader.read_count(32).is_err());
    }

    // ============================================================================
    // VARINT
    // ============================================================================

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(encode_varint(0xfc), vec![0xfc]);
        assert_eq!(encode_varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(encode_varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(encode_varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(encode_varint(0x1_0000_0000).len(), 9);
        for n in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000] {
            assert_eq!(encode_varint(n).len(), varint_size(n));
        }
    }

    #[test]
    fn test_varint_precision_loss() {
        let mut writer = BufferWriter::new();
        writer.write_varint(1u64 << 53);
        let bytes = writer.into_bytes();
        assert_eq!(
            BufferReader::new(&bytes).read_varint_num(),
            Err(SignerError::PrecisionLoss(1u64 << 53))
        );
        assert_eq!(BufferReader::new(&bytes).read_varint_u64().unwrap(), 1u64 << 53);
    }

    // ============================================================================
    // WRITER
    // ============================================================================

    #[test]
    fn test_writer_chaining() {
        let mut writer = BufferWriter::new();
        writer.write_u8(1).write_u16_be(0x0203).write_u32_le(0x0706_0504);
        assert_eq!(writer.to_bytes(), vec![1, 2, 3, 4, 5, 6, 7]);
        writer.write_reverse(&[9, 8]);
        assert_eq!(writer.len(), 9);
        assert_eq!(writer.into_bytes()[7..], [8, 9]);
    }
}
