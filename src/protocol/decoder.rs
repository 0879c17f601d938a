//! Read-side wire primitives and the streaming frame decoder.
//!
//! Inbound bytes accumulate in a `BytesMut`. The decoder parses the next
//! frame on a cursor copy and advances the real buffer only after a whole
//! frame came out; a partial payload surfaces as `IncompleteWireFormat`
//! and the caller waits for more bytes.
use bytes::{Buf, BytesMut};

use super::packet::Packet;
use crate::errors::{DriverError, Result};

/// Borrowing cursor over buffered bytes.
/// Every read checks the remaining length first; an underrun yields
/// `IncompleteWireFormat`, never a partial value.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> ByteReader<'a> {
        ByteReader { buf, pos: 0 }
    }

    /// The number of bytes consumed so far
    #[inline]
    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn ensure(&self, len: usize) -> Result<()> {
        if self.buf.len() - self.pos < len {
            return Err(DriverError::IncompleteWireFormat.into());
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// VarInt64, little-endian 7-bit groups.
    /// Nine continuation bytes without a terminator mean the stream is
    /// corrupted, not that more data is needed.
    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..9u32 {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DriverError::BrokenData.into())
    }

    /// VarInt length + raw bytes
    pub(crate) fn read_str(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        if len > crate::MAX_STRING_LEN {
            return Err(DriverError::StringTooLong.into());
        }
        self.read_bytes(len)
    }

    pub(crate) fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_str()?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    #[inline]
    pub(crate) fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    #[inline]
    pub(crate) fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }
}

/// Pull the next whole frame out of the receive buffer.
///
/// `Ok(None)` means the buffered bytes do not yet hold a complete frame.
/// Real decode failures (unknown opcode, corrupted payload) pass through
/// and are fatal to the connection.
pub(crate) fn next_packet(buf: &mut BytesMut, revision: u64) -> Result<Option<Packet>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut reader = ByteReader::new(&buf[..]);
    match Packet::read(&mut reader, revision) {
        Ok(packet) => {
            let consumed = reader.consumed();
            buf.advance(consumed);
            Ok(Some(packet))
        }
        Err(err) if err.is_incomplete() => Ok(None),
        Err(err) => Err(err),
    }
}
