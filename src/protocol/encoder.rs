//! Write-side wire primitives.
//!
//! Everything outbound goes through `BytesMut`. The helpers here cover
//! the framing encodings, fixed-width scalar payloads are written in bulk
//! by the column container.
use bytes::{BufMut, BytesMut};
use uuid::Uuid;

/// VarInt64: 7 data bits per byte, top bit set while more bytes follow,
/// little-endian group order, at most 9 bytes.
pub(crate) trait WriteAware {
    fn write_varint(&mut self, value: u64);
    fn write_str(&mut self, value: &str);
    fn write_fixed_str(&mut self, value: &[u8], len: usize);
    fn write_uuid(&mut self, value: &Uuid);
}

impl WriteAware for BytesMut {
    fn write_varint(&mut self, mut value: u64) {
        for _ in 0..9 {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.put_u8(byte);
            if value == 0 {
                return;
            }
        }
    }

    #[inline]
    fn write_str(&mut self, value: &str) {
        self.write_varint(value.len() as u64);
        self.put_slice(value.as_bytes());
    }

    /// Up to `len` bytes of the value, zero-padded to exactly `len`.
    /// Truncation is byte-wise and may split a multi-byte code point.
    fn write_fixed_str(&mut self, value: &[u8], len: usize) {
        let head = std::cmp::min(value.len(), len);
        self.put_slice(&value[..head]);
        for _ in head..len {
            self.put_u8(0);
        }
    }

    #[inline]
    fn write_uuid(&mut self, value: &Uuid) {
        let mut bytes = *value.as_bytes();
        swap_uuid_halves(&mut bytes);
        self.put_slice(&bytes);
    }
}

/// On the wire both 8-byte halves of a UUID are byte-reversed relative
/// to the canonical big-endian form. The swap is its own inverse and is
/// the single place raw UUID bytes are reordered.
#[inline]
pub(crate) fn swap_uuid_halves(bytes: &mut [u8; 16]) {
    bytes[..8].reverse();
    bytes[8..].reverse();
}
