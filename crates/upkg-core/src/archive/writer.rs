use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{ArchiveVersion, Guid};
use crate::name::NameRef;

macro_rules! write_endian {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        pub fn $name(&mut self, v: $ty) {
            let mut bytes = [0u8; $size];
            if self.ver.big_endian {
                BigEndian::$method(&mut bytes, v);
            } else {
                LittleEndian::$method(&mut bytes, v);
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

/// Builds a byte buffer with the same encodings [`super::Archive`] reads.
pub struct ArchiveWriter {
    buf: Vec<u8>,
    ver: ArchiveVersion,
}

impl ArchiveWriter {
    pub fn new(ver: ArchiveVersion) -> Self {
        Self {
            buf: Vec::new(),
            ver,
        }
    }

    pub fn version(&self) -> &ArchiveVersion {
        &self.ver
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    write_endian!(write_u16, u16, 2, write_u16);
    write_endian!(write_i16, i16, 2, write_i16);
    write_endian!(write_u32, u32, 4, write_u32);
    write_endian!(write_i32, i32, 4, write_i32);
    write_endian!(write_u64, u64, 8, write_u64);
    write_endian!(write_f32, f32, 4, write_f32);

    pub fn write_compact_index(&mut self, value: i32) {
        let mut v = value.unsigned_abs();
        let mut b0 = (v & 0x3F) as u8;
        if value < 0 {
            b0 |= 0x80;
        }
        v >>= 6;
        if v > 0 {
            b0 |= 0x40;
        }
        self.buf.push(b0);
        let mut written = 0;
        while v > 0 {
            if written == 3 {
                self.buf.push(v as u8);
                break;
            }
            let mut b = (v & 0x7F) as u8;
            v >>= 7;
            if v > 0 {
                b |= 0x80;
            }
            self.buf.push(b);
            written += 1;
        }
    }

    pub fn write_index(&mut self, value: i32) {
        if self.ver.uses_compact_index() {
            self.write_compact_index(value);
        } else {
            self.write_i32(value);
        }
    }

    pub fn write_name_ref(&mut self, name: NameRef) {
        self.write_index(name.index);
        if self.ver.has_name_numbers() {
            self.write_i32(name.number);
        }
    }

    /// Single-byte text with a length that counts the NUL terminator.
    pub fn write_string(&mut self, s: &str) {
        if self.ver.version < super::version::VER_SIZE_PREFIXED_STRINGS {
            self.buf.extend_from_slice(s.as_bytes());
            self.buf.push(0);
            return;
        }
        if s.is_empty() {
            self.write_index(0);
            return;
        }
        self.write_index(s.len() as i32 + 1);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn write_guid(&mut self, guid: Guid) {
        self.write_u32(guid.a);
        self.write_u32(guid.b);
        self.write_u32(guid.c);
        self.write_u32(guid.d);
    }

    /// Overwrite an i32 written earlier (for back-patching offsets).
    pub fn patch_i32(&mut self, pos: usize, v: i32) {
        let mut bytes = [0u8; 4];
        if self.ver.big_endian {
            BigEndian::write_i32(&mut bytes, v);
        } else {
            LittleEndian::write_i32(&mut bytes, v);
        }
        self.buf[pos..pos + 4].copy_from_slice(&bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
