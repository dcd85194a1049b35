//! Endian-aware, version-aware primitive reader.

mod guid;
pub mod version;
mod writer;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub use guid::Guid;
pub use version::ArchiveVersion;
pub use writer::ArchiveWriter;

use crate::error::{Error, Result};
use crate::name::NameRef;

/// Upper bound for any length prefix we are willing to allocate for.
const MAX_STRING_LEN: usize = 1 << 20;

macro_rules! read_endian {
    ($name:ident, $ty:ty, $size:expr, $method:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.read_bytes($size)?;
            Ok(if self.ver.big_endian {
                BigEndian::$method(bytes)
            } else {
                LittleEndian::$method(bytes)
            })
        }
    };
}

/// Read cursor over a package buffer.
#[derive(Clone)]
pub struct Archive<'a> {
    data: &'a [u8],
    pos: usize,
    ver: ArchiveVersion,
}

impl<'a> Archive<'a> {
    pub fn new(data: &'a [u8], ver: ArchiveVersion) -> Self {
        Self { data, pos: 0, ver }
    }

    pub fn version(&self) -> &ArchiveVersion {
        &self.ver
    }

    pub fn set_version(&mut self, ver: ArchiveVersion) {
        self.ver = ver;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: pos,
                need: 0,
                have: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// A new archive over `len` bytes at `offset`, sharing this archive's version.
    pub fn sub_archive(&self, offset: usize, len: usize) -> Result<Archive<'a>> {
        let end = offset.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => Ok(Archive::new(&self.data[offset..end], self.ver.clone())),
            None => Err(Error::UnexpectedEof {
                offset,
                need: len,
                have: self.data.len().saturating_sub(offset),
            }),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    read_endian!(read_u16, u16, 2, read_u16);
    read_endian!(read_i16, i16, 2, read_i16);
    read_endian!(read_u32, u32, 4, read_u32);
    read_endian!(read_i32, i32, 4, read_i32);
    read_endian!(read_u64, u64, 8, read_u64);
    read_endian!(read_i64, i64, 8, read_i64);
    read_endian!(read_f32, f32, 4, read_f32);

    pub fn read_bool32(&mut self) -> Result<bool> {
        Ok(self.read_u32()? != 0)
    }

    /// Legacy variable-length signed integer (1-5 bytes).
    ///
    /// Byte 0: bit 7 sign, bit 6 continuation, bits 0-5 low magnitude.
    /// Bytes 1-3: bit 7 continuation, bits 0-6 magnitude. Byte 4 is read
    /// whole and unconditionally once reached.
    pub fn read_compact_index(&mut self) -> Result<i32> {
        let b0 = self.read_u8()?;
        let negative = b0 & 0x80 != 0;
        let mut value = (b0 & 0x3F) as u32;
        if b0 & 0x40 != 0 {
            let mut shift = 6;
            for i in 0..4 {
                let b = self.read_u8()?;
                if i == 3 {
                    value |= (b as u32) << shift;
                    break;
                }
                value |= ((b & 0x7F) as u32) << shift;
                shift += 7;
                if b & 0x80 == 0 {
                    break;
                }
            }
        }
        let value = value as i32;
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    /// A table index: compact before the deprecation threshold, i32 after.
    pub fn read_index(&mut self) -> Result<i32> {
        if self.ver.uses_compact_index() {
            self.read_compact_index()
        } else {
            self.read_i32()
        }
    }

    pub fn read_name_ref(&mut self) -> Result<NameRef> {
        let index = self.read_index()?;
        let number = if self.ver.has_name_numbers() {
            self.read_i32()?
        } else {
            0
        };
        Ok(NameRef { index, number })
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        Ok(Guid::new(
            self.read_u32()?,
            self.read_u32()?,
            self.read_u32()?,
            self.read_u32()?,
        ))
    }

    /// Length-prefixed text. A positive length is single-byte text, a negative
    /// one is UTF-16. The NUL terminator is consumed but not returned.
    pub fn read_string(&mut self) -> Result<String> {
        if self.ver.version < version::VER_SIZE_PREFIXED_STRINGS {
            return self.read_cstring();
        }
        let offset = self.pos;
        let len = self.read_index()?;
        let count = len.unsigned_abs() as usize;
        if count > MAX_STRING_LEN {
            return Err(Error::format(
                "string",
                format!("length {} at {:#x} is implausible", len, offset),
            ));
        }
        if len == 0 {
            return Ok(String::new());
        }
        if len > 0 {
            let mut bytes = self.read_bytes(count)?;
            if let Some((&0, body)) = bytes.split_last() {
                bytes = body;
            } else if self.peek_u8() == Some(0) {
                self.pos += 1;
            }
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            Ok(text.into_owned())
        } else {
            let mut units = Vec::with_capacity(count);
            for _ in 0..count {
                units.push(self.read_u16()?);
            }
            if units.last() == Some(&0) {
                units.pop();
            } else if self.data.get(self.pos..self.pos + 2) == Some(&[0, 0]) {
                self.pos += 2;
            }
            Ok(String::from_utf16_lossy(&units))
        }
    }

    /// NUL-terminated single-byte text, used by the oldest packages.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.pos;
        let Some(len) = self.data[start.min(self.data.len())..]
            .iter()
            .position(|b| *b == 0)
        else {
            return Err(Error::UnexpectedEof {
                offset: start,
                need: 1,
                have: self.remaining(),
            });
        };
        let bytes = self.read_bytes(len)?;
        self.pos += 1;
        let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
        Ok(text.into_owned())
    }

    /// Read `count` items with `f`, refusing counts that cannot fit in the buffer.
    pub fn read_array<T, F>(&mut self, count: i32, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        if count < 0 || count as usize > self.remaining() {
            return Err(Error::format(
                "array",
                format!("count {} at {:#x} exceeds the buffer", count, self.pos),
            ));
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(f(self)?);
        }
        Ok(out)
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos.checked_add(n).map_or(true, |end| end > self.data.len()) {
            return Err(Error::UnexpectedEof {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ue3() -> ArchiveVersion {
        ArchiveVersion::new(512, 0)
    }

    #[test]
    fn size_prefixed_hello() {
        let bytes = [0x05, 0x00, 0x00, 0x00, 0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x00];
        let mut ar = Archive::new(&bytes, ue3());
        assert_eq!(ar.read_string().unwrap(), "Hello");
        assert!(ar.is_eof());
    }

    #[test]
    fn length_including_terminator() {
        let bytes = [0x06, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o', 0x00, 0x7F];
        let mut ar = Archive::new(&bytes, ue3());
        assert_eq!(ar.read_string().unwrap(), "Hello");
        assert_eq!(ar.read_u8().unwrap(), 0x7F);
    }

    #[test]
    fn utf16_string() {
        let mut w = ArchiveWriter::new(ue3());
        w.write_i32(-3);
        for unit in "hé".encode_utf16() {
            w.write_u16(unit);
        }
        w.write_u16(0);
        let bytes = w.into_bytes();
        let mut ar = Archive::new(&bytes, ue3());
        assert_eq!(ar.read_string().unwrap(), "hé");
        assert!(ar.is_eof());
    }

    #[test]
    fn compact_index_negative_single_byte() {
        let mut ar = Archive::new(&[0x85], ArchiveVersion::new(69, 0));
        assert_eq!(ar.read_compact_index().unwrap(), -5);
    }

    #[test]
    fn compact_index_multi_byte() {
        // 0x40 continuation, magnitude 0x01 | (0x02 << 6)
        let mut ar = Archive::new(&[0x41, 0x02], ArchiveVersion::new(69, 0));
        assert_eq!(ar.read_compact_index().unwrap(), 1 | (2 << 6));
    }

    #[test]
    fn index_width_follows_version() {
        let bytes = [0x05, 0x00, 0x00, 0x00];
        let mut old = Archive::new(&bytes, ArchiveVersion::new(127, 0));
        assert_eq!(old.read_index().unwrap(), 5);
        assert_eq!(old.position(), 1);
        let mut new = Archive::new(&bytes, ArchiveVersion::new(512, 0));
        assert_eq!(new.read_index().unwrap(), 5);
        assert_eq!(new.position(), 4);
    }

    #[test]
    fn big_endian_ints() {
        let bytes = [0x00, 0x00, 0x01, 0x02];
        let mut ar = Archive::new(&bytes, ue3().big_endian(true));
        assert_eq!(ar.read_i32().unwrap(), 0x0102);
    }

    #[test]
    fn name_ref_numbers() {
        let mut w = ArchiveWriter::new(ue3());
        w.write_i32(7);
        w.write_i32(3);
        let bytes = w.into_bytes();
        let name = Archive::new(&bytes, ue3()).read_name_ref().unwrap();
        assert_eq!(name, NameRef { index: 7, number: 3 });

        let old = ArchiveVersion::new(300, 0);
        let name = Archive::new(&bytes, old).read_name_ref().unwrap();
        assert_eq!(name, NameRef { index: 7, number: 0 });
    }

    #[test]
    fn truncated_reads_fail() {
        let mut ar = Archive::new(&[1, 2], ue3());
        assert!(matches!(
            ar.read_u32(),
            Err(Error::UnexpectedEof { need: 4, have: 2, .. })
        ));
    }

    proptest! {
        #[test]
        fn compact_index_round_trip(value in -(1i32 << 28)..(1i32 << 28)) {
            let ver = ArchiveVersion::new(69, 0);
            let mut w = ArchiveWriter::new(ver.clone());
            w.write_compact_index(value);
            let bytes = w.into_bytes();
            prop_assert!(bytes.len() <= 5);
            let mut ar = Archive::new(&bytes, ver);
            prop_assert_eq!(ar.read_compact_index().unwrap(), value);
            prop_assert!(ar.is_eof());
        }
    }
}
