use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::archive::{version, Archive};
use crate::error::{Error, Result};

/// A reference into the name table as stored on disk.
///
/// `number` is stored one greater than the logical instance number, so `0`
/// means the name carries no number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NameRef {
    pub index: i32,
    pub number: i32,
}

impl NameRef {
    pub fn new(index: i32) -> Self {
        Self { index, number: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub text: String,
    pub flags: u64,
}

impl NameRecord {
    pub fn read(ar: &mut Archive) -> Result<Self> {
        let text = ar.read_string()?;
        let flags = if ar.version().at_least(version::VER_64BIT_FLAGS) {
            ar.read_u64()?
        } else {
            ar.read_u32()? as u64
        };
        Ok(Self { text, flags })
    }
}

/// A resolved name. Equality and hashing ignore ASCII case.
#[derive(Debug, Clone, Default)]
pub struct Name {
    pub text: String,
    pub number: i32,
}

impl Name {
    pub const NONE: &'static str = "None";

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            number: 0,
        }
    }

    pub fn with_number(text: impl Into<String>, number: i32) -> Self {
        Self {
            text: text.into(),
            number,
        }
    }

    pub fn is_none(&self) -> bool {
        self.number == 0 && self.text.eq_ignore_ascii_case(Self::NONE)
    }

    pub fn eq_str(&self, text: &str) -> bool {
        self.number == 0 && self.text.eq_ignore_ascii_case(text)
    }

    /// Hash of the normalized identity, used for container buckets.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.text.eq_ignore_ascii_case(&other.text)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.text.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_i32(self.number);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.number > 0 {
            write!(f, "{}_{}", self.text, self.number - 1)
        } else {
            f.write_str(&self.text)
        }
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    records: Vec<NameRecord>,
}

impl NameTable {
    pub fn new(records: Vec<NameRecord>) -> Self {
        Self { records }
    }

    pub fn read(ar: &mut Archive, offset: i32, count: i32) -> Result<Self> {
        ar.seek(offset as usize)?;
        let records = ar.read_array(count, NameRecord::read)?;
        log::debug!("read {} names ending at {:#x}", records.len(), ar.position());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[NameRecord] {
        &self.records
    }

    pub fn text(&self, index: i32) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.records.get(i))
            .map(|r| r.text.as_str())
            .ok_or(Error::NameOutOfRange {
                index,
                count: self.records.len(),
            })
    }

    pub fn resolve(&self, name: NameRef) -> Result<Name> {
        Ok(Name::with_number(self.text(name.index)?, name.number))
    }

    pub fn find(&self, text: &str) -> Option<i32> {
        self.records
            .iter()
            .position(|r| r.text.eq_ignore_ascii_case(text))
            .map(|i| i as i32)
    }
}
