use std::fmt;

/// A signed reference into a package's object tables.
///
/// `0` is the null reference, positive values are 1-based export slots and
/// negative values are 1-based import slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIndex(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    Null,
    Export(usize),
    Import(usize),
}

impl PackageIndex {
    pub const NULL: Self = Self(0);

    pub fn from_export(slot: usize) -> Self {
        Self(slot as i32 + 1)
    }

    pub fn from_import(slot: usize) -> Self {
        Self(-(slot as i32) - 1)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn is_export(self) -> bool {
        self.0 > 0
    }

    pub fn is_import(self) -> bool {
        self.0 < 0
    }

    /// Sign dispatch into a zero-based table slot.
    pub fn resolve(self) -> IndexTarget {
        match self.0 {
            0 => IndexTarget::Null,
            i if i > 0 => IndexTarget::Export((i - 1) as usize),
            i => IndexTarget::Import((-(i as i64) - 1) as usize),
        }
    }
}

impl From<i32> for PackageIndex {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for PackageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_dispatch() {
        assert_eq!(PackageIndex(0).resolve(), IndexTarget::Null);
        assert_eq!(PackageIndex(3).resolve(), IndexTarget::Export(2));
        assert_eq!(PackageIndex(-2).resolve(), IndexTarget::Import(1));
        assert_eq!(PackageIndex(i32::MIN).resolve(), IndexTarget::Import(i32::MAX as usize));
    }

    #[test]
    fn slot_constructors_round_trip() {
        for slot in 0..16 {
            assert_eq!(PackageIndex::from_export(slot).resolve(), IndexTarget::Export(slot));
            assert_eq!(PackageIndex::from_import(slot).resolve(), IndexTarget::Import(slot));
        }
    }
}
