//! Import, export and dependency tables.

use once_cell::unsync::OnceCell;

use crate::archive::version::*;
use crate::archive::{Archive, Guid};
use crate::build::BuildFlags;
use crate::error::Result;
use crate::index::PackageIndex;
use crate::name::NameRef;
use crate::object::ObjectId;
use crate::summary::TableLocation;

/// Fields shared by import and export records.
pub trait ObjectTableItem: Sized {
    const TABLE: &'static str;

    fn read(ar: &mut Archive, index: usize) -> Result<Self>;

    /// Slot within the owning table.
    fn index(&self) -> usize;

    fn object_name(&self) -> NameRef;

    fn outer_index(&self) -> PackageIndex;

    /// Write-once link to the constructed object.
    fn object_cell(&self) -> &OnceCell<ObjectId>;

    fn object(&self) -> Option<ObjectId> {
        self.object_cell().get().copied()
    }
}

#[derive(Debug, Clone)]
pub struct ExportItem {
    pub index: usize,
    pub class_index: PackageIndex,
    pub super_index: PackageIndex,
    pub outer_index: PackageIndex,
    pub object_name: NameRef,
    pub archetype_index: PackageIndex,
    pub object_flags: u64,
    pub serial_size: i32,
    pub serial_offset: i32,
    pub component_map: Vec<(NameRef, PackageIndex)>,
    pub export_flags: u32,
    pub net_objects: Vec<i32>,
    pub package_guid: Guid,
    pub package_flags: u32,
    pub(crate) object: OnceCell<ObjectId>,
}

impl ExportItem {
    /// Byte range of the serialized object, if it has any data.
    pub fn serial_range(&self) -> Option<std::ops::Range<usize>> {
        if self.serial_size <= 0 || self.serial_offset < 0 {
            return None;
        }
        let start = self.serial_offset as usize;
        Some(start..start + self.serial_size as usize)
    }
}

impl ObjectTableItem for ExportItem {
    const TABLE: &'static str = "export";

    fn read(ar: &mut Archive, index: usize) -> Result<Self> {
        let ver = ar.version().clone();
        let class_index = PackageIndex(ar.read_index()?);
        let super_index = PackageIndex(ar.read_index()?);
        let outer_index = PackageIndex(ar.read_i32()?);
        let object_name = ar.read_name_ref()?;
        let archetype_index = if ver.at_least(VER_ARCHETYPE) {
            PackageIndex(ar.read_i32()?)
        } else {
            PackageIndex::NULL
        };
        let object_flags = if ver.at_least(VER_64BIT_FLAGS) {
            ar.read_u64()?
        } else {
            ar.read_u32()? as u64
        };
        let serial_size = ar.read_index()?;
        let serial_offset = if serial_size > 0 || ver.at_least(VER_HEADER_SIZE) {
            ar.read_index()?
        } else {
            0
        };

        let mut component_map = Vec::new();
        if ver.at_least(VER_EXPORT_FLAGS) && !ver.at_least(VER_COMPONENT_MAP_DEPRECATED) {
            let count = ar.read_i32()?;
            component_map = ar.read_array(count, |ar| {
                Ok((ar.read_name_ref()?, PackageIndex(ar.read_i32()?)))
            })?;
        }
        let export_flags = if ver.at_least(VER_EXPORT_FLAGS) {
            ar.read_u32()?
        } else {
            0
        };

        let mut net_objects = Vec::new();
        let mut package_guid = Guid::default();
        if ver.at_least(VER_NET_INDEX) {
            let count = ar.read_i32()?;
            net_objects = ar.read_array(count, |ar| ar.read_i32())?;
            package_guid = ar.read_guid()?;
        }
        let package_flags = if ver.at_least(VER_EXPORT_PACKAGE_FLAGS) {
            ar.read_u32()?
        } else {
            0
        };
        if ver.build.has(BuildFlags::EXPORT_TRAILING_DEPENDENCY) {
            let _dependency = ar.read_i32()?;
        }

        Ok(ExportItem {
            index,
            class_index,
            super_index,
            outer_index,
            object_name,
            archetype_index,
            object_flags,
            serial_size,
            serial_offset,
            component_map,
            export_flags,
            net_objects,
            package_guid,
            package_flags,
            object: OnceCell::new(),
        })
    }

    fn index(&self) -> usize {
        self.index
    }

    fn object_name(&self) -> NameRef {
        self.object_name
    }

    fn outer_index(&self) -> PackageIndex {
        self.outer_index
    }

    fn object_cell(&self) -> &OnceCell<ObjectId> {
        &self.object
    }
}

#[derive(Debug, Clone)]
pub struct ImportItem {
    pub index: usize,
    /// Package that defines the import's class, e.g. `Core` for `Core.Class`.
    pub package_name: NameRef,
    pub class_name: NameRef,
    pub outer_index: PackageIndex,
    pub object_name: NameRef,
    pub(crate) object: OnceCell<ObjectId>,
}

impl ObjectTableItem for ImportItem {
    const TABLE: &'static str = "import";

    fn read(ar: &mut Archive, index: usize) -> Result<Self> {
        Ok(ImportItem {
            index,
            package_name: ar.read_name_ref()?,
            class_name: ar.read_name_ref()?,
            outer_index: PackageIndex(ar.read_i32()?),
            object_name: ar.read_name_ref()?,
            object: OnceCell::new(),
        })
    }

    fn index(&self) -> usize {
        self.index
    }

    fn object_name(&self) -> NameRef {
        self.object_name
    }

    fn outer_index(&self) -> PackageIndex {
        self.outer_index
    }

    fn object_cell(&self) -> &OnceCell<ObjectId> {
        &self.object
    }
}

/// Records of one kind, in file order.
#[derive(Debug, Clone)]
pub struct RecordTable<T> {
    items: Vec<T>,
}

pub type ExportTable = RecordTable<ExportItem>;
pub type ImportTable = RecordTable<ImportItem>;

impl<T: ObjectTableItem> RecordTable<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn read(ar: &mut Archive, loc: TableLocation) -> Result<Self> {
        if loc.count == 0 {
            return Ok(Self::new(Vec::new()));
        }
        ar.seek(loc.offset as usize)?;
        let mut index = 0;
        let items = ar.read_array(loc.count, |ar| {
            let item = T::read(ar, index)?;
            index += 1;
            Ok(item)
        })?;
        log::debug!(
            "read {} {} records, {:#x}..{:#x}",
            items.len(),
            T::TABLE,
            loc.offset,
            ar.position()
        );
        Ok(Self::new(items))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Zero-based slot lookup.
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.items.get(slot)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for RecordTable<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// Per-export list of the objects it depends on.
#[derive(Debug, Clone, Default)]
pub struct DependsTable {
    entries: Vec<Vec<PackageIndex>>,
}

impl DependsTable {
    pub fn read(ar: &mut Archive, offset: i32, export_count: usize) -> Result<Self> {
        if offset <= 0 || export_count == 0 {
            return Ok(Self::default());
        }
        ar.seek(offset as usize)?;
        let mut entries = Vec::with_capacity(export_count);
        for _ in 0..export_count {
            let count = ar.read_i32()?;
            entries.push(ar.read_array(count, |ar| Ok(PackageIndex(ar.read_i32()?)))?);
        }
        Ok(Self { entries })
    }

    /// Dependencies of the export in `slot`.
    pub fn get(&self, slot: usize) -> &[PackageIndex] {
        self.entries.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveVersion, ArchiveWriter};

    #[test]
    fn ue2_export_record() {
        let ver = ArchiveVersion::new(128, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_compact_index(-3);
        w.write_compact_index(0);
        w.write_i32(0);
        w.write_compact_index(7);
        w.write_u32(0x0007_0004);
        w.write_compact_index(200);
        w.write_compact_index(0x1234);
        let bytes = w.into_bytes();

        let mut ar = Archive::new(&bytes, ver);
        let export = ExportItem::read(&mut ar, 0).unwrap();
        assert_eq!(export.class_index, PackageIndex(-3));
        assert_eq!(export.object_name, NameRef::new(7));
        assert_eq!(export.object_flags, 0x0007_0004);
        assert_eq!(export.serial_range(), Some(0x1234..0x1234 + 200));
        assert!(ar.is_eof());
        assert!(export.object().is_none());
    }

    #[test]
    fn empty_export_omits_offset() {
        let ver = ArchiveVersion::new(100, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        for v in [1, 0] {
            w.write_compact_index(v);
        }
        w.write_i32(0);
        w.write_compact_index(2);
        w.write_u32(0);
        w.write_compact_index(0);
        let bytes = w.into_bytes();
        let mut ar = Archive::new(&bytes, ver);
        let export = ExportItem::read(&mut ar, 4).unwrap();
        assert_eq!(export.index, 4);
        assert_eq!(export.serial_range(), None);
        assert!(ar.is_eof());
    }

    #[test]
    fn ue3_export_record_with_component_map() {
        let ver = ArchiveVersion::new(491, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_i32(-1);
        w.write_i32(0);
        w.write_i32(2);
        w.write_name_ref(NameRef { index: 5, number: 3 });
        w.write_i32(0);
        w.write_u64(0x0000_0004_0000_0000);
        w.write_i32(64);
        w.write_i32(1024);
        w.write_i32(1);
        w.write_name_ref(NameRef::new(9));
        w.write_i32(4);
        w.write_u32(0x2);
        w.write_i32(2);
        w.write_i32(10);
        w.write_i32(11);
        w.write_guid(Guid::new(1, 1, 1, 1));
        w.write_u32(0x8);
        let bytes = w.into_bytes();

        let mut ar = Archive::new(&bytes, ver);
        let export = ExportItem::read(&mut ar, 0).unwrap();
        assert_eq!(export.outer_index, PackageIndex(2));
        assert_eq!(export.object_name.number, 3);
        assert_eq!(export.component_map, vec![(NameRef::new(9), PackageIndex(4))]);
        assert_eq!(export.net_objects, vec![10, 11]);
        assert_eq!(export.package_flags, 0x8);
        assert!(ar.is_eof());
    }

    #[test]
    fn import_table() {
        let ver = ArchiveVersion::new(128, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_bytes(&[0xEE; 4]);
        for (pkg, class, outer, name) in [(1, 2, 0, 3), (1, 4, -1, 5)] {
            w.write_compact_index(pkg);
            w.write_compact_index(class);
            w.write_i32(outer);
            w.write_compact_index(name);
        }
        let bytes = w.into_bytes();
        let mut ar = Archive::new(&bytes, ver);
        let table = ImportTable::read(&mut ar, TableLocation { count: 2, offset: 4 }).unwrap();
        assert_eq!(table.len(), 2);
        let second = table.get(1).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.outer_index, PackageIndex(-1));
        assert_eq!(second.object_name, NameRef::new(5));
        assert!(table.get(2).is_none());
    }

    #[test]
    fn depends_table() {
        let ver = ArchiveVersion::new(512, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_i32(0);
        w.write_i32(2);
        w.write_i32(-1);
        w.write_i32(3);
        w.write_i32(0);
        let bytes = w.into_bytes();
        let mut ar = Archive::new(&bytes, ver);
        let table = DependsTable::read(&mut ar, 4, 2).unwrap();
        assert_eq!(table.get(0), &[PackageIndex(-1), PackageIndex(3)]);
        assert!(table.get(1).is_empty());
        assert!(table.get(9).is_empty());
    }
}
