//! Tagged property lists: the script-defined values of an object.

use super::ObjectResolver;
use crate::archive::version::VER_PROPERTY_TAG_TYPENAME;
use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::name::Name;

/// Type names of the packed info byte, indexed by its low nibble.
const PACKED_TYPES: [&str; 16] = [
    "None",
    "ByteProperty",
    "IntProperty",
    "BoolProperty",
    "FloatProperty",
    "ObjectProperty",
    "NameProperty",
    "StringProperty",
    "ClassProperty",
    "ArrayProperty",
    "StructProperty",
    "VectorProperty",
    "RotatorProperty",
    "StrProperty",
    "MapProperty",
    "FixedArrayProperty",
];

const PACKED_STRUCT: u8 = 10;
const PACKED_BOOL: u8 = 3;

/// One serialized property value. The value bytes are kept undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTag {
    pub name: Name,
    pub type_name: Name,
    pub struct_name: Option<Name>,
    pub size: i32,
    pub array_index: i32,
    pub bool_value: bool,
    pub value: Vec<u8>,
}

/// Read tags until the `None` terminator.
pub fn read_property_tags(ar: &mut Archive, linker: &dyn ObjectResolver) -> Result<Vec<PropertyTag>> {
    let mut tags = Vec::new();
    loop {
        let name = linker.read_name(ar)?;
        if name.is_none() {
            return Ok(tags);
        }
        let tag = if ar.version().at_least(VER_PROPERTY_TAG_TYPENAME) {
            read_tag(ar, linker, name)?
        } else {
            read_packed_tag(ar, linker, name)?
        };
        tags.push(tag);
    }
}

fn read_tag(ar: &mut Archive, linker: &dyn ObjectResolver, name: Name) -> Result<PropertyTag> {
    let type_name = linker.read_name(ar)?;
    let size = ar.read_i32()?;
    let array_index = ar.read_i32()?;
    let mut struct_name = None;
    let mut bool_value = false;
    if type_name.eq_str("StructProperty") {
        struct_name = Some(linker.read_name(ar)?);
    } else if type_name.eq_str("BoolProperty") {
        bool_value = ar.read_u32()? != 0;
    }
    let value = read_value(ar, size, &name)?;
    Ok(PropertyTag {
        name,
        type_name,
        struct_name,
        size,
        array_index,
        bool_value,
        value,
    })
}

fn read_packed_tag(ar: &mut Archive, linker: &dyn ObjectResolver, name: Name) -> Result<PropertyTag> {
    let info = ar.read_u8()?;
    let ty = info & 0x0F;
    let array_flag = info & 0x80 != 0;

    let struct_name = if ty == PACKED_STRUCT {
        Some(linker.read_name(ar)?)
    } else {
        None
    };
    let size = match (info >> 4) & 0x07 {
        0 => 1,
        1 => 2,
        2 => 4,
        3 => 12,
        4 => 16,
        5 => ar.read_u8()? as i32,
        6 => ar.read_u16()? as i32,
        _ => ar.read_i32()?,
    };
    let mut array_index = 0;
    let mut bool_value = false;
    if ty == PACKED_BOOL {
        bool_value = array_flag;
    } else if array_flag {
        array_index = read_packed_array_index(ar)?;
    }
    let size = if ty == PACKED_BOOL { 0 } else { size };
    let value = read_value(ar, size, &name)?;
    Ok(PropertyTag {
        name,
        type_name: Name::new(PACKED_TYPES[ty as usize]),
        struct_name,
        size,
        array_index,
        bool_value,
        value,
    })
}

fn read_packed_array_index(ar: &mut Archive) -> Result<i32> {
    let b0 = ar.read_u8()? as i32;
    if b0 & 0x80 == 0 {
        return Ok(b0);
    }
    if b0 & 0xC0 == 0x80 {
        let b1 = ar.read_u8()? as i32;
        return Ok(((b0 & 0x7F) << 8) | b1);
    }
    let rest = ar.read_bytes(3)?;
    Ok(((b0 & 0x3F) << 24) | (rest[0] as i32) << 16 | (rest[1] as i32) << 8 | rest[2] as i32)
}

fn read_value(ar: &mut Archive, size: i32, name: &Name) -> Result<Vec<u8>> {
    if size < 0 {
        return Err(Error::format(
            "property tag",
            format!("{} has negative size {}", name, size),
        ));
    }
    Ok(ar.read_bytes(size as usize)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveVersion, ArchiveWriter};
    use crate::index::PackageIndex;
    use crate::name::NameRef;
    use crate::object::ObjectId;

    struct Names(Vec<&'static str>);

    impl ObjectResolver for Names {
        fn resolve(&mut self, _index: PackageIndex) -> Result<Option<ObjectId>> {
            Ok(None)
        }

        fn name(&self, name: NameRef) -> Result<Name> {
            Ok(Name::new(self.0[name.index as usize]))
        }
    }

    #[test]
    fn packed_tags() {
        let names = Names(vec!["None", "Health", "bHidden", "Location", "Vector", "Items"]);
        let ver = ArchiveVersion::new(128, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        // int Health = 100
        w.write_compact_index(1);
        w.write_u8(0x22);
        w.write_i32(100);
        // bool bHidden = true
        w.write_compact_index(2);
        w.write_u8(0x83);
        // struct Location (Vector, 12 bytes)
        w.write_compact_index(3);
        w.write_u8(0x3A);
        w.write_compact_index(4);
        w.write_bytes(&[0; 12]);
        // Items[130], byte
        w.write_compact_index(5);
        w.write_u8(0x81);
        w.write_u8(0x80);
        w.write_u8(130);
        w.write_u8(7);
        w.write_compact_index(0);
        let bytes = w.into_bytes();

        let mut ar = Archive::new(&bytes, ver);
        let tags = read_property_tags(&mut ar, &names).unwrap();
        assert_eq!(tags.len(), 4);
        assert_eq!(tags[0].type_name, Name::new("IntProperty"));
        assert_eq!(tags[0].value, 100i32.to_le_bytes().to_vec());
        assert!(tags[1].bool_value);
        assert_eq!(tags[1].size, 0);
        assert_eq!(tags[2].struct_name, Some(Name::new("Vector")));
        assert_eq!(tags[2].size, 12);
        assert_eq!(tags[3].array_index, 130);
        assert_eq!(tags[3].value, vec![7]);
        assert!(ar.is_eof());
    }

    #[test]
    fn typed_tags() {
        let names = Names(vec!["None", "Speed", "FloatProperty", "bOn", "BoolProperty"]);
        let ver = ArchiveVersion::new(512, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_name_ref(NameRef::new(1));
        w.write_name_ref(NameRef::new(2));
        w.write_i32(4);
        w.write_i32(0);
        w.write_f32(1.5);
        w.write_name_ref(NameRef::new(3));
        w.write_name_ref(NameRef::new(4));
        w.write_i32(0);
        w.write_i32(0);
        w.write_u32(1);
        w.write_name_ref(NameRef::new(0));
        let bytes = w.into_bytes();

        let mut ar = Archive::new(&bytes, ver);
        let tags = read_property_tags(&mut ar, &names).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].value, 1.5f32.to_le_bytes().to_vec());
        assert!(tags[1].bool_value);
        assert!(ar.is_eof());
    }

    #[test]
    fn truncated_list_is_an_error() {
        let names = Names(vec!["None", "Health"]);
        let ver = ArchiveVersion::new(128, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_compact_index(1);
        w.write_u8(0x22);
        w.write_u8(1);
        let bytes = w.into_bytes();
        let mut ar = Archive::new(&bytes, ver);
        assert!(read_property_tags(&mut ar, &names).is_err());
    }
}
