//! File version thresholds.
//!
//! Each constant is the first file version at which the named layout change
//! applies.

use crate::build::{BuildFlags, BuildIdentity};

/// Strings carry a length prefix.
pub const VER_SIZE_PREFIXED_STRINGS: u16 = 64;
/// Heritage table replaced by a GUID + generations.
pub const VER_HERITAGE_TABLE: u16 = 68;
/// Names gain a 64-bit flags field; object flags become 64-bit.
pub const VER_64BIT_FLAGS: u16 = 195;
/// Compact indices are replaced by plain i32 values.
pub const VER_COMPACT_INDEX_DEPRECATED: u16 = 178;
/// Property tags switch to the (name, type, size, index) form.
pub const VER_PROPERTY_TAG_TYPENAME: u16 = 178;
/// Structs store `line`/`text_pos` and the cpp text reference.
pub const VER_STRUCT_CPP_TEXT: u16 = 120;
/// Export records carry an archetype reference.
pub const VER_ARCHETYPE: u16 = 220;
/// States carry a map from function names to their implementations.
pub const VER_STATE_FUNCTION_MAP: u16 = 220;
/// Engine version field in the summary.
pub const VER_ENGINE_VERSION: u16 = 245;
/// Export records carry export flags and the component map.
pub const VER_EXPORT_FLAGS: u16 = 247;
/// Summary carries the total header size; serial offsets are always present.
pub const VER_HEADER_SIZE: u16 = 249;
/// Summary carries the folder name.
pub const VER_FOLDER_NAME: u16 = 269;
/// Summary carries the cooker version.
pub const VER_COOKER_VERSION: u16 = 277;
/// Objects serialize a net index; generations and exports carry net data.
pub const VER_NET_INDEX: u16 = 322;
/// Summary carries compression flags and the compressed chunk table.
pub const VER_COMPRESSION: u16 = 334;
/// Names are (index, number) pairs.
pub const VER_NAME_NUMBERED: u16 = 343;
/// Summary carries the dependency table offset.
pub const VER_DEPENDS_OFFSET: u16 = 415;
/// Export records carry the export's own package flags.
pub const VER_EXPORT_PACKAGE_FLAGS: u16 = 475;
/// Summary carries the package source checksum.
pub const VER_PACKAGE_SOURCE: u16 = 482;
/// Summary carries the list of additional packages to cook.
pub const VER_ADDITIONAL_PACKAGES: u16 = 516;
/// Export component maps are no longer serialized.
pub const VER_COMPONENT_MAP_DEPRECATED: u16 = 543;
/// Summary carries the thumbnail table offset.
pub const VER_THUMBNAIL_TABLE: u16 = 584;
/// Summary carries the import/export GUID table.
pub const VER_IMPORT_EXPORT_GUIDS: u16 = 623;
/// Structs store the on-disk script size next to the in-memory size.
pub const VER_SCRIPT_STORAGE_SIZE: u16 = 639;

/// Version information every archive read consults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveVersion {
    pub version: u16,
    pub licensee: u16,
    pub big_endian: bool,
    pub build: BuildIdentity,
}

impl ArchiveVersion {
    pub fn new(version: u16, licensee: u16) -> Self {
        Self {
            version,
            licensee,
            ..Default::default()
        }
    }

    pub fn with_build(mut self, build: BuildIdentity) -> Self {
        self.build = build;
        self
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn at_least(&self, threshold: u16) -> bool {
        self.version >= threshold
    }

    pub fn uses_compact_index(&self) -> bool {
        self.version < VER_COMPACT_INDEX_DEPRECATED
    }

    pub fn has_name_numbers(&self) -> bool {
        self.version >= VER_NAME_NUMBERED || self.build.has(BuildFlags::NUMBERED_NAMES)
    }

    /// Size an object reference occupies in the engine's in-memory script.
    pub fn script_object_size(&self) -> u32 {
        4
    }

    /// Size a name reference occupies in the engine's in-memory script.
    pub fn script_name_size(&self) -> u32 {
        if self.has_name_numbers() {
            8
        } else {
            4
        }
    }
}
