//! The package file summary: the versioned header that locates every table.

use bitflags::bitflags;

use crate::archive::version::*;
use crate::archive::{Archive, ArchiveVersion, Guid};
use crate::build::{BuildFlags, BuildIdentity, BuildTable};
use crate::error::{Error, Result};

pub const PACKAGE_TAG: u32 = 0x9E2A_83C1;
pub const PACKAGE_TAG_SWAPPED: u32 = 0xC183_2A9E;

/// Oldest file version with a known layout.
pub const MIN_SUPPORTED_VERSION: u16 = 61;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PackageFlags: u32 {
        const ALLOW_DOWNLOAD = 0x0000_0001;
        const CLIENT_OPTIONAL = 0x0000_0002;
        const SERVER_SIDE_ONLY = 0x0000_0004;
        const COOKED = 0x0000_0008;
        const UNSECURE = 0x0000_0010;
        const NEED = 0x0000_8000;
        const CONTAINS_MAP = 0x0002_0000;
        const CONTAINS_SCRIPT = 0x0020_0000;
        const STORE_COMPRESSED = 0x0200_0000;
        const STORE_FULLY_COMPRESSED = 0x0400_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CompressionFlags: u32 {
        const ZLIB = 0x01;
        const LZO = 0x02;
        const LZX = 0x04;
    }
}

/// `(count, offset)` pair locating a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableLocation {
    pub count: i32,
    pub offset: i32,
}

impl TableLocation {
    fn read(ar: &mut Archive) -> Result<Self> {
        Ok(Self {
            count: ar.read_i32()?,
            offset: ar.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation {
    pub export_count: i32,
    pub name_count: i32,
    pub net_object_count: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressedChunk {
    pub uncompressed_offset: i32,
    pub uncompressed_size: i32,
    pub compressed_offset: i32,
    pub compressed_size: i32,
}

impl CompressedChunk {
    pub fn read(ar: &mut Archive) -> Result<Self> {
        Ok(Self {
            uncompressed_offset: ar.read_i32()?,
            uncompressed_size: ar.read_i32()?,
            compressed_offset: ar.read_i32()?,
            compressed_size: ar.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomVersion {
    pub key: Guid,
    pub version: i32,
}

/// Version block of packages that use the negative legacy tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedVersion {
    pub legacy_version: i32,
    pub legacy_ue3_version: i32,
    pub file_version: i32,
    pub licensee_version: i32,
    pub custom_versions: Vec<CustomVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    /// Single 32-bit `version | licensee << 16` field.
    Legacy,
    /// Negative legacy tag followed by separate version fields.
    Extended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub changelist: u32,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct PackageSummary {
    pub tag: u32,
    pub big_endian: bool,
    pub version: u16,
    pub licensee: u16,
    pub extended: Option<ExtendedVersion>,
    pub build: BuildIdentity,
    pub header_size: i32,
    pub folder_name: String,
    pub package_flags: PackageFlags,
    pub names: TableLocation,
    pub exports: TableLocation,
    pub imports: TableLocation,
    /// Only present before the heritage table was retired.
    pub heritages: TableLocation,
    pub depends_offset: i32,
    pub import_export_guids_offset: i32,
    pub import_guids_count: i32,
    pub export_guids_count: i32,
    pub thumbnail_table_offset: i32,
    pub guid: Guid,
    pub generations: Vec<Generation>,
    pub engine_version: i32,
    pub extended_engine_version: Option<EngineVersion>,
    pub cooker_version: i32,
    pub compression_flags: CompressionFlags,
    pub compressed_chunks: Vec<CompressedChunk>,
    pub package_source: u32,
    pub additional_packages: Vec<String>,
}

impl Default for PackageSummary {
    fn default() -> Self {
        Self {
            tag: PACKAGE_TAG,
            big_endian: false,
            version: 0,
            licensee: 0,
            extended: None,
            build: BuildIdentity::generic(),
            header_size: 0,
            folder_name: String::new(),
            package_flags: PackageFlags::empty(),
            names: TableLocation::default(),
            exports: TableLocation::default(),
            imports: TableLocation::default(),
            heritages: TableLocation::default(),
            depends_offset: 0,
            import_export_guids_offset: 0,
            import_guids_count: 0,
            export_guids_count: 0,
            thumbnail_table_offset: 0,
            guid: Guid::default(),
            generations: Vec::new(),
            engine_version: 0,
            extended_engine_version: None,
            cooker_version: 0,
            compression_flags: CompressionFlags::empty(),
            compressed_chunks: Vec::new(),
            package_source: 0,
            additional_packages: Vec::new(),
        }
    }
}

impl PackageSummary {
    pub fn era(&self) -> Era {
        if self.extended.is_some() {
            Era::Extended
        } else {
            Era::Legacy
        }
    }

    pub fn is_compressed(&self) -> bool {
        !self.compressed_chunks.is_empty()
    }

    pub fn archive_version(&self) -> ArchiveVersion {
        ArchiveVersion::new(self.version, self.licensee)
            .with_build(self.build.clone())
            .big_endian(self.big_endian)
    }

    /// Decode the summary at the start of `ar`, switching the archive to the
    /// package's version once the version fields are known.
    pub fn read(ar: &mut Archive, builds: &BuildTable) -> Result<Self> {
        ar.seek(0)?;
        let tag = ar.read_u32()?;
        let big_endian = match (tag, ar.version().big_endian) {
            (PACKAGE_TAG, be) => be,
            (PACKAGE_TAG_SWAPPED, be) => !be,
            (found, _) => return Err(Error::InvalidTag { found }),
        };
        ar.set_version(ArchiveVersion::default().big_endian(big_endian));

        let mut summary = PackageSummary {
            big_endian,
            ..Default::default()
        };

        let packed = ar.read_i32()?;
        if packed < 0 {
            summary.read_extended(ar, packed, builds)?;
        } else {
            summary.version = (packed as u32 & 0xFFFF) as u16;
            summary.licensee = (packed as u32 >> 16) as u16;
            if summary.version < MIN_SUPPORTED_VERSION {
                return Err(Error::UnsupportedVersion {
                    version: summary.version as i32,
                    licensee: summary.licensee as i32,
                    reason: "predates every known package layout",
                });
            }
            summary.build = builds.resolve(summary.version, summary.licensee);
            ar.set_version(summary.archive_version());
            summary.read_legacy(ar)?;
        }

        summary.validate(ar.len())?;
        log::debug!(
            "summary: version {}/{} build {} names {:?} exports {:?} imports {:?} chunks {}",
            summary.version,
            summary.licensee,
            summary.build.name(),
            summary.names,
            summary.exports,
            summary.imports,
            summary.compressed_chunks.len()
        );
        Ok(summary)
    }

    fn read_legacy(&mut self, ar: &mut Archive) -> Result<()> {
        let ver = ar.version().clone();
        if ver.at_least(VER_HEADER_SIZE) {
            self.header_size = ar.read_i32()?;
        }
        if ver.at_least(VER_FOLDER_NAME) {
            self.folder_name = ar.read_string()?;
        }
        self.package_flags = PackageFlags::from_bits_retain(ar.read_u32()?);
        if ver.build.has(BuildFlags::EXTRA_SUMMARY_INT) {
            let extra = ar.read_i32()?;
            log::debug!("skipping build-specific summary field {:#x}", extra);
        }
        self.names = TableLocation::read(ar)?;
        self.exports = TableLocation::read(ar)?;
        self.imports = TableLocation::read(ar)?;

        if !ver.at_least(VER_HERITAGE_TABLE) {
            self.heritages = TableLocation::read(ar)?;
            return Ok(());
        }

        if ver.at_least(VER_DEPENDS_OFFSET) {
            self.depends_offset = ar.read_i32()?;
        }
        if ver.at_least(VER_IMPORT_EXPORT_GUIDS) {
            self.import_export_guids_offset = ar.read_i32()?;
            self.import_guids_count = ar.read_i32()?;
            self.export_guids_count = ar.read_i32()?;
        }
        if ver.at_least(VER_THUMBNAIL_TABLE) {
            self.thumbnail_table_offset = ar.read_i32()?;
        }

        self.guid = ar.read_guid()?;
        let generation_count = ar.read_i32()?;
        self.generations = ar.read_array(generation_count, |ar| {
            Ok(Generation {
                export_count: ar.read_i32()?,
                name_count: ar.read_i32()?,
                net_object_count: if ar.version().at_least(VER_NET_INDEX) {
                    ar.read_i32()?
                } else {
                    0
                },
            })
        })?;

        if ver.at_least(VER_ENGINE_VERSION) {
            self.engine_version = ar.read_i32()?;
        }
        if ver.at_least(VER_COOKER_VERSION) {
            self.cooker_version = ar.read_i32()?;
        }
        if ver.at_least(VER_COMPRESSION) {
            self.compression_flags = CompressionFlags::from_bits_retain(ar.read_u32()?);
            let chunk_count = ar.read_i32()?;
            self.compressed_chunks = ar.read_array(chunk_count, CompressedChunk::read)?;
        }
        if ver.at_least(VER_PACKAGE_SOURCE) {
            self.package_source = ar.read_u32()?;
        }
        if ver.at_least(VER_ADDITIONAL_PACKAGES) {
            let count = ar.read_i32()?;
            self.additional_packages = ar.read_array(count, |ar| ar.read_string())?;
        }
        Ok(())
    }

    fn read_extended(&mut self, ar: &mut Archive, legacy_version: i32, builds: &BuildTable) -> Result<()> {
        let legacy_ue3_version = if legacy_version != -4 {
            ar.read_i32()?
        } else {
            0
        };
        let file_version = ar.read_i32()?;
        let licensee_version = ar.read_i32()?;

        let mut custom_versions = Vec::new();
        if legacy_version <= -2 {
            let count = ar.read_i32()?;
            custom_versions = match legacy_version {
                -2 => ar.read_array(count, |ar| {
                    let tag = ar.read_u32()?;
                    Ok(CustomVersion {
                        key: Guid::new(tag, 0, 0, 0),
                        version: ar.read_i32()?,
                    })
                })?,
                -5..=-3 => ar.read_array(count, |ar| {
                    let key = ar.read_guid()?;
                    let version = ar.read_i32()?;
                    let _friendly_name = ar.read_string()?;
                    Ok(CustomVersion { key, version })
                })?,
                _ => ar.read_array(count, |ar| {
                    Ok(CustomVersion {
                        key: ar.read_guid()?,
                        version: ar.read_i32()?,
                    })
                })?,
            };
        }

        // The archive keeps the last legacy-era version so string and index
        // encodings resolve to their final (fixed-width) forms.
        self.version = u16::try_from(legacy_ue3_version.max(VER_NAME_NUMBERED as i32)).unwrap_or(u16::MAX);
        self.licensee = licensee_version.clamp(0, u16::MAX as i32) as u16;
        self.build = builds.resolve(self.version, self.licensee);
        ar.set_version(self.archive_version());
        self.extended = Some(ExtendedVersion {
            legacy_version,
            legacy_ue3_version,
            file_version,
            licensee_version,
            custom_versions,
        });

        self.header_size = ar.read_i32()?;
        self.folder_name = ar.read_string()?;
        self.package_flags = PackageFlags::from_bits_retain(ar.read_u32()?);
        self.names = TableLocation::read(ar)?;
        if file_version >= 459 {
            let _gatherable_text = TableLocation::read(ar)?;
        }
        self.exports = TableLocation::read(ar)?;
        self.imports = TableLocation::read(ar)?;
        self.depends_offset = ar.read_i32()?;
        if file_version >= 384 {
            let _soft_package_references = TableLocation::read(ar)?;
        }
        if file_version >= 510 {
            let _searchable_names_offset = ar.read_i32()?;
        }
        self.thumbnail_table_offset = ar.read_i32()?;
        self.guid = ar.read_guid()?;
        let generation_count = ar.read_i32()?;
        self.generations = ar.read_array(generation_count, |ar| {
            Ok(Generation {
                export_count: ar.read_i32()?,
                name_count: ar.read_i32()?,
                net_object_count: 0,
            })
        })?;
        if file_version >= 336 {
            self.extended_engine_version = Some(EngineVersion {
                major: ar.read_u16()?,
                minor: ar.read_u16()?,
                patch: ar.read_u16()?,
                changelist: ar.read_u32()?,
                branch: ar.read_string()?,
            });
        } else {
            self.engine_version = ar.read_i32()?;
        }
        if file_version >= 444 {
            let _compatible_with = (
                ar.read_u16()?,
                ar.read_u16()?,
                ar.read_u16()?,
                ar.read_u32()?,
                ar.read_string()?,
            );
        }
        self.compression_flags = CompressionFlags::from_bits_retain(ar.read_u32()?);
        let chunk_count = ar.read_i32()?;
        self.compressed_chunks = ar.read_array(chunk_count, CompressedChunk::read)?;
        Ok(())
    }

    fn validate(&self, file_len: usize) -> Result<()> {
        if self.is_compressed() {
            // Table offsets refer to the uncompressed stream.
            return Ok(());
        }
        for (what, loc) in [
            ("name table", self.names),
            ("export table", self.exports),
            ("import table", self.imports),
        ] {
            if loc.count < 0 || loc.offset < 0 {
                return Err(Error::format(
                    "summary",
                    format!("{} has negative count or offset {:?}", what, loc),
                ));
            }
            if loc.count > 0 && loc.offset as usize >= file_len {
                return Err(Error::format(
                    "summary",
                    format!("{} offset {:#x} is past the end of the file", what, loc.offset),
                ));
            }
        }
        Ok(())
    }
}
