//! A loaded package file: summary plus record tables over the decoded bytes.

use crate::archive::{Archive, Guid};
use crate::build::{BuildFlags, BuildTable};
use crate::compression::{decompress_package, Decompressor};
use crate::decoder::BufferDecoder;
use crate::error::{Error, Result};
use crate::index::{IndexTarget, PackageIndex};
use crate::name::{Name, NameRef, NameTable};
use crate::script::ScriptResolver;
use crate::summary::{Era, PackageSummary, PACKAGE_TAG, PACKAGE_TAG_SWAPPED};
use crate::tables::{DependsTable, ExportItem, ExportTable, ImportItem, ImportTable};

/// Position of a package inside an [`Environment`](crate::linker::Environment).
pub type PackageId = usize;

/// Collaborators used while opening a package.
#[derive(Clone, Copy)]
pub struct LoadOptions<'a> {
    pub builds: &'a BuildTable,
    pub decoder: Option<&'a dyn BufferDecoder>,
    pub decompressor: Option<&'a dyn Decompressor>,
}

impl<'a> LoadOptions<'a> {
    pub fn new(builds: &'a BuildTable) -> Self {
        Self {
            builds,
            decoder: None,
            decompressor: None,
        }
    }

    pub fn with_decoder(mut self, decoder: &'a dyn BufferDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_decompressor(mut self, decompressor: &'a dyn Decompressor) -> Self {
        self.decompressor = Some(decompressor);
        self
    }
}

pub struct Package {
    pub name: String,
    data: Vec<u8>,
    pub summary: PackageSummary,
    pub names: NameTable,
    pub imports: ImportTable,
    pub exports: ExportTable,
    pub heritages: Vec<Guid>,
    tables_loaded: bool,
}

fn has_tag(data: &[u8]) -> bool {
    match data.get(..4) {
        Some(&[a, b, c, d]) => {
            let tag = u32::from_le_bytes([a, b, c, d]);
            tag == PACKAGE_TAG || tag == PACKAGE_TAG_SWAPPED
        }
        _ => false,
    }
}

impl Package {
    pub fn from_bytes(name: impl Into<String>, mut data: Vec<u8>, options: LoadOptions) -> Result<Self> {
        let name = name.into();

        // A package whose tag does not read is fully obfuscated.
        if !has_tag(&data) {
            if let Some(decoder) = options.decoder {
                decoder.decode(0, &mut data);
            }
        }
        let mut summary = {
            let mut ar = Archive::new(&data, Default::default());
            let summary = PackageSummary::read(&mut ar, options.builds)?;
            let header_end = ar.position();
            if summary.build.has(BuildFlags::XOR_ENCODED) {
                match options.decoder {
                    Some(decoder) => decoder.decode(header_end, &mut data[header_end..]),
                    None => log::warn!(
                        "{}: build {} is obfuscated but no decoder was supplied",
                        name,
                        summary.build.name()
                    ),
                }
            }
            summary
        };

        if summary.era() == Era::Extended {
            return Err(Error::UnsupportedVersion {
                version: summary.extended.as_ref().map_or(0, |e| e.file_version),
                licensee: summary.licensee as i32,
                reason: "tables of extended-era packages are not supported",
            });
        }

        let mut tables_loaded = true;
        if summary.is_compressed() {
            match options.decompressor {
                Some(decompressor) => {
                    data = decompress_package(&data, &summary, decompressor)?;
                    let mut ar = Archive::new(&data, Default::default());
                    summary = PackageSummary::read(&mut ar, options.builds)?;
                    summary.compressed_chunks.clear();
                }
                None => {
                    log::info!("{}: compressed, only the summary was read", name);
                    tables_loaded = false;
                }
            }
        }

        let mut package = Package {
            name,
            data,
            summary,
            names: NameTable::default(),
            imports: ImportTable::default(),
            exports: ExportTable::default(),
            heritages: Vec::new(),
            tables_loaded,
        };
        if tables_loaded {
            package.read_tables()?;
        }
        Ok(package)
    }

    fn read_tables(&mut self) -> Result<()> {
        let mut ar = Archive::new(&self.data, self.summary.archive_version());
        let s = &self.summary;
        self.names = NameTable::read(&mut ar, s.names.offset, s.names.count)?;
        self.imports = ImportTable::read(&mut ar, s.imports)?;
        self.exports = ExportTable::read(&mut ar, s.exports)?;
        if s.heritages.count > 0 {
            ar.seek(s.heritages.offset as usize)?;
            self.heritages = ar.read_array(s.heritages.count, |ar| ar.read_guid())?;
        }
        log::debug!(
            "{}: {} names, {} imports, {} exports",
            self.name,
            self.names.len(),
            self.imports.len(),
            self.exports.len()
        );
        Ok(())
    }

    /// True when the package is compressed and was opened without a
    /// decompressor, so only the summary is available.
    pub fn is_compressed(&self) -> bool {
        !self.tables_loaded
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Archive over the whole package with its stream settings.
    pub fn archive(&self) -> Archive<'_> {
        Archive::new(&self.data, self.summary.archive_version())
    }

    pub fn depends(&self) -> Result<DependsTable> {
        let mut ar = self.archive();
        DependsTable::read(&mut ar, self.summary.depends_offset, self.exports.len())
    }

    pub fn name(&self, name: NameRef) -> Result<Name> {
        self.names.resolve(name)
    }

    pub fn export(&self, slot: usize) -> Result<&ExportItem> {
        self.exports
            .get(slot)
            .ok_or_else(|| self.unresolved(PackageIndex::from_export(slot)))
    }

    pub fn import(&self, slot: usize) -> Result<&ImportItem> {
        self.imports
            .get(slot)
            .ok_or_else(|| self.unresolved(PackageIndex::from_import(slot)))
    }

    pub(crate) fn unresolved(&self, index: PackageIndex) -> Error {
        Error::UnresolvedReference {
            index,
            exports: self.exports.len(),
            imports: self.imports.len(),
        }
    }

    /// Bounds-check `index` against the tables.
    pub fn check_index(&self, index: PackageIndex) -> Result<IndexTarget> {
        match index.resolve() {
            IndexTarget::Export(slot) if slot >= self.exports.len() => Err(self.unresolved(index)),
            IndexTarget::Import(slot) if slot >= self.imports.len() => Err(self.unresolved(index)),
            target => Ok(target),
        }
    }

    /// Serialized bytes of the export in `slot`.
    pub fn export_data(&self, slot: usize) -> Result<&[u8]> {
        let export = self.export(slot)?;
        let Some(range) = export.serial_range() else {
            return Ok(&[]);
        };
        self.data.get(range.clone()).ok_or_else(|| {
            Error::format(
                "export",
                format!(
                    "serial range {:#x}..{:#x} is outside the {} byte package",
                    range.start,
                    range.end,
                    self.data.len()
                ),
            )
        })
    }

    /// Table-level name of the object at `index`, without linking.
    pub fn object_name(&self, index: PackageIndex) -> Result<Option<Name>> {
        let name = match self.check_index(index)? {
            IndexTarget::Null => return Ok(None),
            IndexTarget::Export(slot) => self.export(slot)?.object_name,
            IndexTarget::Import(slot) => self.import(slot)?.object_name,
        };
        self.name(name).map(Some)
    }

    /// Name of the class an export or import is an instance of.
    pub fn class_name(&self, index: PackageIndex) -> Result<Name> {
        match self.check_index(index)? {
            IndexTarget::Null => Ok(Name::new("None")),
            IndexTarget::Export(slot) => {
                let class = self.export(slot)?.class_index;
                Ok(self.object_name(class)?.unwrap_or_else(|| Name::new("Class")))
            }
            IndexTarget::Import(slot) => self.name(self.import(slot)?.class_name),
        }
    }

    /// Dotted path of the object at `index`, outermost first.
    pub fn path_name(&self, index: PackageIndex) -> Result<String> {
        let mut parts = Vec::new();
        let mut cursor = index;
        while !cursor.is_null() && parts.len() < 64 {
            let Some(name) = self.object_name(cursor)? else {
                break;
            };
            parts.push(name.to_string());
            cursor = match self.check_index(cursor)? {
                IndexTarget::Export(slot) => self.export(slot)?.outer_index,
                IndexTarget::Import(slot) => self.import(slot)?.outer_index,
                IndexTarget::Null => PackageIndex::NULL,
            };
        }
        parts.reverse();
        Ok(parts.join("."))
    }

    /// Name of the package file that defines the import in `slot`.
    pub fn import_package_name(&self, slot: usize) -> Result<Name> {
        let mut item = self.import(slot)?;
        for _ in 0..64 {
            match self.check_index(item.outer_index)? {
                IndexTarget::Import(outer) => item = self.import(outer)?,
                // An import nested in an export belongs to this package.
                IndexTarget::Export(_) => return Ok(Name::new(self.name.clone())),
                IndexTarget::Null => break,
            }
        }
        self.name(item.object_name)
    }
}

impl ScriptResolver for Package {
    fn object_name(&self, index: PackageIndex) -> String {
        match Package::object_name(self, index) {
            Ok(Some(name)) => name.to_string(),
            Ok(None) => "None".to_string(),
            Err(_) => format!("UnresolvedObject{}", index.0),
        }
    }

    fn name(&self, name: NameRef) -> String {
        self.names
            .resolve(name)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| format!("UnresolvedName{}", name.index))
    }

    fn object_literal(&self, index: PackageIndex) -> String {
        let class = self
            .class_name(index)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "Object".to_string());
        let path = self.path_name(index).unwrap_or_default();
        format!("{}'{}'", class, path)
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("version", &self.summary.version)
            .field("licensee", &self.summary.licensee)
            .field("names", &self.names.len())
            .field("imports", &self.imports.len())
            .field("exports", &self.exports.len())
            .finish()
    }
}
