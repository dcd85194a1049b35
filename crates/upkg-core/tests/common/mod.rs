//! Builds small legacy-format packages in memory.

#![allow(dead_code)]

use upkg_core::archive::{ArchiveVersion, ArchiveWriter, Guid};
use upkg_core::name::NameRef;
use upkg_core::summary::PACKAGE_TAG;

/// Version 100 resolves to no known build and still uses compact indices.
pub const VERSION: u16 = 100;

struct ImportSpec {
    package: i32,
    class: i32,
    outer: i32,
    name: i32,
}

struct ExportSpec {
    class: i32,
    super_index: i32,
    outer: i32,
    name: i32,
    flags: u32,
    data: Vec<u8>,
}

pub struct PackageFixture {
    big_endian: bool,
    names: Vec<String>,
    imports: Vec<ImportSpec>,
    exports: Vec<ExportSpec>,
}

impl PackageFixture {
    pub fn new() -> Self {
        let mut fixture = Self {
            big_endian: false,
            names: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        };
        fixture.name("None");
        fixture
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn version(&self) -> ArchiveVersion {
        ArchiveVersion::new(VERSION, 0).big_endian(self.big_endian)
    }

    /// Index of `text` in the name table, adding it if needed.
    pub fn name(&mut self, text: &str) -> i32 {
        if let Some(i) = self.names.iter().position(|n| n == text) {
            return i as i32;
        }
        self.names.push(text.to_string());
        self.names.len() as i32 - 1
    }

    /// Adds an import and returns its (negative) package index.
    pub fn import(&mut self, package: &str, class: &str, outer: i32, name: &str) -> i32 {
        let spec = ImportSpec {
            package: self.name(package),
            class: self.name(class),
            outer,
            name: self.name(name),
        };
        self.imports.push(spec);
        -(self.imports.len() as i32)
    }

    /// Adds an export and returns its (positive) package index.
    pub fn export(&mut self, class: i32, super_index: i32, outer: i32, name: &str, data: Vec<u8>) -> i32 {
        let spec = ExportSpec {
            class,
            super_index,
            outer,
            name: self.name(name),
            flags: 0,
            data,
        };
        self.exports.push(spec);
        self.exports.len() as i32
    }

    /// Serialized form of an object with no properties.
    pub fn empty_object(&mut self) -> Vec<u8> {
        let none = self.name("None");
        let mut w = self.writer();
        w.write_name_ref(NameRef::new(none));
        w.into_bytes()
    }

    pub fn writer(&self) -> ArchiveWriter {
        ArchiveWriter::new(self.version())
    }

    pub fn build(self) -> Vec<u8> {
        let mut w = ArchiveWriter::new(self.version());
        w.write_u32(PACKAGE_TAG);
        w.write_i32(VERSION as i32);
        w.write_u32(0);
        let locations = w.position();
        for _ in 0..6 {
            w.write_i32(0);
        }
        w.write_guid(Guid::new(1, 2, 3, 4));
        w.write_i32(1);
        w.write_i32(self.exports.len() as i32);
        w.write_i32(self.names.len() as i32);

        let names_offset = w.position();
        for name in &self.names {
            w.write_string(name);
            w.write_u32(0);
        }

        let mut serial = Vec::with_capacity(self.exports.len());
        for export in &self.exports {
            serial.push((w.position(), export.data.len()));
            w.write_bytes(&export.data);
        }

        let imports_offset = w.position();
        for import in &self.imports {
            w.write_name_ref(NameRef::new(import.package));
            w.write_name_ref(NameRef::new(import.class));
            w.write_i32(import.outer);
            w.write_name_ref(NameRef::new(import.name));
        }

        let exports_offset = w.position();
        for (export, (offset, size)) in self.exports.iter().zip(serial) {
            w.write_index(export.class);
            w.write_index(export.super_index);
            w.write_i32(export.outer);
            w.write_name_ref(NameRef::new(export.name));
            w.write_u32(export.flags);
            w.write_index(size as i32);
            if size > 0 {
                w.write_index(offset as i32);
            }
        }
        // Trailing bytes keep every table offset inside the file.
        w.write_bytes(&[0u8; 4]);

        let tables = [
            (self.names.len(), names_offset),
            (self.exports.len(), exports_offset),
            (self.imports.len(), imports_offset),
        ];
        for (i, (count, offset)) in tables.into_iter().enumerate() {
            w.patch_i32(locations + i * 8, count as i32);
            w.patch_i32(locations + i * 8 + 4, offset as i32);
        }
        w.into_bytes()
    }
}

/// `Textures`: one `Engine.Texture` export called `Hello`.
pub fn texture_package(big_endian: bool) -> Vec<u8> {
    let mut f = PackageFixture::new();
    if big_endian {
        f = f.big_endian();
    }
    let engine = f.import("Core", "Package", 0, "Engine");
    let texture = f.import("Core", "Class", engine, "Texture");
    let data = f.empty_object();
    f.export(texture, 0, 0, "Hello", data);
    f.build()
}
