use std::io::Write;

use anyhow::Result;

use upkg_core::index::PackageIndex;
use upkg_core::Package;

/// Dump the summary and the name, import and export tables of `package`.
pub fn write_tables(out: &mut impl Write, package: &Package) -> Result<()> {
    let s = &package.summary;
    writeln!(out, "package {}", package.name)?;
    writeln!(
        out,
        "version {}/{} build {} {}",
        s.version,
        s.licensee,
        s.build.name(),
        if s.big_endian { "big-endian" } else { "little-endian" }
    )?;
    writeln!(out, "flags {:?}", s.package_flags)?;
    writeln!(out, "guid {}", s.guid)?;
    if package.is_compressed() {
        writeln!(out, "compressed in {} chunks; tables unavailable", s.compressed_chunks.len())?;
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "names ({})", package.names.len())?;
    for (i, record) in package.names.records().iter().enumerate() {
        writeln!(out, "  {:5} {} [{:#x}]", i, record.text, record.flags)?;
    }

    writeln!(out)?;
    writeln!(out, "imports ({})", package.imports.len())?;
    for slot in 0..package.imports.len() {
        let index = PackageIndex::from_import(slot);
        writeln!(
            out,
            "  {:5} {} {}",
            index,
            package.class_name(index)?,
            package.path_name(index)?
        )?;
    }

    writeln!(out)?;
    writeln!(out, "exports ({})", package.exports.len())?;
    let depends = package.depends()?;
    for (slot, export) in package.exports.iter().enumerate() {
        let index = PackageIndex::from_export(slot);
        writeln!(
            out,
            "  {:5} {} {} size {:#x} at {:#x}",
            index,
            package.class_name(index)?,
            package.path_name(index)?,
            export.serial_size,
            export.serial_offset
        )?;
        let deps = depends.get(slot);
        if !deps.is_empty() {
            let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
            writeln!(out, "        depends {}", deps.join(" "))?;
        }
    }
    Ok(())
}
