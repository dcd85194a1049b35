use bitflags::bitflags;

use super::{read_property_tags, Deserialize, FieldData, ObjectId, ObjectResolver, PropertyTag};
use crate::archive::version::*;
use crate::archive::{Archive, Guid};
use crate::build::BuildFlags;
use crate::error::{Error, Result};
use crate::name::Name;
use crate::script;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct FunctionFlags: u32 {
        const FINAL = 0x0000_0001;
        const DEFINED = 0x0000_0002;
        const ITERATOR = 0x0000_0004;
        const LATENT = 0x0000_0008;
        const PRE_OPERATOR = 0x0000_0010;
        const SINGULAR = 0x0000_0020;
        const NET = 0x0000_0040;
        const NET_RELIABLE = 0x0000_0080;
        const SIMULATED = 0x0000_0100;
        const EXEC = 0x0000_0200;
        const NATIVE = 0x0000_0400;
        const EVENT = 0x0000_0800;
        const OPERATOR = 0x0000_1000;
        const STATIC = 0x0000_2000;
        const NO_EXPORT = 0x0000_4000;
        const CONST = 0x0000_8000;
        const INVARIANT = 0x0001_0000;
        const DELEGATE = 0x0010_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ClassFlags: u32 {
        const ABSTRACT = 0x0000_0001;
        const COMPILED = 0x0000_0002;
        const CONFIG = 0x0000_0004;
        const TRANSIENT = 0x0000_0008;
        const PARSED = 0x0000_0010;
        const LOCALIZED = 0x0000_0020;
        const SAFE_REPLACE = 0x0000_0040;
        const NO_EXPORT = 0x0000_0100;
        const PLACEABLE = 0x0000_0200;
        const PER_OBJECT_CONFIG = 0x0000_0400;
        const NATIVE_REPLICATION = 0x0000_0800;
        const EDIT_INLINE_NEW = 0x0000_1000;
        const COLLAPSE_CATEGORIES = 0x0000_2000;
    }
}

/// A field that owns children and, optionally, compiled script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructData {
    pub field: FieldData,
    pub script_text: Option<ObjectId>,
    /// Head of the child list; siblings follow `FieldData::next`.
    pub children: Option<ObjectId>,
    pub friendly_name: Option<Name>,
    pub cpp_text: Option<ObjectId>,
    pub line: i32,
    pub text_pos: i32,
    /// Script size as laid out in engine memory; jump offsets use this space.
    pub script_memory_size: u32,
    /// Script size on disk.
    pub script_storage_size: u32,
    pub script: Vec<u8>,
}

impl Deserialize for StructData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.field.deserialize(ar, linker)?;
        self.script_text = linker.read_object(ar)?;
        self.children = linker.read_object(ar)?;
        if !ar.version().at_least(VER_64BIT_FLAGS) {
            self.friendly_name = Some(linker.read_name(ar)?);
        }
        if ar.version().at_least(VER_STRUCT_CPP_TEXT) {
            self.cpp_text = linker.read_object(ar)?;
        }
        self.line = ar.read_i32()?;
        self.text_pos = ar.read_i32()?;

        let memory_size = ar.read_i32()?;
        if memory_size < 0 {
            return Err(Error::format("struct", format!("negative script size {}", memory_size)));
        }
        self.script_memory_size = memory_size as u32;
        let storage_size = if ar.version().at_least(VER_SCRIPT_STORAGE_SIZE) {
            let size = ar.read_i32()?;
            if size < 0 {
                return Err(Error::format("struct", format!("negative script storage {}", size)));
            }
            size as usize
        } else if ar.version().uses_compact_index() {
            // Compact indices make the disk form shorter than the memory
            // form; only walking the tokens finds the end.
            script::measure_script(ar, self.script_memory_size)?
        } else {
            memory_size as usize
        };
        self.script_storage_size = storage_size as u32;
        self.script = ar.read_bytes(storage_size)?.to_vec();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionData {
    pub structure: StructData,
    pub native_index: u16,
    pub operator_precedence: u8,
    pub function_flags: FunctionFlags,
    pub rep_offset: Option<u16>,
    pub friendly_name: Option<Name>,
}

impl Deserialize for FunctionData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.structure.deserialize(ar, linker)?;
        self.native_index = ar.read_u16()?;
        self.operator_precedence = ar.read_u8()?;
        self.function_flags = FunctionFlags::from_bits_retain(ar.read_u32()?);
        if self.function_flags.contains(FunctionFlags::NET) {
            self.rep_offset = Some(ar.read_u16()?);
        }
        let ver = ar.version();
        if ver.at_least(VER_64BIT_FLAGS) && !ver.build.has(BuildFlags::CONSOLE_COOKED) {
            self.friendly_name = Some(linker.read_name(ar)?);
        } else {
            self.friendly_name = self.structure.friendly_name.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateData {
    pub structure: StructData,
    pub probe_mask: u64,
    pub ignore_mask: u64,
    pub label_table_offset: u16,
    pub state_flags: u32,
    pub function_map: Vec<(Name, Option<ObjectId>)>,
}

impl Deserialize for StateData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.structure.deserialize(ar, linker)?;
        self.probe_mask = ar.read_u64()?;
        self.ignore_mask = ar.read_u64()?;
        self.label_table_offset = ar.read_u16()?;
        self.state_flags = ar.read_u32()?;
        if ar.version().at_least(VER_STATE_FUNCTION_MAP) {
            let count = ar.read_index()?;
            self.function_map = ar.read_array(count, |ar| {
                let name = linker.read_name(ar)?;
                let function = linker.read_object(ar)?;
                Ok((name, function))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDependency {
    pub class: Option<ObjectId>,
    pub deep: bool,
    pub script_text_crc: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassData {
    pub state: StateData,
    pub class_flags: ClassFlags,
    pub class_guid: Guid,
    pub dependencies: Vec<ClassDependency>,
    pub package_imports: Vec<Name>,
    pub within: Option<ObjectId>,
    pub config_name: Option<Name>,
    pub hide_categories: Vec<Name>,
    pub default_properties: Vec<PropertyTag>,
    pub default_object: Option<ObjectId>,
}

impl Deserialize for ClassData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.state.deserialize(ar, linker)?;
        self.class_flags = ClassFlags::from_bits_retain(ar.read_u32()?);
        let legacy = !ar.version().at_least(VER_NET_INDEX);
        if legacy {
            self.class_guid = ar.read_guid()?;
            let count = ar.read_index()?;
            self.dependencies = ar.read_array(count, |ar| {
                Ok(ClassDependency {
                    class: linker.read_object(ar)?,
                    deep: ar.read_bool32()?,
                    script_text_crc: ar.read_u32()?,
                })
            })?;
        }
        let count = ar.read_index()?;
        self.package_imports = ar.read_array(count, |ar| linker.read_name(ar))?;
        self.within = linker.read_object(ar)?;
        let config_name = linker.read_name(ar)?;
        self.config_name = (!config_name.is_none()).then_some(config_name);
        if legacy {
            self.default_properties = read_property_tags(ar, linker)?;
        } else {
            let count = ar.read_index()?;
            self.hide_categories = ar.read_array(count, |ar| linker.read_name(ar))?;
            self.default_object = linker.read_object(ar)?;
        }
        Ok(())
    }
}
