use bitflags::bitflags;
use strum::{EnumString, IntoStaticStr};

use super::{Deserialize, FieldData, ObjectId, ObjectResolver};
use crate::archive::version::VER_64BIT_FLAGS;
use crate::archive::Archive;
use crate::build::BuildFlags;
use crate::error::Result;
use crate::name::Name;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PropertyFlags: u64 {
        const EDIT = 0x0000_0001;
        const CONST = 0x0000_0002;
        const INPUT = 0x0000_0004;
        const EXPORT_OBJECT = 0x0000_0008;
        const OPTIONAL_PARM = 0x0000_0010;
        const NET = 0x0000_0020;
        const PARM = 0x0000_0080;
        const OUT_PARM = 0x0000_0100;
        const SKIP_PARM = 0x0000_0200;
        const RETURN_PARM = 0x0000_0400;
        const COERCE_PARM = 0x0000_0800;
        const NATIVE = 0x0000_1000;
        const TRANSIENT = 0x0000_2000;
        const CONFIG = 0x0000_4000;
        const LOCALIZED = 0x0000_8000;
        const GLOBAL_CONFIG = 0x0004_0000;
    }
}

/// The concrete property class, from `<Type>Property`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum PropertyType {
    Byte,
    Int,
    Bool,
    Float,
    Object,
    Name,
    String,
    Str,
    Class,
    Array,
    Struct,
    Vector,
    Rotator,
    Map,
    FixedArray,
    Delegate,
    Interface,
    Component,
    Pointer,
    QWord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyData {
    pub field: FieldData,
    pub property_type: PropertyType,
    pub array_dim: u16,
    pub element_size: u16,
    pub property_flags: PropertyFlags,
    pub category: Option<Name>,
    pub rep_offset: Option<u16>,
    /// Enum of a byte, struct of a struct, class of an object property.
    pub target: Option<ObjectId>,
    /// Meta class of a class property, value of a map.
    pub secondary: Option<ObjectId>,
    /// Element of an array, key of a map.
    pub inner: Option<ObjectId>,
    pub fixed_count: Option<i32>,
}

impl PropertyData {
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            field: FieldData::default(),
            property_type,
            array_dim: 1,
            element_size: 0,
            property_flags: PropertyFlags::empty(),
            category: None,
            rep_offset: None,
            target: None,
            secondary: None,
            inner: None,
            fixed_count: None,
        }
    }

    pub fn is_parm(&self) -> bool {
        self.property_flags.contains(PropertyFlags::PARM)
    }

    pub fn is_return(&self) -> bool {
        self.property_flags.contains(PropertyFlags::RETURN_PARM)
    }
}

impl Deserialize for PropertyData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.field.deserialize(ar, linker)?;
        self.array_dim = ar.read_u16()?;
        self.element_size = ar.read_u16()?;
        let flags = if ar.version().at_least(VER_64BIT_FLAGS) {
            ar.read_u64()?
        } else {
            ar.read_u32()? as u64
        };
        self.property_flags = PropertyFlags::from_bits_retain(flags);
        if !ar.version().build.has(BuildFlags::CONSOLE_COOKED) {
            self.category = Some(linker.read_name(ar)?);
        }
        if self.property_flags.contains(PropertyFlags::NET) {
            self.rep_offset = Some(ar.read_u16()?);
        }

        match self.property_type {
            PropertyType::Byte
            | PropertyType::Object
            | PropertyType::Component
            | PropertyType::Struct
            | PropertyType::Delegate
            | PropertyType::Interface => {
                self.target = linker.read_object(ar)?;
            }
            PropertyType::Class => {
                self.target = linker.read_object(ar)?;
                self.secondary = linker.read_object(ar)?;
            }
            PropertyType::Array => {
                self.inner = linker.read_object(ar)?;
            }
            PropertyType::FixedArray => {
                self.inner = linker.read_object(ar)?;
                self.fixed_count = Some(ar.read_i32()?);
            }
            PropertyType::Map => {
                self.inner = linker.read_object(ar)?;
                self.secondary = linker.read_object(ar)?;
            }
            PropertyType::Int
            | PropertyType::Bool
            | PropertyType::Float
            | PropertyType::Name
            | PropertyType::String
            | PropertyType::Str
            | PropertyType::Vector
            | PropertyType::Rotator
            | PropertyType::Pointer
            | PropertyType::QWord => {}
        }
        Ok(())
    }
}
