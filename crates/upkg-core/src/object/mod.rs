//! Runtime objects built from export and import records.
//!
//! Objects live in an [`ObjectContainer`] arena and refer to each other only
//! through [`ObjectId`] handles.

mod container;
mod field;
mod property;
mod registry;
mod structs;
mod tags;

use std::fmt;

use bitflags::bitflags;

pub use container::ObjectContainer;
pub use field::{ConstData, EnumData, FieldData, TextBufferData};
pub use property::{PropertyData, PropertyFlags, PropertyType};
pub use registry::{ClassRegistry, KindTag};
pub use structs::{
    ClassData, ClassDependency, ClassFlags, FunctionData, FunctionFlags, StateData, StructData,
};
pub use tags::{read_property_tags, PropertyTag};

use crate::archive::version::*;
use crate::archive::Archive;
use crate::error::Result;
use crate::index::PackageIndex;
use crate::name::{Name, NameRef};
use crate::package::PackageId;

/// Generation-checked handle into an [`ObjectContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ObjectFlags: u64 {
        const TRANSACTIONAL = 0x0000_0001;
        const PUBLIC = 0x0000_0004;
        const STANDALONE = 0x0008_0000;
        const HAS_STACK = 0x0200_0000;
        const NATIVE = 0x0400_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeserializationState {
    /// Constructed, fields not read yet.
    Pending,
    InProgress,
    Done,
    Failed(String),
    /// No serialized data in this package (imports and placeholders).
    Imported,
    /// The class is not known to this build; only the header is available.
    Unsupported,
}

/// Kind-specific data, chosen from the object's class when it is constructed.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Package,
    Class(Box<ClassData>),
    Struct(Box<StructData>),
    State(Box<StateData>),
    Function(Box<FunctionData>),
    Property(Box<PropertyData>),
    Enum(EnumData),
    Const(ConstData),
    TextBuffer(TextBufferData),
    /// Class not registered; carries no decoded fields.
    Unknown,
}

impl ObjectKind {
    pub fn tag(&self) -> Option<KindTag> {
        Some(match self {
            ObjectKind::Package => KindTag::Package,
            ObjectKind::Class(_) => KindTag::Class,
            ObjectKind::Struct(_) => KindTag::Struct,
            ObjectKind::State(_) => KindTag::State,
            ObjectKind::Function(_) => KindTag::Function,
            ObjectKind::Property(p) => KindTag::Property(p.property_type),
            ObjectKind::Enum(_) => KindTag::Enum,
            ObjectKind::Const(_) => KindTag::Const,
            ObjectKind::TextBuffer(_) => KindTag::TextBuffer,
            ObjectKind::Unknown => return None,
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ObjectKind::Unknown)
    }

    pub fn field(&self) -> Option<&FieldData> {
        match self {
            ObjectKind::Class(c) => Some(&c.state.structure.field),
            ObjectKind::Struct(s) => Some(&s.field),
            ObjectKind::State(s) => Some(&s.structure.field),
            ObjectKind::Function(f) => Some(&f.structure.field),
            ObjectKind::Property(p) => Some(&p.field),
            ObjectKind::Enum(e) => Some(&e.field),
            ObjectKind::Const(c) => Some(&c.field),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructData> {
        match self {
            ObjectKind::Class(c) => Some(&c.state.structure),
            ObjectKind::Struct(s) => Some(s),
            ObjectKind::State(s) => Some(&s.structure),
            ObjectKind::Function(f) => Some(&f.structure),
            _ => None,
        }
    }

    fn as_struct_mut(&mut self) -> Option<&mut StructData> {
        match self {
            ObjectKind::Class(c) => Some(&mut c.state.structure),
            ObjectKind::Struct(s) => Some(s),
            ObjectKind::State(s) => Some(&mut s.structure),
            ObjectKind::Function(f) => Some(&mut f.structure),
            _ => None,
        }
    }
}

/// Resolves references met while decoding an object's fields.
pub trait ObjectResolver {
    fn resolve(&mut self, index: PackageIndex) -> Result<Option<ObjectId>>;

    fn name(&self, name: NameRef) -> Result<Name>;

    fn read_object(&mut self, ar: &mut Archive) -> Result<Option<ObjectId>> {
        let index = PackageIndex(ar.read_index()?);
        self.resolve(index)
    }

    fn read_name(&self, ar: &mut Archive) -> Result<Name> {
        let name = ar.read_name_ref()?;
        self.name(name)
    }
}

pub trait Deserialize {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()>;
}

pub trait HasOuter {
    fn outer(&self) -> Option<ObjectId>;
}

pub trait HasSuper {
    fn super_struct(&self) -> Option<ObjectId>;
}

impl HasSuper for ObjectKind {
    fn super_struct(&self) -> Option<ObjectId> {
        self.as_struct().and_then(|s| s.field.super_field)
    }
}

/// Suspended state machine saved with objects that were executing script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFrame {
    pub node: Option<ObjectId>,
    pub state_node: Option<ObjectId>,
    pub probe_mask: u64,
    pub latent_action: i32,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: Name,
    pub class_name: Name,
    pub package: Option<PackageId>,
    /// Index in the owning package's tables; null for synthesized objects.
    pub table_index: PackageIndex,
    pub outer: Option<ObjectId>,
    pub class: Option<ObjectId>,
    pub archetype: Option<ObjectId>,
    pub flags: ObjectFlags,
    pub kind: ObjectKind,
    pub state: DeserializationState,
    pub state_frame: Option<StateFrame>,
    pub net_index: Option<i32>,
    pub properties: Vec<PropertyTag>,
}

impl Object {
    pub fn new(name: Name, class_name: Name, kind: ObjectKind) -> Self {
        let state = if kind.is_unknown() {
            DeserializationState::Unsupported
        } else {
            DeserializationState::Pending
        };
        Self {
            name,
            class_name,
            package: None,
            table_index: PackageIndex::NULL,
            outer: None,
            class: None,
            archetype: None,
            flags: ObjectFlags::empty(),
            kind,
            state,
            state_frame: None,
            net_index: None,
            properties: Vec::new(),
        }
    }

    pub fn is_export(&self) -> bool {
        self.table_index.is_export()
    }

    pub fn super_struct(&self) -> Option<ObjectId> {
        self.kind.super_struct()
    }

    pub(crate) fn set_super(&mut self, super_struct: Option<ObjectId>) {
        if let Some(s) = self.kind.as_struct_mut() {
            s.field.super_field = super_struct;
        }
    }

    /// Decode the common object header and then the kind-specific fields.
    pub fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        if self.flags.contains(ObjectFlags::HAS_STACK) {
            let node = linker.read_object(ar)?;
            let state_node = linker.read_object(ar)?;
            let probe_mask = if ar.version().at_least(VER_NET_INDEX) {
                ar.read_u32()? as u64
            } else {
                ar.read_u64()?
            };
            let latent_action = ar.read_i32()?;
            let offset = match node {
                Some(_) => Some(ar.read_index()?),
                None => None,
            };
            self.state_frame = Some(StateFrame {
                node,
                state_node,
                probe_mask,
                latent_action,
                offset,
            });
        }
        if ar.version().at_least(VER_NET_INDEX) {
            self.net_index = Some(ar.read_i32()?);
        }
        if !matches!(self.kind, ObjectKind::Class(_)) {
            self.properties = read_property_tags(ar, linker)?;
        }

        match &mut self.kind {
            ObjectKind::Package | ObjectKind::Unknown => Ok(()),
            ObjectKind::Class(c) => c.deserialize(ar, linker),
            ObjectKind::Struct(s) => s.deserialize(ar, linker),
            ObjectKind::State(s) => s.deserialize(ar, linker),
            ObjectKind::Function(f) => f.deserialize(ar, linker),
            ObjectKind::Property(p) => p.deserialize(ar, linker),
            ObjectKind::Enum(e) => e.deserialize(ar, linker),
            ObjectKind::Const(c) => c.deserialize(ar, linker),
            ObjectKind::TextBuffer(t) => t.deserialize(ar, linker),
        }
    }
}

impl HasOuter for Object {
    fn outer(&self) -> Option<ObjectId> {
        self.outer
    }
}
