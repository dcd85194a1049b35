use super::{Deserialize, ObjectId, ObjectResolver};
use crate::archive::Archive;
use crate::error::Result;
use crate::name::Name;

/// Header shared by every script-visible member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldData {
    pub super_field: Option<ObjectId>,
    /// Next sibling in the owning struct's child list.
    pub next: Option<ObjectId>,
}

impl Deserialize for FieldData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        let super_field = linker.read_object(ar)?;
        // The export record may already have supplied it.
        if super_field.is_some() {
            self.super_field = super_field;
        }
        self.next = linker.read_object(ar)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstData {
    pub field: FieldData,
    pub value: String,
}

impl Deserialize for ConstData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.field.deserialize(ar, linker)?;
        self.value = ar.read_string()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumData {
    pub field: FieldData,
    pub names: Vec<Name>,
}

impl Deserialize for EnumData {
    fn deserialize(&mut self, ar: &mut Archive, linker: &mut dyn ObjectResolver) -> Result<()> {
        self.field.deserialize(ar, linker)?;
        let count = ar.read_index()?;
        self.names = ar.read_array(count, |ar| linker.read_name(ar))?;
        Ok(())
    }
}

/// Source text kept alongside compiled script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBufferData {
    pub pos: u32,
    pub top: u32,
    pub text: String,
}

impl Deserialize for TextBufferData {
    fn deserialize(&mut self, ar: &mut Archive, _linker: &mut dyn ObjectResolver) -> Result<()> {
        self.pos = ar.read_u32()?;
        self.top = ar.read_u32()?;
        self.text = ar.read_string()?;
        Ok(())
    }
}
