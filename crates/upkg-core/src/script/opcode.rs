use strum::{FromRepr, IntoStaticStr};

/// First opcode of the extended native range; the next byte completes the index.
pub const EXTENDED_NATIVE: u8 = 0x60;
/// Opcodes from here up are native function indices.
pub const FIRST_NATIVE: u8 = 0x70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum ExprToken {
    LocalVariable = 0x00,
    InstanceVariable = 0x01,
    DefaultVariable = 0x02,
    StateVariable = 0x03,
    Return = 0x04,
    Switch = 0x05,
    Jump = 0x06,
    JumpIfNot = 0x07,
    Stop = 0x08,
    Assert = 0x09,
    Case = 0x0A,
    Nothing = 0x0B,
    LabelTable = 0x0C,
    GotoLabel = 0x0D,
    EatReturnValue = 0x0E,
    Let = 0x0F,
    DynArrayElement = 0x10,
    New = 0x11,
    ClassContext = 0x12,
    MetaCast = 0x13,
    LetBool = 0x14,
    EndParmValue = 0x15,
    EndFunctionParms = 0x16,
    Self_ = 0x17,
    Skip = 0x18,
    Context = 0x19,
    ArrayElement = 0x1A,
    VirtualFunction = 0x1B,
    FinalFunction = 0x1C,
    IntConst = 0x1D,
    FloatConst = 0x1E,
    StringConst = 0x1F,
    ObjectConst = 0x20,
    NameConst = 0x21,
    RotationConst = 0x22,
    VectorConst = 0x23,
    ByteConst = 0x24,
    IntZero = 0x25,
    IntOne = 0x26,
    True = 0x27,
    False = 0x28,
    NativeParm = 0x29,
    NoObject = 0x2A,
    IntConstByte = 0x2C,
    BoolVariable = 0x2D,
    DynamicCast = 0x2E,
    Iterator = 0x2F,
    IteratorPop = 0x30,
    IteratorNext = 0x31,
    StructCmpEq = 0x32,
    StructCmpNe = 0x33,
    UnicodeStringConst = 0x34,
    StructMember = 0x35,
    DynArrayLength = 0x36,
    GlobalFunction = 0x37,
    PrimitiveCast = 0x38,
    DynArrayInsert = 0x39,
    ReturnNothing = 0x3A,
    EqualEqualDelDel = 0x3B,
    NotEqualDelDel = 0x3C,
    EqualEqualDelFunc = 0x3D,
    NotEqualDelFunc = 0x3E,
    EmptyDelegate = 0x3F,
    DynArrayRemove = 0x40,
    DebugInfo = 0x41,
    DelegateFunction = 0x42,
    DelegateProperty = 0x43,
    LetDelegate = 0x44,
    Conditional = 0x45,
    DynArrayFind = 0x46,
    DynArrayFindStruct = 0x47,
    LocalOutVariable = 0x48,
    DefaultParmValue = 0x49,
    EmptyParmValue = 0x4A,
    InstanceDelegate = 0x4B,
    InterfaceContext = 0x51,
    InterfaceCast = 0x52,
    EndOfScript = 0x53,
    DynArrayAdd = 0x54,
    DynArrayAddItem = 0x55,
    DynArrayRemoveItem = 0x56,
    DynArrayInsertItem = 0x57,
    DynArrayIterator = 0x58,
    DynArraySort = 0x59,
    FilterEditorOnly = 0x5A,
}

impl ExprToken {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Display name of any opcode byte, including natives.
pub fn opcode_name(opcode: u8) -> String {
    match ExprToken::from_repr(opcode) {
        Some(token) => token.name().to_string(),
        None if opcode >= FIRST_NATIVE => format!("Native_{:02X}", opcode),
        None if opcode >= EXTENDED_NATIVE => format!("ExtendedNative_{:02X}", opcode),
        None => format!("Unknown_{:02X}", opcode),
    }
}

/// Target type names of the primitive cast codes.
pub fn cast_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0x36 => "interface",
        0x39 | 0x4D => "vector",
        0x3A | 0x41 | 0x44 | 0x4A => "int",
        0x3B | 0x3E | 0x45 | 0x47 | 0x48 | 0x4B | 0x4F | 0x51 | 0x5C => "bool",
        0x3C | 0x3F | 0x42 | 0x4C => "float",
        0x3D | 0x40 | 0x43 | 0x49 => "byte",
        0x4E | 0x50 => "rotator",
        0x52..=0x5A => "string",
        0x5D | 0x60 => "name",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(ExprToken::from_repr(0x07), Some(ExprToken::JumpIfNot));
        assert_eq!(ExprToken::from_repr(0x2B), None);
        assert_eq!(opcode_name(0x0A), "Case");
        assert_eq!(opcode_name(0x9A), "Native_9A");
        assert_eq!(opcode_name(0x61), "ExtendedNative_61");
        assert_eq!(opcode_name(0x5F), "Unknown_5F");
    }
}
