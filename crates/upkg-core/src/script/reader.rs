//! Bytecode decoding.

use super::native::{NativeFunction, NativeFunctionCache};
use super::opcode::{ExprToken, EXTENDED_NATIVE, FIRST_NATIVE};
use super::token::{Label, Operand, Token};
use crate::archive::version::VER_NET_INDEX;
use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::name::NameRef;

const MAX_DEPTH: u32 = 256;

/// Turns references inside the bytecode into display text.
pub trait ScriptResolver {
    fn object_name(&self, index: PackageIndex) -> String;

    fn name(&self, name: NameRef) -> String;

    /// Text of an object literal such as `Class'Engine.Actor'`.
    fn object_literal(&self, index: PackageIndex) -> String {
        format!("'{}'", self.object_name(index))
    }
}

/// Resolver for when only token extents matter.
pub struct NullResolver;

impl ScriptResolver for NullResolver {
    fn object_name(&self, index: PackageIndex) -> String {
        format!("obj{}", index.0)
    }

    fn name(&self, name: NameRef) -> String {
        format!("name{}", name.index)
    }
}

/// Decoded statement list of one struct.
#[derive(Debug)]
pub struct Script {
    pub tokens: Vec<Token>,
    pub memory_size: u32,
    /// Why decoding stopped early, if it did.
    pub error: Option<Error>,
}

pub struct TokenReader<'a, 'r> {
    ar: Archive<'a>,
    position: u32,
    depth: u32,
    resolver: &'r dyn ScriptResolver,
    natives: Option<&'r NativeFunctionCache>,
    scope: Option<String>,
}

impl<'a, 'r> TokenReader<'a, 'r> {
    pub fn new(ar: Archive<'a>, resolver: &'r dyn ScriptResolver) -> Self {
        Self {
            ar,
            position: 0,
            depth: 0,
            resolver,
            natives: None,
            scope: None,
        }
    }

    pub fn with_natives(mut self, natives: &'r NativeFunctionCache) -> Self {
        self.natives = Some(natives);
        self
    }

    /// Class whose native table is searched first.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Current memory offset.
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn disk_position(&self) -> usize {
        self.ar.position()
    }

    /// Statement tokens until `memory_size` is covered or the script ends.
    pub fn read_script(mut self, memory_size: u32) -> Script {
        let mut tokens = Vec::new();
        let mut error = None;
        while self.position < memory_size && !self.ar.is_eof() {
            match self.read_token() {
                Ok(token) => {
                    let last = token.is(ExprToken::EndOfScript);
                    tokens.push(token);
                    if last {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("script decoding stopped at {:#06x}: {}", self.position, e);
                    error = Some(e);
                    break;
                }
            }
        }
        Script {
            tokens,
            memory_size,
            error,
        }
    }

    fn u8(&mut self) -> Result<u8> {
        let v = self.ar.read_u8()?;
        self.position += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16> {
        let v = self.ar.read_u16()?;
        self.position += 2;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32> {
        let v = self.ar.read_i32()?;
        self.position += 4;
        Ok(v)
    }

    fn f32(&mut self) -> Result<f32> {
        let v = self.ar.read_f32()?;
        self.position += 4;
        Ok(v)
    }

    fn object(&mut self) -> Result<PackageIndex> {
        let index = PackageIndex(self.ar.read_index()?);
        self.position += self.ar.version().script_object_size();
        Ok(index)
    }

    fn object_name(&mut self) -> Result<String> {
        let index = self.object()?;
        Ok(self.resolver.object_name(index))
    }

    fn name(&mut self) -> Result<String> {
        let name = self.ar.read_name_ref()?;
        self.position += self.ar.version().script_name_size();
        Ok(self.resolver.name(name))
    }

    fn ansi_string(&mut self) -> Result<String> {
        let start = self.ar.position();
        let text = self.ar.read_cstring()?;
        self.position += (self.ar.position() - start) as u32;
        Ok(text)
    }

    fn unicode_string(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    fn params(&mut self, children: &mut Vec<Token>) -> Result<()> {
        loop {
            let token = self.read_token()?;
            if token.is(ExprToken::EndFunctionParms) {
                return Ok(());
            }
            children.push(token);
        }
    }

    fn error(&self, opcode: u8, position: u32, message: impl Into<String>) -> Error {
        Error::TokenDecode {
            opcode,
            position,
            message: message.into(),
        }
    }

    pub fn read_token(&mut self) -> Result<Token> {
        let position = self.position;
        let opcode = self.u8()?;
        if self.depth >= MAX_DEPTH {
            return Err(self.error(opcode, position, "expression nesting too deep"));
        }
        self.depth += 1;
        let result = self.read_body(opcode, position);
        self.depth -= 1;
        let (operand, children) = result?;
        Ok(Token {
            opcode,
            position,
            size: self.position - position,
            operand,
            children,
        })
    }

    fn native(&mut self, index: u16, children: &mut Vec<Token>) -> Result<Operand> {
        let function = self
            .natives
            .and_then(|n| n.lookup(self.scope.as_deref(), index))
            .unwrap_or_else(|| NativeFunction::unknown(index));
        self.params(children)?;
        Ok(Operand::Native(function))
    }

    fn read_body(&mut self, opcode: u8, position: u32) -> Result<(Operand, Vec<Token>)> {
        use ExprToken as T;

        let mut children = Vec::new();
        if opcode >= FIRST_NATIVE {
            let operand = self.native(opcode as u16, &mut children)?;
            return Ok((operand, children));
        }
        if opcode >= EXTENDED_NATIVE {
            let low = self.u8()?;
            let index = (((opcode - EXTENDED_NATIVE) as u16) << 8) | low as u16;
            let operand = self.native(index, &mut children)?;
            return Ok((operand, children));
        }
        let Some(token) = ExprToken::from_repr(opcode) else {
            return Err(self.error(opcode, position, "unknown opcode"));
        };
        let ue3 = self.ar.version().at_least(VER_NET_INDEX);

        let operand = match token {
            T::LocalVariable
            | T::InstanceVariable
            | T::DefaultVariable
            | T::StateVariable
            | T::LocalOutVariable
            | T::NativeParm
            | T::ReturnNothing => Operand::Text(self.object_name()?),
            T::Return
            | T::GotoLabel
            | T::BoolVariable
            | T::DynArrayLength
            | T::InterfaceContext => {
                children.push(self.read_token()?);
                Operand::None
            }
            T::Switch => {
                if ue3 {
                    self.object()?;
                }
                let size = self.u8()?;
                children.push(self.read_token()?);
                Operand::Byte(size)
            }
            T::Jump => Operand::Offset(self.u16()?),
            T::JumpIfNot => {
                let target = self.u16()?;
                children.push(self.read_token()?);
                Operand::Offset(target)
            }
            T::Assert => {
                let line = self.u16()?;
                if ue3 {
                    self.u8()?;
                }
                children.push(self.read_token()?);
                Operand::Int(line as i32)
            }
            T::Case => {
                let next = self.u16()?;
                if next != 0xFFFF {
                    children.push(self.read_token()?);
                }
                Operand::Offset(next)
            }
            T::LabelTable => {
                let mut labels = Vec::new();
                loop {
                    let name = self.name()?;
                    let offset = self.i32()? as u32;
                    if name.eq_ignore_ascii_case("None") {
                        break;
                    }
                    labels.push(Label { name, offset });
                }
                Operand::Labels(labels)
            }
            T::EatReturnValue => {
                if ue3 {
                    self.object()?;
                }
                children.push(self.read_token()?);
                Operand::None
            }
            T::Let | T::LetBool | T::LetDelegate | T::DynArrayElement | T::ArrayElement => {
                children.push(self.read_token()?);
                children.push(self.read_token()?);
                Operand::None
            }
            T::StructCmpEq | T::StructCmpNe => {
                let name = self.object_name()?;
                children.push(self.read_token()?);
                children.push(self.read_token()?);
                Operand::Text(name)
            }
            T::EqualEqualDelDel | T::NotEqualDelDel | T::EqualEqualDelFunc | T::NotEqualDelFunc => {
                self.params(&mut children)?;
                Operand::None
            }
            T::New => {
                for _ in 0..4 {
                    children.push(self.read_token()?);
                }
                Operand::None
            }
            T::ClassContext | T::Context => {
                children.push(self.read_token()?);
                let skip = self.u16()?;
                if ue3 {
                    self.object()?;
                }
                self.u8()?;
                children.push(self.read_token()?);
                Operand::Offset(skip)
            }
            T::MetaCast | T::DynamicCast | T::InterfaceCast => {
                let class = self.object_name()?;
                children.push(self.read_token()?);
                Operand::Text(class)
            }
            T::Skip => {
                let skip = self.u16()?;
                children.push(self.read_token()?);
                Operand::Offset(skip)
            }
            T::VirtualFunction | T::GlobalFunction => {
                let name = self.name()?;
                self.params(&mut children)?;
                Operand::Text(name)
            }
            T::FinalFunction => {
                let name = self.object_name()?;
                self.params(&mut children)?;
                Operand::Text(name)
            }
            T::DelegateFunction => {
                if ue3 {
                    self.u8()?;
                }
                self.object()?;
                let name = self.name()?;
                self.params(&mut children)?;
                Operand::Text(name)
            }
            T::DelegateProperty => {
                let name = self.name()?;
                if ue3 {
                    self.object()?;
                }
                Operand::Text(name)
            }
            T::InstanceDelegate => Operand::Text(self.name()?),
            T::IntConst => Operand::Int(self.i32()?),
            T::FloatConst => Operand::Float(self.f32()?),
            T::StringConst => Operand::Text(self.ansi_string()?),
            T::UnicodeStringConst => Operand::Text(self.unicode_string()?),
            T::ObjectConst => {
                let index = self.object()?;
                Operand::Text(self.resolver.object_literal(index))
            }
            T::NameConst => Operand::Text(self.name()?),
            T::RotationConst => Operand::Rotator(self.i32()?, self.i32()?, self.i32()?),
            T::VectorConst => Operand::Vector(self.f32()?, self.f32()?, self.f32()?),
            T::ByteConst | T::IntConstByte => Operand::Byte(self.u8()?),
            T::Iterator => {
                children.push(self.read_token()?);
                Operand::Offset(self.u16()?)
            }
            T::StructMember => {
                let member = self.object_name()?;
                if ue3 {
                    self.object()?;
                    self.u8()?;
                    self.u8()?;
                }
                children.push(self.read_token()?);
                Operand::Text(member)
            }
            T::PrimitiveCast => {
                let cast = self.u8()?;
                children.push(self.read_token()?);
                Operand::Cast(cast)
            }
            T::DynArrayInsert | T::DynArrayRemove => {
                for _ in 0..3 {
                    children.push(self.read_token()?);
                }
                Operand::None
            }
            T::DynArrayAdd => {
                children.push(self.read_token()?);
                self.params(&mut children)?;
                Operand::None
            }
            T::DynArrayFind
            | T::DynArrayFindStruct
            | T::DynArrayAddItem
            | T::DynArrayRemoveItem
            | T::DynArrayInsertItem
            | T::DynArraySort => {
                children.push(self.read_token()?);
                let skip = self.u16()?;
                self.params(&mut children)?;
                Operand::Offset(skip)
            }
            T::DynArrayIterator => {
                children.push(self.read_token()?);
                children.push(self.read_token()?);
                let with_index = self.u8()?;
                let index = self.read_token()?;
                if with_index != 0 {
                    children.push(index);
                }
                Operand::Offset(self.u16()?)
            }
            T::Conditional => {
                children.push(self.read_token()?);
                self.u16()?;
                children.push(self.read_token()?);
                self.u16()?;
                children.push(self.read_token()?);
                Operand::None
            }
            T::DefaultParmValue => {
                let size = self.u16()?;
                children.push(self.read_token()?);
                let end = self.read_token()?;
                if !end.is(ExprToken::EndParmValue) {
                    return Err(self.error(opcode, position, "default value without end marker"));
                }
                Operand::Offset(size)
            }
            T::FilterEditorOnly => Operand::Offset(self.u16()?),
            T::DebugInfo => {
                let _version = self.i32()?;
                let line = self.i32()?;
                let _pos = self.i32()?;
                let _op = self.u8()?;
                Operand::Int(line)
            }
            T::Stop
            | T::Nothing
            | T::EndParmValue
            | T::EndFunctionParms
            | T::Self_
            | T::IntZero
            | T::IntOne
            | T::True
            | T::False
            | T::NoObject
            | T::IteratorPop
            | T::IteratorNext
            | T::EmptyDelegate
            | T::EmptyParmValue
            | T::EndOfScript => Operand::None,
        };
        Ok((operand, children))
    }
}

/// Disk length of a script whose memory length is `memory_size`, leaving
/// `ar` where it was.
pub fn measure_script(ar: &Archive, memory_size: u32) -> Result<usize> {
    let start = ar.position();
    let mut reader = TokenReader::new(ar.clone(), &NullResolver);
    while reader.position() < memory_size {
        let token = reader.read_token()?;
        if token.is(ExprToken::EndOfScript) {
            break;
        }
    }
    Ok(reader.disk_position() - start)
}

/// Decode `bytes` as script with the stream settings of `ar`.
pub fn read_script(
    ar: Archive,
    memory_size: u32,
    resolver: &dyn ScriptResolver,
    natives: &NativeFunctionCache,
    scope: Option<&str>,
) -> Script {
    let mut reader = TokenReader::new(ar, resolver).with_natives(natives);
    if let Some(scope) = scope {
        reader = reader.with_scope(scope);
    }
    reader.read_script(memory_size)
}
