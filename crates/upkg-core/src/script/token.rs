use super::native::NativeFunction;
use super::opcode::{ExprToken, FIRST_NATIVE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub offset: u32,
}

/// Inline data carried by a token besides its operand tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i32),
    Float(f32),
    Byte(u8),
    /// Jump destination, next-case link or skip end, as a memory offset.
    Offset(u16),
    /// Resolved object, name or string text.
    Text(String),
    Vector(f32, f32, f32),
    Rotator(i32, i32, i32),
    Labels(Vec<Label>),
    Native(NativeFunction),
    Cast(u8),
}

/// One decoded instruction and the expressions it owns.
///
/// `position` and `size` are in memory offsets, the space jump targets use.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub opcode: u8,
    pub position: u32,
    pub size: u32,
    pub operand: Operand,
    pub children: Vec<Token>,
}

impl Token {
    pub fn expr(&self) -> Option<ExprToken> {
        ExprToken::from_repr(self.opcode)
    }

    pub fn is(&self, token: ExprToken) -> bool {
        self.opcode == token as u8
    }

    pub fn is_native(&self) -> bool {
        matches!(self.operand, Operand::Native(_)) || self.opcode >= FIRST_NATIVE
    }

    /// Memory offset just past this token.
    pub fn end(&self) -> u32 {
        self.position + self.size
    }

    /// Destination of a `Jump`/`JumpIfNot`.
    pub fn jump_target(&self) -> Option<u32> {
        match (self.expr(), &self.operand) {
            (Some(ExprToken::Jump | ExprToken::JumpIfNot), Operand::Offset(target)) => {
                Some(*target as u32)
            }
            _ => None,
        }
    }

    /// For `Case`: the next case's offset, `None` for `default`.
    pub fn next_case(&self) -> Option<u32> {
        match (self.expr(), &self.operand) {
            (Some(ExprToken::Case), Operand::Offset(0xFFFF)) => None,
            (Some(ExprToken::Case), Operand::Offset(next)) => Some(*next as u32),
            _ => None,
        }
    }

    pub fn is_default_case(&self) -> bool {
        self.is(ExprToken::Case) && self.operand == Operand::Offset(0xFFFF)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.operand {
            Operand::Text(t) => Some(t),
            _ => None,
        }
    }
}
