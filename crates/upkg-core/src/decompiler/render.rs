use crate::error::{Error, Result};
use crate::script::{cast_name, ExprToken, NativeFormat, Operand, Token};

/// Precedence limit that never adds parentheses.
pub const TOP: u8 = u8::MAX;

/// Indentation state of one decompilation.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub indent: String,
}

impl RenderContext {
    const UNIT: &'static str = "    ";

    pub fn push(&mut self) {
        self.indent.push_str(Self::UNIT);
    }

    pub fn pop(&mut self) {
        let len = self.indent.len().saturating_sub(Self::UNIT.len());
        self.indent.truncate(len);
    }

    pub fn depth(&self) -> usize {
        self.indent.len() / Self::UNIT.len()
    }
}

fn malformed(token: &Token, message: &str) -> Error {
    Error::TokenDecode {
        opcode: token.opcode,
        position: token.position,
        message: message.to_string(),
    }
}

fn child<'t>(token: &'t Token, i: usize) -> Result<&'t Token> {
    token
        .children
        .get(i)
        .ok_or_else(|| malformed(token, "missing operand"))
}

fn text(token: &Token) -> Result<&str> {
    token.text().ok_or_else(|| malformed(token, "missing name"))
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn float(v: f32) -> String {
    let s = v.to_string();
    if s.contains(['.', 'e', 'E']) || !v.is_finite() {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Comma separated call arguments; skipped optional arguments stay as
/// empty slots, trailing ones are dropped.
pub fn arguments(args: &[Token]) -> Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        if arg.is(ExprToken::EmptyParmValue) || arg.is(ExprToken::Nothing) {
            parts.push(String::new());
        } else {
            parts.push(expression(arg, TOP)?);
        }
    }
    while parts.last().map_or(false, |p| p.is_empty()) {
        parts.pop();
    }
    Ok(parts.join(", "))
}

fn call(name: &str, args: &[Token]) -> Result<String> {
    Ok(format!("{}({})", name, arguments(args)?))
}

fn is_symbol(name: &str) -> bool {
    !name.chars().any(|c| c.is_alphanumeric() || c == '_')
}

/// Render an expression. `limit` is the loosest operator precedence that
/// may appear without parentheses; lower precedence values bind tighter.
pub fn expression(token: &Token, limit: u8) -> Result<String> {
    if let Operand::Native(function) = &token.operand {
        let args = &token.children;
        let (s, precedence) = match function.format {
            NativeFormat::Function => (call(&function.name, args)?, 0),
            NativeFormat::PreOperator => {
                let operand = expression(child(token, 0)?, 0)?;
                let s = if is_symbol(&function.name) {
                    format!("{}{}", function.name, operand)
                } else {
                    format!("{} {}", function.name, operand)
                };
                (s, 0)
            }
            NativeFormat::PostOperator => {
                let operand = expression(child(token, 0)?, 0)?;
                (format!("{}{}", operand, function.name), 0)
            }
            NativeFormat::Operator => {
                let p = function.precedence;
                let left = expression(child(token, 0)?, p)?;
                let right = expression(child(token, 1)?, p.saturating_sub(1))?;
                (format!("{} {} {}", left, function.name, right), p)
            }
        };
        return Ok(if precedence > limit {
            format!("({})", s)
        } else {
            s
        });
    }

    let Some(expr) = token.expr() else {
        return Err(malformed(token, "not an expression"));
    };
    use ExprToken as T;
    Ok(match expr {
        T::LocalVariable
        | T::InstanceVariable
        | T::StateVariable
        | T::LocalOutVariable
        | T::NativeParm
        | T::DelegateProperty
        | T::InstanceDelegate => text(token)?.to_string(),
        T::DefaultVariable => format!("default.{}", text(token)?),
        T::BoolVariable | T::InterfaceContext | T::Skip | T::EatReturnValue => {
            expression(child(token, 0)?, limit)?
        }
        T::DynArrayLength => format!("{}.Length", expression(child(token, 0)?, 0)?),
        T::Let | T::LetBool | T::LetDelegate => format!(
            "{} = {}",
            expression(child(token, 0)?, TOP)?,
            expression(child(token, 1)?, TOP)?
        ),
        T::ArrayElement | T::DynArrayElement => format!(
            "{}[{}]",
            expression(child(token, 1)?, 0)?,
            expression(child(token, 0)?, TOP)?
        ),
        T::Return => {
            let value = child(token, 0)?;
            if value.is(ExprToken::Nothing) {
                "return".to_string()
            } else {
                format!("return {}", expression(value, TOP)?)
            }
        }
        T::ReturnNothing => "return".to_string(),
        T::Stop => "stop".to_string(),
        T::Assert => format!("assert({})", expression(child(token, 0)?, TOP)?),
        T::GotoLabel => format!("goto {}", expression(child(token, 0)?, TOP)?),
        T::New => {
            let mut head = Vec::new();
            for arg in token.children.iter().take(3) {
                if !arg.is(ExprToken::Nothing) {
                    head.push(expression(arg, TOP)?);
                }
            }
            let class = expression(child(token, 3)?, 0)?;
            if head.is_empty() {
                format!("new {}", class)
            } else {
                format!("new ({}) {}", head.join(", "), class)
            }
        }
        T::Context => format!(
            "{}.{}",
            expression(child(token, 0)?, 0)?,
            expression(child(token, 1)?, 0)?
        ),
        T::ClassContext => format!(
            "{}.static.{}",
            expression(child(token, 0)?, 0)?,
            expression(child(token, 1)?, 0)?
        ),
        T::MetaCast => format!("class<{}>({})", text(token)?, expression(child(token, 0)?, TOP)?),
        T::DynamicCast | T::InterfaceCast => {
            format!("{}({})", text(token)?, expression(child(token, 0)?, TOP)?)
        }
        T::PrimitiveCast => {
            let Operand::Cast(code) = token.operand else {
                return Err(malformed(token, "missing cast code"));
            };
            let inner = expression(child(token, 0)?, TOP)?;
            match cast_name(code) {
                Some(name) => format!("{}({})", name, inner),
                None => inner,
            }
        }
        T::StructMember => format!("{}.{}", expression(child(token, 0)?, 0)?, text(token)?),
        T::StructCmpEq | T::EqualEqualDelDel | T::EqualEqualDelFunc => {
            binary(token, "==", 24, limit)?
        }
        T::StructCmpNe | T::NotEqualDelDel | T::NotEqualDelFunc => binary(token, "!=", 26, limit)?,
        T::VirtualFunction | T::FinalFunction | T::DelegateFunction => {
            call(text(token)?, &token.children)?
        }
        T::GlobalFunction => format!("global.{}", call(text(token)?, &token.children)?),
        T::Self_ => "self".to_string(),
        T::NoObject | T::EmptyDelegate => "none".to_string(),
        T::IntZero => "0".to_string(),
        T::IntOne => "1".to_string(),
        T::True => "true".to_string(),
        T::False => "false".to_string(),
        T::IntConst | T::ByteConst | T::IntConstByte | T::FloatConst => match token.operand {
            Operand::Int(v) => v.to_string(),
            Operand::Byte(v) => v.to_string(),
            Operand::Float(v) => float(v),
            _ => return Err(malformed(token, "missing constant")),
        },
        T::StringConst | T::UnicodeStringConst => quote(text(token)?),
        T::ObjectConst => text(token)?.to_string(),
        T::NameConst => format!("'{}'", text(token)?),
        T::RotationConst => match token.operand {
            Operand::Rotator(p, y, r) => format!("rot({}, {}, {})", p, y, r),
            _ => return Err(malformed(token, "missing rotator")),
        },
        T::VectorConst => match token.operand {
            Operand::Vector(x, y, z) => format!("vect({}, {}, {})", float(x), float(y), float(z)),
            _ => return Err(malformed(token, "missing vector")),
        },
        T::Conditional => {
            let s = format!(
                "{} ? {} : {}",
                expression(child(token, 0)?, 0)?,
                expression(child(token, 1)?, TOP)?,
                expression(child(token, 2)?, TOP)?
            );
            if limit < TOP {
                format!("({})", s)
            } else {
                s
            }
        }
        T::DynArrayInsert => array_call(token, "Insert")?,
        T::DynArrayRemove => array_call(token, "Remove")?,
        T::DynArrayAdd => array_call(token, "Add")?,
        T::DynArrayFind | T::DynArrayFindStruct => array_call(token, "Find")?,
        T::DynArrayAddItem => array_call(token, "AddItem")?,
        T::DynArrayRemoveItem => array_call(token, "RemoveItem")?,
        T::DynArrayInsertItem => array_call(token, "InsertItem")?,
        T::DynArraySort => array_call(token, "Sort")?,
        T::Nothing | T::EmptyParmValue => String::new(),
        T::Switch
        | T::Jump
        | T::JumpIfNot
        | T::Case
        | T::LabelTable
        | T::EndParmValue
        | T::EndFunctionParms
        | T::Iterator
        | T::IteratorPop
        | T::IteratorNext
        | T::DynArrayIterator
        | T::DebugInfo
        | T::DefaultParmValue
        | T::FilterEditorOnly
        | T::EndOfScript => return Err(malformed(token, "statement token used as an expression")),
    })
}

fn binary(token: &Token, op: &str, precedence: u8, limit: u8) -> Result<String> {
    let s = format!(
        "{} {} {}",
        expression(child(token, 0)?, precedence)?,
        op,
        expression(child(token, 1)?, precedence - 1)?
    );
    Ok(if precedence > limit {
        format!("({})", s)
    } else {
        s
    })
}

fn array_call(token: &Token, method: &str) -> Result<String> {
    let array = expression(child(token, 0)?, 0)?;
    Ok(format!("{}.{}", array, call(method, &token.children[1..])?))
}

/// Header of a `foreach` statement.
pub fn foreach_header(token: &Token) -> Result<String> {
    if token.is(ExprToken::DynArrayIterator) {
        let array = expression(child(token, 0)?, 0)?;
        let item = expression(child(token, 1)?, TOP)?;
        return Ok(match token.children.get(2) {
            Some(index) => format!("foreach {}({}, {})", array, item, expression(index, TOP)?),
            None => format!("foreach {}({})", array, item),
        });
    }
    Ok(format!("foreach {}", expression(child(token, 0)?, TOP)?))
}

/// Header of a `case`/`default` label.
pub fn case_label(token: &Token) -> Result<String> {
    if token.is_default_case() {
        return Ok("default:".to_string());
    }
    Ok(format!("case {}:", expression(child(token, 0)?, TOP)?))
}

/// Condition of a conditional jump.
pub fn condition(token: &Token) -> Result<String> {
    expression(child(token, 0)?, TOP)
}

/// Opcode names of a token tree, for diagnostics.
pub fn opcode_names(token: &Token) -> String {
    let mut names = vec![crate::script::opcode_name(token.opcode)];
    for c in &token.children {
        names.push(opcode_names(c));
    }
    names.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{NativeFunction, NativeFunctionCache};

    fn leaf(expr: ExprToken, operand: Operand) -> Token {
        Token {
            opcode: expr as u8,
            position: 0,
            size: 1,
            operand,
            children: Vec::new(),
        }
    }

    fn var(name: &str) -> Token {
        leaf(ExprToken::LocalVariable, Operand::Text(name.into()))
    }

    fn native(index: u16, children: Vec<Token>) -> Token {
        let function = NativeFunctionCache::new()
            .lookup(None, index)
            .unwrap_or_else(|| NativeFunction::unknown(index));
        Token {
            opcode: 0x70,
            position: 0,
            size: 1,
            operand: Operand::Native(function),
            children,
        }
    }

    #[test]
    fn operator_parentheses() {
        // (a + b) * c
        let sum = native(146, vec![var("a"), var("b")]);
        let product = native(144, vec![sum, var("c")]);
        assert_eq!(expression(&product, TOP).unwrap(), "(a + b) * c");

        // a - (b - c) keeps the right-hand grouping
        let inner = native(147, vec![var("b"), var("c")]);
        let outer = native(147, vec![var("a"), inner]);
        assert_eq!(expression(&outer, TOP).unwrap(), "a - (b - c)");

        let not = native(129, vec![native(130, vec![var("x"), var("y")])]);
        assert_eq!(expression(&not, TOP).unwrap(), "!(x && y)");
    }

    #[test]
    fn calls_drop_trailing_skipped_args() {
        let mut call = leaf(ExprToken::VirtualFunction, Operand::Text("Spawn".into()));
        call.children = vec![
            var("Cls"),
            leaf(ExprToken::EmptyParmValue, Operand::None),
            leaf(ExprToken::EmptyParmValue, Operand::None),
        ];
        assert_eq!(expression(&call, TOP).unwrap(), "Spawn(Cls)");
    }

    #[test]
    fn constants() {
        assert_eq!(expression(&leaf(ExprToken::FloatConst, Operand::Float(2.0)), TOP).unwrap(), "2.0");
        assert_eq!(
            expression(&leaf(ExprToken::StringConst, Operand::Text("say \"hi\"".into())), TOP).unwrap(),
            "\"say \\\"hi\\\"\""
        );
        assert_eq!(expression(&leaf(ExprToken::NameConst, Operand::Text("None".into())), TOP).unwrap(), "'None'");
    }

    #[test]
    fn missing_operand_is_an_error() {
        let broken = leaf(ExprToken::Let, Operand::None);
        assert!(matches!(
            expression(&broken, TOP),
            Err(Error::TokenDecode { opcode: 0x0F, .. })
        ));
    }
}
