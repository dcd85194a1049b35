//! Script decompiler.
//!
//! Works in two passes over a function's statement tokens. The first pass
//! ([`nest::analyze`]) turns jumps into blocks and labels. The second walks
//! the tokens, prints each statement and opens or closes blocks as the
//! cursor reaches their Begin and End positions.

mod class_writer;
mod nest;
mod render;

use std::collections::BTreeMap;
use std::fmt::Write as _;

pub use class_writer::ClassWriter;
pub use nest::{analyze, Analysis, Block, JumpRole, Nest, NestKind, NestRole};
pub use render::{expression, RenderContext};

use crate::error::Error;
use crate::script::{ExprToken, Token};

/// Text of one decompiled script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decompiled {
    pub text: String,
    /// Errors that were rendered into the text as comments.
    pub diagnostics: Vec<String>,
    /// Blocks still open when the tokens ran out.
    pub unclosed_nests: usize,
}

impl Decompiled {
    pub fn failed(message: &str) -> Self {
        let line = format!("// Deserialization failed: {}", message);
        Self {
            text: format!("{}\n", line),
            diagnostics: vec![message.to_string()],
            unclosed_nests: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.unclosed_nests == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    pair: usize,
    statements: usize,
    /// Last statement was break, return, goto, continue or stop.
    terminated: bool,
}

struct Line {
    text: String,
    terminal: bool,
}

impl Line {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminal: false,
        }
    }

    fn terminal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminal: true,
        }
    }
}

pub struct Decompiler<'t> {
    tokens: &'t [Token],
    analysis: Analysis,
    blocks: Vec<Block>,
    begins: Vec<Nest>,
    /// Block introduced by each statement, by statement index.
    owned: BTreeMap<usize, usize>,
    opened: Vec<bool>,
    stack: Vec<Frame>,
    /// Closing lines for `do` loops, by block.
    footers: BTreeMap<usize, String>,
    ctx: RenderContext,
    out: String,
    diagnostics: Vec<String>,
    truncation: Option<String>,
    trailing_return: Option<usize>,
}

impl<'t> Decompiler<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        let analysis = nest::analyze(tokens);
        let blocks = analysis.blocks.clone();
        let owned = blocks.iter().enumerate().map(|(pair, b)| (b.owner, pair)).collect();
        let opened = vec![false; blocks.len()];
        let begins = analysis
            .markers()
            .into_iter()
            .filter(|n| n.role == NestRole::Begin)
            .collect();

        let trailing_return = tokens
            .iter()
            .rposition(|t| !t.is(ExprToken::EndOfScript))
            .filter(|&i| {
                let t = &tokens[i];
                t.is(ExprToken::Return)
                    && t.children.first().map_or(false, |c| c.is(ExprToken::Nothing))
                    && !analysis.labels.contains_key(&t.position)
                    && !analysis.named_labels.contains_key(&t.position)
            });

        Self {
            tokens,
            analysis,
            blocks,
            begins,
            owned,
            opened,
            stack: Vec::new(),
            footers: BTreeMap::new(),
            ctx: RenderContext::default(),
            out: String::new(),
            diagnostics: Vec::new(),
            truncation: None,
            trailing_return,
        }
    }

    /// Note that the token stream stopped early because of `error`.
    pub fn with_truncation(mut self, error: &Error) -> Self {
        self.truncation = Some(error.to_string());
        self
    }

    pub fn decompile(mut self) -> Decompiled {
        let tokens = self.tokens;
        for (i, token) in tokens.iter().enumerate() {
            self.emit_labels(token.position);
            self.open_do_loops(token.position);

            match self.statement(i, token) {
                Ok(Some(line)) => self.emit_statement(line),
                Ok(None) => {}
                Err(e) => {
                    let names = render::opcode_names(token);
                    self.comment(format!("TokenDecodeError at 0x{:04X}: {} [{}]", token.position, e, names));
                    self.diagnostics.push(e.to_string());
                }
            }

            self.open_begins(token.end());
            self.close_ends(token.end());
        }

        let end = tokens.last().map_or(0, Token::end);
        let pending: Vec<u32> = self
            .analysis
            .labels
            .keys()
            .copied()
            .filter(|&p| p >= end)
            .collect();
        for position in pending {
            self.emit_labels(position);
        }

        let mut unclosed = 0;
        while let Some(frame) = self.stack.last().copied() {
            let kind = self.blocks[frame.pair].kind;
            self.diagnostics
                .push(format!("{} block left open at end of script", kind.name()));
            self.close_top();
            unclosed += 1;
        }
        if let Some(reason) = self.truncation.take() {
            self.comment(format!("Decompilation stopped early: {}", reason));
            self.diagnostics.push(reason);
        }

        Decompiled {
            text: self.out,
            diagnostics: self.diagnostics,
            unclosed_nests: unclosed,
        }
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(&mut self.out, "{}{}", self.ctx.indent, text);
    }

    fn comment(&mut self, text: String) {
        let line = format!("// {}", text);
        self.line(&line);
    }

    fn emit_statement(&mut self, line: Line) {
        self.line(&line.text);
        if let Some(frame) = self.stack.last_mut() {
            frame.statements += 1;
            frame.terminated = line.terminal;
        }
    }

    fn emit_labels(&mut self, position: u32) {
        let mut labels = Vec::new();
        if let Some(names) = self.analysis.named_labels.get(&position) {
            labels.extend(names.iter().cloned());
        }
        if let Some((label, _)) = self.analysis.labels.remove(&position) {
            labels.push(label);
        }
        for label in labels {
            let text = format!("{}:", label);
            self.line(&text);
        }
    }

    fn open(&mut self, pair: usize) {
        self.opened[pair] = true;
        let kind = self.blocks[pair].kind;
        if kind == NestKind::Do {
            self.emit_statement(Line::plain("do"));
        }
        if kind.braced() {
            self.line("{");
        }
        self.ctx.push();
        self.stack.push(Frame {
            pair,
            statements: 0,
            terminated: false,
        });
    }

    fn open_do_loops(&mut self, position: u32) {
        let mut due: Vec<usize> = (0..self.blocks.len())
            .filter(|&p| {
                !self.opened[p] && self.blocks[p].kind == NestKind::Do && self.blocks[p].begin <= position
            })
            .collect();
        // Outer loops first.
        due.sort_by_key(|&p| std::cmp::Reverse(self.blocks[p].end));
        for pair in due {
            self.open(pair);
        }
    }

    fn open_begins(&mut self, cursor: u32) {
        let mut due: Vec<usize> = self
            .begins
            .iter()
            .filter(|n| n.position <= cursor)
            .map(|n| n.pair)
            .filter(|&p| !self.opened[p] && self.blocks[p].kind != NestKind::Do)
            .collect();
        due.sort_by_key(|&p| (self.blocks[p].begin, std::cmp::Reverse(self.blocks[p].end)));
        for pair in due {
            self.open(pair);
        }
    }

    fn close_ends(&mut self, cursor: u32) {
        while let Some(top) = self.stack.last().copied() {
            if self.blocks[top.pair].end <= cursor {
                self.close_top();
                continue;
            }
            let deeper = self.stack[..self.stack.len() - 1]
                .iter()
                .rev()
                .find(|f| self.blocks[f.pair].end <= cursor)
                .map(|f| self.blocks[f.pair].kind);
            let Some(found) = deeper else {
                break;
            };
            let expected = self.blocks[top.pair].kind;
            let error = Error::NestConsistency {
                position: cursor,
                expected: expected.name(),
                found: found.name(),
            };
            self.comment(format!("NestConsistencyError: {}", error));
            self.diagnostics.push(error.to_string());
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let block = self.blocks[frame.pair].clone();
        if matches!(block.kind, NestKind::Case | NestKind::Default)
            && frame.statements > 0
            && !frame.terminated
        {
            self.line("break;");
        }
        self.ctx.pop();
        if block.kind.braced() {
            match self.footers.remove(&frame.pair) {
                Some(footer) => self.line(&footer),
                None => self.line("}"),
            }
        }
        // The enclosing block saw one more (compound) statement.
        if let Some(parent) = self.stack.last_mut() {
            parent.statements += 1;
            parent.terminated = false;
        }

        if block.kind == NestKind::If {
            if let Some(target) = block.else_target.filter(|&t| t > block.end) {
                self.emit_statement(Line::plain("else"));
                let pair = self.blocks.len();
                self.blocks.push(Block {
                    kind: NestKind::Else,
                    begin: block.end,
                    end: target,
                    else_target: None,
                    owner: block.owner,
                    closes_parent: false,
                });
                self.opened.push(false);
                self.open(pair);
            }
        }

        if block.closes_parent {
            let parent = self.stack.last().map(|f| self.blocks[f.pair].kind);
            if parent == Some(NestKind::Switch) {
                self.close_top();
            }
        }
    }

    fn owned_kind(&self, index: usize) -> Option<NestKind> {
        self.owned.get(&index).map(|&p| self.blocks[p].kind)
    }

    fn statement(&mut self, index: usize, token: &Token) -> crate::error::Result<Option<Line>> {
        let Some(expr) = token.expr() else {
            return render::expression(token, render::TOP).map(|s| Some(Line::plain(format!("{};", s))));
        };
        use ExprToken as T;
        Ok(Some(match expr {
            T::JumpIfNot => {
                let condition = render::condition(token)?;
                if self.analysis.until.contains(&index) {
                    if let Some(&pair) = self.owned.get(&index) {
                        self.footers.insert(pair, format!("}} until ({});", condition));
                    }
                    return Ok(None);
                }
                match self.owned_kind(index) {
                    Some(NestKind::Loop) => Line::plain(format!("while ({})", condition)),
                    _ => Line::plain(format!("if ({})", condition)),
                }
            }
            T::Jump => match self.analysis.jumps.get(&index) {
                Some(JumpRole::Break) => Line::terminal("break;"),
                Some(JumpRole::Continue) => Line::terminal("continue;"),
                Some(JumpRole::Goto(label)) => Line::terminal(format!("goto {};", label)),
                Some(JumpRole::ElseSkip | JumpRole::LoopBack) | None => return Ok(None),
            },
            T::Switch => Line::plain(format!("switch ({})", render::condition(token)?)),
            T::Case => Line::plain(render::case_label(token)?),
            T::Iterator | T::DynArrayIterator => Line::plain(render::foreach_header(token)?),
            T::Return => {
                if self.trailing_return == Some(index) && self.stack.is_empty() {
                    return Ok(None);
                }
                Line::terminal(format!("{};", render::expression(token, render::TOP)?))
            }
            T::ReturnNothing | T::Stop | T::GotoLabel => {
                Line::terminal(format!("{};", render::expression(token, render::TOP)?))
            }
            T::IteratorNext
            | T::IteratorPop
            | T::LabelTable
            | T::EndOfScript
            | T::Nothing
            | T::DebugInfo
            | T::DefaultParmValue
            | T::EndParmValue
            | T::EndFunctionParms
            | T::FilterEditorOnly => return Ok(None),
            _ => Line::plain(format!("{};", render::expression(token, render::TOP)?)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::script::Operand;

    /// Builds a statement list with consecutive positions.
    struct Script {
        tokens: Vec<Token>,
        position: u32,
    }

    fn leaf(expr: ExprToken, operand: Operand, size: u32) -> Token {
        Token {
            opcode: expr as u8,
            position: 0,
            size,
            operand,
            children: Vec::new(),
        }
    }

    fn var(name: &str) -> Token {
        leaf(ExprToken::LocalVariable, Operand::Text(name.into()), 5)
    }

    fn call(name: &str) -> Token {
        leaf(ExprToken::VirtualFunction, Operand::Text(name.into()), 10)
    }

    impl Script {
        fn new() -> Self {
            Self {
                tokens: Vec::new(),
                position: 0,
            }
        }

        fn push(&mut self, expr: ExprToken, operand: Operand, size: u32, children: Vec<Token>) -> u32 {
            let position = self.position;
            self.tokens.push(Token {
                opcode: expr as u8,
                position,
                size,
                operand,
                children,
            });
            self.position += size;
            position
        }

        fn stmt(&mut self, name: &str) -> u32 {
            self.push(ExprToken::VirtualFunction, Operand::Text(name.into()), 10, Vec::new())
        }

        /// Patch the offset operand of the statement at `position`.
        fn patch(&mut self, position: u32, offset: u32) {
            let token = self
                .tokens
                .iter_mut()
                .find(|t| t.position == position)
                .unwrap();
            token.operand = Operand::Offset(offset as u16);
        }

        fn finish(mut self) -> Vec<Token> {
            let nothing = leaf(ExprToken::Nothing, Operand::None, 1);
            self.push(ExprToken::Return, Operand::None, 2, vec![nothing]);
            self.push(ExprToken::EndOfScript, Operand::None, 1, Vec::new());
            self.tokens
        }
    }

    fn braces(text: &str) -> (usize, usize) {
        (text.matches('{').count(), text.matches('}').count())
    }

    #[test]
    fn switch_cases_close_with_breaks() {
        let mut s = Script::new();
        s.push(ExprToken::Switch, Operand::Byte(1), 7, vec![var("Mode")]);
        let a = s.push(ExprToken::Case, Operand::Offset(0), 8, vec![leaf(ExprToken::IntOne, Operand::None, 1)]);
        s.stmt("A");
        let b = s.push(ExprToken::Case, Operand::Offset(0), 8, vec![leaf(ExprToken::IntZero, Operand::None, 1)]);
        s.stmt("B");
        let end = s.position;
        s.patch(a, b);
        s.patch(b, end);
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let expected = "\
switch (Mode)
{
    case 1:
        A();
        break;
    case 0:
        B();
        break;
}
";
        assert_eq!(out.text, expected);
        assert!(out.is_clean());
        assert_eq!(out.text.matches("break;").count(), 2);
    }

    #[test]
    fn explicit_break_is_not_doubled() {
        let mut s = Script::new();
        s.push(ExprToken::Switch, Operand::Byte(1), 7, vec![var("Mode")]);
        let a = s.push(ExprToken::Case, Operand::Offset(0), 8, vec![leaf(ExprToken::IntOne, Operand::None, 1)]);
        s.stmt("A");
        let brk = s.push(ExprToken::Jump, Operand::Offset(0), 3, Vec::new());
        let d = s.push(ExprToken::Case, Operand::Offset(0xFFFF), 3, Vec::new());
        s.stmt("B");
        let end = s.position;
        s.patch(a, d);
        s.patch(brk, end);
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let expected = "\
switch (Mode)
{
    case 1:
        A();
        break;
    default:
        B();
        break;
}
";
        assert_eq!(out.text, expected);
        assert!(out.is_clean());
    }

    #[test]
    fn if_else_and_while() {
        let mut s = Script::new();
        // while (Go) { Step(); }
        let head = s.push(ExprToken::JumpIfNot, Operand::Offset(0), 8, vec![var("Go")]);
        s.stmt("Step");
        s.push(ExprToken::Jump, Operand::Offset(head as u16), 3, Vec::new());
        let after_loop = s.position;
        s.patch(head, after_loop);
        // if (Ok) { Yes(); } else { No(); }
        let cond = s.push(ExprToken::JumpIfNot, Operand::Offset(0), 8, vec![var("Ok")]);
        s.stmt("Yes");
        let skip = s.push(ExprToken::Jump, Operand::Offset(0), 3, Vec::new());
        let else_start = s.position;
        s.stmt("No");
        let end = s.position;
        s.patch(cond, else_start);
        s.patch(skip, end);
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let expected = "\
while (Go)
{
    Step();
}
if (Ok)
{
    Yes();
}
else
{
    No();
}
";
        assert_eq!(out.text, expected);
        assert!(out.is_clean());
    }

    #[test]
    fn do_until_and_goto() {
        let mut s = Script::new();
        let start = s.stmt("Tick");
        s.push(ExprToken::JumpIfNot, Operand::Offset(start as u16), 8, vec![var("Done")]);
        let jump = s.push(ExprToken::Jump, Operand::Offset(0), 3, Vec::new());
        s.stmt("Skipped");
        let target = s.stmt("Landed");
        s.patch(jump, target);
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let expected = "\
do
{
    Tick();
} until (Done);
goto J0x1F;
Skipped();
J0x1F:
Landed();
";
        assert_eq!(out.text, expected);
    }

    #[test]
    fn braces_balance_and_nests_close() {
        let mut s = Script::new();
        let outer = s.push(ExprToken::JumpIfNot, Operand::Offset(0), 8, vec![var("A")]);
        let inner = s.push(ExprToken::JumpIfNot, Operand::Offset(0), 8, vec![var("B")]);
        s.stmt("Both");
        let end = s.position;
        s.patch(outer, end);
        s.patch(inner, end);
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let (open, close) = braces(&out.text);
        assert_eq!(open, close);
        assert_eq!(out.unclosed_nests, 0);
        assert!(out.is_clean());
    }

    #[test]
    fn bad_token_becomes_comment() {
        let mut s = Script::new();
        s.stmt("Before");
        // A Let without operands cannot be rendered.
        s.push(ExprToken::Let, Operand::None, 1, Vec::new());
        s.stmt("After");
        let tokens = s.finish();

        let out = Decompiler::new(&tokens).decompile();
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[0], "Before();");
        assert!(lines[1].starts_with("// TokenDecodeError at 0x000A"));
        assert_eq!(lines[2], "After();");
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn truncated_script_ends_with_note() {
        let tokens = vec![call("Only")];
        let error = Error::TokenDecode {
            opcode: 0x5F,
            position: 10,
            message: "unknown opcode".into(),
        };
        let out = Decompiler::new(&tokens).with_truncation(&error).decompile();
        assert!(out.text.starts_with("Only();\n"));
        assert!(out.text.trim_end().ends_with("unknown opcode"));
        assert!(!out.is_clean());
    }
}
