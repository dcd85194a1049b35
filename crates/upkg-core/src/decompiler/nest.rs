//! First pass: classify jumps and lay out the block structure of a script.

use std::collections::{BTreeMap, BTreeSet};

use strum::IntoStaticStr;

use crate::script::{ExprToken, Operand, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum NestKind {
    Scope,
    If,
    Else,
    Loop,
    /// `do { } until ()`; opens before its first body token.
    Do,
    ForEach,
    Switch,
    Case,
    Default,
}

impl NestKind {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Case labels indent their body but print no braces.
    pub fn braced(self) -> bool {
        !matches!(self, NestKind::Case | NestKind::Default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestRole {
    Begin,
    End,
}

/// One marker of a matched block. Begin and End of a block share `pair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nest {
    pub kind: NestKind,
    pub position: u32,
    pub role: NestRole,
    /// For an `If` End: where the `else` block ends.
    pub else_target: Option<u32>,
    pub pair: usize,
}

/// A block as found by the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: NestKind,
    pub begin: u32,
    pub end: u32,
    pub else_target: Option<u32>,
    /// Statement index of the token that introduces the block.
    pub owner: usize,
    /// Closing this block also closes the enclosing `Switch`.
    pub closes_parent: bool,
}

/// What an unconditional jump means in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpRole {
    Break,
    Continue,
    /// Skip over an `else` block; printed by the block structure.
    ElseSkip,
    /// Back edge of a loop; printed by the block structure.
    LoopBack,
    Goto(String),
}

#[derive(Debug, Default)]
pub struct Analysis {
    pub blocks: Vec<Block>,
    /// Role of each `Jump` statement, by statement index.
    pub jumps: BTreeMap<usize, JumpRole>,
    /// Synthesized labels and how many jumps use them.
    pub labels: BTreeMap<u32, (String, usize)>,
    /// Labels declared by the script's label table.
    pub named_labels: BTreeMap<u32, Vec<String>>,
    /// Conditional jumps that close a `do` loop, by statement index.
    pub until: BTreeSet<usize>,
}

impl Analysis {
    /// Flat, position-ordered Begin/End marker list.
    pub fn markers(&self) -> Vec<Nest> {
        let mut markers = Vec::with_capacity(self.blocks.len() * 2);
        for (pair, block) in self.blocks.iter().enumerate() {
            markers.push(Nest {
                kind: block.kind,
                position: block.begin,
                role: NestRole::Begin,
                else_target: None,
                pair,
            });
            markers.push(Nest {
                kind: block.kind,
                position: block.end,
                role: NestRole::End,
                else_target: block.else_target,
                pair,
            });
        }
        markers.sort_by_key(|n| (n.position, n.role == NestRole::Begin));
        markers
    }
}

pub fn goto_label(target: u32) -> String {
    format!("J0x{:02X}", target)
}

struct Scan<'t> {
    tokens: &'t [Token],
    by_position: BTreeMap<u32, usize>,
    script_end: u32,
}

impl<'t> Scan<'t> {
    /// Index of the statement that ends exactly at `position`.
    fn ending_at(&self, position: u32) -> Option<usize> {
        let (_, &i) = self.by_position.range(..position).next_back()?;
        (self.tokens[i].end() == position).then_some(i)
    }

    fn at(&self, position: u32) -> Option<&'t Token> {
        self.by_position.get(&position).map(|&i| &self.tokens[i])
    }

    /// End of the last statement that is not a `return` or end marker.
    fn body_end(&self) -> u32 {
        self.tokens
            .iter()
            .rev()
            .find(|t| !t.is(ExprToken::EndOfScript) && !t.is(ExprToken::Return))
            .map_or(self.script_end, Token::end)
    }
}

/// Collect blocks, jump roles and labels of the statements in `tokens`.
pub fn analyze(tokens: &[Token]) -> Analysis {
    let scan = Scan {
        tokens,
        by_position: tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.position, i))
            .collect(),
        script_end: tokens.last().map_or(0, Token::end),
    };
    let mut analysis = Analysis::default();

    // Loops and iterators first; jump roles depend on them.
    for (i, token) in tokens.iter().enumerate() {
        match (token.expr(), &token.operand) {
            (Some(ExprToken::JumpIfNot), Operand::Offset(target)) => {
                let target = *target as u32;
                if target <= token.position {
                    analysis.until.insert(i);
                    analysis.blocks.push(Block {
                        kind: NestKind::Do,
                        begin: target,
                        end: token.end(),
                        else_target: None,
                        owner: i,
                        closes_parent: false,
                    });
                    continue;
                }
                let back_edge = scan.ending_at(target).filter(|&j| {
                    j > i && tokens[j]
                        .jump_target()
                        .map_or(false, |t| t <= token.position && tokens[j].is(ExprToken::Jump))
                });
                if let Some(j) = back_edge {
                    analysis.jumps.insert(j, JumpRole::LoopBack);
                    analysis.blocks.push(Block {
                        kind: NestKind::Loop,
                        begin: token.end(),
                        end: target,
                        else_target: None,
                        owner: i,
                        closes_parent: false,
                    });
                }
            }
            (Some(ExprToken::Iterator | ExprToken::DynArrayIterator), Operand::Offset(end)) => {
                analysis.blocks.push(Block {
                    kind: NestKind::ForEach,
                    begin: token.end(),
                    end: (*end as u32).max(token.end()),
                    else_target: None,
                    owner: i,
                    closes_parent: false,
                });
            }
            (Some(ExprToken::FilterEditorOnly), Operand::Offset(end)) => {
                analysis.blocks.push(Block {
                    kind: NestKind::Scope,
                    begin: token.end(),
                    end: (*end as u32).max(token.end()),
                    else_target: None,
                    owner: i,
                    closes_parent: false,
                });
            }
            _ => {}
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if token.is(ExprToken::Switch) {
            switch_blocks(&scan, i, &mut analysis);
        }
    }

    // Plain `if` for every forward conditional jump that is not a loop.
    let owned: BTreeSet<usize> = analysis.blocks.iter().map(|b| b.owner).collect();
    for (i, token) in tokens.iter().enumerate() {
        let Some(target) = token.jump_target() else {
            continue;
        };
        if !token.is(ExprToken::JumpIfNot) || owned.contains(&i) || target <= token.position {
            continue;
        }
        let mut else_target = None;
        if let Some(j) = scan.ending_at(target).filter(|&j| j > i) {
            let skip = &tokens[j];
            if let Some(end) = skip.jump_target().filter(|_| skip.is(ExprToken::Jump)) {
                let leaves_enclosing = enclosing_breakable(&analysis.blocks, skip.position)
                    .map_or(false, |b| end == b.end);
                if end > target && !leaves_enclosing && !analysis.jumps.contains_key(&j) {
                    else_target = Some(end);
                    analysis.jumps.insert(j, JumpRole::ElseSkip);
                }
            }
        }
        analysis.blocks.push(Block {
            kind: NestKind::If,
            begin: token.end(),
            end: target,
            else_target,
            owner: i,
            closes_parent: false,
        });
    }

    for (i, token) in tokens.iter().enumerate() {
        if !token.is(ExprToken::Jump) || analysis.jumps.contains_key(&i) {
            continue;
        }
        let Some(target) = token.jump_target() else {
            continue;
        };
        let role = match enclosing_breakable(&analysis.blocks, token.position) {
            Some(block) if target == block.end => JumpRole::Break,
            Some(block)
                if block.kind != NestKind::Switch
                    && target < block.begin
                    && tokens[block.owner].position == target =>
            {
                JumpRole::Continue
            }
            _ => {
                let label = goto_label(target);
                analysis
                    .labels
                    .entry(target)
                    .or_insert_with(|| (label.clone(), 0))
                    .1 += 1;
                JumpRole::Goto(label)
            }
        };
        analysis.jumps.insert(i, role);
    }

    for token in tokens {
        if let Operand::Labels(labels) = &token.operand {
            for label in labels {
                analysis
                    .named_labels
                    .entry(label.offset)
                    .or_default()
                    .push(label.name.clone());
            }
        }
    }
    analysis
}

/// Innermost loop, iterator or switch around `position`.
fn enclosing_breakable(blocks: &[Block], position: u32) -> Option<&Block> {
    blocks
        .iter()
        .filter(|b| {
            matches!(b.kind, NestKind::Loop | NestKind::Do | NestKind::ForEach | NestKind::Switch)
                && b.begin <= position
                && position < b.end
        })
        .min_by_key(|b| b.end - b.begin)
}

fn switch_blocks(scan: &Scan, owner: usize, analysis: &mut Analysis) {
    let switch = &scan.tokens[owner];
    let mut cases: Vec<&Token> = Vec::new();
    let mut cursor = scan.at(switch.end());
    while let Some(case) = cursor.filter(|t| t.is(ExprToken::Case)) {
        if cases.iter().any(|c| c.position == case.position) {
            break;
        }
        cases.push(case);
        cursor = case
            .next_case()
            .filter(|&next| next > case.position)
            .and_then(|next| scan.at(next));
    }
    let Some(last) = cases.last() else {
        return;
    };

    // Breaks in earlier cases jump past the last case to the switch end.
    let first = switch.position;
    let mut end = match last.next_case() {
        Some(next) if next > last.position => next,
        _ => 0,
    };
    for token in scan.tokens {
        if token.position <= first || token.position >= last.position || !token.is(ExprToken::Jump) {
            continue;
        }
        if let Some(target) = token.jump_target().filter(|&t| t > last.position) {
            end = end.max(target);
        }
    }
    if end <= last.end() {
        // A default without a break runs to the enclosing block or the body end.
        end = enclosing_end(&analysis.blocks, first).unwrap_or_else(|| scan.body_end());
        end = end.max(last.end());
    }

    analysis.blocks.push(Block {
        kind: NestKind::Switch,
        begin: switch.end(),
        end,
        else_target: None,
        owner,
        closes_parent: false,
    });
    for (n, case) in cases.iter().enumerate() {
        let is_last = n + 1 == cases.len();
        let case_end = if is_last {
            end
        } else {
            cases[n + 1].position
        };
        let owner = scan.by_position.get(&case.position).copied().unwrap_or(owner);
        analysis.blocks.push(Block {
            kind: if case.is_default_case() {
                NestKind::Default
            } else {
                NestKind::Case
            },
            begin: case.end(),
            end: case_end,
            else_target: None,
            owner,
            closes_parent: is_last,
        });
    }
}

fn enclosing_end(blocks: &[Block], position: u32) -> Option<u32> {
    blocks
        .iter()
        .filter(|b| b.begin <= position && position < b.end)
        .min_by_key(|b| b.end - b.begin)
        .map(|b| b.end)
}
