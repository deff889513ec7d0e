//! Block state machine.
//!
//! Consumes one control file's lines top to bottom, keeping a stack of open
//! `If`/`Define`/domain blocks. Every ordinary line is annotated with the
//! concatenation of the open branch scopes, outermost first. The machine
//! also records the block tree, which is immutable once parsing finishes.

use crate::ast::{Directive, Line, Provenance};
use crate::error::ParseError;
use crate::scope::{Branch, Scope, ScopeKind, ScopeList};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    If,
    Define,
    Domain,
}

impl BlockKind {
    fn opener(&self) -> &'static str {
        match self {
            BlockKind::If => "If",
            BlockKind::Define => "Define",
            BlockKind::Domain => "Start 1D Domain",
        }
    }
}

/// One entry of the block tree: an ordinary line (by its index in the
/// annotated sequence) or a nested block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BlockItem {
    Line(usize),
    Block(BlockNode),
}

/// One `If ... End If` group (or define/domain group).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockNode {
    pub kind: BlockKind,
    pub line: u32,
    pub branches: Vec<BlockBranch>,
}

/// One branch of a block. `condition` is `None` for a plain `Else`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockBranch {
    pub condition: Option<Scope>,
    pub items: Vec<BlockItem>,
}

struct Frame {
    kind: BlockKind,
    /// Conditions of the branches already closed in this block.
    prior: Vec<Scope>,
    branch: Branch,
    else_seen: bool,
    node: BlockNode,
}

impl Frame {
    fn open(kind: BlockKind, condition: Scope, line: u32) -> Frame {
        Frame {
            kind,
            prior: Vec::new(),
            branch: Branch {
                negated: Vec::new(),
                own: Some(condition.clone()),
            },
            else_seen: false,
            node: BlockNode {
                kind,
                line,
                branches: vec![BlockBranch {
                    condition: Some(condition),
                    items: Vec::new(),
                }],
            },
        }
    }

    /// Close the current branch and open the next one in the same block.
    fn next_branch(&mut self, condition: Option<Scope>) {
        if let Some(own) = self.branch.own.take() {
            self.prior.push(own);
        }
        self.branch = Branch {
            negated: self.prior.iter().map(Scope::negate).collect(),
            own: condition.clone(),
        };
        self.node.branches.push(BlockBranch {
            condition,
            items: Vec::new(),
        });
    }

    fn items(&mut self) -> &mut Vec<BlockItem> {
        let n = self.node.branches.len();
        &mut self.node.branches[n - 1].items
    }
}

pub struct BlockMachine {
    file: String,
    base: ScopeList,
    stack: Vec<Frame>,
    root: Vec<BlockItem>,
}

impl BlockMachine {
    pub fn new(file: &str) -> BlockMachine {
        BlockMachine::with_base(file, ScopeList::global())
    }

    /// A machine whose every scope is nested inside `base` (used when a
    /// read file is spliced into an open block of its includer).
    pub fn with_base(file: &str, base: ScopeList) -> BlockMachine {
        BlockMachine {
            file: file.to_string(),
            base,
            stack: Vec::new(),
            root: Vec::new(),
        }
    }

    /// Current nesting depth, excluding the base scope.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Scope list for a line at the current position.
    pub fn scope(&self) -> ScopeList {
        let mut list = self.base.clone();
        for f in &self.stack {
            list.push_branch(&f.branch);
        }
        list
    }

    fn error(&self, prov: &Provenance, msg: impl Into<String>) -> ParseError {
        ParseError::structure(&prov.file, prov.line, msg)
    }

    /// Apply one structural directive.
    pub fn directive(&mut self, d: &Directive, prov: &Provenance) -> Result<(), ParseError> {
        match d {
            Directive::If(scope) => {
                self.stack.push(Frame::open(BlockKind::If, scope.clone(), prov.line));
            }
            Directive::ElseIf(scope) => {
                let frame = self.top_if(prov, "Else If")?;
                frame.next_branch(Some(scope.clone()));
            }
            Directive::Else => {
                let frame = self.top_if(prov, "Else")?;
                frame.next_branch(None);
                frame.else_seen = true;
            }
            Directive::EndIf => self.close(BlockKind::If, "End If", prov)?,
            Directive::Define(scope) => {
                self.stack.push(Frame::open(BlockKind::Define, scope.clone(), prov.line));
            }
            Directive::EndDefine => self.close(BlockKind::Define, "End Define", prov)?,
            Directive::StartDomain => {
                let scope = Scope::new(ScopeKind::OneDimensionalDomain, &[]);
                self.stack.push(Frame::open(BlockKind::Domain, scope, prov.line));
            }
            Directive::EndDomain => self.close(BlockKind::Domain, "End Domain", prov)?,
        }
        Ok(())
    }

    fn top_if(&mut self, prov: &Provenance, what: &str) -> Result<&mut Frame, ParseError> {
        let err = match self.stack.last() {
            Some(f) if f.kind == BlockKind::If && f.else_seen => {
                Some(format!("'{}' after 'Else' in the same block", what))
            }
            Some(f) if f.kind == BlockKind::If => None,
            _ => Some(format!("'{}' without a matching 'If'", what)),
        };
        if let Some(msg) = err {
            return Err(self.error(prov, msg));
        }
        match self.stack.last_mut() {
            Some(f) => Ok(f),
            None => Err(ParseError::structure(&prov.file, prov.line, "empty block stack")),
        }
    }

    fn close(&mut self, kind: BlockKind, what: &str, prov: &Provenance) -> Result<(), ParseError> {
        match self.stack.last() {
            Some(f) if f.kind == kind => {}
            Some(f) => {
                return Err(self.error(
                    prov,
                    format!(
                        "'{}' does not close the '{}' opened at line {}",
                        what,
                        f.kind.opener(),
                        f.node.line
                    ),
                ))
            }
            None => {
                return Err(self.error(
                    prov,
                    format!("'{}' without a matching '{}'", what, kind.opener()),
                ))
            }
        }
        if let Some(frame) = self.stack.pop() {
            let item = BlockItem::Block(frame.node);
            match self.stack.last_mut() {
                Some(parent) => parent.items().push(item),
                None => self.root.push(item),
            }
        }
        Ok(())
    }

    /// Record an ordinary line in the current branch.
    pub fn record(&mut self, index: usize) {
        match self.stack.last_mut() {
            Some(f) => f.items().push(BlockItem::Line(index)),
            None => self.root.push(BlockItem::Line(index)),
        }
    }

    /// Record the items of a spliced read file in the current branch.
    pub fn extend(&mut self, items: Vec<BlockItem>) {
        match self.stack.last_mut() {
            Some(f) => f.items().extend(items),
            None => self.root.extend(items),
        }
    }

    /// End of input. A block still open is a structural error.
    pub fn finish(self) -> Result<Vec<BlockItem>, ParseError> {
        if let Some(f) = self.stack.last() {
            return Err(ParseError::structure(
                &self.file,
                f.node.line,
                format!(
                    "'{}' opened at line {} is never closed",
                    f.kind.opener(),
                    f.node.line
                ),
            ));
        }
        Ok(self.root)
    }
}

/// Annotate every ordinary line of one file with its scope list. Returns
/// `(line, scope)` pairs for non-structural lines plus the block tree.
pub fn annotate(lines: &[Line], file: &str) -> Result<(Vec<(usize, ScopeList)>, Vec<BlockItem>), ParseError> {
    let mut machine = BlockMachine::new(file);
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        match &line.directive {
            Some(d) => machine.directive(d, &line.command.prov)?,
            None => {
                machine.record(i);
                out.push((i, machine.scope()));
            }
        }
    }
    let tree = machine.finish()?;
    Ok((out, tree))
}
