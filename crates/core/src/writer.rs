//! Serialises a control file back to text.
//!
//! A file with no edits is written back byte for byte. Otherwise the block
//! structure is derived again from each input's scope list: blocks open and
//! close as consecutive inputs' branches change, `Else If`/`Else` continue
//! a block when the new branch negates exactly the conditions seen so far.
//! Structural lines that existed before reuse their original text.

use crate::block::BlockKind;
use crate::input::{Input, InputId};
use crate::loader::{DirectiveLine, SourceText};
use crate::ast::Directive;
use crate::scope::{Branch, Scope, ScopeKind, ScopeList};
use std::collections::{HashMap, VecDeque};

const DEFAULT_INDENT: &str = "    ";

fn condition_text(prefix: &str, scope: &Scope) -> String {
    let positive = if scope.negated { scope.negate() } else { scope.clone() };
    match (positive.kind, positive.name.as_deref()) {
        (ScopeKind::Variable, Some(name)) => {
            format!("{} Variable {} == {}", prefix, name, positive.expr())
        }
        (ScopeKind::Event, _) | (ScopeKind::EventVariable, _) => {
            format!("{} Event == {}", prefix, positive.expr())
        }
        _ => format!("{} Scenario == {}", prefix, positive.expr()),
    }
}

/// Block kind and opening line for a branch's own condition.
fn opener(scope: &Scope) -> (BlockKind, String) {
    match scope.kind {
        ScopeKind::EventVariable => (BlockKind::Define, format!("Define Event == {}", scope.expr())),
        ScopeKind::OutputZone => (
            BlockKind::Define,
            format!("Define Output Zone == {}", scope.expr()),
        ),
        ScopeKind::Control => (BlockKind::Define, format!("Define Control == {}", scope.expr())),
        ScopeKind::OneDimensionalDomain => (BlockKind::Domain, "Start 1D Domain".to_string()),
        _ => (BlockKind::If, condition_text("If", scope)),
    }
}

fn closer(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::If => "End If",
        BlockKind::Define => "End Define",
        BlockKind::Domain => "End 1D Domain",
    }
}

/// Canonical text of a structural line, used to match it with the lines
/// the writer needs.
pub fn canonical(d: &Directive) -> String {
    match d {
        Directive::If(s) => condition_text("If", s),
        Directive::ElseIf(s) => condition_text("Else If", s),
        Directive::Else => "Else".to_string(),
        Directive::EndIf => "End If".to_string(),
        Directive::Define(s) => opener(s).1,
        Directive::EndDefine => "End Define".to_string(),
        Directive::StartDomain => "Start 1D Domain".to_string(),
        Directive::EndDomain => "End 1D Domain".to_string(),
    }
}

fn key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

struct Open {
    kind: BlockKind,
    branch: Branch,
    /// Positive conditions of every branch written so far in this block.
    prior: Vec<Scope>,
    else_seen: bool,
}

/// A block whose closing line was the last line written.
struct Closed {
    frame: Open,
    depth: usize,
    end: usize,
}

struct FileWriter {
    out: Vec<String>,
    open: Vec<Open>,
    last_closed: Option<Closed>,
    reuse: HashMap<(String, usize), VecDeque<String>>,
    indent: String,
}

impl FileWriter {
    fn new(directives: &[DirectiveLine], indent: String) -> Self {
        let mut reuse: HashMap<(String, usize), VecDeque<String>> = HashMap::new();
        for d in directives {
            reuse
                .entry((key(&canonical(&d.directive)), d.depth))
                .or_default()
                .push_back(d.command.raw.clone());
        }
        FileWriter {
            out: Vec::new(),
            open: Vec::new(),
            last_closed: None,
            reuse,
            indent,
        }
    }

    fn structural(&mut self, text: &str, depth: usize) {
        let line = match self
            .reuse
            .get_mut(&(key(text), depth))
            .and_then(VecDeque::pop_front)
        {
            Some(raw) => raw,
            None => format!("{}{}", self.indent.repeat(depth), text),
        };
        self.out.push(line);
    }

    fn close_top(&mut self) {
        if let Some(frame) = self.open.pop() {
            let depth = self.open.len();
            let kind = frame.kind;
            self.structural(closer(kind), depth);
            self.last_closed = Some(Closed {
                frame,
                depth,
                end: self.out.len(),
            });
        }
    }

    /// Reopen the `If` block closed by the last written line when `branch`
    /// extends its chain, adding empty `Else If` lines for negated
    /// conditions the block does not have yet.
    fn reopen(&mut self, branch: &Branch) -> bool {
        let depth = self.open.len();
        let Some(closed) = self.last_closed.take() else {
            return false;
        };
        let Closed { mut frame, depth: closed_depth, end } = closed;
        let prior: Vec<Scope> = frame.prior.iter().map(Scope::negate).collect();
        let own_is_if = branch
            .own
            .as_ref()
            .map_or(true, |own| opener(own).0 == BlockKind::If);
        if end != self.out.len()
            || closed_depth != depth
            || frame.kind != BlockKind::If
            || frame.else_seen
            || !own_is_if
            || !branch.negated.starts_with(&prior)
        {
            return false;
        }
        if let Some(end_line) = self.out.pop() {
            self.reuse
                .entry((key(closer(BlockKind::If)), depth))
                .or_default()
                .push_front(end_line);
        }
        for n in &branch.negated[prior.len()..] {
            self.structural(&condition_text("Else If", n), depth);
            frame.prior.push(n.negate());
        }
        self.open.push(frame);
        self.try_continue(depth, branch)
    }

    /// Continue the open block at `level` with `branch` as `Else If` or
    /// `Else`, if the branch negates exactly the conditions written so far.
    fn try_continue(&mut self, level: usize, branch: &Branch) -> bool {
        let frame = &self.open[level];
        let negations: Vec<Scope> = frame.prior.iter().map(Scope::negate).collect();
        if frame.kind != BlockKind::If || frame.else_seen || negations != branch.negated {
            return false;
        }
        let text = match &branch.own {
            Some(own) if opener(own).0 == BlockKind::If => condition_text("Else If", own),
            Some(_) => return false,
            None => "Else".to_string(),
        };
        self.structural(&text, level);
        let frame = &mut self.open[level];
        frame.branch = branch.clone();
        match &branch.own {
            Some(own) => frame.prior.push(own.clone()),
            None => frame.else_seen = true,
        }
        true
    }

    fn open_branch(&mut self, branch: &Branch) {
        let depth = self.open.len();
        match (branch.negated.first(), &branch.own) {
            (None, Some(own)) => {
                let (kind, text) = opener(own);
                self.structural(&text, depth);
                self.open.push(Open {
                    kind,
                    branch: branch.clone(),
                    prior: vec![own.clone()],
                    else_seen: false,
                });
            }
            (Some(_), _) if self.reopen(branch) => {}
            (Some(first), own) => {
                // An else branch with no block to continue: write the chain
                // of excluded conditions as empty branches.
                self.structural(&condition_text("If", first), depth);
                for n in &branch.negated[1..] {
                    self.structural(&condition_text("Else If", n), depth);
                }
                match own {
                    Some(s) => self.structural(&condition_text("Else If", s), depth),
                    None => self.structural("Else", depth),
                }
                let mut prior: Vec<Scope> = branch.negated.iter().map(Scope::negate).collect();
                prior.extend(own.clone());
                self.open.push(Open {
                    kind: BlockKind::If,
                    branch: branch.clone(),
                    prior,
                    else_seen: own.is_none(),
                });
            }
            (None, None) => {}
        }
    }

    /// Bring the open blocks in line with `branches`.
    fn enter(&mut self, branches: &[Branch]) {
        let mut k = 0;
        while k < self.open.len() && k < branches.len() && self.open[k].branch == branches[k] {
            k += 1;
        }
        while self.open.len() > k + 1 {
            self.close_top();
        }
        if self.open.len() == k + 1 {
            let continued = k < branches.len() && self.try_continue(k, &branches[k]);
            if !continued {
                self.close_top();
            } else {
                k += 1;
            }
        }
        for b in &branches[k.min(branches.len())..] {
            self.open_branch(b);
        }
    }

    fn line(&mut self, input: &Input, original_depth: Option<usize>) {
        let depth = self.open.len();
        let cmd = input.command();
        if !input.is_dirty() && original_depth == Some(depth) {
            self.out.push(cmd.raw.clone());
            return;
        }
        let body = if input.is_dirty() {
            cmd.render().trim_start().to_string()
        } else {
            cmd.raw.trim_start().to_string()
        };
        if body.is_empty() {
            self.out.push(String::new());
        } else {
            self.out.push(format!("{}{}", self.indent.repeat(depth), body));
        }
    }

    fn finish(mut self) -> Vec<String> {
        while !self.open.is_empty() {
            self.close_top();
        }
        self.out
    }
}

/// Indent used for one nesting level: taken from the first non-blank line
/// at depth one, or four spaces when there is none.
fn detect_indent(source: &SourceText, inputs: &[&Input], depths: &HashMap<InputId, usize>) -> String {
    let from_inputs = inputs
        .iter()
        .filter(|i| depths.get(&i.id()) == Some(&1) && !i.command().raw.trim().is_empty())
        .map(|i| i.command().indent.as_str())
        .next();
    let from_directives = source
        .directives
        .iter()
        .find(|d| d.depth == 1)
        .map(|d| d.command.indent.as_str());
    from_inputs
        .or(from_directives)
        .unwrap_or(DEFAULT_INDENT)
        .to_string()
}

/// Render one physical file from the inputs that belong to it.
///
/// `depths` holds each input's original nesting depth within this file;
/// inputs that keep their depth and were not edited keep their text.
pub fn render_file(source: &SourceText, inputs: &[&Input], depths: &HashMap<InputId, usize>) -> String {
    let indent = detect_indent(source, inputs, depths);
    let mut w = FileWriter::new(&source.directives, indent);
    for input in inputs {
        let relative = ScopeList::from_levelled(input.scope().strip_levels(source.base_depth).as_slice().to_vec());
        w.enter(&relative.branches());
        w.line(input, depths.get(&input.id()).copied());
    }
    let lines = w.finish();

    let eol = if source.text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut text = lines.join(eol);
    if source.text.is_empty() || source.text.ends_with('\n') {
        text.push_str(eol);
    }
    text
}

/// Render one physical file, verbatim when `changed` is false.
pub fn render(source: &SourceText, inputs: &[&Input], depths: &HashMap<InputId, usize>, changed: bool) -> String {
    if changed {
        render_file(source, inputs, depths)
    } else {
        source.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_text;
    use crate::source::InMemoryProvider;
    use std::path::Path;

    fn rewrite(text: &str, edit: impl FnOnce(&mut Vec<Input>)) -> String {
        let provider = InMemoryProvider::from_pairs([("/m/m.tcf", text)]);
        let parsed = parse_text(Path::new("/m/m.tcf"), text, &provider).unwrap();
        let depths: HashMap<InputId, usize> = parsed
            .inputs
            .iter()
            .map(|i| (i.id(), i.scope().depth()))
            .collect();
        let mut inputs = parsed.inputs.clone();
        edit(&mut inputs);
        let refs: Vec<&Input> = inputs.iter().collect();
        render_file(&parsed.main, &refs, &depths)
    }

    #[test]
    fn unchanged_structure_reproduces_text() {
        let text = "Set Zpts == 100  ! base\nIf Scenario == DEV  ! dev\n\tRead Grid Zpts == DEV.tif\n\
                    Else\n\tRead Grid Zpts == EXG.tif\nEnd If\n";
        assert_eq!(rewrite(text, |_| {}), text);
    }

    #[test]
    fn else_if_chain_is_rebuilt() {
        let text = "If Scenario == A\n  X == 1\nElse If Scenario == B\n  X == 2\nElse\n  X == 3\nEnd If\n";
        assert_eq!(rewrite(text, |_| {}), text);
    }

    #[test]
    fn moving_input_out_of_block_closes_it() {
        let text = "If Scenario == DEV\n  A == 1\n  B == 2\nEnd If\n";
        let out = rewrite(text, |inputs| {
            inputs[1] = inputs[1].rescoped(ScopeList::global());
        });
        assert_eq!(out, "If Scenario == DEV\n  A == 1\nEnd If\nB == 2\n");
    }

    #[test]
    fn new_scope_opens_block_with_detected_indent() {
        let text = "A == 1\nIf Event == Q100\n\tB == 2\nEnd If\n";
        let out = rewrite(text, |inputs| {
            inputs[0] = inputs[0].rescoped(ScopeList::from_scopes(vec![Scope::scenario("OPT")]));
        });
        assert_eq!(
            out,
            "If Scenario == OPT\n\tA == 1\nEnd If\nIf Event == Q100\n\tB == 2\nEnd If\n"
        );
    }

    #[test]
    fn orphan_else_branch_gets_an_empty_if() {
        let out = rewrite("A == 1\n", |inputs| {
            inputs[0] = inputs[0].rescoped(ScopeList::from_scopes(vec![Scope::scenario("DEV").negate()]));
        });
        assert_eq!(out, "If Scenario == DEV\nElse\n    A == 1\nEnd If\n");
    }

    #[test]
    fn else_if_branch_extends_the_block_just_closed() {
        let text = "If Scenario == A\n  X == 1\nEnd If\nZ == 3\n";
        let out = rewrite(text, |inputs| {
            inputs[1] = inputs[1].rescoped(ScopeList::from_scopes(vec![
                Scope::scenario("A").negate(),
                Scope::scenario("B").negate(),
                Scope::scenario("C"),
            ]));
        });
        assert_eq!(
            out,
            "If Scenario == A\n  X == 1\nElse If Scenario == B\nElse If Scenario == C\n  Z == 3\nEnd If\n"
        );
    }

    #[test]
    fn block_is_not_reopened_across_other_lines() {
        let text = "If Scenario == A\n  X == 1\nEnd If\nW == 0\nZ == 3\n";
        let out = rewrite(text, |inputs| {
            inputs[2] = inputs[2].rescoped(ScopeList::from_scopes(vec![
                Scope::scenario("A").negate(),
                Scope::scenario("C"),
            ]));
        });
        assert_eq!(
            out,
            "If Scenario == A\n  X == 1\nEnd If\nW == 0\nIf Scenario == A\nElse If Scenario == C\n  Z == 3\nEnd If\n"
        );
    }

    #[test]
    fn crlf_is_preserved() {
        let out = rewrite("If Scenario == A\r\nX == 1\r\nEnd If\r\nY == 2\r\n", |inputs| {
            inputs[1] = inputs[1].rescoped(ScopeList::from_scopes(vec![Scope::scenario("A")]));
        });
        assert_eq!(out, "If Scenario == A\r\nX == 1\r\nY == 2\r\nEnd If\r\n");
    }
}
