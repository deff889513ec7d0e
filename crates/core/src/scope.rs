//! Activation conditions attached to inputs.
//!
//! A [`Scope`] is one condition (scenario, event, domain, ...). Within a
//! scope the selector tokens are OR-ed; across a [`ScopeList`] the scopes
//! are AND-ed. Scopes produced by an `Else`/`Else If` branch are negations
//! of the preceding sibling conditions.

use crate::context::Context;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Scenario,
    Event,
    /// Inside a `Define Event == X` block.
    EventVariable,
    OneDimensionalDomain,
    OutputZone,
    Control,
    /// `If Variable NAME == ...`
    Variable,
    /// Synthetic marker used by the simplified view of an `Else` branch.
    Else,
}

impl ScopeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Global => "Global",
            ScopeKind::Scenario => "Scenario",
            ScopeKind::Event => "Event",
            ScopeKind::EventVariable => "Event Variable",
            ScopeKind::OneDimensionalDomain => "1D Domain",
            ScopeKind::OutputZone => "Output Zone",
            ScopeKind::Control => "Control",
            ScopeKind::Variable => "Variable",
            ScopeKind::Else => "Else",
        }
    }

    /// Parse the kind word used after `If` / `Else If`.
    pub fn from_condition_word(word: &str) -> Option<ScopeKind> {
        match word.to_ascii_lowercase().as_str() {
            "scenario" => Some(ScopeKind::Scenario),
            "event" => Some(ScopeKind::Event),
            "variable" => Some(ScopeKind::Variable),
            _ => None,
        }
    }

    /// Kinds that group inputs without ever excluding them.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ScopeKind::Global
                | ScopeKind::OneDimensionalDomain
                | ScopeKind::OutputZone
                | ScopeKind::Control
        )
    }
}

/// One activation condition.
///
/// `level` is the block nesting depth the scope came from; scopes sharing a
/// level belong to the same branch. It is ignored by equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Acceptable selector tokens (OR-ed). Empty means "any".
    pub tokens: Vec<String>,
    /// Variable name for [`ScopeKind::Variable`] scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub level: usize,
}

impl Scope {
    pub fn new(kind: ScopeKind, tokens: &[&str]) -> Scope {
        Scope {
            kind,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            name: None,
            negated: false,
            level: 0,
        }
    }

    pub fn global() -> Scope {
        Scope::new(ScopeKind::Global, &[])
    }

    pub fn scenario(expr: &str) -> Scope {
        Scope::from_expr(ScopeKind::Scenario, expr)
    }

    pub fn event(expr: &str) -> Scope {
        Scope::from_expr(ScopeKind::Event, expr)
    }

    pub fn variable(name: &str, expr: &str) -> Scope {
        let mut s = Scope::from_expr(ScopeKind::Variable, expr);
        s.name = Some(name.to_string());
        s
    }

    pub fn else_marker() -> Scope {
        Scope::new(ScopeKind::Else, &[])
    }

    /// Build a scope from a pipe-delimited selector expression (`D01 | D02`).
    pub fn from_expr(kind: ScopeKind, expr: &str) -> Scope {
        Scope {
            kind,
            tokens: split_tokens(expr),
            name: None,
            negated: false,
            level: 0,
        }
    }

    pub fn negate(&self) -> Scope {
        let mut s = self.clone();
        s.negated = !s.negated;
        s
    }

    pub fn at_level(mut self, level: usize) -> Scope {
        self.level = level;
        self
    }

    /// True if any token of this scope equals `token`, ignoring case.
    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.eq_ignore_ascii_case(token))
    }

    fn intersects(&self, candidates: &[String]) -> bool {
        candidates.iter().any(|c| self.has_token(c))
    }

    /// Evaluate this scope against a resolution context. `variable` returns
    /// the current value of a variable for [`ScopeKind::Variable`] scopes.
    pub fn evaluate(&self, ctx: &Context, variable: &dyn Fn(&str) -> Option<String>) -> bool {
        let positive = match self.kind {
            ScopeKind::Global
            | ScopeKind::OneDimensionalDomain
            | ScopeKind::OutputZone
            | ScopeKind::Control => return true,
            ScopeKind::Else => return true,
            ScopeKind::Scenario => self.intersects(&ctx.scenarios()),
            ScopeKind::Event | ScopeKind::EventVariable => self.intersects(&ctx.events()),
            ScopeKind::Variable => match self.name.as_deref().and_then(variable) {
                Some(value) => self.has_token(value.trim()),
                None => false,
            },
        };
        positive != self.negated
    }

    /// Membership test used for queries such as "is this input in the DEV
    /// scenario". A query without tokens matches any scope of its kind.
    pub fn matches_query(&self, query: &Scope) -> bool {
        if self.kind != query.kind {
            return false;
        }
        if query.tokens.is_empty() {
            return true;
        }
        let hit = query.tokens.iter().any(|t| self.has_token(t));
        hit != self.negated
    }

    /// Pipe-delimited selector text (`D01 | D02`).
    pub fn expr(&self) -> String {
        self.tokens.join(" | ")
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.negated == other.negated
            && self.tokens.len() == other.tokens.len()
            && self
                .tokens
                .iter()
                .zip(&other.tokens)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
            && match (&self.name, &other.name) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScopeKind::Global | ScopeKind::Else | ScopeKind::OneDimensionalDomain => {
                write!(f, "{}", self.kind.name())
            }
            _ => {
                write!(f, "{}", self.kind.name())?;
                if let Some(name) = &self.name {
                    write!(f, " {}", name)?;
                }
                let bang = if self.negated { "!" } else { "" };
                write!(f, ":{}{}", bang, self.tokens.join("|"))
            }
        }
    }
}

/// Split a selector expression on `|`, trimming and dropping empties.
pub fn split_tokens(expr: &str) -> Vec<String> {
    expr.split('|')
        .map(|t| crate::ast::unquote(t).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ──────────────────────────────────────────────
// ScopeList
// ──────────────────────────────────────────────

/// The ordered stack of conditions required to reach an input, outermost
/// first. An empty list is the global scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeList(Vec<Scope>);

/// One branch of one block, as recovered from a scope list: the negated
/// conditions of earlier sibling branches plus the branch's own condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub negated: Vec<Scope>,
    pub own: Option<Scope>,
}

impl Branch {
    pub fn scopes(&self) -> Vec<Scope> {
        let mut out = self.negated.clone();
        out.extend(self.own.clone());
        out
    }
}

impl ScopeList {
    pub fn global() -> ScopeList {
        ScopeList(Vec::new())
    }

    /// Build a list from scopes whose `level` fields are already set.
    pub fn from_levelled(scopes: Vec<Scope>) -> ScopeList {
        ScopeList(
            scopes
                .into_iter()
                .filter(|s| s.kind != ScopeKind::Global && s.kind != ScopeKind::Else)
                .collect(),
        )
    }

    /// Build a list from plain scopes, assigning nesting levels: negated
    /// scopes gather into the next positive scope's branch (an `Else If`),
    /// trailing negations form an `Else` branch.
    pub fn from_scopes(scopes: Vec<Scope>) -> ScopeList {
        let mut out = Vec::new();
        let mut level = 0;
        for s in scopes {
            if s.kind == ScopeKind::Global || s.kind == ScopeKind::Else {
                continue;
            }
            let negated = s.negated;
            out.push(s.at_level(level));
            if !negated {
                level += 1;
            }
        }
        ScopeList(out)
    }

    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Scope] {
        &self.0
    }

    /// Append the scopes of one more (inner) branch.
    pub fn push_branch(&mut self, branch: &Branch) {
        let level = self.depth();
        for s in branch.scopes() {
            self.0.push(s.at_level(level));
        }
    }

    /// Number of nesting levels (branches) in this list.
    pub fn depth(&self) -> usize {
        self.0.last().map(|s| s.level + 1).unwrap_or(0)
    }

    /// The outermost `levels` branches.
    pub fn prefix_levels(&self, levels: usize) -> ScopeList {
        ScopeList(self.0.iter().filter(|s| s.level < levels).cloned().collect())
    }

    /// Everything below the outermost `levels` branches, renumbered from 0.
    pub fn strip_levels(&self, levels: usize) -> ScopeList {
        ScopeList(
            self.0
                .iter()
                .filter(|s| s.level >= levels)
                .map(|s| s.clone().at_level(s.level - levels))
                .collect(),
        )
    }

    /// This list with the branches of `inner` nested inside it.
    pub fn join(&self, inner: &ScopeList) -> ScopeList {
        let mut out = self.clone();
        for b in inner.branches() {
            out.push_branch(&b);
        }
        out
    }

    /// Group the list into per-level branches, outermost first.
    pub fn branches(&self) -> Vec<Branch> {
        let mut out: Vec<Branch> = Vec::new();
        let mut current_level: Option<usize> = None;
        for s in &self.0 {
            if current_level != Some(s.level) {
                out.push(Branch {
                    negated: Vec::new(),
                    own: None,
                });
                current_level = Some(s.level);
            }
            if let Some(b) = out.last_mut() {
                if s.negated && b.own.is_none() {
                    b.negated.push(s.clone());
                } else {
                    b.own = Some(s.clone());
                }
            }
        }
        out
    }

    /// Detailed view: every condition, with `Else` branches expanded into
    /// the negations of their preceding siblings. `[Global]` when empty.
    pub fn detailed(&self) -> Vec<Scope> {
        if self.0.is_empty() {
            return vec![Scope::global()];
        }
        self.0.clone()
    }

    /// Simplified view: the negated predecessor conditions of each branch
    /// collapse into a single `Else` marker.
    pub fn simplified(&self) -> Vec<Scope> {
        if self.0.is_empty() {
            return vec![Scope::global()];
        }
        let mut out = Vec::new();
        for (i, b) in self.branches().into_iter().enumerate() {
            if !b.negated.is_empty() {
                out.push(Scope::else_marker().at_level(i));
            }
            if let Some(own) = b.own {
                out.push(own);
            }
        }
        out
    }

    /// Membership test: whether the list carries a condition matching
    /// `query`. Scenario/event queries with tokens succeed when a token is
    /// in a non-negated scope of that kind, or when every negated scope of
    /// that kind excludes none of the query tokens.
    pub fn contains(&self, query: &Scope) -> bool {
        match query.kind {
            ScopeKind::Global => return self.0.iter().all(|s| s.kind.is_structural()),
            ScopeKind::Else => return self.0.iter().any(|s| s.negated),
            _ => {}
        }
        let same_kind: Vec<&Scope> = self.0.iter().filter(|s| s.kind == query.kind).collect();
        if same_kind.is_empty() {
            return false;
        }
        if query.tokens.is_empty() {
            return true;
        }
        if same_kind
            .iter()
            .any(|s| !s.negated && s.matches_query(query))
        {
            return true;
        }
        let negated: Vec<&&Scope> = same_kind.iter().filter(|s| s.negated).collect();
        !negated.is_empty() && negated.iter().all(|s| s.matches_query(query))
    }

    /// AND of every scope in the list.
    pub fn evaluate(&self, ctx: &Context, variable: &dyn Fn(&str) -> Option<String>) -> bool {
        self.0.iter().all(|s| s.evaluate(ctx, variable))
    }
}

impl fmt::Display for ScopeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.detailed().iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn or_within_scope_and_across_list() {
        let list = ScopeList::from_scopes(vec![Scope::scenario("D01 | D02"), Scope::scenario("D03")]);
        let yes = Context::parse("-s1 D02 -s2 D03");
        let no = Context::parse("-s1 D01 -s2 D02");
        assert!(list.evaluate(&yes, &no_vars));
        assert!(!list.evaluate(&no, &no_vars));
    }

    #[test]
    fn negated_scope_matches_when_disjoint() {
        let s = Scope::scenario("DEV").negate();
        assert!(s.evaluate(&Context::parse("-s1 EXG"), &no_vars));
        assert!(!s.evaluate(&Context::parse("-s1 dev"), &no_vars));
    }

    #[test]
    fn structural_kinds_always_match() {
        let s = Scope::new(ScopeKind::OneDimensionalDomain, &[]);
        assert!(s.evaluate(&Context::default(), &no_vars));
    }

    #[test]
    fn variable_scope_uses_lookup() {
        let s = Scope::variable("CELL", "2 | 5");
        let lookup = |name: &str| (name == "CELL").then(|| "5".to_string());
        assert!(s.evaluate(&Context::default(), &lookup));
        assert!(!s.evaluate(&Context::default(), &no_vars));
    }

    #[test]
    fn membership_query_semantics() {
        let list = ScopeList::from_scopes(vec![Scope::scenario("DEV").negate()]);
        assert!(list.contains(&Scope::scenario("D01")));
        assert!(!list.contains(&Scope::scenario("DEV")));
        assert!(list.contains(&Scope::new(ScopeKind::Scenario, &[])));
        assert!(!list.contains(&Scope::event("Q100")));
        assert!(list.contains(&Scope::else_marker()));

        let dev = ScopeList::from_scopes(vec![Scope::scenario("DEV | OPT")]);
        assert!(dev.contains(&Scope::scenario("opt")));
        assert!(!dev.contains(&Scope::scenario("EXG")));
        assert!(!dev.contains(&Scope::global()));
        assert!(ScopeList::global().contains(&Scope::global()));
    }

    #[test]
    fn simplified_collapses_negations_per_branch() {
        let mut list = ScopeList::global();
        list.push_branch(&Branch {
            negated: vec![Scope::scenario("A").negate(), Scope::scenario("B").negate()],
            own: Some(Scope::scenario("C")),
        });
        assert_eq!(
            list.detailed(),
            vec![
                Scope::scenario("A").negate(),
                Scope::scenario("B").negate(),
                Scope::scenario("C")
            ]
        );
        assert_eq!(
            list.simplified(),
            vec![Scope::else_marker(), Scope::scenario("C")]
        );
    }

    #[test]
    fn from_scopes_groups_else_if() {
        let list = ScopeList::from_scopes(vec![
            Scope::scenario("Y").negate(),
            Scope::scenario("X"),
            Scope::event("Q100"),
        ]);
        let branches = list.branches();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].negated, vec![Scope::scenario("Y").negate()]);
        assert_eq!(branches[0].own, Some(Scope::scenario("X")));
        assert_eq!(branches[1].own, Some(Scope::event("Q100")));
    }

    #[test]
    fn level_slicing() {
        let list = ScopeList::from_scopes(vec![
            Scope::scenario("A"),
            Scope::event("B").negate(),
            Scope::event("C"),
        ]);
        assert_eq!(list.depth(), 2);
        assert_eq!(list.prefix_levels(1).detailed(), vec![Scope::scenario("A")]);
        let inner = list.strip_levels(1);
        assert_eq!(inner.depth(), 1);
        assert_eq!(inner.branches()[0].own, Some(Scope::event("C")));
        assert_eq!(list.prefix_levels(1).join(&inner), list);
    }

    #[test]
    fn display_forms() {
        assert_eq!(ScopeList::global().to_string(), "[Global]");
        assert_eq!(Scope::scenario("DEV").negate().to_string(), "Scenario:!DEV");
        assert_eq!(Scope::scenario("D01 | D02").to_string(), "Scenario:D01|D02");
    }

    fn arb_tokens() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop_oneof![Just("A"), Just("B"), Just("C"), Just("D")], 1..4)
            .prop_map(|v| v.into_iter().map(String::from).collect())
    }

    proptest! {
        #[test]
        fn negation_is_complement(tokens in arb_tokens(), selected in arb_tokens()) {
            let scope = Scope { kind: ScopeKind::Scenario, tokens, name: None, negated: false, level: 0 };
            let ctx = Context::from_lists(&selected, &[]);
            prop_assert_eq!(
                scope.evaluate(&ctx, &no_vars),
                !scope.negate().evaluate(&ctx, &no_vars)
            );
        }

        #[test]
        fn argument_order_does_not_change_inclusion(tokens in arb_tokens(), selected in arb_tokens()) {
            let scope = Scope { kind: ScopeKind::Scenario, tokens, name: None, negated: false, level: 0 };
            let mut reversed = selected.clone();
            reversed.reverse();
            let a = Context::from_lists(&selected, &[]);
            let b = Context::from_lists(&reversed, &[]);
            prop_assert_eq!(scope.evaluate(&a, &no_vars), scope.evaluate(&b, &no_vars));
        }
    }
}
