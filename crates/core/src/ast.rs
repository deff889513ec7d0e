//! Shared line types for the control-file parser.
//!
//! These types are produced by the lexer and consumed by the block state
//! machine, the input model and the writer. They live here so that those
//! modules can import them without depending on the lexer.

use crate::scope::Scope;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Provenance
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub file: String,
    pub line: u32,
}

// ──────────────────────────────────────────────
// Command
// ──────────────────────────────────────────────

/// One logical control-file line (continuation lines already joined).
///
/// A command is never edited in place: edits build a new `Command` through
/// [`Command::with_lhs`] / [`Command::with_rhs`] so the original stays
/// available to the edit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Original text as it appeared in the file, without line terminators.
    pub raw: String,
    /// Leading whitespace of the first physical line.
    pub indent: String,
    /// Command keyword with internal whitespace collapsed. Empty for blank
    /// and comment-only lines.
    pub lhs: String,
    /// Value text after the `==` separator, trimmed. Surrounding quotes are
    /// kept so the value can be written back unchanged.
    pub rhs: Option<String>,
    /// Trailing comment including its `!` or `#` marker.
    pub comment: Option<String>,
    pub prov: Provenance,
}

impl Command {
    /// True for a blank line or a line holding only a comment.
    pub fn is_comment_line(&self) -> bool {
        self.lhs.is_empty()
    }

    /// Lower-cased keyword, used for every keyword comparison.
    pub fn keyword(&self) -> String {
        self.lhs.to_ascii_lowercase()
    }

    /// Build a replacement command with a different keyword.
    pub fn with_lhs(&self, lhs: &str) -> Command {
        let mut c = self.clone();
        c.lhs = collapse_whitespace(lhs);
        c.raw = c.render();
        c
    }

    /// Build a replacement command with a different value.
    pub fn with_rhs(&self, rhs: &str) -> Command {
        let mut c = self.clone();
        c.rhs = Some(rhs.trim().to_string());
        c.raw = c.render();
        c
    }

    /// Build a commented-out copy of this command (`! <original text>`).
    pub fn commented_out(&self) -> Command {
        let body = self.raw.trim_start();
        Command {
            raw: format!("{}! {}", self.indent, body),
            indent: self.indent.clone(),
            lhs: String::new(),
            rhs: None,
            comment: Some(format!("! {}", body)),
            prov: self.prov.clone(),
        }
    }

    /// Canonical text for this command, used when `raw` no longer matches.
    pub fn render(&self) -> String {
        let mut s = self.indent.clone();
        s.push_str(&self.lhs);
        if let Some(rhs) = &self.rhs {
            s.push_str(" == ");
            s.push_str(rhs);
        }
        if let Some(comment) = &self.comment {
            if !self.lhs.is_empty() {
                s.push_str("  ");
            }
            s.push_str(comment);
        }
        s
    }

    /// The value with surrounding double quotes removed.
    pub fn unquoted_rhs(&self) -> Option<&str> {
        self.rhs.as_deref().map(unquote)
    }
}

/// Strip one pair of surrounding double quotes.
pub fn unquote(s: &str) -> &str {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ──────────────────────────────────────────────
// Structural directives
// ──────────────────────────────────────────────

/// A block-structure line. These are routed to the block state machine
/// instead of becoming inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `If Scenario == A | B`, `If Event == ...`, `If Variable X == ...`
    If(Scope),
    /// `Else If <Kind> == ...`
    ElseIf(Scope),
    /// `Else`
    Else,
    /// `End If`
    EndIf,
    /// `Define Event == X`, `Define Output Zone == X`, `Define Control == X`
    Define(Scope),
    /// `End Define`
    EndDefine,
    /// `Start 1D Domain`
    StartDomain,
    /// `End 1D Domain` / `End Domain`
    EndDomain,
}

/// A lexed line: the command plus its directive classification.
#[derive(Debug, Clone)]
pub struct Line {
    pub command: Command,
    pub directive: Option<Directive>,
}
