use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stage of loading a control file failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// Malformed line text (e.g. an unterminated quote).
    Lex,
    /// Unbalanced `If`/`Define`/domain blocks.
    Structure,
    /// The file could not be read.
    Io,
    /// A control file includes itself, directly or through read files.
    Cycle,
}

/// A parse error. Fatal to the one file it was raised for; sibling control
/// files that were already loaded stay usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, file: &str, line: u32, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    pub fn lex(file: &str, line: u32, message: impl Into<String>) -> Self {
        ParseError::new(ParseErrorKind::Lex, file, line, message)
    }

    pub fn structure(file: &str, line: u32, message: impl Into<String>) -> Self {
        ParseError::new(ParseErrorKind::Structure, file, line, message)
    }

    pub fn io(file: &str, message: impl Into<String>) -> Self {
        ParseError::new(ParseErrorKind::Io, file, 0, message)
    }

    pub fn cycle(file: &str, line: u32, message: impl Into<String>) -> Self {
        ParseError::new(ParseErrorKind::Cycle, file, line, message)
    }

    /// Serialize to JSON. Every field is always present.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "file":    self.file,
            "kind":    self.kind,
            "line":    self.line,
            "message": self.message,
        })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Errors raised by build-state edit operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EditError {
    /// The attribute is derived and cannot be assigned.
    #[error("'{attribute}' is read-only, use rhs instead")]
    ReadOnlyAttribute { attribute: String },

    /// A command change would reinterpret the input as a different variant.
    #[error("cannot change a {from} input into a {to} input")]
    IncompatibleCommand { from: String, to: String },

    /// No input with the given identity exists in this control file.
    #[error("input not found: {id}")]
    UnknownInput { id: String },

    /// Run-state control files cannot be edited.
    #[error("run state is read-only; edit the build state and resolve again")]
    RunStateReadOnly,

    /// `undo` was called with an empty edit log.
    #[error("nothing to undo")]
    NothingToUndo,

    /// The anchor input passed to an insert operation does not exist.
    #[error("anchor input not found: {id}")]
    AnchorNotFound { id: String },

    /// The text given to an append/insert operation is not a command line.
    #[error("invalid command text '{text}': {message}")]
    InvalidText { text: String, message: String },
}

/// Errors raised while loading a database referenced from a control file.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum DatabaseError {
    #[error("cannot read database '{path}': {message}")]
    Io { path: String, message: String },

    #[error("malformed database '{path}': {message}")]
    Csv { path: String, message: String },

    #[error("database '{path}' has no header row")]
    MissingHeader { path: String },

    #[error("input {id} is not a database reference")]
    NotADatabase { id: String },
}

impl DatabaseError {
    pub fn csv(path: &std::path::Path, source: &csv::Error) -> Self {
        DatabaseError::Csv {
            path: path.display().to_string(),
            message: source.to_string(),
        }
    }
}

/// Errors raised when writing control files back to disk.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("run state cannot be written; write the build state instead")]
    RunState,

    #[error("cannot write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_includes_every_field() {
        let e = ParseError::structure("model.tcf", 12, "End If without matching If");
        let v = e.to_json_value();
        assert_eq!(v["kind"], "structure");
        assert_eq!(v["line"], 12);
        assert_eq!(v["file"], "model.tcf");
        assert_eq!(v["message"], "End If without matching If");
    }

    #[test]
    fn display_carries_location() {
        let e = ParseError::lex("a.tgc", 3, "unterminated quote");
        assert_eq!(e.to_string(), "a.tgc:3: unterminated quote");
    }

    #[test]
    fn read_only_message_points_to_rhs() {
        let e = EditError::ReadOnlyAttribute {
            attribute: "value".into(),
        };
        assert!(e.to_string().contains("use rhs instead"));
    }
}
