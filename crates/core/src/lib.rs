//! tmf-core: control-file parser and build-state model.
//!
//! Reads TUFLOW-style control files (`.tcf`, `.tgc`, `.tbc`, `.ecf`, ...)
//! into typed inputs carrying their scope, the files they reference and
//! where they came from. The [`ControlFile`] graph loads child control
//! files and databases on demand, records edits in an undoable log and
//! writes changed files back with their block structure regenerated.
//!
//! # Public API
//!
//! - [`ControlFile`] -- one control file and its lazily loaded children
//! - [`Input`] -- one command line with its [`ScopeList`] and files
//! - [`Scope`], [`ScopeList`] -- conditions under which an input applies
//! - [`Context`] -- `-s`/`-e` run arguments
//! - [`Database`] -- BC, material and soil databases
//! - [`ParseError`], [`EditError`], [`DatabaseError`], [`WriteError`]

pub mod ast;
pub mod block;
pub mod context;
pub mod control_file;
pub mod database;
pub mod error;
pub mod infer;
pub mod input;
pub mod keywords;
pub mod lexer;
pub mod loader;
pub mod patterns;
pub mod scope;
pub mod source;
pub mod writer;

// ── Convenience re-exports ────────────────────────────────────────────

pub use ast::{Command, Provenance};
pub use block::{BlockBranch, BlockItem, BlockKind, BlockNode};
pub use context::Context;
pub use control_file::ControlFile;
pub use database::{Database, Row};
pub use error::{DatabaseError, EditError, ParseError, ParseErrorKind, WriteError};
pub use input::{
    ControlFileKind, DatabaseKind, FileRef, Input, InputId, InputKind, ReadFileOrigin, ResolvedFields,
    Unresolved,
};
pub use scope::{Scope, ScopeKind, ScopeList};
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};
