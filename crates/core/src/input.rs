//! The input model: one [`Input`] per non-structural command.
//!
//! An input carries its command text, variant, associated files and the
//! scope list required to reach it. Run-state inputs additionally carry
//! [`ResolvedFields`]; the same type serves both states.

use crate::ast::{unquote, Command};
use crate::keywords;
use crate::patterns::{self, normalise_separators, split_layer};
use crate::scope::{Scope, ScopeList};
use crate::source::{normalize_path, SourceProvider};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

// ──────────────────────────────────────────────
// Identity
// ──────────────────────────────────────────────

static INPUT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique input identity. Stable across edits of the same input
/// and across build → run resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InputId(u64);

impl InputId {
    /// Allocate a fresh, unique identity.
    pub fn next() -> Self {
        InputId(INPUT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ──────────────────────────────────────────────
// Variants
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlFileKind {
    Tcf,
    Tgc,
    Tbc,
    Ecf,
    Tef,
    Toc,
    Trfc,
    Qcf,
    Tesf,
    Tscf,
    Trd,
    Other,
}

impl ControlFileKind {
    pub fn from_extension(ext: &str) -> ControlFileKind {
        match ext.to_ascii_lowercase().as_str() {
            "tcf" => ControlFileKind::Tcf,
            "tgc" => ControlFileKind::Tgc,
            "tbc" => ControlFileKind::Tbc,
            "ecf" => ControlFileKind::Ecf,
            "tef" => ControlFileKind::Tef,
            "toc" => ControlFileKind::Toc,
            "trfc" => ControlFileKind::Trfc,
            "qcf" => ControlFileKind::Qcf,
            "tesf" => ControlFileKind::Tesf,
            "tscf" => ControlFileKind::Tscf,
            "trd" => ControlFileKind::Trd,
            _ => ControlFileKind::Other,
        }
    }

    pub fn from_path(path: &Path) -> ControlFileKind {
        path.extension()
            .map(|e| ControlFileKind::from_extension(&e.to_string_lossy()))
            .unwrap_or(ControlFileKind::Other)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ControlFileKind::Tcf => "tcf",
            ControlFileKind::Tgc => "tgc",
            ControlFileKind::Tbc => "tbc",
            ControlFileKind::Ecf => "ecf",
            ControlFileKind::Tef => "tef",
            ControlFileKind::Toc => "toc",
            ControlFileKind::Trfc => "trfc",
            ControlFileKind::Qcf => "qcf",
            ControlFileKind::Tesf => "tesf",
            ControlFileKind::Tscf => "tscf",
            ControlFileKind::Trd => "trd",
            ControlFileKind::Other => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DatabaseKind {
    BcDbase,
    Materials,
    Soils,
    PitInlet,
    DepthDischarge,
}

/// Input variant, derived from the command keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InputKind {
    Setting,
    File,
    Gis,
    Grid,
    ControlFile(ControlFileKind),
    Database(DatabaseKind),
    Comment,
}

impl InputKind {
    pub fn name(&self) -> &'static str {
        match self {
            InputKind::Setting => "setting",
            InputKind::File => "file",
            InputKind::Gis => "GIS",
            InputKind::Grid => "grid",
            InputKind::ControlFile(_) => "control file",
            InputKind::Database(_) => "database",
            InputKind::Comment => "comment",
        }
    }

    /// Variants whose value references files.
    pub fn references_files(&self) -> bool {
        !matches!(self, InputKind::Setting | InputKind::Comment)
    }

    /// Whether a command change from `self` to `other` keeps the input's
    /// meaning (same variant family).
    pub fn compatible_with(&self, other: &InputKind) -> bool {
        match (self, other) {
            (InputKind::ControlFile(_), InputKind::ControlFile(_)) => true,
            (InputKind::Database(_), InputKind::Database(_)) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ──────────────────────────────────────────────
// Files and resolved fields
// ──────────────────────────────────────────────

/// A file associated with an input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRef {
    pub path: PathBuf,
    /// Layer name inside a spatial database (`db.gpkg >> layer`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    pub missing: bool,
}

impl FileRef {
    /// The `(dbpath, lyrname)` pair handed to GIS collaborators.
    pub fn gis_parts(&self) -> (&Path, Option<&str>) {
        (&self.path, self.layer.as_deref())
    }
}

/// A value that still holds `<<...>>` tokens after substitution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unresolved {
    pub raw: String,
    pub tokens: Vec<String>,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unresolved variable(s) {} in '{}'",
            self.tokens.join(", "),
            self.raw
        )
    }
}

/// Run-state fields. Present only on inputs produced by resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFields {
    /// Variable-substituted value, or the raw text when tokens remain.
    pub value: Result<String, Unresolved>,
    pub files: Vec<FileRef>,
}

/// Marks an input spliced in from a read file (`Read File == x.trd`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadFileOrigin {
    pub path: PathBuf,
    /// Number of scope levels contributed by the including file.
    pub depth: usize,
}

// ──────────────────────────────────────────────
// Input
// ──────────────────────────────────────────────

/// Location information used to derive an input's files.
pub struct FileContext<'a> {
    pub provider: &'a dyn SourceProvider,
    /// Folder relative paths are resolved against.
    pub base_dir: &'a Path,
    /// The owning control file.
    pub owner: &'a Path,
    /// Active `Spatial Database` for extension-less GIS layers.
    pub spatial_db: Option<&'a Path>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Input {
    id: InputId,
    kind: InputKind,
    command: Command,
    files: Vec<FileRef>,
    scope: ScopeList,
    dirty: bool,
    owner: PathBuf,
    /// `Spatial Database` in effect where the input was read.
    #[serde(skip)]
    spatial_db: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trd: Option<ReadFileOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<ResolvedFields>,
}

impl Input {
    /// Build an input from a parsed command.
    pub fn new(command: Command, scope: ScopeList, fctx: &FileContext<'_>) -> Input {
        let kind = keywords::classify_keyword(&command.lhs);
        let files = derive_files(kind, &command, fctx);
        Input {
            id: InputId::next(),
            kind,
            command,
            files,
            scope,
            dirty: false,
            owner: fctx.owner.to_path_buf(),
            spatial_db: fctx.spatial_db.map(Path::to_path_buf),
            trd: None,
            resolved: None,
        }
    }

    pub fn with_trd(mut self, origin: Option<ReadFileOrigin>) -> Input {
        self.trd = origin;
        self
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Command keyword as written (whitespace collapsed).
    pub fn lhs(&self) -> &str {
        &self.command.lhs
    }

    /// Value text with surrounding quotes removed. `None` for commands
    /// without a value.
    pub fn rhs(&self) -> Option<&str> {
        self.command.unquoted_rhs()
    }

    pub fn comment(&self) -> Option<&str> {
        self.command.comment.as_deref()
    }

    pub fn files(&self) -> &[FileRef] {
        match &self.resolved {
            Some(r) => &r.files,
            None => &self.files,
        }
    }

    pub fn scope(&self) -> &ScopeList {
        &self.scope
    }

    /// Scope list with `Else` branches expanded into negated predecessors.
    pub fn scope_detailed(&self) -> Vec<Scope> {
        self.scope.detailed()
    }

    /// Scope list with `Else` branches collapsed into an `Else` marker.
    pub fn scope_simplified(&self) -> Vec<Scope> {
        self.scope.simplified()
    }

    pub fn in_scope(&self, query: &Scope) -> bool {
        self.scope.contains(query)
    }

    pub fn has_missing_files(&self) -> bool {
        self.files().iter().any(|f| f.missing)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The control file this input belongs to.
    pub fn owner(&self) -> &Path {
        &self.owner
    }

    pub fn trd(&self) -> Option<&ReadFileOrigin> {
        self.trd.as_ref()
    }

    pub fn resolved(&self) -> Option<&ResolvedFields> {
        self.resolved.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The effective value. In run state this is the substituted value; in
    /// build state it is the raw value when it holds no variables.
    pub fn value(&self) -> Result<String, Unresolved> {
        if let Some(r) = &self.resolved {
            return r.value.clone();
        }
        let raw = self.rhs().unwrap_or("").to_string();
        let tokens = patterns::variable_tokens(&raw);
        if tokens.is_empty() {
            Ok(raw)
        } else {
            Err(Unresolved { raw, tokens })
        }
    }

    /// True for `Set Variable NAME == value`.
    pub fn variable_name(&self) -> Option<&str> {
        let lhs = self.lhs();
        let mut words = lhs.splitn(3, ' ');
        let set = words.next()?;
        let var = words.next()?;
        if set.eq_ignore_ascii_case("set") && var.eq_ignore_ascii_case("variable") {
            words.next().map(str::trim).filter(|n| !n.is_empty())
        } else {
            None
        }
    }

    pub fn is_comment(&self) -> bool {
        self.kind == InputKind::Comment
    }

    pub fn is_pause(&self) -> bool {
        self.lhs().eq_ignore_ascii_case("pause")
    }

    // -- Copy-on-edit helpers used by the control file's edit log --------

    pub fn spatial_db(&self) -> Option<&Path> {
        self.spatial_db.as_deref()
    }

    pub(crate) fn replaced(&self, command: Command, fctx: &FileContext<'_>) -> Input {
        let fctx = FileContext {
            spatial_db: self.spatial_db.as_deref().or(fctx.spatial_db),
            ..*fctx
        };
        let mut i = self.clone();
        i.kind = keywords::classify_keyword(&command.lhs);
        i.files = derive_files(i.kind, &command, &fctx);
        i.command = command;
        i.dirty = true;
        i
    }

    pub(crate) fn rescoped(&self, scope: ScopeList) -> Input {
        let mut i = self.clone();
        i.scope = scope;
        i.dirty = true;
        i
    }

    pub(crate) fn mark_dirty(mut self) -> Input {
        self.dirty = true;
        self
    }

    /// Run-state copy keeping the identity of the build-state input.
    pub fn into_resolved(&self, fields: ResolvedFields) -> Input {
        let mut i = self.clone();
        i.resolved = Some(fields);
        i
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, self.command.rhs.as_deref()) {
            (InputKind::Comment, _) => write!(f, "{}", self.command.raw.trim()),
            (_, Some(rhs)) => write!(f, "{} == {}", self.command.lhs, rhs),
            (_, None) => write!(f, "{}", self.command.lhs),
        }
    }
}

/// Resolve a path as written in a control file against `base_dir`.
pub fn resolve_path(base_dir: &Path, text: &str) -> PathBuf {
    let p = PathBuf::from(normalise_separators(unquote(text)));
    if p.is_absolute() {
        normalize_path(&p)
    } else {
        normalize_path(&base_dir.join(p))
    }
}

fn is_output_location(lhs: &str) -> bool {
    matches!(
        lhs.to_ascii_lowercase().as_str(),
        "output folder" | "log folder" | "write check files"
    )
}

/// Derive the files referenced by a command's value.
pub fn derive_files(kind: InputKind, command: &Command, fctx: &FileContext<'_>) -> Vec<FileRef> {
    if !kind.references_files() {
        return Vec::new();
    }
    let rhs = match command.rhs.as_deref() {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Vec::new(),
    };

    if let InputKind::ControlFile(ControlFileKind::Ecf) = kind {
        if unquote(rhs).eq_ignore_ascii_case("auto") {
            let path = fctx.owner.with_extension("ecf");
            let missing = !fctx.provider.exists(&path);
            return vec![FileRef {
                path,
                layer: None,
                missing,
            }];
        }
    }

    let output = is_output_location(&command.lhs);
    let mut out = Vec::new();
    for part in rhs.split('|') {
        let part = unquote(part);
        if part.is_empty() {
            continue;
        }
        let (db, layer) = split_layer(part);
        if !patterns::looks_like_path(&db) {
            // extension-less GIS layer inside the active spatial database
            if kind == InputKind::Gis && !db.chars().all(|c| c.is_ascii_digit() || c == '.') {
                if let Some(spatial) = fctx.spatial_db {
                    out.push(FileRef {
                        path: spatial.to_path_buf(),
                        layer: Some(db.clone()),
                        missing: !fctx.provider.exists(spatial),
                    });
                }
            }
            continue;
        }
        let path = resolve_path(fctx.base_dir, &db);
        let path_text = path.to_string_lossy().to_string();
        if patterns::has_pattern(&path_text) {
            let expanded = patterns::expand_wildcards(fctx.provider, &path);
            if expanded.is_empty() {
                out.push(FileRef {
                    path,
                    layer,
                    missing: !output,
                });
                continue;
            }
            for p in expanded {
                out.push(FileRef {
                    path: p,
                    layer: layer.clone(),
                    missing: false,
                });
            }
            continue;
        }
        let missing = !output && !fctx.provider.exists(&path);
        out.push(FileRef {
            path,
            layer,
            missing,
        });
    }
    out
}
