//! Control files and the control-file graph.
//!
//! A [`ControlFile`] owns its inputs and a log of edits; the current inputs
//! are the parsed inputs with the log applied in order. Child control files
//! and databases are loaded on first access and cached behind one load
//! path per file. The same type represents the run state: a resolved
//! control file carries its [`Context`] and rejects edits.

use crate::ast::Command;
use crate::block::BlockItem;
use crate::context::Context;
use crate::database::Database;
use crate::error::{DatabaseError, EditError, ParseError, WriteError};
use crate::infer;
use crate::input::{ControlFileKind, DatabaseKind, FileContext, Input, InputId, InputKind};
use crate::keywords;
use crate::lexer;
use crate::loader::{self, Parsed, SourceText};
use crate::scope::ScopeList;
use crate::source::{normalize_path, FileSystemProvider, SourceProvider};
use crate::writer;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

type ChildCell = Arc<OnceLock<Result<Arc<ControlFile>, ParseError>>>;
type DatabaseCell = Arc<OnceLock<Result<Arc<Database>, DatabaseError>>>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    End,
    Before(InputId),
    After(InputId),
}

/// One build-state edit. The current inputs are a fold over these.
#[derive(Debug, Clone)]
enum Edit {
    Command { id: InputId, command: Command },
    Scope { id: InputId, scope: ScopeList },
    Insert { at: Position, input: Input },
    Remove { id: InputId },
}

pub struct ControlFile {
    path: PathBuf,
    kind: ControlFileKind,
    provider: Arc<dyn SourceProvider>,
    parsed: Arc<Parsed>,
    log: Vec<Edit>,
    inputs: Vec<Input>,
    context: Option<Context>,
    children: Mutex<HashMap<PathBuf, ChildCell>>,
    databases: Mutex<HashMap<PathBuf, DatabaseCell>>,
}

impl fmt::Debug for ControlFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlFile")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.len())
            .field("edits", &self.log.len())
            .field("context", &self.context)
            .finish()
    }
}

// ──────────────────────────────────────────────
// Loading
// ──────────────────────────────────────────────

impl ControlFile {
    /// Load a control file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<ControlFile, ParseError> {
        ControlFile::load_with_provider(path, Arc::new(FileSystemProvider))
    }

    /// Load a control file through `provider`. Child control files loaded
    /// later share the same provider.
    pub fn load_with_provider(
        path: impl AsRef<Path>,
        provider: Arc<dyn SourceProvider>,
    ) -> Result<ControlFile, ParseError> {
        let parsed = loader::load(path.as_ref(), provider.as_ref())?;
        Ok(ControlFile::from_parsed(parsed, provider))
    }

    /// Parse `text` as the control file at `path`.
    pub fn from_text(
        path: impl AsRef<Path>,
        text: &str,
        provider: Arc<dyn SourceProvider>,
    ) -> Result<ControlFile, ParseError> {
        let parsed = loader::parse_text(path.as_ref(), text, provider.as_ref())?;
        Ok(ControlFile::from_parsed(parsed, provider))
    }

    fn from_parsed(parsed: Parsed, provider: Arc<dyn SourceProvider>) -> ControlFile {
        let path = parsed.main.path.clone();
        ControlFile {
            kind: ControlFileKind::from_path(&path),
            path,
            provider,
            inputs: parsed.inputs.clone(),
            parsed: Arc::new(parsed),
            log: Vec::new(),
            context: None,
            children: Mutex::new(HashMap::new()),
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Build the run-state counterpart of this control file: `inputs` are
    /// the included, resolved inputs and `children` the resolved child
    /// control files keyed by path.
    pub fn to_run_state(
        &self,
        context: Context,
        inputs: Vec<Input>,
        children: Vec<(PathBuf, Arc<ControlFile>)>,
    ) -> ControlFile {
        let cells = children
            .into_iter()
            .map(|(path, child)| {
                let cell = OnceLock::new();
                let _ = cell.set(Ok(child));
                (normalize_path(&path), Arc::new(cell))
            })
            .collect();
        ControlFile {
            path: self.path.clone(),
            kind: self.kind,
            provider: Arc::clone(&self.provider),
            parsed: Arc::clone(&self.parsed),
            log: Vec::new(),
            inputs,
            context: Some(context),
            children: Mutex::new(cells),
            databases: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ControlFileKind {
        self.kind
    }

    /// Folder relative paths in this file are resolved against.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn provider(&self) -> &Arc<dyn SourceProvider> {
        &self.provider
    }

    pub fn is_run_state(&self) -> bool {
        self.context.is_some()
    }

    /// The context a run-state control file was resolved with.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Block tree of the file as parsed. Line items index the parsed
    /// inputs, not the edited ones.
    pub fn blocks(&self) -> &[BlockItem] {
        &self.parsed.blocks
    }

    /// Read files spliced into this control file.
    pub fn read_files(&self) -> Vec<&Path> {
        self.parsed.read_files.iter().map(|s| s.path.as_path()).collect()
    }

    fn file_context(&self) -> FileContext<'_> {
        FileContext {
            provider: self.provider.as_ref(),
            base_dir: self.dir(),
            owner: &self.path,
            spatial_db: None,
        }
    }
}

// ──────────────────────────────────────────────
// Queries
// ──────────────────────────────────────────────

impl ControlFile {
    /// This file's own inputs (read files included), in file order.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input(&self, id: InputId) -> Option<&Input> {
        self.inputs.iter().find(|i| i.id() == id)
    }

    /// First own input matching `pred`.
    pub fn find_input(&self, pred: impl Fn(&Input) -> bool) -> Option<&Input> {
        self.inputs.iter().find(|i| pred(i))
    }

    /// Every input, optionally walking into child control files. A child's
    /// inputs follow the input that references it.
    pub fn get_inputs(&self, recursive: bool) -> Result<Vec<Input>, ParseError> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_inputs(recursive, &mut visited, &mut out)?;
        Ok(out)
    }

    /// Every input matching `pred`, optionally across the whole graph.
    pub fn find_inputs(&self, pred: impl Fn(&Input) -> bool, recursive: bool) -> Result<Vec<Input>, ParseError> {
        Ok(self
            .get_inputs(recursive)?
            .into_iter()
            .filter(|i| pred(i))
            .collect())
    }

    fn collect_inputs(
        &self,
        recursive: bool,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<Input>,
    ) -> Result<(), ParseError> {
        if !visited.insert(self.path.clone()) {
            return Ok(());
        }
        for input in &self.inputs {
            out.push(input.clone());
            if recursive && matches!(input.kind(), InputKind::ControlFile(_)) {
                for child in self.children(input)? {
                    child.collect_inputs(true, visited, out)?;
                }
            }
        }
        Ok(())
    }

    /// Every referenced file in first-seen order. In build state the
    /// source files listed in BC databases are included.
    pub fn get_files(&self, recursive: bool) -> Result<Vec<PathBuf>, ParseError> {
        let mut out: Vec<PathBuf> = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |p: &Path| {
            if seen.insert(p.to_path_buf()) {
                out.push(p.to_path_buf());
            }
        };
        for input in self.get_inputs(recursive)? {
            for f in input.files() {
                push(&f.path);
            }
            if !input.is_resolved() && matches!(input.kind(), InputKind::Database(_)) {
                match self.database(&input) {
                    Ok(db) => db.files().iter().for_each(|p| push(p)),
                    Err(e) => tracing::warn!(error = %e, "database not loaded"),
                }
            }
        }
        Ok(out)
    }

    /// Files referenced but not present.
    pub fn missing_files(&self, recursive: bool) -> Result<Vec<PathBuf>, ParseError> {
        let mut out = Vec::new();
        for input in self.get_inputs(recursive)? {
            for f in input.files().iter().filter(|f| f.missing) {
                if !out.contains(&f.path) {
                    out.push(f.path.clone());
                }
            }
        }
        Ok(out)
    }

    /// Child control files referenced by `input`. Missing files are
    /// skipped; a child that fails to parse is an error.
    pub fn children(&self, input: &Input) -> Result<Vec<Arc<ControlFile>>, ParseError> {
        if !matches!(input.kind(), InputKind::ControlFile(_)) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for f in input.files() {
            if f.missing {
                tracing::warn!(file = %f.path.display(), "control file not found");
                continue;
            }
            if let Some(child) = self.child(&f.path) {
                out.push(child?);
            }
        }
        Ok(out)
    }

    /// The control file at `path`, loaded once through this file's provider.
    /// A run-state file only knows the children it was resolved with.
    pub fn child(&self, path: &Path) -> Option<Result<Arc<ControlFile>, ParseError>> {
        let key = normalize_path(path);
        let cell = {
            let mut map = self.children.lock().unwrap_or_else(|e| e.into_inner());
            if self.is_run_state() && !map.contains_key(&key) {
                return None;
            }
            Arc::clone(map.entry(key.clone()).or_default())
        };
        let result = cell.get_or_init(|| {
            tracing::debug!(file = %key.display(), "loading child control file");
            ControlFile::load_with_provider(&key, Arc::clone(&self.provider)).map(Arc::new)
        });
        Some(result.clone())
    }

    /// Every child control file referenced by this file, deduplicated.
    pub fn control_files(&self) -> Result<Vec<Arc<ControlFile>>, ParseError> {
        let mut out: Vec<Arc<ControlFile>> = Vec::new();
        for input in &self.inputs {
            for child in self.children(input)? {
                if !out.iter().any(|c| c.path == child.path) {
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    /// First child control file of the given kind.
    pub fn control_file(&self, kind: ControlFileKind) -> Result<Option<Arc<ControlFile>>, ParseError> {
        for input in &self.inputs {
            if input.kind() == InputKind::ControlFile(kind) {
                if let Some(child) = self.children(input)?.into_iter().next() {
                    return Ok(Some(child));
                }
            }
        }
        Ok(None)
    }

    pub fn tgc(&self) -> Result<Option<Arc<ControlFile>>, ParseError> {
        self.control_file(ControlFileKind::Tgc)
    }

    pub fn tbc(&self) -> Result<Option<Arc<ControlFile>>, ParseError> {
        self.control_file(ControlFileKind::Tbc)
    }

    pub fn ecf(&self) -> Result<Option<Arc<ControlFile>>, ParseError> {
        self.control_file(ControlFileKind::Ecf)
    }

    pub fn tef(&self) -> Result<Option<Arc<ControlFile>>, ParseError> {
        self.control_file(ControlFileKind::Tef)
    }

    /// The database referenced by `input`, loaded once and cached.
    pub fn database(&self, input: &Input) -> Result<Arc<Database>, DatabaseError> {
        let InputKind::Database(kind) = input.kind() else {
            return Err(DatabaseError::NotADatabase {
                id: input.id().to_string(),
            });
        };
        let path = input
            .files()
            .first()
            .map(|f| f.path.clone())
            .ok_or_else(|| DatabaseError::Io {
                path: input.rhs().unwrap_or("").to_string(),
                message: "no file given".to_string(),
            })?;
        let cell = {
            let mut map = self.databases.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(path.clone()).or_default())
        };
        cell.get_or_init(|| Database::load(self.provider.as_ref(), &path, kind).map(Arc::new))
            .clone()
    }

    /// The first database of `kind` referenced by this file.
    pub fn database_of(&self, kind: DatabaseKind) -> Option<Result<Arc<Database>, DatabaseError>> {
        self.inputs
            .iter()
            .find(|i| i.kind() == InputKind::Database(kind))
            .map(|i| self.database(i))
    }

    pub fn bc_dbase(&self) -> Option<Result<Arc<Database>, DatabaseError>> {
        self.database_of(DatabaseKind::BcDbase)
    }

    pub fn mat_file(&self) -> Option<Result<Arc<Database>, DatabaseError>> {
        self.database_of(DatabaseKind::Materials)
    }
}

// ──────────────────────────────────────────────
// Edits
// ──────────────────────────────────────────────

fn apply(inputs: &mut Vec<Input>, edit: &Edit, fctx: &FileContext<'_>) {
    let index = |inputs: &Vec<Input>, id: InputId| inputs.iter().position(|i| i.id() == id);
    match edit {
        Edit::Command { id, command } => {
            if let Some(i) = index(inputs, *id) {
                inputs[i] = inputs[i].replaced(command.clone(), fctx);
            }
        }
        Edit::Scope { id, scope } => {
            if let Some(i) = index(inputs, *id) {
                inputs[i] = inputs[i].rescoped(scope.clone());
            }
        }
        Edit::Insert { at, input } => {
            let at = match at {
                Position::End => None,
                Position::Before(a) => index(inputs, *a),
                Position::After(a) => index(inputs, *a).map(|i| i + 1),
            };
            let input = input.clone().mark_dirty();
            match at {
                Some(i) => inputs.insert(i, input),
                None => inputs.push(input),
            }
        }
        Edit::Remove { id } => inputs.retain(|i| i.id() != *id),
    }
}

/// Text of a comment line with its leading markers removed.
fn comment_body(input: &Input) -> &str {
    input
        .command()
        .raw
        .trim_start()
        .trim_start_matches(['!', '#'])
        .trim_start()
}

impl ControlFile {
    fn check_build(&self) -> Result<(), EditError> {
        if self.is_run_state() {
            Err(EditError::RunStateReadOnly)
        } else {
            Ok(())
        }
    }

    fn editable(&self, id: InputId) -> Result<&Input, EditError> {
        self.check_build()?;
        self.input(id).ok_or_else(|| EditError::UnknownInput { id: id.to_string() })
    }

    fn push(&mut self, edit: Edit) {
        let fctx = FileContext {
            provider: self.provider.as_ref(),
            base_dir: self.path.parent().unwrap_or_else(|| Path::new("")),
            owner: &self.path,
            spatial_db: None,
        };
        apply(&mut self.inputs, &edit, &fctx);
        self.log.push(edit);
    }

    fn replay(&mut self) {
        let mut inputs = self.parsed.inputs.clone();
        {
            let fctx = self.file_context();
            for edit in &self.log {
                apply(&mut inputs, edit, &fctx);
            }
        }
        self.inputs = inputs;
    }

    /// Parse `text` into a single new input placed next to `anchor`.
    fn new_input(&self, text: &str, anchor: Option<&Input>) -> Result<Input, EditError> {
        let text = infer::guess_command_from_text(text, self.dir(), anchor);
        let invalid = |message: String| EditError::InvalidText {
            text: text.clone(),
            message,
        };
        if text.contains('\n') {
            return Err(invalid("expected a single line".to_string()));
        }
        let fname = self.path.display().to_string();
        let command = lexer::parse_command(&text, &fname, 0).map_err(|e| invalid(e.message))?;
        if lexer::classify(&command).map_err(|e| invalid(e.message))?.is_some() {
            return Err(invalid(
                "block lines are derived from input scopes; use set_scope".to_string(),
            ));
        }
        let scope = anchor.map(|a| a.scope().clone()).unwrap_or_default();
        // Appended lines see the database in effect at the end of the file.
        let spatial_db = match anchor {
            Some(a) => a.spatial_db(),
            None => self.inputs.last().and_then(Input::spatial_db),
        };
        let fctx = FileContext {
            spatial_db,
            ..self.file_context()
        };
        let input = Input::new(command, scope, &fctx);
        Ok(input.with_trd(anchor.and_then(|a| a.trd().cloned())))
    }

    /// Add a line at the end of the file. Bare file paths get a command
    /// keyword inferred from their extension.
    pub fn append_input(&mut self, text: &str) -> Result<InputId, EditError> {
        self.check_build()?;
        let input = self.new_input(text, None)?;
        let id = input.id();
        self.push(Edit::Insert {
            at: Position::End,
            input,
        });
        Ok(id)
    }

    /// Add a line before or after `anchor`, inside the same blocks. The
    /// anchor's command is reused for a bare path of a compatible type.
    pub fn insert_input(&mut self, anchor: InputId, text: &str, after: bool) -> Result<InputId, EditError> {
        self.check_build()?;
        let anchor_input = self
            .input(anchor)
            .ok_or_else(|| EditError::AnchorNotFound { id: anchor.to_string() })?;
        let input = self.new_input(text, Some(anchor_input))?;
        let id = input.id();
        let at = if after {
            Position::After(anchor)
        } else {
            Position::Before(anchor)
        };
        self.push(Edit::Insert { at, input });
        Ok(id)
    }

    pub fn set_rhs(&mut self, id: InputId, rhs: &str) -> Result<(), EditError> {
        let input = self.editable(id)?;
        if input.is_comment() {
            return Err(EditError::InvalidText {
                text: rhs.to_string(),
                message: "comment lines have no value".to_string(),
            });
        }
        let command = input.command().with_rhs(rhs);
        self.push(Edit::Command { id, command });
        Ok(())
    }

    /// Change the command keyword. A keyword implying a different variant
    /// (e.g. a GIS command into a plain setting) is refused.
    pub fn set_command(&mut self, id: InputId, lhs: &str) -> Result<(), EditError> {
        let input = self.editable(id)?;
        let to = keywords::classify_keyword(lhs);
        if !input.kind().compatible_with(&to) {
            return Err(EditError::IncompatibleCommand {
                from: input.kind().to_string(),
                to: to.to_string(),
            });
        }
        let command = input.command().with_lhs(lhs);
        self.push(Edit::Command { id, command });
        Ok(())
    }

    /// Assign an attribute by name. Only `lhs`/`command` and `rhs` are
    /// writable; derived attributes such as `value` are refused.
    pub fn set_attribute(&mut self, id: InputId, attribute: &str, text: &str) -> Result<(), EditError> {
        match attribute.to_ascii_lowercase().as_str() {
            "rhs" => self.set_rhs(id, text),
            "lhs" | "command" => self.set_command(id, text),
            _ => {
                self.editable(id)?;
                Err(EditError::ReadOnlyAttribute {
                    attribute: attribute.to_string(),
                })
            }
        }
    }

    /// Replace an input's scope list. For an input spliced from a read file
    /// the list is relative to the scope the read file was included in.
    /// The block lines are derived again when the file is written.
    pub fn set_scope(&mut self, id: InputId, scope: ScopeList) -> Result<(), EditError> {
        let input = self.editable(id)?;
        let scope = match input.trd() {
            Some(origin) => input.scope().prefix_levels(origin.depth).join(&scope),
            None => scope,
        };
        self.push(Edit::Scope { id, scope });
        Ok(())
    }

    pub fn remove_input(&mut self, id: InputId) -> Result<(), EditError> {
        self.editable(id)?;
        self.push(Edit::Remove { id });
        Ok(())
    }

    /// Turn an input into a comment line (`! <text>`). Already-commented
    /// inputs are left alone.
    pub fn comment_out(&mut self, id: InputId) -> Result<(), EditError> {
        let input = self.editable(id)?;
        if input.is_comment() {
            return Ok(());
        }
        let command = input.command().commented_out();
        self.push(Edit::Command { id, command });
        Ok(())
    }

    /// Turn a commented-out command back into an input.
    pub fn uncomment(&mut self, id: InputId) -> Result<(), EditError> {
        let input = self.editable(id)?;
        if !input.is_comment() {
            return Ok(());
        }
        let body = comment_body(input);
        let invalid = |message: &str| EditError::InvalidText {
            text: body.to_string(),
            message: message.to_string(),
        };
        let text = format!("{}{}", input.command().indent, body);
        let mut command = lexer::parse_command(&text, &input.command().prov.file, input.command().prov.line)
            .map_err(|e| invalid(&e.message))?;
        if command.is_comment_line() {
            return Err(invalid("comment holds no command"));
        }
        if lexer::classify(&command).map_err(|e| invalid(&e.message))?.is_some() {
            return Err(invalid("block lines are derived from input scopes"));
        }
        command.raw = text;
        self.push(Edit::Command { id, command });
        Ok(())
    }

    /// Drop the most recent edit.
    pub fn undo(&mut self) -> Result<(), EditError> {
        self.check_build()?;
        self.log.pop().ok_or(EditError::NothingToUndo)?;
        self.replay();
        Ok(())
    }

    /// Drop every edit.
    pub fn reset(&mut self) {
        self.log.clear();
        self.replay();
    }

    pub fn is_dirty(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn edit_count(&self) -> usize {
        self.log.len()
    }
}

// ──────────────────────────────────────────────
// Writing
// ──────────────────────────────────────────────

impl ControlFile {
    fn sources(&self) -> impl Iterator<Item = &SourceText> {
        std::iter::once(&self.parsed.main).chain(self.parsed.read_files.iter())
    }

    fn belongs(input: &Input, source: &SourceText, main: bool) -> bool {
        match input.trd() {
            Some(origin) => !main && origin.path == source.path,
            None => main,
        }
    }

    /// Text of this file and of each spliced read file, in that order.
    /// Files untouched by edits come back exactly as read.
    pub fn render(&self) -> Result<Vec<(PathBuf, String)>, WriteError> {
        if self.is_run_state() {
            return Err(WriteError::RunState);
        }
        let current: HashSet<InputId> = self.inputs.iter().map(Input::id).collect();
        let mut out = Vec::new();
        for (n, source) in self.sources().enumerate() {
            let main = n == 0;
            let depths: HashMap<InputId, usize> = self
                .parsed
                .inputs
                .iter()
                .filter(|i| Self::belongs(i, source, main))
                .map(|i| (i.id(), i.scope().depth().saturating_sub(source.base_depth)))
                .collect();
            let inputs: Vec<&Input> = self
                .inputs
                .iter()
                .filter(|i| Self::belongs(i, source, main))
                .collect();
            let changed = inputs.iter().any(|i| i.is_dirty())
                || depths.keys().any(|id| !current.contains(id));
            out.push((
                source.path.clone(),
                writer::render(source, &inputs, &depths, changed),
            ));
        }
        Ok(out)
    }

    /// Write this file and its read files back in place.
    pub fn write(&self) -> Result<Vec<PathBuf>, WriteError> {
        let files = self.render()?;
        write_all(files)
    }

    /// Write to `dest`. Read files keep their location relative to the
    /// control file.
    pub fn write_to(&self, dest: &Path) -> Result<Vec<PathBuf>, WriteError> {
        let dest_dir = dest.parent().unwrap_or_else(|| Path::new(""));
        let files = self
            .render()?
            .into_iter()
            .enumerate()
            .map(|(n, (path, text))| {
                if n == 0 {
                    (dest.to_path_buf(), text)
                } else {
                    let rel = path.strip_prefix(self.dir()).unwrap_or(&path);
                    (dest_dir.join(rel), text)
                }
            })
            .collect();
        write_all(files)
    }
}

fn write_all(files: Vec<(PathBuf, String)>) -> Result<Vec<PathBuf>, WriteError> {
    let mut written = Vec::new();
    for (path, text) in files {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(&path, text).map_err(|source| WriteError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(file = %path.display(), "wrote control file");
        written.push(path);
    }
    Ok(written)
}
