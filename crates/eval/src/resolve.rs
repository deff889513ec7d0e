//! Resolution of a build-state control file against a [`Context`].
//!
//! Inputs are visited in file order, child control files in place of the
//! input that references them. An input is included when every scope in
//! its list matches the context; included inputs get their `<<...>>`
//! tokens substituted and their files derived again from the substituted
//! value. An included `Pause` aborts the whole resolution.

use crate::variables::{EventDefinitions, VariableTable};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tmf_core::input::{derive_files, FileContext};
use tmf_core::{
    Context, ControlFile, FileRef, Input, InputId, InputKind, ParseError, ResolvedFields, ScopeKind, Unresolved,
};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// An in-context `Pause == message` was reached.
    #[error("model paused at {file}:{line}: {message}")]
    Pause { message: String, file: String, line: u32 },
    /// A child control file could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A concrete value was needed but a variable is undefined.
    #[error("{file}:{line}: unresolved variable <<{token}>>")]
    Unresolved { token: String, file: String, line: u32 },
}

impl ResolveError {
    pub(crate) fn unresolved(input: &Input, unresolved: &Unresolved) -> ResolveError {
        ResolveError::Unresolved {
            token: unresolved.tokens.first().cloned().unwrap_or_default(),
            file: input.command().prov.file.clone(),
            line: input.command().prov.line,
        }
    }
}

/// Per-input outcome of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputStatus {
    NotEvaluated,
    Included,
    Excluded,
    /// The input stopped resolution (an in-context `Pause`).
    Errored,
}

// ──────────────────────────────────────────────
// Run state
// ──────────────────────────────────────────────

/// A resolved model: the run-state control file plus the status of every
/// build-state input that was visited.
#[derive(Debug)]
pub struct RunState {
    control_file: Arc<ControlFile>,
    status: HashMap<InputId, InputStatus>,
    variables: VariableTable,
}

impl RunState {
    /// The resolved top-level control file. Child control files are
    /// reachable through it the same way as in build state.
    pub fn control_file(&self) -> &ControlFile {
        &self.control_file
    }

    pub fn context(&self) -> &Context {
        self.variables.context()
    }

    pub fn status(&self, id: InputId) -> InputStatus {
        self.status
            .get(&id)
            .copied()
            .unwrap_or(InputStatus::NotEvaluated)
    }

    /// Variables as defined at the end of the top-level file.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Every included input across the graph, in file order.
    pub fn inputs(&self) -> Vec<Input> {
        // run-state children are all resolved up front, loading cannot fail
        self.control_file.get_inputs(true).unwrap_or_default()
    }

    /// JSON summary of the included inputs.
    pub fn to_json(&self) -> serde_json::Value {
        let inputs: Vec<serde_json::Value> = self
            .inputs()
            .iter()
            .map(|i| {
                let (value, unresolved) = match i.value() {
                    Ok(v) => (v, Vec::new()),
                    Err(u) => (u.raw, u.tokens),
                };
                serde_json::json!({
                    "id": i.id().get(),
                    "file": i.command().prov.file,
                    "line": i.command().prov.line,
                    "command": i.lhs(),
                    "value": value,
                    "unresolved": unresolved,
                    "files": i.files(),
                })
            })
            .collect();
        serde_json::json!({
            "control_file": self.control_file.path(),
            "context": self.context(),
            "inputs": inputs,
        })
    }
}

// ──────────────────────────────────────────────
// Resolver
// ──────────────────────────────────────────────

/// One resolution pass. Statuses are kept after a failed resolution so
/// callers can see which input stopped it.
#[derive(Debug)]
pub struct Resolver {
    context: Context,
    recursive: bool,
    status: HashMap<InputId, InputStatus>,
    stack: Vec<PathBuf>,
}

fn is_event_definition(input: &Input) -> bool {
    input
        .scope()
        .iter()
        .any(|s| s.kind == ScopeKind::EventVariable)
}

fn dir_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

impl Resolver {
    pub fn new(context: Context) -> Resolver {
        Resolver {
            context,
            recursive: true,
            status: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Whether child control files are resolved too (default yes).
    pub fn recursive(mut self, recursive: bool) -> Resolver {
        self.recursive = recursive;
        self
    }

    pub fn status(&self, id: InputId) -> InputStatus {
        self.status
            .get(&id)
            .copied()
            .unwrap_or(InputStatus::NotEvaluated)
    }

    pub fn resolve(&mut self, cf: &ControlFile) -> Result<RunState, ResolveError> {
        self.status.clear();
        self.stack.clear();
        let events = EventDefinitions::collect(cf)?;
        let mut table = VariableTable::new(&self.context, &events);
        tracing::debug!(file = %cf.path().display(), context = %self.context, "resolving");
        let control_file = self.resolve_file(cf, &mut table)?;
        Ok(RunState {
            control_file,
            status: std::mem::take(&mut self.status),
            variables: table,
        })
    }

    fn resolve_file(&mut self, cf: &ControlFile, table: &mut VariableTable) -> Result<Arc<ControlFile>, ResolveError> {
        self.stack.push(cf.path().to_path_buf());
        for input in cf.inputs() {
            self.status.insert(input.id(), InputStatus::NotEvaluated);
        }

        let mut included = Vec::new();
        let mut children: Vec<(PathBuf, Arc<ControlFile>)> = Vec::new();
        let mut spatial_db: Option<PathBuf> = None;

        for input in cf.inputs() {
            let in_scope = input
                .scope()
                .evaluate(&self.context, &|name: &str| table.get(name));
            if !in_scope || input.is_comment() {
                self.status.insert(input.id(), InputStatus::Excluded);
                continue;
            }
            if input.is_pause() {
                self.status.insert(input.id(), InputStatus::Errored);
                return Err(ResolveError::Pause {
                    message: input.rhs().unwrap_or("").to_string(),
                    file: input.command().prov.file.clone(),
                    line: input.command().prov.line,
                });
            }
            self.status.insert(input.id(), InputStatus::Included);

            let fields = self.resolve_fields(cf, input, table, spatial_db.as_deref());
            let resolved = input.into_resolved(fields);
            self.track_definitions(&resolved, table);
            if resolved.lhs().eq_ignore_ascii_case("spatial database") {
                spatial_db = match resolved.value() {
                    Ok(v) if v.eq_ignore_ascii_case("off") => None,
                    _ => resolved.files().first().map(|f| f.path.clone()),
                };
            }

            if self.recursive && matches!(resolved.kind(), InputKind::ControlFile(_)) {
                for f in resolved.files().iter().filter(|f| !f.missing) {
                    if self.stack.contains(&f.path) {
                        tracing::warn!(file = %f.path.display(), "control file references itself, skipped");
                        continue;
                    }
                    match cf.child(&f.path) {
                        Some(Ok(child)) => {
                            let mut scoped = table.clone();
                            let run = self.resolve_file(&child, &mut scoped)?;
                            children.push((f.path.clone(), run));
                        }
                        Some(Err(e)) => return Err(ResolveError::Parse(e)),
                        None => {}
                    }
                }
            }
            included.push(resolved);
        }

        self.stack.pop();
        tracing::debug!(file = %cf.path().display(), included = included.len(), "resolved control file");
        Ok(Arc::new(cf.to_run_state(self.context.clone(), included, children)))
    }

    fn track_definitions(&self, input: &Input, table: &mut VariableTable) {
        let value = match input.value() {
            Ok(v) => v,
            Err(u) => u.raw,
        };
        if let Some(name) = input.variable_name() {
            if !is_event_definition(input) {
                table.set(name, &value);
            }
        } else if input.lhs().eq_ignore_ascii_case("bc event text") {
            table.set_legacy_event_text(&value);
        } else if input.lhs().eq_ignore_ascii_case("bc event name") {
            table.set_legacy_event_name(&value);
        }
    }

    fn resolve_fields(
        &self,
        cf: &ControlFile,
        input: &Input,
        table: &VariableTable,
        spatial_db: Option<&Path>,
    ) -> ResolvedFields {
        let raw = input.rhs().unwrap_or("");
        let (text, tokens) = table.substitute(raw);
        for token in &tokens {
            tracing::warn!(
                file = %input.command().prov.file,
                line = input.command().prov.line,
                token = %token,
                "unresolved variable"
            );
        }
        let value = if tokens.is_empty() {
            Ok(text.clone())
        } else {
            Err(Unresolved {
                raw: text.clone(),
                tokens,
            })
        };

        let mut files = if !input.kind().references_files() {
            Vec::new()
        } else if text == raw && spatial_db.is_none() {
            input.files().to_vec()
        } else {
            let fctx = FileContext {
                provider: cf.provider().as_ref(),
                base_dir: dir_of(input.owner()),
                owner: input.owner(),
                spatial_db,
            };
            derive_files(input.kind(), &input.command().with_rhs(&text), &fctx)
        };

        if let InputKind::Database(_) = input.kind() {
            files.extend(self.database_sources(cf, input, &files, table));
        }
        ResolvedFields { value, files }
    }

    /// Source files listed in a BC database, with event substitutions
    /// applied to their names.
    fn database_sources(&self, cf: &ControlFile, input: &Input, files: &[FileRef], table: &VariableTable) -> Vec<FileRef> {
        if files.first().map_or(true, |f| f.missing) {
            return Vec::new();
        }
        let lookup = input.into_resolved(ResolvedFields {
            value: Ok(String::new()),
            files: files.to_vec(),
        });
        let db = match cf.database(&lookup) {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!(error = %e, "database not loaded");
                return Vec::new();
            }
        };
        db.files_with(&|name| table.replace_sources(&table.substitute(name).0))
            .into_iter()
            .map(|path| FileRef {
                missing: !cf.provider().exists(&path),
                path,
                layer: None,
            })
            .collect()
    }
}

/// Resolve `cf` and its children against `context`.
pub fn resolve(cf: &ControlFile, context: &Context) -> Result<RunState, ResolveError> {
    Resolver::new(context.clone()).resolve(cf)
}

/// Resolve against batch-style flags such as `-s1 D02 -e1 Q100`.
pub fn context(cf: &ControlFile, flags: &str) -> Result<RunState, ResolveError> {
    resolve(cf, &Context::parse(flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmf_core::InMemoryProvider;

    fn load(pairs: &[(&str, &str)], path: &str) -> ControlFile {
        let provider = InMemoryProvider::from_pairs(pairs.iter().copied());
        ControlFile::load_with_provider(path, Arc::new(provider)).unwrap()
    }

    #[test]
    fn else_if_takes_first_match() {
        let cf = load(
            &[(
                "/m/m.tcf",
                "If Scenario == A\nCell Size == 1\nElse If Scenario == B\nCell Size == 2\nElse\nCell Size == 3\nEnd If\n",
            )],
            "/m/m.tcf",
        );
        let value = |flags: &str| {
            let run = context(&cf, flags).unwrap();
            run.inputs()[0].value().unwrap()
        };
        assert_eq!(value("-s1 B -s2 A"), "1");
        assert_eq!(value("-s1 B"), "2");
        assert_eq!(value(""), "3");
    }

    #[test]
    fn later_set_variable_wins() {
        let cf = load(
            &[(
                "/m/m.tcf",
                "Set Variable CELL == 5\nSet Variable CELL == 2\nCell Size == <<CELL>>\n",
            )],
            "/m/m.tcf",
        );
        let run = context(&cf, "").unwrap();
        let cell = run
            .inputs()
            .into_iter()
            .find(|i| i.lhs() == "Cell Size")
            .unwrap();
        assert_eq!(cell.value().unwrap(), "2");
    }

    #[test]
    fn unresolved_variable_is_recorded_not_raised() {
        let cf = load(&[("/m/m.tcf", "Timestep == <<TS>>\n")], "/m/m.tcf");
        let run = context(&cf, "").unwrap();
        let err = run.inputs()[0].value().unwrap_err();
        assert_eq!(err.tokens, vec!["TS".to_string()]);
        assert_eq!(err.raw, "<<TS>>");
    }

    #[test]
    fn variable_scope_reads_the_table() {
        let cf = load(
            &[(
                "/m/m.tcf",
                "Set Variable CELL == 5\nIf Variable CELL == 2 | 5\nTimestep == 1\nElse\nTimestep == 2\nEnd If\n",
            )],
            "/m/m.tcf",
        );
        let run = context(&cf, "").unwrap();
        let ts = run
            .inputs()
            .into_iter()
            .find(|i| i.lhs() == "Timestep")
            .unwrap();
        assert_eq!(ts.value().unwrap(), "1");
    }

    #[test]
    fn pause_marks_the_input_errored() {
        let cf = load(
            &[(
                "/m/m.tcf",
                "Timestep == 1\nIf Scenario == BAD\nPause == scenario BAD is retired\nEnd If\nEnd Time == 2\n",
            )],
            "/m/m.tcf",
        );
        let ids: Vec<InputId> = cf.inputs().iter().map(|i| i.id()).collect();
        let mut resolver = Resolver::new(Context::parse("-s1 BAD"));
        let err = resolver.resolve(&cf).unwrap_err();
        assert!(err.to_string().contains("scenario BAD is retired"));
        assert_eq!(resolver.status(ids[0]), InputStatus::Included);
        assert_eq!(resolver.status(ids[1]), InputStatus::Errored);
        assert_eq!(resolver.status(ids[2]), InputStatus::NotEvaluated);

        let run = Resolver::new(Context::parse("-s1 GOOD")).resolve(&cf).unwrap();
        assert_eq!(run.status(ids[1]), InputStatus::Excluded);
        assert_eq!(run.status(ids[2]), InputStatus::Included);
    }
}
