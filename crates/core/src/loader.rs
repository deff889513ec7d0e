//! Loads one control file: lex, block annotation, input construction and
//! read-file splicing.
//!
//! A `Read File == x.trd` line stays an input of its own; the read file's
//! lines are spliced in right after it, nested inside the scope that was
//! open at the point of reference. Read files including each other are a
//! cycle error.

use crate::ast::{Command, Directive};
use crate::block::{BlockItem, BlockMachine};
use crate::error::ParseError;
use crate::input::{FileContext, Input, InputKind, ReadFileOrigin};
use crate::lexer;
use crate::scope::ScopeList;
use crate::source::{normalize_path, SourceProvider};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A structural line as it appeared in the file, kept so the writer can
/// reuse its original text.
#[derive(Debug, Clone)]
pub struct DirectiveLine {
    pub directive: Directive,
    pub command: Command,
    /// Nesting depth of the line within its own file.
    pub depth: usize,
}

/// The text of one physical file contributing to a control file.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
    pub directives: Vec<DirectiveLine>,
    /// Scope levels contributed by the including file (0 for the control
    /// file itself).
    pub base_depth: usize,
}

/// Result of loading one control file.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub inputs: Vec<Input>,
    pub main: SourceText,
    pub read_files: Vec<SourceText>,
    pub blocks: Vec<BlockItem>,
}

struct Loader<'a> {
    provider: &'a dyn SourceProvider,
    owner: PathBuf,
    base_dir: PathBuf,
    inputs: Vec<Input>,
    sources: Vec<SourceText>,
    stack: Vec<PathBuf>,
    stack_set: HashSet<PathBuf>,
    spatial_db: Option<PathBuf>,
}

/// Read and parse the control file at `path`.
pub fn load(path: &Path, provider: &dyn SourceProvider) -> Result<Parsed, ParseError> {
    let path = normalize_path(path);
    let text = provider
        .read_source(&path)
        .map_err(|e| ParseError::io(&path.display().to_string(), format!("cannot open file: {}", e)))?;
    parse_text(&path, &text, provider)
}

/// Parse control-file text as if it had been read from `path`. Read files
/// and file existence still go through `provider`.
pub fn parse_text(path: &Path, text: &str, provider: &dyn SourceProvider) -> Result<Parsed, ParseError> {
    let owner = normalize_path(path);
    let base_dir = owner.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut loader = Loader {
        provider,
        owner: owner.clone(),
        base_dir,
        inputs: Vec::new(),
        sources: Vec::new(),
        stack: Vec::new(),
        stack_set: HashSet::new(),
        spatial_db: None,
    };
    let blocks = loader.splice(&owner, text, ScopeList::global(), None)?;

    let mut main = None;
    let mut read_files = Vec::new();
    for s in loader.sources {
        if main.is_none() && s.base_depth == 0 && s.path == owner {
            main = Some(s);
        } else {
            read_files.push(s);
        }
    }
    let main = main.ok_or_else(|| ParseError::io(&owner.display().to_string(), "control file text was not recorded"))?;

    tracing::debug!(
        file = %owner.display(),
        inputs = loader.inputs.len(),
        read_files = read_files.len(),
        "parsed control file"
    );
    Ok(Parsed {
        inputs: loader.inputs,
        main,
        read_files,
        blocks,
    })
}

fn directive_depth(d: &Directive, before: usize, after: usize) -> usize {
    match d {
        Directive::If(_) | Directive::Define(_) | Directive::StartDomain => before,
        Directive::ElseIf(_) | Directive::Else => before.saturating_sub(1),
        Directive::EndIf | Directive::EndDefine | Directive::EndDomain => after,
    }
}

/// Path of the read file referenced by `input`, if it is one.
fn read_file_target(input: &Input) -> Option<PathBuf> {
    if input.kind() != InputKind::File || !input.lhs().eq_ignore_ascii_case("read file") {
        return None;
    }
    input.files().first().map(|f| f.path.clone())
}

impl<'a> Loader<'a> {
    fn splice(
        &mut self,
        path: &Path,
        text: &str,
        base: ScopeList,
        origin: Option<ReadFileOrigin>,
    ) -> Result<Vec<BlockItem>, ParseError> {
        let fname = path.display().to_string();
        let canon = self
            .provider
            .canonicalize(path)
            .unwrap_or_else(|_| normalize_path(path));
        if self.stack_set.contains(&canon) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&canon))
                .map(|p| p.display().to_string())
                .collect();
            return Err(ParseError::cycle(
                &fname,
                0,
                format!("read file cycle: {}", chain.join(" -> ")),
            ));
        }
        self.stack.push(canon.clone());
        self.stack_set.insert(canon.clone());

        let lines = lexer::lex(text, &fname)?;
        let base_depth = base.depth();
        let mut machine = BlockMachine::with_base(&fname, base);
        let mut directives = Vec::new();

        for line in lines {
            if let Some(d) = line.directive {
                let before = machine.depth();
                machine.directive(&d, &line.command.prov)?;
                let depth = directive_depth(&d, before, machine.depth());
                directives.push(DirectiveLine {
                    directive: d,
                    command: line.command,
                    depth,
                });
                continue;
            }

            let scope = machine.scope();
            let fctx = FileContext {
                provider: self.provider,
                base_dir: &self.base_dir,
                owner: &self.owner,
                spatial_db: self.spatial_db.as_deref(),
            };
            let input = Input::new(line.command, scope.clone(), &fctx).with_trd(origin.clone());
            if input.kind() == InputKind::Setting && input.rhs().is_none() && !input.is_pause() {
                tracing::warn!(file = %fname, line = input.command().prov.line, command = input.lhs(), "unrecognised command");
            }
            self.track_spatial_database(&input);
            let target = read_file_target(&input);
            let read_line = input.command().prov.line;

            machine.record(self.inputs.len());
            self.inputs.push(input);

            if let Some(target) = target {
                let items = self.read_file(&target, scope, &fname, read_line)?;
                machine.extend(items);
            }
        }

        let tree = machine.finish()?;
        self.sources.push(SourceText {
            path: path.to_path_buf(),
            text: text.to_string(),
            directives,
            base_depth,
        });
        self.stack.pop();
        self.stack_set.remove(&canon);
        Ok(tree)
    }

    fn read_file(&mut self, target: &Path, scope: ScopeList, from: &str, line: u32) -> Result<Vec<BlockItem>, ParseError> {
        if !self.provider.exists(target) {
            tracing::warn!(file = from, line, read_file = %target.display(), "read file not found, nothing spliced");
            return Ok(Vec::new());
        }
        let text = self.provider.read_source(target).map_err(|e| {
            ParseError::io(from, format!("cannot read '{}': {}", target.display(), e))
        })?;
        let origin = ReadFileOrigin {
            path: target.to_path_buf(),
            depth: scope.depth(),
        };
        tracing::debug!(read_file = %target.display(), depth = origin.depth, "splicing read file");
        self.splice(target, &text, scope, Some(origin))
    }

    fn track_spatial_database(&mut self, input: &Input) {
        if !input.lhs().eq_ignore_ascii_case("spatial database") {
            return;
        }
        match input.rhs() {
            Some(v) if v.eq_ignore_ascii_case("off") => self.spatial_db = None,
            _ => self.spatial_db = input.files().first().map(|f| f.path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use crate::scope::Scope;
    use crate::source::InMemoryProvider;

    #[test]
    fn read_file_lines_are_spliced_under_the_open_scope() {
        let provider = InMemoryProvider::from_pairs([
            (
                "/m/m.tcf",
                "If Scenario == DEV\n  Read File == dev.trd\nEnd If\nTimestep == 2\n",
            ),
            ("/m/dev.trd", "Hardware == GPU\nIf Event == Q100\nEnd Time == 3\nEnd If\n"),
        ]);
        let parsed = load(Path::new("/m/m.tcf"), &provider).unwrap();
        let lhs: Vec<&str> = parsed.inputs.iter().map(|i| i.lhs()).collect();
        assert_eq!(lhs, vec!["Read File", "Hardware", "End Time", "Timestep"]);

        let hw = &parsed.inputs[1];
        assert_eq!(hw.scope().detailed(), vec![Scope::scenario("DEV")]);
        assert_eq!(hw.trd().unwrap().path, PathBuf::from("/m/dev.trd"));
        assert_eq!(hw.trd().unwrap().depth, 1);
        assert_eq!(
            parsed.inputs[2].scope().detailed(),
            vec![Scope::scenario("DEV"), Scope::event("Q100")]
        );
        assert!(parsed.inputs[3].scope().is_global());
        assert_eq!(parsed.read_files.len(), 1);
        assert_eq!(parsed.read_files[0].base_depth, 1);
    }

    #[test]
    fn read_file_cycle_is_detected() {
        let provider = InMemoryProvider::from_pairs([
            ("/m/m.tcf", "Read File == a.trd\n"),
            ("/m/a.trd", "Read File == b.trd\n"),
            ("/m/b.trd", "Read File == a.trd\n"),
        ]);
        let err = load(Path::new("/m/m.tcf"), &provider).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Cycle);
        assert!(err.message.contains("a.trd"));
    }

    #[test]
    fn missing_read_file_is_not_fatal() {
        let provider = InMemoryProvider::from_pairs([("/m/m.tcf", "Read File == gone.trd\n")]);
        let parsed = load(Path::new("/m/m.tcf"), &provider).unwrap();
        assert_eq!(parsed.inputs.len(), 1);
        assert!(parsed.inputs[0].has_missing_files());
    }

    #[test]
    fn spatial_database_turns_names_into_layers() {
        let provider = InMemoryProvider::from_pairs([
            ("/m/m.tgc", ""),
            ("/m/gis/model.gpkg", ""),
        ]);
        let text = "Spatial Database == gis\\model.gpkg\nRead GIS Code == 2d_code_R\n\
                    Spatial Database == OFF\nRead GIS Mat == 2d_mat_R\n";
        let parsed = parse_text(Path::new("/m/m.tgc"), text, &provider).unwrap();
        let code = &parsed.inputs[1];
        assert_eq!(code.files()[0].path, PathBuf::from("/m/gis/model.gpkg"));
        assert_eq!(code.files()[0].layer.as_deref(), Some("2d_code_R"));
        assert!(parsed.inputs[3].files().is_empty());
    }

    #[test]
    fn directive_depths_are_recorded() {
        let provider = InMemoryProvider::from_pairs([("/m/m.tcf", "")]);
        let text = "If Scenario == A\nIf Event == B\nX == 1\nEnd If\nElse\nY == 2\nEnd If\n";
        let parsed = parse_text(Path::new("/m/m.tcf"), text, &provider).unwrap();
        let depths: Vec<usize> = parsed.main.directives.iter().map(|d| d.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0, 0]);
    }

    #[test]
    fn missing_control_file_is_an_io_error() {
        let provider = InMemoryProvider::from_pairs([("/m/m.tcf", "")]);
        let err = load(Path::new("/m/other.tcf"), &provider).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Io);
    }
}
