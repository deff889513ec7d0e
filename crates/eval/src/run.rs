//! Run-state accessors used by output readers and the solver launcher.

use crate::resolve::{ResolveError, RunState};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tmf_core::Input;

/// Floating point precision of the solver build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Precision {
    Single,
    Double,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)~([se])(\d*)~").expect("static regex"))
}

impl RunState {
    /// Last included input with the given command, searched across the
    /// whole model.
    fn last_setting(&self, lhs: &str) -> Option<Input> {
        self.inputs()
            .into_iter()
            .rev()
            .find(|i| i.lhs().eq_ignore_ascii_case(lhs))
    }

    fn folder(&self, lhs: &str) -> Result<Option<PathBuf>, ResolveError> {
        let Some(input) = self.last_setting(lhs) else {
            return Ok(None);
        };
        if let Err(u) = input.value() {
            return Err(ResolveError::unresolved(&input, &u));
        }
        Ok(input.files().first().map(|f| f.path.clone()))
    }

    fn model_dir(&self) -> &Path {
        self.control_file().dir()
    }

    /// `Output Folder`, or the control file's folder when not set.
    pub fn output_folder(&self) -> Result<PathBuf, ResolveError> {
        Ok(self
            .folder("output folder")?
            .unwrap_or_else(|| self.model_dir().to_path_buf()))
    }

    /// `Log Folder`, or `log` beside the control file when not set.
    pub fn log_folder(&self) -> Result<PathBuf, ResolveError> {
        Ok(self
            .folder("log folder")?
            .unwrap_or_else(|| self.model_dir().join("log")))
    }

    /// Result file name: the control file name with its `~s1~`/`~e1~`
    /// placeholders and `<<...>>` tokens filled from the context.
    pub fn result_name(&self) -> String {
        let stem = self
            .control_file()
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let (stem, _) = self.variables().substitute(&stem);
        let ctx = self.context();
        placeholder_re()
            .replace_all(&stem, |caps: &regex::Captures| {
                let slot = if caps[2].is_empty() {
                    1
                } else {
                    caps[2].parse().unwrap_or(1)
                };
                let found = if caps[1].eq_ignore_ascii_case("s") {
                    ctx.scenario(slot)
                } else {
                    ctx.event(slot)
                };
                found.map_or_else(|| caps[0].to_string(), str::to_string)
            })
            .into_owned()
    }

    /// `Model Precision`; single unless set to double.
    pub fn precision(&self) -> Precision {
        match self.last_setting("model precision").and_then(|i| i.value().ok()) {
            Some(v) if v.trim().to_ascii_lowercase().starts_with("double") => Precision::Double,
            _ => Precision::Single,
        }
    }

    /// Files referenced by included inputs that do not exist.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.control_file().missing_files(true).unwrap_or_default()
    }
}
