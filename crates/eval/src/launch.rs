//! Solver executables and launch arguments.
//!
//! The registry is an ordinary value built by the caller; nothing is
//! registered globally. Spawning hands back the child process and never
//! waits on it.

use crate::resolve::RunState;
use crate::run::Precision;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tmf_core::SourceProvider;

const SINGLE_EXE: &[&str] = &["TUFLOW_iSP_w64.exe", "TUFLOW_iSP.exe", "tuflow_isp"];
const DOUBLE_EXE: &[&str] = &["TUFLOW_iDP_w64.exe", "TUFLOW_iDP.exe", "tuflow_idp"];

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no solver registered as '{version}'")]
    UnknownVersion { version: String },
    #[error("control file not found: {path}")]
    NoControlFile { path: String },
    #[error("failed to start {exe}: {source}")]
    Spawn {
        exe: String,
        #[source]
        source: std::io::Error,
    },
}

/// Executables of one registered version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binary {
    pub single: Option<PathBuf>,
    pub double: Option<PathBuf>,
}

impl Binary {
    /// Executable for `precision`, falling back to the other build.
    pub fn executable(&self, precision: Precision) -> Option<&Path> {
        let (first, second) = match precision {
            Precision::Single => (&self.single, &self.double),
            Precision::Double => (&self.double, &self.single),
        };
        first.as_deref().or(second.as_deref())
    }
}

/// Version name → solver executables.
#[derive(Debug, Clone, Default)]
pub struct BinaryRegistry {
    versions: BTreeMap<String, Binary>,
}

fn file_name_is(path: &Path, names: &[&str]) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| names.iter().any(|x| x.eq_ignore_ascii_case(&n)))
}

impl BinaryRegistry {
    pub fn new() -> BinaryRegistry {
        BinaryRegistry::default()
    }

    /// Register an executable under `version`. The file name decides the
    /// precision; any other name serves both.
    pub fn register(&mut self, version: &str, exe: impl Into<PathBuf>) {
        let exe = exe.into();
        let entry = self.versions.entry(version.to_string()).or_default();
        if file_name_is(&exe, DOUBLE_EXE) {
            entry.double = Some(exe);
        } else if file_name_is(&exe, SINGLE_EXE) {
            entry.single = Some(exe);
        } else {
            entry.single = Some(exe.clone());
            entry.double = Some(exe);
        }
    }

    /// Register every release folder under `folder`: each sub-folder
    /// holding a solver executable becomes a version named after it.
    /// Returns the number of versions found.
    pub fn register_folder(&mut self, provider: &dyn SourceProvider, folder: &Path) -> std::io::Result<usize> {
        let mut found = 0;
        for dir in provider.list_dir(folder)? {
            let Ok(files) = provider.list_dir(&dir) else {
                continue;
            };
            let Some(version) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let exes: Vec<PathBuf> = files
                .into_iter()
                .filter(|f| file_name_is(f, SINGLE_EXE) || file_name_is(f, DOUBLE_EXE))
                .collect();
            if exes.is_empty() {
                continue;
            }
            for exe in exes {
                self.register(&version, exe);
            }
            tracing::debug!(version = %version, "registered solver");
            found += 1;
        }
        Ok(found)
    }

    pub fn get(&self, version: &str) -> Option<&Binary> {
        self.versions.get(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Executable for `version`; a path to an existing file is accepted
    /// as is.
    pub fn resolve(&self, version: &str, precision: Precision) -> Result<PathBuf, LaunchError> {
        if let Some(exe) = self.get(version).and_then(|b| b.executable(precision)) {
            return Ok(exe.to_path_buf());
        }
        let direct = Path::new(version);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        Err(LaunchError::UnknownVersion {
            version: version.to_string(),
        })
    }
}

/// Solver arguments for a run: `-b`, the context flags, then the control
/// file.
pub fn launch_args(run: &RunState) -> Vec<String> {
    let mut args = vec!["-b".to_string()];
    args.extend(run.context().to_args());
    args.push(run.control_file().path().display().to_string());
    args
}

/// The process command for a run, without starting it.
pub fn command(registry: &BinaryRegistry, version: &str, run: &RunState) -> Result<Command, LaunchError> {
    let tcf = run.control_file();
    if !tcf.provider().exists(tcf.path()) {
        return Err(LaunchError::NoControlFile {
            path: tcf.path().display().to_string(),
        });
    }
    let exe = registry.resolve(version, run.precision())?;
    let mut cmd = Command::new(&exe);
    cmd.args(launch_args(run)).current_dir(tcf.dir());
    Ok(cmd)
}

/// Start the solver. The caller owns the returned process.
pub fn spawn(registry: &BinaryRegistry, version: &str, run: &RunState) -> Result<Child, LaunchError> {
    let mut cmd = command(registry, version, run)?;
    tracing::info!(command = ?cmd, "starting solver");
    cmd.spawn().map_err(|source| LaunchError::Spawn {
        exe: format!("{:?}", cmd.get_program()),
        source,
    })
}
