//! `tmf.toml` configuration.
//!
//! # Example
//!
//! ```toml
//! log_level = "info"
//! default_context = "-s1 DEV -e1 Q100"
//! binary_folders = ["C:/TUFLOW/releases"]
//!
//! [binaries]
//! "2023-03-AE" = "C:/TUFLOW/2023-03-AE/TUFLOW_iSP_w64.exe"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tmf_core::FileSystemProvider;
use tmf_eval::BinaryRegistry;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "tmf.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default log filter (`RUST_LOG` syntax).
    pub log_level: Option<String>,
    /// Context flags used when a command is given none.
    pub default_context: Option<String>,
    /// Solver executables by version name.
    pub binaries: BTreeMap<String, PathBuf>,
    /// Folders of release directories to scan for solver executables.
    pub binary_folders: Vec<PathBuf>,
}

/// Read and parse a config file.
pub fn read_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// The explicit config file, else `tmf.toml` when present, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    match explicit {
        Some(path) => read_config(path),
        None if Path::new(DEFAULT_CONFIG).is_file() => read_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

impl Config {
    /// Registry holding the configured binaries and every version found
    /// in the configured folders.
    pub fn registry(&self) -> BinaryRegistry {
        let mut registry = BinaryRegistry::new();
        for folder in &self.binary_folders {
            if let Err(e) = registry.register_folder(&FileSystemProvider, folder) {
                tracing::warn!(folder = %folder.display(), error = %e, "cannot scan binary folder");
            }
        }
        for (version, exe) in &self.binaries {
            registry.register(version, exe.clone());
        }
        registry
    }
}
