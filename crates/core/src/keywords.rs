//! Command keyword → input variant lookup.
//!
//! Built once on first use. Exact keywords are checked first, then keyword
//! prefixes (`Read GIS ...`, `Read Grid ...`).

use crate::input::{ControlFileKind, DatabaseKind, InputKind};
use std::collections::HashMap;
use std::sync::OnceLock;

const CONTROL_FILE_COMMANDS: &[(&str, ControlFileKind)] = &[
    ("geometry control file", ControlFileKind::Tgc),
    ("bc control file", ControlFileKind::Tbc),
    ("estry control file", ControlFileKind::Ecf),
    ("estry control file auto", ControlFileKind::Ecf),
    ("1d control file", ControlFileKind::Ecf),
    ("event file", ControlFileKind::Tef),
    ("read operating controls file", ControlFileKind::Toc),
    ("operating controls file", ControlFileKind::Toc),
    ("rainfall control file", ControlFileKind::Trfc),
    ("quadtree control file", ControlFileKind::Qcf),
    ("external stress file", ControlFileKind::Tesf),
    ("swmm control file", ControlFileKind::Tscf),
];

const DATABASE_COMMANDS: &[(&str, DatabaseKind)] = &[
    ("bc database", DatabaseKind::BcDbase),
    ("read materials file", DatabaseKind::Materials),
    ("read soils file", DatabaseKind::Soils),
    ("pit inlet database", DatabaseKind::PitInlet),
    ("depth discharge database", DatabaseKind::DepthDischarge),
];

const FILE_COMMANDS: &[&str] = &[
    "read file",
    "output folder",
    "log folder",
    "write check files",
    "spatial database",
    "read restart file",
    "read rowcol",
];

const GIS_PREFIXES: &[&str] = &["read gis", "read mi"];
const GRID_PREFIXES: &[&str] = &["read grid", "read tin"];

fn table() -> &'static HashMap<&'static str, InputKind> {
    static TABLE: OnceLock<HashMap<&'static str, InputKind>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        for (kw, kind) in CONTROL_FILE_COMMANDS {
            m.insert(*kw, InputKind::ControlFile(*kind));
        }
        for (kw, kind) in DATABASE_COMMANDS {
            m.insert(*kw, InputKind::Database(*kind));
        }
        for kw in FILE_COMMANDS {
            m.insert(*kw, InputKind::File);
        }
        m
    })
}

/// Classify a command keyword. Unknown keywords are settings.
pub fn classify_keyword(lhs: &str) -> InputKind {
    if lhs.trim().is_empty() {
        return InputKind::Comment;
    }
    let kw = lhs.to_ascii_lowercase();
    if let Some(kind) = table().get(kw.as_str()) {
        return *kind;
    }
    if GRID_PREFIXES.iter().any(|p| has_word_prefix(&kw, p)) {
        return InputKind::Grid;
    }
    if GIS_PREFIXES.iter().any(|p| has_word_prefix(&kw, p)) {
        return InputKind::Gis;
    }
    InputKind::Setting
}

/// Keyword used to reference a control file of the given kind.
pub fn control_file_command(kind: ControlFileKind) -> Option<&'static str> {
    match kind {
        ControlFileKind::Tgc => Some("Geometry Control File"),
        ControlFileKind::Tbc => Some("BC Control File"),
        ControlFileKind::Ecf => Some("ESTRY Control File"),
        ControlFileKind::Tef => Some("Event File"),
        ControlFileKind::Toc => Some("Read Operating Controls File"),
        ControlFileKind::Trfc => Some("Rainfall Control File"),
        ControlFileKind::Qcf => Some("Quadtree Control File"),
        ControlFileKind::Tesf => Some("External Stress File"),
        ControlFileKind::Tscf => Some("SWMM Control File"),
        ControlFileKind::Tcf | ControlFileKind::Trd | ControlFileKind::Other => None,
    }
}

fn has_word_prefix(kw: &str, prefix: &str) -> bool {
    kw == prefix
        || kw
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(' '))
}
