//! Command inference: build a full command line from a bare value.
//!
//! `gis/2d_code_001_R.shp` becomes `Read GIS Code == gis\2d_code_001_R.shp`,
//! `DEM.tif` becomes `Read Grid Zpts == DEM.tif`, a `.tgc` becomes a
//! `Geometry Control File` reference and so on. Text that is already a
//! command, or is not a path, is returned unchanged.

use crate::input::{ControlFileKind, DatabaseKind, Input, InputKind};
use crate::keywords;
use crate::lexer::SEPARATOR;
use crate::patterns::{self, normalise_separators, split_layer};
use std::path::{Component, Path, PathBuf};

const GIS_EXTENSIONS: &[&str] = &["shp", "mif", "mid", "tab", "gpkg", "gdb"];
const GRID_EXTENSIONS: &[&str] = &["tif", "tiff", "gtif", "asc", "flt", "dem", "nc"];

/// TUFLOW GIS filename prefixes and the `Read GIS` type they imply.
const GIS_TYPES: &[(&str, &str)] = &[
    ("2d_code", "Code"),
    ("2d_mat", "Mat"),
    ("2d_zsh", "Z Shape"),
    ("2d_bc", "BC"),
    ("2d_po", "PO"),
    ("1d_nwk", "Network"),
    ("2d_loc", "Location"),
    ("2d_sa", "SA"),
    ("2d_rf", "RF"),
    ("2d_zln", "Z Line"),
    ("2d_zpt", "Z Pts"),
    ("2d_soil", "Soil"),
];

/// One value of a command being built: a file or an attribute index.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Path(PathBuf),
    Attribute(u32),
}

/// Variant implied by a file extension.
pub fn kind_for_extension(ext: &str) -> Option<InputKind> {
    let ext = ext.to_ascii_lowercase();
    if GIS_EXTENSIONS.contains(&ext.as_str()) {
        return Some(InputKind::Gis);
    }
    if GRID_EXTENSIONS.contains(&ext.as_str()) {
        return Some(InputKind::Grid);
    }
    match ext.as_str() {
        "trd" => Some(InputKind::File),
        "csv" => Some(InputKind::Database(DatabaseKind::BcDbase)),
        "tmf" => Some(InputKind::Database(DatabaseKind::Materials)),
        "tsoilf" => Some(InputKind::Database(DatabaseKind::Soils)),
        _ => match ControlFileKind::from_extension(&ext) {
            ControlFileKind::Other | ControlFileKind::Tcf | ControlFileKind::Trd => None,
            k => Some(InputKind::ControlFile(k)),
        },
    }
}

/// `Read GIS` type implied by a TUFLOW filename prefix.
pub fn gis_type(path: &Path) -> Option<&'static str> {
    let (db, layer) = split_layer(&path.to_string_lossy());
    let name = match layer {
        Some(l) => l,
        None => Path::new(&db)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
    };
    let name = name.to_ascii_lowercase();
    GIS_TYPES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, t)| *t)
}

fn keyword_for(path: &Path) -> Option<String> {
    let ext = patterns::extension(&path.to_string_lossy())?;
    let kind = kind_for_extension(&ext)?;
    let kw = match kind {
        InputKind::Gis => match gis_type(path) {
            Some(t) => format!("Read GIS {}", t),
            None => "Read GIS".to_string(),
        },
        InputKind::Grid => "Read Grid Zpts".to_string(),
        InputKind::File => "Read File".to_string(),
        InputKind::Database(DatabaseKind::BcDbase) => "BC Database".to_string(),
        InputKind::Database(DatabaseKind::Materials) => "Read Materials File".to_string(),
        InputKind::Database(DatabaseKind::Soils) => "Read Soils File".to_string(),
        InputKind::ControlFile(k) => keywords::control_file_command(k)?.to_string(),
        _ => return None,
    };
    Some(kw)
}

/// Path text as written in a control file in `base_dir`: relative where
/// possible, with Windows separators.
pub fn relative_text(path: &Path, base_dir: &Path) -> String {
    let rel = if path.is_absolute() && base_dir.is_absolute() {
        relative_path(path, base_dir).unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    normalise_separators(&rel.to_string_lossy()).replace('/', "\\")
}

fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    let p: Vec<Component> = path.components().collect();
    let b: Vec<Component> = base.components().collect();
    if p.first() != b.first() {
        return None;
    }
    let common = p.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let mut out = PathBuf::new();
    for _ in common..b.len() {
        out.push("..");
    }
    for c in &p[common..] {
        out.push(c.as_os_str());
    }
    Some(out)
}

fn anchor_keyword(anchor: Option<&Input>, first: &Path) -> Option<String> {
    let anchor = anchor?;
    let ext = patterns::extension(&first.to_string_lossy())?;
    let kind = kind_for_extension(&ext)?;
    // csv files serve both BC and materials databases
    let same = anchor.kind() == kind
        || (ext.eq_ignore_ascii_case("csv") && matches!(anchor.kind(), InputKind::Database(_)));
    same.then(|| anchor.lhs().to_string())
}

/// Build one command from a value list. Files come first, a trailing
/// attribute index is appended as ` | N`. Returns `None` when the list
/// holds no file with a recognised extension.
pub fn build_command(values: &[CommandValue], base_dir: &Path, anchor: Option<&Input>) -> Option<String> {
    let first = values.iter().find_map(|v| match v {
        CommandValue::Path(p) => Some(p.as_path()),
        CommandValue::Attribute(_) => None,
    })?;
    let keyword = anchor_keyword(anchor, first).or_else(|| keyword_for(first))?;
    let parts: Vec<String> = values
        .iter()
        .map(|v| match v {
            CommandValue::Path(p) => relative_text(p, base_dir),
            CommandValue::Attribute(n) => n.to_string(),
        })
        .collect();
    Some(format!("{} {} {}", keyword, SEPARATOR, parts.join(" | ")))
}

/// One command per inferred GIS type; files of the same type are joined.
pub fn build_gis_commands(paths: &[PathBuf], base_dir: &Path) -> Vec<String> {
    let mut groups: Vec<(String, Vec<CommandValue>)> = Vec::new();
    for p in paths {
        let Some(kw) = keyword_for(p) else {
            tracing::warn!(path = %p.display(), "no command inferred for file");
            continue;
        };
        match groups.iter_mut().find(|(k, _)| *k == kw) {
            Some((_, v)) => v.push(CommandValue::Path(p.clone())),
            None => groups.push((kw, vec![CommandValue::Path(p.clone())])),
        }
    }
    groups
        .iter()
        .filter_map(|(_, values)| build_command(values, base_dir, None))
        .collect()
}

/// Turn user text into a command line. Full commands (containing `==`) and
/// non-path text pass through; bare paths (optionally `|`-separated, with
/// a trailing attribute index) get a keyword.
pub fn guess_command_from_text(text: &str, base_dir: &Path, anchor: Option<&Input>) -> String {
    let trimmed = text.trim();
    if trimmed.contains(SEPARATOR) || trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with('#') {
        return text.to_string();
    }
    let mut values = Vec::new();
    for part in trimmed.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        if let Ok(n) = part.parse::<u32>() {
            values.push(CommandValue::Attribute(n));
        } else if patterns::looks_like_path(part) {
            values.push(CommandValue::Path(PathBuf::from(normalise_separators(part))));
        } else {
            return text.to_string();
        }
    }
    match build_command(&values, base_dir, anchor) {
        Some(cmd) => cmd,
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_gis_keywords_from_prefix() {
        let base = Path::new("/model");
        let cmd = build_command(
            &[CommandValue::Path("/model/gis/2d_code_001_R.shp".into())],
            base,
            None,
        );
        assert_eq!(cmd.as_deref(), Some("Read GIS Code == gis\\2d_code_001_R.shp"));
    }

    #[test]
    fn attribute_index_is_appended() {
        let cmd = build_command(
            &[
                CommandValue::Path("/model/gis/2d_mat_001_R.shp".into()),
                CommandValue::Attribute(2),
            ],
            Path::new("/model"),
            None,
        );
        assert_eq!(cmd.as_deref(), Some("Read GIS Mat == gis\\2d_mat_001_R.shp | 2"));
    }

    #[test]
    fn same_type_files_are_joined() {
        let cmds = build_gis_commands(
            &[
                "/model/gis/2d_code_001_R.shp".into(),
                "/model/gis/2d_zsh_L.shp".into(),
                "/model/gis/2d_zsh_P.shp".into(),
            ],
            Path::new("/model"),
        );
        assert_eq!(
            cmds,
            vec![
                "Read GIS Code == gis\\2d_code_001_R.shp",
                "Read GIS Z Shape == gis\\2d_zsh_L.shp | gis\\2d_zsh_P.shp",
            ]
        );
    }

    #[test]
    fn other_extensions() {
        let base = Path::new("/model/runs");
        assert_eq!(
            guess_command_from_text("..\\model\\M01.tgc", base, None),
            "Geometry Control File == ..\\model\\M01.tgc"
        );
        assert_eq!(guess_command_from_text("DEM.tif", base, None), "Read Grid Zpts == DEM.tif");
        assert_eq!(guess_command_from_text("a.trd", base, None), "Read File == a.trd");
        assert_eq!(guess_command_from_text("bc\\bc_dbase.csv", base, None), "BC Database == bc\\bc_dbase.csv");
    }

    #[test]
    fn non_paths_and_commands_pass_through() {
        let base = Path::new("/model");
        assert_eq!(guess_command_from_text("Tutorial Model == ON", base, None), "Tutorial Model == ON");
        assert_eq!(guess_command_from_text("Pause", base, None), "Pause");
    }

    #[test]
    fn relative_paths_climb_out_of_base() {
        assert_eq!(
            relative_text(Path::new("/m/model/gis/a.shp"), Path::new("/m/runs")),
            "..\\model\\gis\\a.shp"
        );
    }
}
