//! Variable tokens, wildcard expansion and file-name helpers.
//!
//! `<<NAME>>` is a user variable, `<<~s1~>>` / `<<~e1~>>` are scenario and
//! event wildcards. Wildcards left in a file path after substitution are
//! matched against the file system one path component at a time.

use crate::source::SourceProvider;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<<([^<>]+)>>").expect("static regex"))
}

fn wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^~[se]\d*~$").expect("static regex"))
}

/// Bodies of every `<<...>>` token in `text`, in order.
pub fn variable_tokens(text: &str) -> Vec<String> {
    token_re()
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// True if `text` holds at least one `<<...>>` token.
pub fn contains_variable(text: &str) -> bool {
    token_re().is_match(text)
}

/// True for a scenario/event wildcard body such as `~s1~` or `~e~`.
pub fn is_wildcard_token(body: &str) -> bool {
    wildcard_re().is_match(body.trim())
}

/// Replace every `<<TOKEN>>` for which `lookup` has a value. Returns the
/// new text and the bodies of the tokens left in place.
pub fn substitute(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();
    let out = token_re().replace_all(text, |caps: &regex::Captures| {
        let body = caps[1].trim();
        match lookup(body) {
            Some(v) => v,
            None => {
                unresolved.push(body.to_string());
                caps[0].to_string()
            }
        }
    });
    (out.into_owned(), unresolved)
}

/// Convert a single path component holding `<<...>>` tokens (or `*`/`?`
/// globs) into an anchored, case-insensitive regex.
pub fn component_regex(component: &str) -> Regex {
    let mut re = String::from("(?i)^");
    let mut last = 0;
    for m in token_re().find_iter(component) {
        re.push_str(&glob_to_regex(&component[last..m.start()]));
        re.push_str(".*");
        last = m.end();
    }
    re.push_str(&glob_to_regex(&component[last..]));
    re.push('$');
    Regex::new(&re).unwrap_or_else(|_| Regex::new("^$").expect("static regex"))
}

fn glob_to_regex(literal: &str) -> String {
    let mut out = String::new();
    for c in literal.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// True if `text` holds `<<...>>` tokens or `*`/`?` globs.
pub fn has_pattern(text: &str) -> bool {
    contains_variable(text) || text.contains('*') || text.contains('?')
}

/// Expand wildcard tokens in `path` against the file system. A path
/// without wildcards is returned as-is when it exists, and dropped when
/// it does not.
pub fn expand_wildcards(provider: &dyn SourceProvider, path: &Path) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = vec![PathBuf::new()];
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy().to_string();
        let is_pattern = matches!(component, Component::Normal(_)) && has_pattern(&text);
        if !is_pattern {
            for c in candidates.iter_mut() {
                c.push(component.as_os_str());
            }
            continue;
        }
        let re = component_regex(&text);
        let mut next = Vec::new();
        for dir in &candidates {
            let listing = match provider.list_dir(dir) {
                Ok(l) => l,
                Err(_) => continue,
            };
            for entry in listing {
                let matched = entry
                    .file_name()
                    .map(|n| re.is_match(&n.to_string_lossy()))
                    .unwrap_or(false);
                if matched {
                    next.push(entry);
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }
    candidates.retain(|p| provider.exists(p));
    candidates.sort();
    candidates.dedup();
    candidates
}

/// Every file in `dir` matching a wildcard file-name `pattern`.
pub fn expand_and_get_files(provider: &dyn SourceProvider, dir: &Path, pattern: &str) -> Vec<PathBuf> {
    expand_wildcards(provider, &dir.join(normalise_separators(pattern)))
}

/// Control files are usually written on Windows; use `/` throughout.
pub fn normalise_separators(s: &str) -> String {
    s.replace('\\', "/")
}

/// Position of the first `>>` that is not the end of a `<<...>>` token.
fn layer_separator(value: &str) -> Option<usize> {
    let tokens: Vec<(usize, usize)> = token_re()
        .find_iter(value)
        .map(|m| (m.start(), m.end()))
        .collect();
    value
        .match_indices(">>")
        .map(|(i, _)| i)
        .find(|&i| !tokens.iter().any(|&(start, end)| i >= start && i < end))
}

/// Split a `path.gpkg >> layer` reference into database path and layer.
pub fn split_layer(value: &str) -> (String, Option<String>) {
    let Some(at) = layer_separator(value) else {
        return (value.trim().to_string(), None);
    };
    let (db, layer) = (&value[..at], value[at + 2..].trim());
    if layer.is_empty() {
        (db.trim().to_string(), None)
    } else {
        (db.trim().to_string(), Some(layer.to_string()))
    }
}

/// Heuristic: does this value text look like a file path?
pub fn looks_like_path(value: &str) -> bool {
    let v = crate::ast::unquote(value);
    if v.is_empty() {
        return false;
    }
    let (db, _) = split_layer(v);
    extension(&db).is_some() || db.contains('\\') || db.contains('/')
}

/// Lower-case extension (without the dot) of a path-like string.
pub fn extension(value: &str) -> Option<String> {
    let v = normalise_separators(crate::ast::unquote(value));
    let name = v.rsplit('/').next().unwrap_or(&v);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 6 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if ext.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<head>.*?)(?P<num>\d+)(?P<geom>_[PLRplr])?$").expect("static regex")
    })
}

/// Increment (`"auto"`) or set (`"005"`) the version number of a TUFLOW
/// style file name, keeping the number width and geometry suffix:
/// `2d_code_001_R.shp` → `2d_code_002_R.shp`. A name without a number part
/// gets `_001` (or the given number) appended.
pub fn increment_fpath(path: &Path, inc: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    let new_stem = match version_re().captures(&stem) {
        Some(caps) => {
            let num = &caps["num"];
            let replacement = if inc.eq_ignore_ascii_case("auto") {
                let n: u64 = num.parse().unwrap_or(0) + 1;
                format!("{:0width$}", n, width = num.len())
            } else {
                inc.to_string()
            };
            format!(
                "{}{}{}",
                &caps["head"],
                replacement,
                caps.name("geom").map(|m| m.as_str()).unwrap_or("")
            )
        }
        None => {
            let replacement = if inc.eq_ignore_ascii_case("auto") { "001" } else { inc };
            format!("{}_{}", stem, replacement)
        }
    };

    let file_name = match ext {
        Some(e) => format!("{}.{}", new_stem, e),
        None => new_stem,
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    #[test]
    fn finds_and_substitutes_tokens() {
        assert_eq!(variable_tokens("a<<CELL>>b<<~s1~>>"), vec!["CELL", "~s1~"]);
        let (out, left) = substitute("grid_<<CELL>>m_<<X>>.tif", &|t| {
            (t == "CELL").then(|| "5".to_string())
        });
        assert_eq!(out, "grid_5m_<<X>>.tif");
        assert_eq!(left, vec!["X"]);
    }

    #[test]
    fn recognises_wildcards() {
        assert!(is_wildcard_token("~s1~"));
        assert!(is_wildcard_token("~E~"));
        assert!(!is_wildcard_token("CELL"));
    }

    #[test]
    fn expands_component_wildcards() {
        let provider = InMemoryProvider::from_pairs([
            ("/m/gis/2d_code_001_R.shp", ""),
            ("/m/gis/2d_code_002_R.shp", ""),
            ("/m/gis/2d_mat_001_R.shp", ""),
        ]);
        let files = expand_and_get_files(&provider, Path::new("/m/gis"), "2d_code_<<~s~>>_R.shp");
        assert_eq!(
            files,
            vec![
                PathBuf::from("/m/gis/2d_code_001_R.shp"),
                PathBuf::from("/m/gis/2d_code_002_R.shp")
            ]
        );
    }

    #[test]
    fn expands_wildcard_directories() {
        let provider = InMemoryProvider::from_pairs([
            ("/m/DEV/zpts.tif", ""),
            ("/m/EXG/zpts.tif", ""),
        ]);
        let files = expand_wildcards(&provider, Path::new("/m/<<~s1~>>/zpts.tif"));
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn layer_split() {
        assert_eq!(
            split_layer("gis/model.gpkg >> 2d_code_R"),
            ("gis/model.gpkg".to_string(), Some("2d_code_R".to_string()))
        );
        assert_eq!(split_layer("a.shp"), ("a.shp".to_string(), None));
    }

    #[test]
    fn token_ends_are_not_layer_separators() {
        assert_eq!(
            split_layer("grid\\DEM_<<CELL>>.tif"),
            ("grid\\DEM_<<CELL>>.tif".to_string(), None)
        );
        assert_eq!(
            split_layer("gis/<<~s1~>>.gpkg >> 2d_code_<<~e1~>>"),
            ("gis/<<~s1~>>.gpkg".to_string(), Some("2d_code_<<~e1~>>".to_string()))
        );
        assert!(looks_like_path("m_<<~s1~>>.tgc"));
    }

    #[test]
    fn path_heuristics() {
        assert!(looks_like_path("gis\\2d_code.shp"));
        assert!(looks_like_path("model.tgc"));
        assert!(!looks_like_path("ON"));
        assert!(!looks_like_path("2.5"));
        assert_eq!(extension("A.SHP").as_deref(), Some("shp"));
    }

    #[test]
    fn increments_version_numbers() {
        assert_eq!(
            increment_fpath(Path::new("path/to/2d_code_001_R.shp"), "auto"),
            PathBuf::from("path/to/2d_code_002_R.shp")
        );
        assert_eq!(
            increment_fpath(Path::new("path/to/2d_code_001_R.shp"), "005"),
            PathBuf::from("path/to/2d_code_005_R.shp")
        );
        assert_eq!(
            increment_fpath(Path::new("M01_099.tcf"), "auto"),
            PathBuf::from("M01_100.tcf")
        );
        assert_eq!(
            increment_fpath(Path::new("model.tgc"), "auto"),
            PathBuf::from("model_001.tgc")
        );
    }
}
