//! Databases referenced from control files (BC database, materials and
//! soils tables).
//!
//! Rows keep file order; a lower-cased key index sits alongside for
//! case-insensitive lookups.

use crate::error::DatabaseError;
use crate::input::{resolve_path, DatabaseKind};
use crate::source::SourceProvider;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Database {
    path: PathBuf,
    kind: DatabaseKind,
    header: Vec<String>,
    rows: Vec<Row>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

impl Database {
    /// Read and parse a database through the source provider.
    pub fn load(provider: &dyn SourceProvider, path: &Path, kind: DatabaseKind) -> Result<Database, DatabaseError> {
        let text = provider
            .read_source(path)
            .map_err(|e| DatabaseError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), ?kind, "loading database");
        Database::parse(&text, path, kind)
    }

    pub fn parse(text: &str, path: &Path, kind: DatabaseKind) -> Result<Database, DatabaseError> {
        let (header, rows) = if is_csv(path) {
            parse_csv(text, path)?
        } else {
            (Vec::new(), parse_delimited(text))
        };
        let mut index = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.key.to_ascii_lowercase()).or_insert(i);
        }
        Ok(Database {
            path: path.to_path_buf(),
            kind,
            header,
            rows,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row by key, ignoring case. The first row wins on duplicate keys.
    pub fn get(&self, key: &str) -> Option<&Row> {
        self.index
            .get(&key.trim().to_ascii_lowercase())
            .and_then(|i| self.rows.get(*i))
    }

    /// Keys in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.key.as_str())
    }

    /// Value of a named column (CSV databases) for the row `key`.
    pub fn value(&self, key: &str, column: &str) -> Option<&str> {
        let col = self
            .header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))?;
        // values exclude the key column
        let row = self.get(key)?;
        col.checked_sub(1)
            .and_then(|c| row.values.get(c))
            .map(String::as_str)
    }

    /// Files referenced by the `Source` column of a BC database, resolved
    /// against the database folder.
    pub fn files(&self) -> Vec<PathBuf> {
        self.files_with(&|s| s.to_string())
    }

    /// As [`Database::files`], passing each source name through `subst`
    /// first (event substitutions in run state).
    pub fn files_with(&self, subst: &dyn Fn(&str) -> String) -> Vec<PathBuf> {
        if self.kind != DatabaseKind::BcDbase {
            return Vec::new();
        }
        let Some(col) = self.header.iter().position(|h| h.eq_ignore_ascii_case("source")) else {
            return Vec::new();
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let mut out: Vec<PathBuf> = Vec::new();
        for row in &self.rows {
            let source = if col == 0 {
                Some(row.key.as_str())
            } else {
                row.values.get(col - 1).map(String::as_str)
            };
            if let Some(s) = source.map(str::trim).filter(|s| !s.is_empty()) {
                let p = resolve_path(dir, &subst(s));
                if !out.contains(&p) {
                    out.push(p);
                }
            }
        }
        out
    }
}

fn parse_csv(text: &str, path: &Path) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'!'))
        .from_reader(text.as_bytes());
    let csv_err = |e: csv::Error| DatabaseError::csv(path, &e);
    let header: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(|h| h.is_empty()) {
        return Err(DatabaseError::MissingHeader {
            path: path.display().to_string(),
        });
    }
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let mut fields = record.iter().map(str::to_string);
        let key = fields.next().unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        rows.push(Row {
            key,
            values: fields.collect(),
        });
    }
    Ok((header, rows))
}

/// Whitespace or comma separated table without a header (`.tmf`,
/// `.tsoilf`). `!` and `#` start comments.
fn parse_delimited(text: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let code = line.split(['!', '#']).next().unwrap_or("");
        let mut fields = code
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let Some(key) = fields.next() else { continue };
        rows.push(Row {
            key,
            values: fields.collect(),
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    const BC_DBASE: &str = "Name,Source,Column 1,Column 2\n\
                            FC01,FC01_~ARI~.csv,Time,Flow\n\
                            ! a comment\n\
                            fc02,..\\shared\\FC02.csv,Time,Flow\n";

    #[test]
    fn csv_rows_and_case_insensitive_lookup() {
        let db = Database::parse(BC_DBASE, Path::new("/m/bc/bc_dbase.csv"), DatabaseKind::BcDbase).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.keys().collect::<Vec<_>>(), vec!["FC01", "fc02"]);
        assert_eq!(db.get("fc01").unwrap().values[0], "FC01_~ARI~.csv");
        assert_eq!(db.value("FC02", "Column 2"), Some("Flow"));
        assert!(db.get("FC03").is_none());
    }

    #[test]
    fn bc_sources_resolve_against_database_folder() {
        let db = Database::parse(BC_DBASE, Path::new("/m/bc/bc_dbase.csv"), DatabaseKind::BcDbase).unwrap();
        assert_eq!(
            db.files(),
            vec![
                PathBuf::from("/m/bc/FC01_~ARI~.csv"),
                PathBuf::from("/m/shared/FC02.csv")
            ]
        );
        let files = db.files_with(&|s| s.replace("~ARI~", "100yr"));
        assert_eq!(files[0], PathBuf::from("/m/bc/FC01_100yr.csv"));
    }

    #[test]
    fn materials_table_without_header() {
        let text = "! id  n\n1, 0.03\n2  0.06 ! grass\n";
        let db = Database::parse(text, Path::new("/m/mat.tmf"), DatabaseKind::Materials).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get("2").unwrap().values, vec!["0.06"]);
        assert!(db.files().is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let provider = InMemoryProvider::from_pairs([("/m/a.csv", "Name,Source\n")]);
        let err = Database::load(&provider, Path::new("/m/b.csv"), DatabaseKind::BcDbase).unwrap_err();
        assert!(matches!(err, DatabaseError::Io { .. }));
    }

    #[test]
    fn empty_csv_has_no_header() {
        let err = Database::parse("", Path::new("/m/a.csv"), DatabaseKind::BcDbase).unwrap_err();
        assert!(matches!(err, DatabaseError::MissingHeader { .. }));
    }
}
