use std::path::Path;
use std::process;

use crate::{load_or_exit, print_json, report_parse_error, OutputFormat};

pub(crate) fn cmd_files(file: &Path, missing: bool, output: OutputFormat, quiet: bool) {
    let cf = load_or_exit(file, output, quiet);
    let listed = if missing {
        cf.missing_files(true)
    } else {
        cf.get_files(true)
    };
    let files = match listed {
        Ok(f) => f,
        Err(e) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&serde_json::json!(files)),
        OutputFormat::Text => {
            for f in &files {
                println!("{}", f.display());
            }
        }
    }
}
