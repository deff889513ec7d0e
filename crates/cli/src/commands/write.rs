use std::path::Path;
use std::process;

use crate::{load_or_exit, print_json, report_error, OutputFormat};

pub(crate) fn cmd_write(file: &Path, out: &Path, output: OutputFormat, quiet: bool) {
    let cf = load_or_exit(file, output, quiet);
    let written = match cf.write_to(out) {
        Ok(w) => w,
        Err(e) => {
            report_error(&format!("write error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&serde_json::json!(written)),
        OutputFormat::Text => {
            if !quiet {
                for path in &written {
                    println!("wrote {}", path.display());
                }
            }
        }
    }
}
