use std::path::Path;
use std::process;

use tmf_core::InputKind;

use crate::{load_or_exit, print_json, report_parse_error, OutputFormat};

/// Parse the whole graph. Parse errors exit non-zero; missing files are
/// reported but do not fail the check.
pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let cf = load_or_exit(file, output, quiet);
    let inputs = match cf.get_inputs(true) {
        Ok(inputs) => inputs,
        Err(e) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let missing = match cf.missing_files(true) {
        Ok(m) => m,
        Err(e) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
    };
    let control_files = 1 + inputs
        .iter()
        .filter(|i| matches!(i.kind(), InputKind::ControlFile(_)))
        .count();

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "file": cf.path(),
            "control_files": control_files,
            "inputs": inputs.len(),
            "missing_files": missing,
        })),
        OutputFormat::Text => {
            for m in &missing {
                if !quiet {
                    println!("missing: {}", m.display());
                }
            }
            if !quiet {
                println!(
                    "ok: {} input(s), {} missing file(s)",
                    inputs.len(),
                    missing.len()
                );
            }
        }
    }
}
