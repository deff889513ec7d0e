use std::path::Path;
use std::process;

use tmf_eval::ResolveError;

use crate::{load_or_exit, print_json, report_error, report_parse_error, OutputFormat};

pub(crate) fn cmd_resolve(file: &Path, flags: &str, output: OutputFormat, quiet: bool) {
    let cf = load_or_exit(file, output, quiet);
    let run = match tmf_eval::context(&cf, flags) {
        Ok(run) => run,
        Err(ResolveError::Parse(e)) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
        Err(e) => {
            report_error(&format!("resolution error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&run.to_json()),
        OutputFormat::Text => {
            for i in run.inputs() {
                let value = match i.value() {
                    Ok(v) => v,
                    Err(u) => {
                        tracing::warn!(line = i.command().prov.line, "{}", u);
                        format!("{}  (unresolved: {})", u.raw, u.tokens.join(", "))
                    }
                };
                match i.rhs() {
                    Some(_) => println!(
                        "{}:{}  {} == {}",
                        i.owner().display(),
                        i.command().prov.line,
                        i.lhs(),
                        value
                    ),
                    None => println!("{}:{}  {}", i.owner().display(), i.command().prov.line, i.lhs()),
                }
            }
        }
    }
}
