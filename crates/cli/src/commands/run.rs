use std::path::Path;
use std::process;

use tmf_eval::{BinaryRegistry, ResolveError};

use crate::{load_or_exit, print_json, report_error, report_parse_error, OutputFormat};

pub(crate) fn cmd_run(
    file: &Path,
    registry: &BinaryRegistry,
    version: &str,
    flags: &str,
    dry_run: bool,
    output: OutputFormat,
    quiet: bool,
) {
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
    for m in run.missing_files() {
        tracing::warn!(file = %m.display(), "missing file");
    }

    if dry_run {
        let exe = match registry.resolve(version, run.precision()) {
            Ok(exe) => exe,
            Err(e) => {
                report_error(&e.to_string(), output, quiet);
                process::exit(1);
            }
        };
        let args = tmf_eval::launch_args(&run);
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "executable": exe,
                "args": args,
            })),
            OutputFormat::Text => println!("{} {}", exe.display(), args.join(" ")),
        }
        return;
    }

    match tmf_eval::spawn(registry, version, &run) {
        Ok(child) => match output {
            OutputFormat::Json => print_json(&serde_json::json!({ "pid": child.id() })),
            OutputFormat::Text => {
                if !quiet {
                    println!("started solver (pid {})", child.id());
                }
            }
        },
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}
