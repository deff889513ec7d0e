use std::path::Path;
use std::process;

use tmf_core::{Input, Scope};

use crate::{load_or_exit, print_json, report_parse_error, OutputFormat, ScopeView};

fn scopes_of(input: &Input, view: ScopeView) -> Vec<Scope> {
    match view {
        ScopeView::Detailed => input.scope_detailed(),
        ScopeView::Simple => input.scope_simplified(),
    }
}

pub(crate) fn cmd_inputs(file: &Path, recursive: bool, view: ScopeView, output: OutputFormat, quiet: bool) {
    let cf = load_or_exit(file, output, quiet);
    let inputs = match cf.get_inputs(recursive) {
        Ok(inputs) => inputs,
        Err(e) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = inputs
                .iter()
                .map(|i| {
                    serde_json::json!({
                        "id": i.id(),
                        "kind": i.kind(),
                        "file": i.owner(),
                        "line": i.command().prov.line,
                        "command": i.lhs(),
                        "rhs": i.rhs(),
                        "comment": i.comment(),
                        "scopes": scopes_of(i, view),
                        "files": i.files(),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows));
        }
        OutputFormat::Text => {
            for i in &inputs {
                let scopes: Vec<String> = scopes_of(i, view).iter().map(|s| s.to_string()).collect();
                println!(
                    "{}:{}  {}  [{}]",
                    i.owner().display(),
                    i.command().prov.line,
                    i,
                    scopes.join(", ")
                );
            }
            if !quiet {
                eprintln!("{} input(s)", inputs.len());
            }
        }
    }
}
