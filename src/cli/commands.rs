//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::combine::{self, ModuleKind, ModuleSet, ScriptError};

use super::{CliError, CliResult, ExitCode};

fn script_error(err: ScriptError) -> CliError {
    let code = match err {
        ScriptError::MissingModule { .. } => ExitCode::MISSING,
        _ => ExitCode::FAILURE,
    };
    CliError::diagnostic(err, code)
}

/// Bundle `root` and write the script to `output` (or stdout).
pub fn combine(root: &Path, output: Option<&Path>) -> CliResult<ExitCode> {
    let bundle = combine::combine(root).map_err(script_error)?;
    let code = combine::gen_code(&bundle);
    match output {
        Some(path) => {
            fs::write(path, format!("{code}\n"))
                .map_err(|e| CliError::failure(format!("Error writing {}: {}", path.display(), e)))?;
            tracing::info!(modules = bundle.modules.len(), output = %path.display(), "wrote bundle");
        }
        None => println!("{code}"),
    }
    Ok(ExitCode::SUCCESS)
}

/// Print the module graph reachable from `root`.
///
/// Exits with `ExitCode::MISSING` when any module is missing.
pub fn list_modules(root: &Path, as_json: bool) -> CliResult<ExitCode> {
    let set = combine::read_modules(root).map_err(script_error)?;
    if as_json {
        println!("{}", render_json(&set));
    } else {
        print!("{}", render_text(&set));
    }
    Ok(if set.missing.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::MISSING
    })
}

fn render_text(set: &ModuleSet) -> String {
    let mut out = String::new();
    for (path, module) in &set.modules {
        let kind = match module.kind {
            ModuleKind::Module => "",
            ModuleKind::Script => " (script)",
        };
        out.push_str(&format!("{}{kind}\n", path.display()));
        for (name, target) in &module.imports {
            out.push_str(&format!("    {name} -> {}\n", target.display()));
        }
    }
    for (path, referrers) in &set.missing {
        let referrers: Vec<&str> = referrers.iter().map(String::as_str).collect();
        out.push_str(&format!(
            "missing: {} (referred to by: {})\n",
            path.display(),
            referrers.join(", ")
        ));
    }
    out
}

fn render_json(set: &ModuleSet) -> serde_json::Value {
    let modules: serde_json::Map<String, serde_json::Value> = set
        .modules
        .iter()
        .map(|(path, module)| {
            let imports: serde_json::Map<String, serde_json::Value> = module
                .imports
                .iter()
                .map(|(name, target)| (name.clone(), json!(target.display().to_string())))
                .collect();
            (path.display().to_string(), json!({ "imports": imports }))
        })
        .collect();
    let missing: serde_json::Map<String, serde_json::Value> = set
        .missing
        .iter()
        .map(|(path, referrers)| (path.display().to_string(), json!(referrers)))
        .collect();
    json!({
        "root": set.root.display().to_string(),
        "modules": modules,
        "missing": missing,
    })
}
