//! Emitting the combined script.

use std::collections::HashMap;
use std::path::Path;

use super::graph::Bundle;
use super::{Module, ModuleKind};

const INDENT: &str = "    ";

/// Generate the combined script for `bundle`.
///
/// Every non-root module becomes `var $combine$N = (function(imports) {...})({...});`, numbered in emission order,
/// and receives only the modules it imports. The root's closure runs last and is not assigned.
pub fn gen_code(bundle: &Bundle) -> String {
    let mut names: HashMap<&Path, String> = HashMap::new();
    let mut lines = vec!["(function() {".to_string()];
    let last = bundle.modules.len().saturating_sub(1);

    for (index, module) in bundle.modules.iter().enumerate() {
        let is_root = index == last;
        let name = format!("$combine${}", index + 1);
        let prefix = if is_root {
            INDENT.to_string()
        } else {
            format!("{INDENT}var {name} = ")
        };
        match module.kind {
            ModuleKind::Module => emit_module(&mut lines, &prefix, module, &names),
            ModuleKind::Script => emit_script(&mut lines, &prefix, module),
        }
        names.insert(module.path.as_path(), name);
    }

    lines.push("})();".to_string());
    lines.join("\n")
}

fn emit_module(lines: &mut Vec<String>, prefix: &str, module: &Module, names: &HashMap<&Path, String>) {
    let param = module.param.as_deref().unwrap_or("");
    lines.push(format!("{prefix}(function({param}) {{"));
    push_body(lines, &module.body);

    let entries: Vec<String> = module
        .imports
        .iter()
        .filter_map(|(import, path)| {
            names
                .get(path.as_path())
                .map(|var| format!("{INDENT}{INDENT}{import}: {var}"))
        })
        .collect();
    if entries.is_empty() {
        lines.push(format!("{INDENT}}})({{}});"));
    } else {
        lines.push(format!("{INDENT}}})({{"));
        lines.push(entries.join(",\n"));
        lines.push(format!("{INDENT}}});"));
    }
}

fn emit_script(lines: &mut Vec<String>, prefix: &str, module: &Module) {
    let inner = format!("{INDENT}{INDENT}");
    lines.push(format!("{prefix}(function() {{"));
    lines.push(format!("{inner}var $combine$exports;"));
    lines.push(format!("{inner}function define(deps, factory) {{"));
    lines.push(format!("{inner}{INDENT}$combine$exports = factory();"));
    lines.push(format!("{inner}}}"));
    lines.push(format!("{inner}define.amd = true;"));
    push_body(lines, &module.body);
    lines.push(format!("{inner}return $combine$exports;"));
    lines.push(format!("{INDENT}}})();"));
}

/// Append `body` dedented and re-indented two levels.
fn push_body(lines: &mut Vec<String>, body: &str) {
    for line in dedent(body) {
        if line.is_empty() {
            lines.push(line);
        } else {
            lines.push(format!("{INDENT}{INDENT}{line}"));
        }
    }
}

/// Strip leading and trailing blank lines and the common leading indentation.
fn dedent(body: &str) -> Vec<String> {
    let raw: Vec<&str> = body.lines().collect();
    let Some(start) = raw.iter().position(|l| !l.trim().is_empty()) else {
        return Vec::new();
    };
    let end = raw.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(start);
    let kept = &raw[start..=end];

    let leading = |l: &str| l.len() - l.trim_start_matches([' ', '\t']).len();
    let indent = kept
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading(*l))
        .min()
        .unwrap_or(0);

    kept.iter()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                l[indent.min(leading(*l))..].trim_end().to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use indexmap::IndexMap;

    use super::*;

    fn module(path: &str, imports: &[(&str, &str)], body: &str) -> Module {
        Module {
            path: PathBuf::from(path),
            kind: ModuleKind::Module,
            imports: imports
                .iter()
                .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
                .collect::<IndexMap<_, _>>(),
            param: Some("imports".to_string()),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("\n        a\n          b\n\n        c\n    "), vec!["a", "  b", "", "c"]);
        assert_eq!(dedent(" return 1; "), vec!["return 1;"]);
        assert!(dedent("  \n ").is_empty());
    }

    #[test]
    fn test_each_closure_gets_only_its_imports() {
        let bundle = Bundle {
            modules: vec![
                module("x.js", &[], " return 1; "),
                module("y.js", &[], " return 2; "),
                module("root.js", &[("x", "x.js")], "\n    return imports.x;\n"),
            ],
        };
        let code = gen_code(&bundle);
        assert_eq!(
            code,
            [
                "(function() {",
                "    var $combine$1 = (function(imports) {",
                "        return 1;",
                "    })({});",
                "    var $combine$2 = (function(imports) {",
                "        return 2;",
                "    })({});",
                "    (function(imports) {",
                "        return imports.x;",
                "    })({",
                "        x: $combine$1",
                "    });",
                "})();",
            ]
            .join("\n")
        );
    }
}
