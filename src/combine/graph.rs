//! Import graph: discovery from a root and dependency ordering.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Module, ScriptError, display, normalize, read_module};

/// Referrer recorded for a root module that does not exist.
pub const ROOT_REFERRER: &str = "<root>";

/// Result of walking the import graph.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    pub root: PathBuf,
    /// Every module that was found and parsed.
    pub modules: BTreeMap<PathBuf, Module>,
    /// Missing path to the paths importing it (`<root>` for the root itself).
    pub missing: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl ModuleSet {
    /// The first missing module (by path) as an error, if any.
    pub fn missing_error(&self) -> Option<ScriptError> {
        self.missing.iter().next().map(|(path, referrers)| ScriptError::MissingModule {
            path: display(path),
            referrers: referrers.iter().cloned().collect::<Vec<_>>().join(", "),
        })
    }
}

/// Read `root` and everything it imports, transitively.
///
/// Missing files are collected rather than reported; malformed files are errors.
#[tracing::instrument(skip_all, fields(root = %root.display()))]
pub fn read_modules(root: &Path) -> Result<ModuleSet, ScriptError> {
    let root = normalize(root);
    let mut set = ModuleSet {
        root: root.clone(),
        ..ModuleSet::default()
    };
    let mut queue: VecDeque<(PathBuf, String)> = VecDeque::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    queue.push_back((root, ROOT_REFERRER.to_string()));

    while let Some((path, referrer)) = queue.pop_front() {
        if !seen.insert(path.clone()) {
            if let Some(referrers) = set.missing.get_mut(&path) {
                referrers.insert(referrer);
            }
            continue;
        }
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(module = %path.display(), referrer = %referrer, "missing module");
                set.missing.entry(path).or_default().insert(referrer);
                continue;
            }
            Err(source) => {
                return Err(ScriptError::Io {
                    path: display(&path),
                    source,
                });
            }
        };
        let module = read_module(&path, &source)?;
        let referrer = display(&path);
        for target in module.imports.values() {
            queue.push_back((target.clone(), referrer.clone()));
        }
        set.modules.insert(path, module);
    }

    tracing::debug!(modules = set.modules.len(), missing = set.missing.len(), "read module graph");
    Ok(set)
}

/// A complete import graph in emission order.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Modules ordered so that each follows everything it imports; the root is last.
    pub modules: Vec<Module>,
}

impl Bundle {
    pub fn root(&self) -> Option<&Module> {
        self.modules.last()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.modules.iter().map(|m| m.path.clone()).collect()
    }
}

/// Read the graph rooted at `root` and order it for emission.
///
/// ## Errors
///
/// - `MissingModule` naming the first missing module and its referrers.
/// - `Cycle` when modules import each other.
pub fn combine(root: &Path) -> Result<Bundle, ScriptError> {
    let mut set = read_modules(root)?;
    if let Some(err) = set.missing_error() {
        return Err(err);
    }
    let order = topological_order(&set)?;
    let modules = order
        .into_iter()
        .filter_map(|path| set.modules.remove(&path))
        .collect();
    Ok(Bundle { modules })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Post-order depth-first walk from the root, visiting imports in declaration order.
fn topological_order(set: &ModuleSet) -> Result<Vec<PathBuf>, ScriptError> {
    let mut marks: BTreeMap<&Path, Mark> = BTreeMap::new();
    let mut order = Vec::new();
    let mut stack: Vec<&Path> = Vec::new();
    visit(set, &set.root, &mut marks, &mut stack, &mut order)?;
    Ok(order)
}

fn visit<'s>(
    set: &'s ModuleSet,
    path: &'s Path,
    marks: &mut BTreeMap<&'s Path, Mark>,
    stack: &mut Vec<&'s Path>,
    order: &mut Vec<PathBuf>,
) -> Result<(), ScriptError> {
    match marks.get(path) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|p| *p == path).unwrap_or(0);
            let mut chain: Vec<String> = stack[start..].iter().map(|p| display(p)).collect();
            chain.push(display(path));
            return Err(ScriptError::Cycle {
                chain: chain.join(" -> "),
            });
        }
        None => {}
    }
    let Some(module) = set.modules.get(path) else {
        return Ok(());
    };
    marks.insert(path, Mark::Visiting);
    stack.push(path);
    for target in module.imports.values() {
        visit(set, target, marks, stack, order)?;
    }
    stack.pop();
    marks.insert(path, Mark::Done);
    order.push(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fixtree-graph-{}-{}", std::process::id(), rand::random::<u32>()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_diamond_orders_shared_import_once() {
        let dir = dir();
        fs::write(dir.join("shared.js"), "module({}, function() { return 0; });").unwrap();
        fs::write(dir.join("l.js"), "module({s: 'shared.js'}, function(imports) { return 1; });").unwrap();
        fs::write(dir.join("r.js"), "module({s: 'shared.js'}, function(imports) { return 2; });").unwrap();
        fs::write(
            dir.join("top.js"),
            "module({l: 'l.js', r: 'r.js'}, function(imports) { return 3; });",
        )
        .unwrap();

        let bundle = combine(&dir.join("top.js")).unwrap();
        let names: Vec<String> = bundle
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["shared.js", "l.js", "r.js", "top.js"]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let dir = dir();
        fs::write(dir.join("me.js"), "module({me: 'me.js'}, function(imports) { return 1; });").unwrap();
        let err = combine(&dir.join("me.js")).unwrap_err();
        assert!(matches!(err, ScriptError::Cycle { .. }), "{err}");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_referrers_accumulate() {
        let dir = dir();
        fs::write(dir.join("a.js"), "module({x: 'gone.js', b: 'b.js'}, function(imports) { return 1; });").unwrap();
        fs::write(dir.join("b.js"), "module({x: 'gone.js'}, function(imports) { return 1; });").unwrap();
        let set = read_modules(&dir.join("a.js")).unwrap();
        let referrers = &set.missing[&dir.join("gone.js")];
        assert_eq!(referrers.len(), 2);
        fs::remove_dir_all(dir).unwrap();
    }
}
