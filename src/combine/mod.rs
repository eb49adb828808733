//! Module bundler.
//!
//! Combines a root module and everything it transitively imports into one script. A module file has the shape
//!
//! ```text
//! module({a: 'a.js', b: 'subdir/b.js'}, function(imports) {
//!     ...
//!     return exports;
//! });
//! ```
//!
//! Import paths are relative to the importing file. Files that do not start with a `module(...)` call are treated
//! as plain scripts in the AMD style: they have no imports and export whatever they pass to `define`.
//!
//! ## Pipeline
//!
//! 1. [`read_module`] parses a single file,
//! 2. [`read_modules`] walks the import graph from a root and records missing files,
//! 3. [`combine`] orders the graph so every module follows its imports,
//! 4. [`gen_code`] emits the combined script.

mod codegen;
mod graph;
mod reader;

use std::io;
use std::path::{Component, Path, PathBuf};

use fixtree_core::{ErrorKind, Failure};
use indexmap::IndexMap;
use miette::Diagnostic;
use thiserror::Error;

pub use codegen::gen_code;
pub use graph::{Bundle, ModuleSet, ROOT_REFERRER, combine, read_modules};
pub use reader::read_module;

/// Errors raised while reading or combining modules.
#[derive(Debug, Error, Diagnostic)]
pub enum ScriptError {
    #[error("Module '{path}' is missing, referred to by: {referrers}")]
    #[diagnostic(code(fixtree::combine::missing_module))]
    MissingModule { path: String, referrers: String },

    #[error("Bad deps")]
    #[diagnostic(
        code(fixtree::combine::bad_deps),
        help("the first argument of `module` in {path} must be an object of name: 'path' entries")
    )]
    BadDeps { path: String },

    #[error("Bad module body")]
    #[diagnostic(
        code(fixtree::combine::bad_body),
        help("the second argument of `module` in {path} must be a function expression")
    )]
    BadBody { path: String },

    #[error("Module '{path}' has no top-level return statement")]
    #[diagnostic(code(fixtree::combine::missing_return))]
    MissingReturn { path: String },

    #[error("Malformed module '{path}': {message}")]
    #[diagnostic(code(fixtree::combine::syntax))]
    Syntax { path: String, message: String },

    #[error("Dependency cycle: {chain}")]
    #[diagnostic(code(fixtree::combine::cycle))]
    Cycle { chain: String },

    #[error("Failed to read '{path}': {source}")]
    #[diagnostic(code(fixtree::combine::io))]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ScriptError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ScriptError
    }
}

impl From<ScriptError> for Failure {
    fn from(err: ScriptError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

/// How a file was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// A `module({...}, function(imports) {...})` call.
    Module,
    /// Anything else; wrapped with an AMD `define` shim.
    Script,
}

/// A parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub path: PathBuf,
    pub kind: ModuleKind,
    /// Import name to normalized path, in declaration order.
    pub imports: IndexMap<String, PathBuf>,
    /// Name of the body function's parameter, if it has one.
    pub param: Option<String>,
    /// Source between the body function's braces (the whole file for scripts).
    pub body: String,
}

/// Lexically normalize a path: drop `.` components and fold `dir/..` pairs.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Display form used in messages and generated code.
pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c.js")), PathBuf::from("a/c.js"));
        assert_eq!(normalize(Path::new("combine/subdir/../a.js")), PathBuf::from("combine/a.js"));
        assert_eq!(normalize(Path::new("../x.js")), PathBuf::from("../x.js"));
        assert_eq!(normalize(Path::new("a/../../x.js")), PathBuf::from("../x.js"));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
        assert_eq!(normalize(Path::new("/../x.js")), PathBuf::from("/x.js"));
    }

    #[test]
    fn test_errors_are_script_errors() {
        let err = ScriptError::BadDeps { path: "m.js".into() };
        assert_eq!(err.to_string(), "Bad deps");
        let failure = Failure::from(err);
        assert_eq!(failure.kind, ErrorKind::ScriptError);
        assert_eq!(failure.message, "Bad deps");
    }
}
