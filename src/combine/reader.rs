//! Reading a single module file.
//!
//! This is not a JavaScript parser. It understands exactly enough to find the `module(...)` call: comments, string
//! literals, identifiers and balanced braces. Regular expression literals are not recognised, so a regex
//! containing an unbalanced brace or quote inside a module body will confuse the brace matcher.

use std::path::Path;

use indexmap::IndexMap;

use super::{Module, ModuleKind, ScriptError, display, normalize};

/// Parse `source` as the module stored at `path`.
///
/// ## Parameters
///
/// - `path`: where the module lives; import paths are resolved against its directory.
/// - `source`: the file contents.
///
/// ## Returns
///
/// - The parsed module. Files that do not open with a `module(` call are returned as [`ModuleKind::Script`].
///
/// ## Errors
///
/// - `BadDeps` when the first argument is not an object of `name: 'path'` entries.
/// - `BadBody` when the second argument is not a function expression (an immediately invoked function included).
/// - `MissingReturn` when the body has no top-level `return`.
pub fn read_module(path: &Path, source: &str) -> Result<Module, ScriptError> {
    let shown = display(path);
    let syntax = |message: String| ScriptError::Syntax {
        path: shown.clone(),
        message,
    };
    let bad_deps = || ScriptError::BadDeps { path: shown.clone() };
    let bad_body = || ScriptError::BadBody { path: shown.clone() };

    let mut cur = Cursor::new(source);
    cur.skip_trivia().map_err(&syntax)?;
    let is_module = cur.ident() == Some("module") && {
        cur.skip_trivia().map_err(&syntax)?;
        cur.peek() == Some(b'(')
    };
    if !is_module {
        return Ok(Module {
            path: path.to_path_buf(),
            kind: ModuleKind::Script,
            imports: IndexMap::new(),
            param: None,
            body: source.to_string(),
        });
    }
    cur.bump();

    // Dependency object.
    cur.skip_trivia().map_err(&syntax)?;
    if !cur.eat(b'{') {
        return Err(bad_deps());
    }
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut imports = IndexMap::new();
    loop {
        cur.skip_trivia().map_err(&syntax)?;
        if cur.eat(b'}') {
            break;
        }
        let key = match cur.ident() {
            Some(ident) => ident.to_string(),
            None => cur.string().map_err(&syntax)?.ok_or_else(bad_deps)?,
        };
        cur.skip_trivia().map_err(&syntax)?;
        if !cur.eat(b':') {
            return Err(bad_deps());
        }
        cur.skip_trivia().map_err(&syntax)?;
        let target = cur.string().map_err(&syntax)?.ok_or_else(bad_deps)?;
        imports.insert(key, normalize(&base.join(target)));
        cur.skip_trivia().map_err(&syntax)?;
        if cur.eat(b',') {
            continue;
        }
        if cur.eat(b'}') {
            break;
        }
        return Err(bad_deps());
    }

    // Body function.
    cur.skip_trivia().map_err(&syntax)?;
    if !cur.eat(b',') {
        return Err(bad_body());
    }
    cur.skip_trivia().map_err(&syntax)?;
    if cur.ident() != Some("function") {
        return Err(bad_body());
    }
    cur.skip_trivia().map_err(&syntax)?;
    if cur.peek() != Some(b'(') {
        // named function expression
        if cur.ident().is_none() {
            return Err(bad_body());
        }
        cur.skip_trivia().map_err(&syntax)?;
    }
    if !cur.eat(b'(') {
        return Err(bad_body());
    }
    let params_start = cur.pos;
    while cur.peek().is_some_and(|b| b != b')') {
        cur.bump();
    }
    let params = &source[params_start..cur.pos];
    if !cur.eat(b')') {
        return Err(syntax("unterminated parameter list".into()));
    }
    let param = params
        .split(',')
        .next()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    cur.skip_trivia().map_err(&syntax)?;
    if cur.peek() != Some(b'{') {
        return Err(bad_body());
    }
    let (start, end) = cur.balanced_block().map_err(&syntax)?;
    let body = &source[start..end];

    cur.skip_trivia().map_err(&syntax)?;
    if !cur.eat(b')') {
        return Err(bad_body());
    }

    if !has_top_level_return(body).map_err(&syntax)? {
        return Err(ScriptError::MissingReturn { path: shown.clone() });
    }

    tracing::trace!(module = %shown, imports = imports.len(), "read module");
    Ok(Module {
        path: path.to_path_buf(),
        kind: ModuleKind::Module,
        imports,
        param,
        body: body.to_string(),
    })
}

/// Whether `body` contains `return` outside any nested braces.
fn has_top_level_return(body: &str) -> Result<bool, String> {
    let mut cur = Cursor::new(body);
    let mut depth = 0usize;
    loop {
        cur.skip_trivia()?;
        let Some(b) = cur.peek() else {
            return Ok(false);
        };
        match b {
            b'{' => {
                depth += 1;
                cur.bump();
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                cur.bump();
            }
            b'\'' | b'"' | b'`' => {
                cur.string()?;
            }
            _ => match cur.ident() {
                Some("return") if depth == 0 => return Ok(true),
                Some(_) => {}
                None => cur.bump(),
            },
        }
    }
}

/// Byte cursor over JavaScript-ish source.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        // Advance a whole char so `pos` stays on a char boundary.
        let width = self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
        self.pos += width;
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), String> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let rest = &self.src[self.pos + 2..];
                    match rest.find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => return Err("unterminated block comment".into()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        match bytes.get(start) {
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' || *b == b'$' => {}
            _ => return None,
        }
        let mut end = start + 1;
        while bytes
            .get(end)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$')
        {
            end += 1;
        }
        self.pos = end;
        Some(&self.src[start..end])
    }

    /// Read a quoted string literal if one starts here, returning its unescaped contents.
    fn string(&mut self) -> Result<Option<String>, String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"' | b'`')) => q,
            _ => return Ok(None),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.src[self.pos..].chars().next() else {
                return Err("unterminated string literal".into());
            };
            self.pos += c.len_utf8();
            match c {
                '\\' => {
                    let Some(escaped) = self.src[self.pos..].chars().next() else {
                        return Err("unterminated string literal".into());
                    };
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c if c as u32 == u32::from(quote) => return Ok(Some(out)),
                '\n' if quote != b'`' => return Err("newline in string literal".into()),
                c => out.push(c),
            }
        }
    }

    /// At a `{`, skip to just past the matching `}` and return the byte range of the contents.
    fn balanced_block(&mut self) -> Result<(usize, usize), String> {
        if !self.eat(b'{') {
            return Err("expected '{'".into());
        }
        let start = self.pos;
        let mut depth = 1usize;
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Err("unbalanced braces".into()),
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos;
                        self.pos += 1;
                        return Ok((start, end));
                    }
                    self.pos += 1;
                }
                Some(b'\'' | b'"' | b'`') => {
                    self.string()?;
                }
                Some(_) => self.bump(),
            }
        }
    }
}
