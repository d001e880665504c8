//! Deploy-time templating.
//!
//! Suite headers are rendered once at deployment with values from the deploy
//! config. Blocks:
//!
//! - `<?expr?>` is replaced with the value of `expr`
//! - `<!stmts!>` runs `name = expr` assignments, one per line (`#` comments
//!   and blank lines allowed); assigned names become template locals.
//!   `import os` / `import platform` lines are accepted and do nothing
//! - `<&file&>` is replaced with the rendered contents of an include file
//!
//! Expressions are small: a local name, a quoted string, `config.origin`,
//! `config.get('key')` with an optional default given positionally or as
//! `default='...'`, `platform.node()` and `os.path.abspath(expr)`. Dotted keys
//! reach into config sections.

use super::error::TemplateError;
use super::includes::{IncludePath, read_file};
use crate::config::Config;
use crate::context::machine_hostname;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum `<&include&>` nesting depth.
pub const MAX_INCLUDE_DEPTH: usize = 50;

static ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("Invalid assignment regex")
});

static IMPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+([A-Za-z_][A-Za-z0-9_.]*)$").expect("Invalid import regex"));

/// Modules whose functions expressions may call.
const KNOWN_MODULES: [&str; 3] = ["os", "os.path", "platform"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Eval,
    Exec,
    Include,
}

impl BlockKind {
    fn opener(self) -> &'static str {
        match self {
            BlockKind::Eval => "<?",
            BlockKind::Exec => "<!",
            BlockKind::Include => "<&",
        }
    }

    fn closer(self) -> &'static str {
        match self {
            BlockKind::Eval => "?>",
            BlockKind::Exec => "!>",
            BlockKind::Include => "&>",
        }
    }
}

const BLOCK_KINDS: [BlockKind; 3] = [BlockKind::Eval, BlockKind::Exec, BlockKind::Include];

#[derive(Debug, Clone, Copy)]
enum Token {
    Open(BlockKind),
    Close(&'static str),
}

/// A parsed template expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Str(String),
    Local(String),
    ConfigOrigin,
    ConfigGet { key: String, default: Option<String> },
    /// `platform.node()`: this machine's hostname.
    Hostname,
    /// `os.path.abspath(expr)`
    AbsPath(Box<Expr>),
}

/// Renderer for deploy templates.
#[derive(Debug)]
pub struct DeployTemplate<'a> {
    config: Option<&'a Config>,
    includes: &'a IncludePath,
    locals: BTreeMap<String, String>,
}

impl<'a> DeployTemplate<'a> {
    /// Create a renderer.
    ///
    /// `deploy_config_host` (this machine) and, when the config was loaded
    /// from a file, `deploy_config_path` are predefined locals.
    pub fn new(config: Option<&'a Config>, includes: &'a IncludePath) -> Self {
        let mut locals = BTreeMap::new();
        locals.insert("deploy_config_host".to_string(), machine_hostname());
        if let Some(origin) = config.and_then(|c| c.origin.as_ref()) {
            locals.insert("deploy_config_path".to_string(), origin.display().to_string());
        }
        Self {
            config,
            includes,
            locals,
        }
    }

    /// Render a template file.
    pub fn render_file(&self, path: &Path) -> Result<String, TemplateError> {
        let text = read_file(path)?;
        self.render_inner(&text, &path.display().to_string(), 0)
    }

    /// Render template text. `source` labels error messages.
    pub fn render(&self, text: &str, source: &str) -> Result<String, TemplateError> {
        self.render_inner(text, source, 0)
    }

    fn render_inner(&self, text: &str, source: &str, depth: usize) -> Result<String, TemplateError> {
        let mut locals = self.locals.clone();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let Some((offset, token)) = next_token(rest) else {
                out.push_str(rest);
                break;
            };

            out.push_str(&rest[..offset]);
            let start = pos + offset;
            let line = line_at(text, start);

            let kind = match token {
                Token::Close(delimiter) => {
                    return Err(TemplateError::UnexpectedDelimiter {
                        delimiter,
                        source: source.to_string(),
                        line,
                    });
                }
                Token::Open(kind) => kind,
            };

            let body_start = start + kind.opener().len();
            let body_len = text[body_start..].find(kind.closer()).ok_or_else(|| {
                TemplateError::UnterminatedBlock {
                    delimiter: kind.opener(),
                    source: source.to_string(),
                    line,
                }
            })?;
            let body = &text[body_start..body_start + body_len];

            match kind {
                BlockKind::Eval => {
                    out.push_str(&self.evaluate(body, &locals, source, line)?);
                }
                BlockKind::Exec => {
                    self.execute(body, &mut locals, source, line)?;
                }
                BlockKind::Include => {
                    let name = body.trim();
                    if depth >= MAX_INCLUDE_DEPTH {
                        return Err(TemplateError::IncludeTooDeep {
                            name: name.to_string(),
                            source: source.to_string(),
                        });
                    }
                    let (path, included) = self.includes.read(name, source)?;
                    out.push_str(&self.render_inner(
                        &included,
                        &path.display().to_string(),
                        depth + 1,
                    )?);
                }
            }

            pos = body_start + body_len + kind.closer().len();
        }

        Ok(out)
    }

    fn evaluate(
        &self,
        expr: &str,
        locals: &BTreeMap<String, String>,
        source: &str,
        line: usize,
    ) -> Result<String, TemplateError> {
        let invalid = |reason: String| TemplateError::InvalidExpression {
            expr: expr.to_string(),
            reason,
            source: source.to_string(),
            line,
        };

        let parsed = parse_expr(expr).map_err(invalid)?;
        self.value(parsed, locals).map_err(invalid)
    }

    fn value(&self, expr: Expr, locals: &BTreeMap<String, String>) -> Result<String, String> {
        match expr {
            Expr::Str(s) => Ok(s),
            Expr::Local(name) => locals
                .get(&name)
                .cloned()
                .ok_or_else(|| format!("name '{}' is not defined", name)),
            Expr::ConfigOrigin => self
                .config
                .and_then(|c| c.origin.as_ref())
                .map(|p| p.display().to_string())
                .ok_or_else(|| "no deploy config file is loaded".to_string()),
            Expr::ConfigGet { key, default } => {
                let config = self
                    .config
                    .ok_or_else(|| "no deploy config is loaded".to_string())?;
                match config.get(&key).map_err(|e| e.to_string())? {
                    Some(value) => Ok(value),
                    None => default.ok_or_else(|| format!("'{}' is not defined in the config", key)),
                }
            }
            Expr::Hostname => Ok(machine_hostname()),
            Expr::AbsPath(inner) => {
                let path = self.value(*inner, locals)?;
                std::path::absolute(&path)
                    .map(|p| p.display().to_string())
                    .map_err(|e| format!("cannot make '{}' absolute: {}", path, e))
            }
        }
    }

    fn execute(
        &self,
        body: &str,
        locals: &mut BTreeMap<String, String>,
        source: &str,
        first_line: usize,
    ) -> Result<(), TemplateError> {
        for (idx, statement) in body.lines().enumerate() {
            let statement = statement.trim();
            if statement.is_empty() || statement.starts_with('#') {
                continue;
            }
            let line = first_line + idx;

            if let Some(module) = IMPORT_REGEX.captures(statement)
                && KNOWN_MODULES.contains(&&module[1])
            {
                continue;
            }

            let caps = ASSIGNMENT_REGEX.captures(statement).ok_or_else(|| {
                TemplateError::UnsupportedStatement {
                    statement: statement.to_string(),
                    source: source.to_string(),
                    line,
                }
            })?;
            let value = self.evaluate(&caps[2], locals, source, line)?;
            locals.insert(caps[1].to_string(), value);
        }
        Ok(())
    }
}

/// Find the earliest block delimiter in `text`.
fn next_token(text: &str) -> Option<(usize, Token)> {
    for (idx, _) in text.char_indices() {
        let rest = &text[idx..];
        for kind in BLOCK_KINDS {
            if rest.starts_with(kind.opener()) {
                return Some((idx, Token::Open(kind)));
            }
            if rest.starts_with(kind.closer()) {
                return Some((idx, Token::Close(kind.closer())));
            }
        }
    }
    None
}

fn line_at(text: &str, byte_pos: usize) -> usize {
    text[..byte_pos].matches('\n').count() + 1
}

/// Parse a template expression.
fn parse_expr(src: &str) -> Result<Expr, String> {
    let mut parser = ExprParser { src, pos: 0 };
    parser.skip_ws();
    let expr = parser.primary()?;
    parser.skip_ws();
    if parser.pos != src.len() {
        return Err(format!("unexpected '{}'", &src[parser.pos..]));
    }
    Ok(expr)
}

struct ExprParser<'s> {
    src: &'s str,
    pos: usize,
}

impl ExprParser<'_> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(format!("expected '{}'", c))
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some('\'') | Some('"') => Ok(Expr::Str(self.string()?)),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let name = self.name();
                match name.as_str() {
                    "config.origin" => Ok(Expr::ConfigOrigin),
                    "config.get" => self.config_get(),
                    "platform.node" => {
                        self.expect('(')?;
                        self.expect(')')?;
                        Ok(Expr::Hostname)
                    }
                    "os.path.abspath" => {
                        self.expect('(')?;
                        self.skip_ws();
                        let inner = self.primary()?;
                        self.expect(')')?;
                        Ok(Expr::AbsPath(Box::new(inner)))
                    }
                    _ if name.contains('.') => Err(format!("unknown attribute '{}'", name)),
                    _ => Ok(Expr::Local(name)),
                }
            }
            Some(c) => Err(format!("unexpected '{}'", c)),
            None => Err("empty expression".to_string()),
        }
    }

    fn name(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        let name = self.rest()[..len].to_string();
        self.pos += len;
        name
    }

    fn config_get(&mut self) -> Result<Expr, String> {
        self.expect('(')?;
        self.skip_ws();
        let key = self.string()?;
        let mut default = None;

        self.skip_ws();
        if self.peek() == Some(',') {
            self.pos += 1;
            self.skip_ws();
            if self.rest().starts_with("default") {
                self.pos += "default".len();
                self.expect('=')?;
                self.skip_ws();
            }
            default = Some(self.string()?);
        }

        self.expect(')')?;
        Ok(Expr::ConfigGet { key, default })
    }

    fn string(&mut self) -> Result<String, String> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err("expected a quoted string".to_string()),
        };
        self.pos += 1;

        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos += idx + 1;
                    return Ok(value);
                }
                c => value.push(c),
            }
        }
        Err("unterminated string".to_string())
    }
}
