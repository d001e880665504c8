//! Error type shared by both template processors.

use crate::error::EcfjobError;
use std::fmt;
use std::path::PathBuf;

/// Error type for template rendering failures.
///
/// `source` is the file (or a label such as `<string>`) being processed and
/// `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable was referenced but not provided and has no default.
    UndefinedVariable {
        name: String,
        source: String,
        line: usize,
    },
    /// A `%` opened a variable reference that is never closed on the line.
    UnmatchedMicro { source: String, line: usize },
    /// `%end` without an open `%manual`, `%comment` or `%nopp` block.
    UnmatchedEnd { source: String, line: usize },
    /// A `%manual`, `%comment` or `%nopp` block is never closed.
    UnclosedBlock {
        directive: String,
        source: String,
    },
    /// An include file is not in any include directory.
    IncludeNotFound {
        name: String,
        searched: Vec<PathBuf>,
        required_by: String,
    },
    /// Includes nest deeper than the limit (usually an include cycle).
    IncludeTooDeep { name: String, source: String },
    /// A `<?`, `<!` or `<&` block is never closed.
    UnterminatedBlock {
        delimiter: &'static str,
        source: String,
        line: usize,
    },
    /// A closing delimiter appears outside of any block.
    UnexpectedDelimiter {
        delimiter: &'static str,
        source: String,
        line: usize,
    },
    /// An expression could not be parsed or evaluated.
    InvalidExpression {
        expr: String,
        reason: String,
        source: String,
        line: usize,
    },
    /// A statement block contains something other than an assignment.
    UnsupportedStatement {
        statement: String,
        source: String,
        line: usize,
    },
    /// A template or include file could not be read.
    Io { path: PathBuf, message: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, source, line } => {
                write!(f, "{}:{}: undefined variable '{}'", source, line, name)
            }
            TemplateError::UnmatchedMicro { source, line } => {
                write!(f, "{}:{}: unmatched '%' in variable reference", source, line)
            }
            TemplateError::UnmatchedEnd { source, line } => {
                write!(f, "{}:{}: '%end' without an open block", source, line)
            }
            TemplateError::UnclosedBlock { directive, source } => {
                write!(f, "{}: '%{}' is never closed with '%end'", source, directive)
            }
            TemplateError::IncludeNotFound {
                name,
                searched,
                required_by,
            } => {
                let dirs: Vec<String> = searched.iter().map(|d| d.display().to_string()).collect();
                write!(
                    f,
                    "{} not found in {} (required by {})",
                    name,
                    if dirs.is_empty() {
                        "<no include directories>".to_string()
                    } else {
                        dirs.join(", ")
                    },
                    required_by
                )
            }
            TemplateError::IncludeTooDeep { name, source } => {
                write!(
                    f,
                    "{}: include of '{}' nests too deeply (include cycle?)",
                    source, name
                )
            }
            TemplateError::UnterminatedBlock {
                delimiter,
                source,
                line,
            } => {
                write!(f, "{}:{}: '{}' block is never closed", source, line, delimiter)
            }
            TemplateError::UnexpectedDelimiter {
                delimiter,
                source,
                line,
            } => {
                write!(f, "{}:{}: unexpected '{}'", source, line, delimiter)
            }
            TemplateError::InvalidExpression {
                expr,
                reason,
                source,
                line,
            } => {
                write!(
                    f,
                    "{}:{}: cannot evaluate '{}': {}",
                    source,
                    line,
                    expr.trim(),
                    reason
                )
            }
            TemplateError::UnsupportedStatement {
                statement,
                source,
                line,
            } => {
                write!(
                    f,
                    "{}:{}: unsupported statement '{}' (only 'name = expression' is allowed)",
                    source, line, statement
                )
            }
            TemplateError::Io { path, message } => {
                write!(f, "failed to read '{}': {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<TemplateError> for EcfjobError {
    fn from(err: TemplateError) -> Self {
        EcfjobError::TemplateError(err.to_string())
    }
}
