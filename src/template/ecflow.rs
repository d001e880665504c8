//! ecFlow-style job script preprocessing.
//!
//! Supports the subset of ecFlow's preprocessor the suite's headers use:
//!
//! - `%VAR%` substitutes a variable, `%VAR:default%` falls back to `default`
//! - `%%` renders a literal `%`
//! - `%include <file>`, `%includeonce <file>`, `%includenopp <file>`
//! - `%manual` / `%comment` blocks (dropped) and `%nopp` blocks (verbatim),
//!   each closed by `%end`
//! - `%ecfmicro X` switches the micro character for the rest of the job
//!
//! Directives are only recognised at the start of a line.

use super::error::TemplateError;
use super::includes::{IncludePath, read_file};
use crate::context::VarMap;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default micro character.
pub const DEFAULT_MICRO: char = '%';

/// Maximum include nesting depth.
pub const MAX_INCLUDE_DEPTH: usize = 50;

/// Include directive, matched after the micro character.
static INCLUDE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^include(once|nopp)?\s*<([^>]+)>\s*$").expect("Invalid include regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    /// `%manual` / `%comment`: lines are dropped.
    Skip,
    /// `%nopp`: lines are copied without substitution.
    Verbatim,
}

struct State {
    micro: char,
    included: HashSet<PathBuf>,
}

/// Preprocessor for ecFlow job scripts.
#[derive(Debug)]
pub struct Preprocessor<'a> {
    vars: &'a VarMap,
    includes: &'a IncludePath,
}

impl<'a> Preprocessor<'a> {
    pub fn new(vars: &'a VarMap, includes: &'a IncludePath) -> Self {
        Self { vars, includes }
    }

    /// Preprocess a script file.
    pub fn process_file(&self, path: &Path) -> Result<String, TemplateError> {
        let text = read_file(path)?;
        let mut state = State {
            micro: DEFAULT_MICRO,
            included: HashSet::new(),
        };
        state.included.insert(include_key(path));

        let mut out = String::with_capacity(text.len());
        self.process(&text, &path.display().to_string(), &mut state, 0, &mut out)?;
        Ok(out)
    }

    /// Preprocess script text. `source` labels error messages.
    pub fn process_str(&self, text: &str, source: &str) -> Result<String, TemplateError> {
        let mut state = State {
            micro: DEFAULT_MICRO,
            included: HashSet::new(),
        };
        let mut out = String::with_capacity(text.len());
        self.process(text, source, &mut state, 0, &mut out)?;
        Ok(out)
    }

    fn process(
        &self,
        text: &str,
        source: &str,
        state: &mut State,
        depth: usize,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let mut block: Option<(Block, String)> = None;

        for (idx, raw_line) in text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim_end_matches(['\n', '\r']);
            let ending = &raw_line[line.len()..];
            let directive = line.strip_prefix(state.micro).map(str::trim_end);

            if let Some((kind, _)) = &block {
                if directive == Some("end") {
                    block = None;
                } else if *kind == Block::Verbatim {
                    out.push_str(raw_line);
                }
                continue;
            }

            if let Some(rest) = directive {
                let keyword = rest.split_whitespace().next().unwrap_or("");
                match keyword {
                    "manual" | "comment" => {
                        block = Some((Block::Skip, keyword.to_string()));
                        continue;
                    }
                    "nopp" => {
                        block = Some((Block::Verbatim, keyword.to_string()));
                        continue;
                    }
                    "end" => {
                        return Err(TemplateError::UnmatchedEnd {
                            source: source.to_string(),
                            line: line_no,
                        });
                    }
                    "ecfmicro" => {
                        let arg = rest["ecfmicro".len()..].trim();
                        state.micro = arg.chars().next().ok_or_else(|| {
                            TemplateError::InvalidExpression {
                                expr: line.to_string(),
                                reason: "ecfmicro needs a character".to_string(),
                                source: source.to_string(),
                                line: line_no,
                            }
                        })?;
                        continue;
                    }
                    _ => {}
                }

                if let Some(caps) = INCLUDE_REGEX.captures(rest) {
                    let kind = caps.get(1).map(|m| m.as_str());
                    let name = caps[2].trim();
                    self.include(kind, name, source, state, depth, out)?;
                    continue;
                }
            }

            out.push_str(&self.substitute(line, state.micro, source, line_no)?);
            out.push_str(ending);
        }

        if let Some((_, directive)) = block {
            return Err(TemplateError::UnclosedBlock {
                directive,
                source: source.to_string(),
            });
        }

        Ok(())
    }

    fn include(
        &self,
        kind: Option<&str>,
        name: &str,
        source: &str,
        state: &mut State,
        depth: usize,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(TemplateError::IncludeTooDeep {
                name: name.to_string(),
                source: source.to_string(),
            });
        }

        let path = self.includes.find(name, source)?;
        let first_time = state.included.insert(include_key(&path));
        if kind == Some("once") && !first_time {
            return Ok(());
        }

        let text = read_file(&path)?;
        if kind == Some("nopp") {
            out.push_str(&text);
        } else {
            let included_source = path.display().to_string();
            self.process(&text, &included_source, state, depth + 1, out)?;
        }

        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(())
    }

    /// Substitute `%VAR%` references in one line.
    fn substitute(
        &self,
        line: &str,
        micro: char,
        source: &str,
        line_no: usize,
    ) -> Result<String, TemplateError> {
        let width = micro.len_utf8();
        let mut result = String::with_capacity(line.len());
        let mut rest = line;

        while let Some(pos) = rest.find(micro) {
            result.push_str(&rest[..pos]);
            let after = &rest[pos + width..];

            if after.starts_with(micro) {
                result.push(micro);
                rest = &after[width..];
                continue;
            }

            let end = after.find(micro).ok_or_else(|| TemplateError::UnmatchedMicro {
                source: source.to_string(),
                line: line_no,
            })?;
            let reference = &after[..end];
            let (name, default) = match reference.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (reference, None),
            };

            match (self.vars.get(name), default) {
                (Some(value), _) => result.push_str(value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => {
                    return Err(TemplateError::UndefinedVariable {
                        name: name.to_string(),
                        source: source.to_string(),
                        line: line_no,
                    });
                }
            }
            rest = &after[end + width..];
        }

        result.push_str(rest);
        Ok(result)
    }
}

fn include_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
