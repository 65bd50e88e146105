//! Conditional compilation on raw source text.
//!
//! Lines of inactive `#if` branches are blanked before parsing, so a
//! declaration whose header differs per branch reaches the grammar as one
//! declaration. Symbols come from the file's own `#define` and `#undef`
//! lines; nothing else is defined. Line numbers are preserved.

use std::collections::HashSet;
use std::path::Path;

use crate::extract::error::ExtractError;

struct Branch {
    /// Whether the enclosing code is compiled at all
    enclosing: bool,
    /// Whether an earlier arm of this `#if` chain was taken
    taken: bool,
    active: bool,
    in_else: bool,
}

/// Returns `content` with inactive conditional lines and conditional directives blanked
pub fn resolve_directives(path: &Path, content: &str) -> Result<String, ExtractError> {
    let mut symbols = HashSet::new();
    let mut branches: Vec<Branch> = Vec::new();
    let mut resolved = String::with_capacity(content.len());

    for (index, line) in content.split_inclusive('\n').enumerate() {
        let error = |message: &str| ExtractError::Parse {
            path: path.to_path_buf(),
            message: format!("{} at line {}", message, index + 1),
        };
        let active = branches.last().is_none_or(|branch| branch.active);

        let Some(directive) = line.trim_start().strip_prefix('#') else {
            if active {
                resolved.push_str(line);
            } else {
                push_line_end(&mut resolved, line);
            }
            continue;
        };

        let (keyword, argument) = split_directive(directive);
        match keyword {
            "if" => {
                let taken = active && evaluate(argument, &symbols).map_err(|m| error(&m))?;
                branches.push(Branch {
                    enclosing: active,
                    taken,
                    active: taken,
                    in_else: false,
                });
            }
            "elif" => {
                let branch = branches
                    .last_mut()
                    .ok_or_else(|| error("#elif without #if"))?;
                if branch.in_else {
                    return Err(error("#elif after #else"));
                }
                let enter = branch.enclosing
                    && !branch.taken
                    && evaluate(argument, &symbols).map_err(|m| error(&m))?;
                branch.active = enter;
                branch.taken |= enter;
            }
            "else" => {
                let branch = branches
                    .last_mut()
                    .ok_or_else(|| error("#else without #if"))?;
                if branch.in_else {
                    return Err(error("duplicate #else"));
                }
                branch.active = branch.enclosing && !branch.taken;
                branch.taken = true;
                branch.in_else = true;
            }
            "endif" => {
                branches.pop().ok_or_else(|| error("#endif without #if"))?;
            }
            "define" if active => {
                symbols.insert(argument.to_string());
            }
            "undef" if active => {
                symbols.remove(argument);
            }
            // region, pragma, nullable and the like stay for the grammar
            _ if active => {
                resolved.push_str(line);
                continue;
            }
            _ => {}
        }
        push_line_end(&mut resolved, line);
    }

    if !branches.is_empty() {
        return Err(ExtractError::Parse {
            path: path.to_path_buf(),
            message: "unterminated #if at end of file".to_string(),
        });
    }
    Ok(resolved)
}

fn push_line_end(resolved: &mut String, line: &str) {
    if line.ends_with("\r\n") {
        resolved.push_str("\r\n");
    } else if line.ends_with('\n') {
        resolved.push('\n');
    }
}

/// `if DEBUG // note` becomes `("if", "DEBUG")`
fn split_directive(directive: &str) -> (&str, &str) {
    let directive = directive.trim_start();
    let end = directive
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(directive.len());
    let (keyword, rest) = directive.split_at(end);
    let argument = rest.split("//").next().unwrap_or_default().trim();
    (keyword, argument)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Symbol(String),
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            '!' if chars.next_if_eq(&'=').is_some() => Token::NotEqual,
            '!' => Token::Not,
            '&' if chars.next_if_eq(&'&').is_some() => Token::And,
            '|' if chars.next_if_eq(&'|').is_some() => Token::Or,
            '=' if chars.next_if_eq(&'=').is_some() => Token::Equal,
            c if c.is_alphanumeric() || c == '_' => {
                let mut symbol = c.to_string();
                while let Some(next) = chars.next_if(|n| n.is_alphanumeric() || *n == '_') {
                    symbol.push(next);
                }
                Token::Symbol(symbol)
            }
            other => return Err(format!("unexpected `{}` in condition", other)),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Precedence from loosest: `||`, `&&`, `==`/`!=`, `!`
struct Condition<'a> {
    tokens: Vec<Token>,
    position: usize,
    symbols: &'a HashSet<String>,
}

impl Condition<'_> {
    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.position) == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            value = value || right;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            value = value && right;
        }
        Ok(value)
    }

    fn equality(&mut self) -> Result<bool, String> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Equal) {
                value = value == self.unary()?;
            } else if self.eat(&Token::NotEqual) {
                value = value != self.unary()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<bool, String> {
        if self.eat(&Token::Not) {
            return Ok(!self.unary()?);
        }
        if self.eat(&Token::Open) {
            let value = self.or()?;
            if !self.eat(&Token::Close) {
                return Err("missing `)` in condition".to_string());
            }
            return Ok(value);
        }

        match self.tokens.get(self.position) {
            Some(Token::Symbol(symbol)) => {
                let value = match symbol.as_str() {
                    "true" => true,
                    "false" => false,
                    name => self.symbols.contains(name),
                };
                self.position += 1;
                Ok(value)
            }
            _ => Err("malformed condition".to_string()),
        }
    }
}

fn evaluate(expression: &str, symbols: &HashSet<String>) -> Result<bool, String> {
    let mut condition = Condition {
        tokens: tokenize(expression)?,
        position: 0,
        symbols,
    };
    let value = condition.or()?;
    if condition.position != condition.tokens.len() {
        return Err("trailing tokens in condition".to_string());
    }
    Ok(value)
}
