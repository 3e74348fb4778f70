// src/materials/preprocess.rs
//! Uniform scanner with a minimal preprocessor.
//!
//! Finds the `uniform` declarations that survive preprocessing of a shader
//! source. Supports `#define`, `#undef`, `#ifdef`, `#ifndef`, `#if`, `#elif`,
//! `#else` and `#endif` (nested), with `defined(X)`, `!`, `&&`, `||` and
//! parentheses in conditions. Macro expansion is not performed; only whether a
//! name is defined matters. `#include` and `#pragma` are ignored.

use std::collections::HashSet;

/// A `uniform` declaration that is live after preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub type_name: String,
    pub array_len: Option<usize>,
}

impl UniformDecl {
    /// Underscore-prefixed uniforms are managed internally and hidden from
    /// inspector listings.
    #[inline]
    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent_active: bool,
    taking: bool,
    taken: bool,
}

/// Scans `source` and returns live uniform declarations in source order.
/// A name declared more than once keeps its first live declaration.
pub fn scan_uniforms(source: &str) -> Vec<UniformDecl> {
    let code = live_code(source);
    let mut seen = HashSet::new();
    let mut uniforms = Vec::new();

    for statement in code.split(';') {
        // drop anything up to the last brace: function bodies end in `}`
        let statement = match statement.rfind(['{', '}']) {
            Some(i) => &statement[i + 1..],
            None => statement,
        };
        if let Some(decl) = parse_uniform(statement) {
            if seen.insert(decl.name.clone()) {
                uniforms.push(decl);
            }
        }
    }
    uniforms
}

/// Source with comments removed and inactive conditional branches dropped.
fn live_code(source: &str) -> String {
    let mut defines = HashSet::new();
    run(source, &mut defines)
}

fn run(source: &str, defines: &mut HashSet<String>) -> String {
    let stripped = strip_comments(source);
    let mut stack: Vec<Frame> = Vec::new();
    let mut out = String::with_capacity(stripped.len());

    for (line_no, line) in stripped.lines().enumerate() {
        let active = stack.last().map_or(true, |f| f.parent_active && f.taking);
        let trimmed = line.trim_start();

        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        };

        let directive = directive.trim_start();
        let (keyword, rest) = directive
            .split_once(|c: char| c.is_whitespace())
            .unwrap_or((directive, ""));
        let rest = rest.trim();

        match keyword {
            "define" if active => {
                if let Some(name) = first_identifier(rest) {
                    defines.insert(name.to_string());
                }
            }
            "undef" if active => {
                if let Some(name) = first_identifier(rest) {
                    defines.remove(name);
                }
            }
            "ifdef" | "ifndef" | "if" => {
                let cond = match keyword {
                    "ifdef" => first_identifier(rest).is_some_and(|n| defines.contains(n)),
                    "ifndef" => !first_identifier(rest).is_some_and(|n| defines.contains(n)),
                    _ => evaluate(rest, defines),
                };
                stack.push(Frame {
                    parent_active: active,
                    taking: cond,
                    taken: cond,
                });
            }
            "elif" => match stack.last_mut() {
                Some(frame) => {
                    if frame.taken {
                        frame.taking = false;
                    } else {
                        let cond = evaluate(rest, defines);
                        frame.taking = cond;
                        frame.taken = cond;
                    }
                }
                None => log::warn!("line {}: #elif without #if", line_no + 1),
            },
            "else" => match stack.last_mut() {
                Some(frame) => {
                    frame.taking = !frame.taken;
                    frame.taken = true;
                }
                None => log::warn!("line {}: #else without #if", line_no + 1),
            },
            "endif" => {
                if stack.pop().is_none() {
                    log::warn!("line {}: #endif without #if", line_no + 1);
                }
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        log::warn!("{} unterminated conditional block(s) at end of shader", stack.len());
    }
    out
}

fn first_identifier(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}

/// Replaces `//` and `/* */` comments with whitespace, keeping line breaks.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_uniform(statement: &str) -> Option<UniformDecl> {
    let mut text = statement.trim();
    for qualifier in ["global", "instance"] {
        if let Some(rest) = text.strip_prefix(qualifier) {
            if rest.starts_with(char::is_whitespace) {
                text = rest.trim_start();
            }
        }
    }
    let rest = text.strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    // drop hints and initializer
    let decl = rest.split_once('=').map_or(rest, |(d, _)| d);
    let decl = decl.split_once(':').map_or(decl, |(d, _)| d);

    let mut words = decl
        .split_whitespace()
        .filter(|w| !matches!(*w, "lowp" | "mediump" | "highp"));
    let type_name = words.next()?.to_string();
    let name_part: String = words.collect();

    let (name, array_len) = match name_part.split_once('[') {
        Some((n, len)) => (n.to_string(), len.trim_end_matches(']').trim().parse().ok()),
        None => (name_part, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some(UniformDecl {
        name,
        type_name,
        array_len,
    })
}

// ====================================================================================
// `#if` expressions
// ====================================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(digits.parse().unwrap_or(0)));
        } else {
            chars.next();
            match (c, chars.peek()) {
                ('&', Some('&')) => {
                    chars.next();
                    tokens.push(Token::And);
                }
                ('|', Some('|')) => {
                    chars.next();
                    tokens.push(Token::Or);
                }
                ('!', _) => tokens.push(Token::Not),
                ('(', _) => tokens.push(Token::Open),
                (')', _) => tokens.push(Token::Close),
                _ => log::debug!("ignoring '{}' in #if expression", c),
            }
        }
    }
    tokens
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    defines: &'a HashSet<String>,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn or(&mut self) -> bool {
        let mut value = self.and();
        while self.peek() == Some(&Token::Or) {
            self.bump();
            let rhs = self.and();
            value = value || rhs;
        }
        value
    }

    fn and(&mut self) -> bool {
        let mut value = self.unary();
        while self.peek() == Some(&Token::And) {
            self.bump();
            let rhs = self.unary();
            value = value && rhs;
        }
        value
    }

    fn unary(&mut self) -> bool {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            return !self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> bool {
        match self.bump() {
            Some(Token::Ident(word)) if word == "defined" => {
                let parens = self.peek() == Some(&Token::Open);
                if parens {
                    self.bump();
                }
                let result = match self.bump() {
                    Some(Token::Ident(name)) => self.defines.contains(&name),
                    _ => false,
                };
                if parens && self.peek() == Some(&Token::Close) {
                    self.bump();
                }
                result
            }
            // bare identifiers: defined means true, no macro expansion
            Some(Token::Ident(name)) => self.defines.contains(&name),
            Some(Token::Number(n)) => n != 0,
            Some(Token::Open) => {
                let value = self.or();
                if self.peek() == Some(&Token::Close) {
                    self.bump();
                }
                value
            }
            _ => false,
        }
    }
}

fn evaluate(expr: &str, defines: &HashSet<String>) -> bool {
    let mut parser = ExprParser {
        tokens: tokenize(expr),
        pos: 0,
        defines,
    };
    parser.or()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(source: &str) -> Vec<String> {
        scan_uniforms(source).into_iter().map(|u| u.name).collect()
    }

    #[test]
    fn test_plain_uniforms() {
        let src = "uniform float a;\nuniform vec4 b : source_color = vec4(1.0);\nfloat c;\n";
        let decls = scan_uniforms(src);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].name, "b");
        assert_eq!(decls[1].type_name, "vec4");
        assert_eq!(decls[1].array_len, None);
    }

    #[test]
    fn test_ifdef_blocks() {
        let src = "\
#define A
#ifdef A
uniform float in_a;
#else
uniform float not_a;
#endif
#ifndef B
uniform float no_b;
#endif
#ifdef B
uniform float in_b;
#endif
";
        assert_eq!(names(src), vec!["in_a", "no_b"]);
    }

    #[test]
    fn test_nested_and_elif() {
        let src = "\
#define OUTER
#define SECOND
#ifdef OUTER
  #if defined(FIRST)
  uniform int first;
  #elif defined(SECOND) && !defined(THIRD)
  uniform int second;
  #else
  uniform int fallback;
  #endif
  #ifdef MISSING
    #ifdef OUTER
    uniform int hidden;
    #endif
  #endif
#endif
";
        assert_eq!(names(src), vec!["second"]);
    }

    #[test]
    fn test_define_inside_inactive_branch_is_ignored() {
        let src = "\
#ifdef NOPE
#define LATER
#endif
#ifdef LATER
uniform float never;
#endif
uniform float always;
";
        assert_eq!(names(src), vec!["always"]);
    }

    #[test]
    fn test_comments_and_arrays() {
        let src = "\
// uniform float commented;
/* uniform float block;
   still comment */
uniform int _region_map[256]; // trailing
uniform sampler2D tex : hint_default_black, filter_linear, repeat_disable;
";
        let decls = scan_uniforms(src);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "_region_map");
        assert_eq!(decls[0].array_len, Some(256));
        assert!(decls[0].is_private());
        assert_eq!(decls[1].name, "tex");
        assert_eq!(decls[1].type_name, "sampler2D");
    }

    #[test]
    fn test_uniform_after_function_body() {
        let src = "\
float f(float x) {
\treturn x * 2.0;
}
uniform float after;
";
        assert_eq!(names(src), vec!["after"]);
    }

    #[test]
    fn test_or_expression_and_hint_range() {
        let src = "\
#define FLAT
#if defined(WORLD) || defined(FLAT)
uniform float blend : hint_range(0, 1) = 0.5;
#endif
";
        let decls = scan_uniforms(src);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "blend");
        assert_eq!(decls[0].type_name, "float");
    }

    #[test]
    fn test_unbalanced_directives_do_not_panic() {
        let src = "#endif\n#else\nuniform float a;\n#ifdef X\n";
        assert_eq!(names(src), vec!["a"]);
    }
}
