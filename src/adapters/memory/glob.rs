//! Glob patterns with Redis/SQLite `GLOB` semantics, compiled to anchored regexes.
//!
//! Supported: `*` (any run), `?` (one char), `[abc]`, `[a-z]`, `[^abc]`.
//! A `]` right after the opening bracket (or `[^`) is a literal.

use regex::Regex;

use crate::domain::errors::{DomainError, DomainResult};

pub fn compile_glob(glob: &str) -> DomainResult<Regex> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                let (class, next) = parse_class(&chars, i)
                    .ok_or_else(|| DomainError::InvalidGlob(format!("unterminated class in {glob}")))?;
                pattern.push_str(&class);
                i = next;
                continue;
            }
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

/// Translate the class starting at `chars[start] == '['`. Returns the regex
/// class and the index just past the closing bracket.
fn parse_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut out = String::from("[");
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    let body_start = i;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && i > body_start {
            out.push(']');
            return Some((out, i + 1));
        }
        match c {
            '-' if i > body_start && chars.get(i + 1).is_some_and(|n| *n != ']') => out.push('-'),
            _ => {
                if c.is_ascii_punctuation() {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        i += 1;
    }
}
