use regex::{Captures, Regex};
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::SearchResult;

/// Resolves per-type URL templates against a search result.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    pattern: Regex,
}

impl TemplateResolver {
    pub fn new() -> DomainResult<Self> {
        Ok(Self {
            pattern: Regex::new(r"\$\{(\w+)\}|\$(\w+)")?,
        })
    }

    /// Substitute `${field}` and `$field` with values from the result.
    /// Unknown fields and nulls become empty strings.
    pub fn resolve(&self, template: &str, binding: &SearchResult) -> String {
        self.pattern
            .replace_all(template, |caps: &Captures<'_>| {
                let field = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map_or("", |m| m.as_str());
                match binding.get(field) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                }
            })
            .into_owned()
    }
}
