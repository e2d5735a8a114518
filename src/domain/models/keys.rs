//! Cache key codec.
//!
//! Keys are flat strings of ordered, colon-delimited fields:
//! `provider:type:account:location:name[:extra...]`. Field values escape `%`
//! as `%25` and `:` as `%3A` so arbitrary names survive a round trip.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const DELIMITER: char = ':';

/// Structured form of a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub provider: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub account: String,
    pub location: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
}

impl CacheKey {
    pub fn new(
        provider: impl Into<String>,
        type_name: impl Into<String>,
        account: impl Into<String>,
        location: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            type_name: type_name.into(),
            account: account.into(),
            location: location.into(),
            name: name.into(),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra.push(extra.into());
        self
    }

    /// Encode into the flat string form.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, field) in self.fields().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            out.push_str(&escape(field));
        }
        out
    }

    /// Parse a flat key. Returns `None` for anything that does not have at
    /// least the five mandatory, non-empty fields or carries a bad escape.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.split(DELIMITER).map(unescape);
        let provider = parts.next()??;
        let type_name = parts.next()??;
        let account = parts.next()??;
        let location = parts.next()??;
        let name = parts.next()??;
        let extra = parts.collect::<Option<Vec<_>>>()?;

        if [&provider, &type_name, &account, &location, &name]
            .iter()
            .any(|f| f.is_empty())
        {
            return None;
        }

        Some(Self {
            provider,
            type_name,
            account,
            location,
            name,
            extra,
        })
    }

    /// Parsed field map: `provider`, `type`, `account`, `location`, `name`
    /// and, when present, `extra` (remaining fields re-joined with `:`).
    pub fn field_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("provider".to_string(), self.provider.clone());
        map.insert("type".to_string(), self.type_name.clone());
        map.insert("account".to_string(), self.account.clone());
        map.insert("location".to_string(), self.location.clone());
        map.insert("name".to_string(), self.name.clone());
        if !self.extra.is_empty() {
            map.insert("extra".to_string(), self.extra.join(":"));
        }
        map
    }

    /// Glob matching every key of a type for one provider, optionally
    /// narrowed to an account and location.
    pub fn scope_glob(provider: &str, type_name: &str, account: Option<&str>, location: Option<&str>) -> String {
        let account = account.map_or_else(|| "*".to_string(), |a| escape_glob(&escape(a)));
        let location = location.map_or_else(|| "*".to_string(), |l| escape_glob(&escape(l)));
        format!(
            "{}:{}:{account}:{location}:*",
            escape_glob(&escape(provider)),
            escape_glob(&escape(type_name))
        )
    }

    fn fields(&self) -> impl Iterator<Item = &str> {
        [
            self.provider.as_str(),
            self.type_name.as_str(),
            self.account.as_str(),
            self.location.as_str(),
            self.name.as_str(),
        ]
        .into_iter()
        .chain(self.extra.iter().map(String::as_str))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn escape(field: &str) -> String {
    field.replace('%', "%25").replace(':', "%3A")
}

fn unescape(field: &str) -> Option<String> {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

/// Escape glob metacharacters so a literal value can be embedded in a glob.
pub fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' | '?' | '[' | ']' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_basic_key() {
        let key = CacheKey::new("kubernetes", "deployment", "acct", "ns1", "my-deployment");
        assert_eq!(key.encode(), "kubernetes:deployment:acct:ns1:my-deployment");
    }

    #[test]
    fn test_names_with_delimiters_are_escaped() {
        let key = CacheKey::new("aws", "instances", "prod", "us-east-1", "a:b%c");
        let encoded = key.encode();
        assert_eq!(encoded, "aws:instances:prod:us-east-1:a%3Ab%25c");
        assert_eq!(CacheKey::parse(&encoded), Some(key));
    }

    #[test]
    fn test_extra_fields_are_preserved() {
        let key = CacheKey::new("aws", "loadBalancers", "prod", "us-east-1", "lb").with_extra("vpc-1");
        let parsed = CacheKey::parse(&key.encode()).unwrap();
        assert_eq!(parsed.extra, vec!["vpc-1".to_string()]);
        assert_eq!(parsed.field_map()["extra"], "vpc-1");
    }

    #[test]
    fn test_unparseable_keys_are_none() {
        assert!(CacheKey::parse("").is_none());
        assert!(CacheKey::parse("aws:instances:prod").is_none());
        assert!(CacheKey::parse("aws:instances::us-east-1:i-1").is_none());
        assert!(CacheKey::parse("aws:instances:prod:us-east-1:bad%zz").is_none());
        assert!(CacheKey::parse("aws:instances:prod:us-east-1:trunc%3").is_none());
    }

    #[test]
    fn test_scope_glob_escapes_literal_metacharacters() {
        assert_eq!(
            CacheKey::scope_glob("aws", "instances", Some("prod*"), None),
            "aws:instances:prod[*]:*:*"
        );
        assert_eq!(
            CacheKey::scope_glob("kubernetes", "pod", Some("acct"), Some("ns1")),
            "kubernetes:pod:acct:ns1:*"
        );
    }

    fn field() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9%:._ -]{1,12}"
    }

    proptest! {
        #[test]
        fn prop_encode_parse_round_trip(
            provider in field(),
            type_name in field(),
            account in field(),
            location in field(),
            name in field(),
            extra in proptest::collection::vec(field(), 0..3),
        ) {
            let key = CacheKey {
                provider,
                type_name,
                account,
                location,
                name,
                extra,
            };
            prop_assert_eq!(CacheKey::parse(&key.encode()), Some(key));
        }
    }
}
