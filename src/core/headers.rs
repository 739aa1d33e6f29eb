//! Parsing of `name=value,name2=value2` header strings.
//!
//! This is the `OTEL_EXPORTER_OTLP_HEADERS` format. The same syntax is used
//! for `OTEL_RESOURCE_ATTRIBUTES`, see [`crate::core::resource`].

use std::fmt;

/// Ordered list of header name/value pairs.
///
/// Duplicate names are kept as separate entries, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Parses an optional header string. `None` and `""` give an empty set.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.map(parse_headers).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All values recorded for `name`, in order. Names compare case-insensitively.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn into_inner(self) -> Vec<(String, String)> {
        self.0
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Headers(pairs)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may carry credentials; names only.
        let names: Vec<&str> = self.iter().map(|(n, _)| n).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Parses `name1=value1,name2=value2`.
///
/// Segments without `=` or with an empty name are skipped. Whitespace around
/// names and values is trimmed and values are percent-decoded.
pub fn parse_headers(raw: &str) -> Headers {
    let pairs = raw
        .split(',')
        .filter_map(|segment| {
            let Some((name, value)) = segment.split_once('=') else {
                if !segment.trim().is_empty() {
                    tracing::debug!("Skipping malformed header segment without '='");
                }
                return None;
            };
            let name = name.trim();
            if name.is_empty() {
                tracing::debug!("Skipping header segment with empty name");
                return None;
            }
            Some((name.to_string(), decode_value(value.trim())))
        })
        .collect();

    Headers(pairs)
}

fn decode_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    match urlencoding::decode(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}
