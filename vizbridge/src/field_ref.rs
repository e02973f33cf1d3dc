//! Codec for the compact field references found in workbook markup.
//!
//! A reference looks like `[namespace].[aggregation:name:role]`, for example
//! `[federated.0xq1].[sum:Sales:qk]`. Parsing is all-or-nothing: either every
//! component is populated or none is.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::warn;

// A colon inside the name must be followed by whitespace ("Ship: Mode"), so
// stacked derivations such as `pcto:sum:Sales:qk` do not match.
static FIELD_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\[(?P<ns>[^\]]*)\]|(?P<bare>[^.\[\]]+))\.\[(?P<agg>[^:\[\]]+):(?P<name>[^:\[\]]+(?::\s[^:\[\]]*)*):(?P<role>[^:\[\]]+)\]$",
    )
    .expect("field reference pattern is valid")
});

/// A decoded field reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldReference {
    pub namespace: Option<String>,
    pub aggregation: Option<String>,
    pub field_name: Option<String>,
    pub role_category: Option<String>,
}

impl FieldReference {
    /// The all-empty reference returned when decoding fails.
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.field_name.is_some()
    }

    /// Encode back into markup form. `None` when the reference is unresolved.
    pub fn encode(&self) -> Option<String> {
        match (
            &self.namespace,
            &self.aggregation,
            &self.field_name,
            &self.role_category,
        ) {
            (Some(ns), Some(agg), Some(name), Some(role)) => {
                Some(format!("[{}].[{}:{}:{}]", ns, agg, name, role))
            }
            _ => None,
        }
    }

    /// Target-platform aggregation function for this reference, if any.
    ///
    /// `none` (and an unresolved reference) carry no function; unknown
    /// aggregations fall back to `Sum`.
    pub fn aggregation_function(&self) -> Option<&'static str> {
        let agg = self.aggregation.as_deref()?;
        match agg.to_ascii_lowercase().as_str() {
            "none" => None,
            "sum" => Some("Sum"),
            "avg" => Some("Average"),
            "min" => Some("Minimum"),
            "max" => Some("Maximum"),
            "count" => Some("Count"),
            _ => Some("Sum"),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Some(encoded) => f.write_str(&encoded),
            None => f.write_str("<unresolved field reference>"),
        }
    }
}

/// Decode an encoded field reference.
///
/// Never fails: a string that does not match the grammar yields
/// [`FieldReference::unresolved`] and a warning in the log.
pub fn parse(reference: &str) -> FieldReference {
    let trimmed = reference.trim();
    let Some(caps) = FIELD_REFERENCE.captures(trimmed) else {
        warn!(reference = trimmed, "Could not parse field reference");
        return FieldReference::unresolved();
    };

    let namespace = caps
        .name("ns")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str().to_string());

    FieldReference {
        namespace,
        aggregation: caps.name("agg").map(|m| m.as_str().to_string()),
        field_name: caps.name("name").map(|m| m.as_str().to_string()),
        role_category: caps.name("role").map(|m| m.as_str().to_string()),
    }
}

/// Split the text of a rows/columns shelf into individual references.
///
/// Shelves list references separated by ` / `, optionally wrapped in
/// parentheses when nested.
pub fn split_shelf(text: &str) -> Vec<&str> {
    text.split(" / ")
        .map(|part| part.trim().trim_start_matches('(').trim_end_matches(')').trim())
        .filter(|part| !part.is_empty())
        .collect()
}
