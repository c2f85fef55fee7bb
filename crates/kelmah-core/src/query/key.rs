// ── Query keys ──
//
// Deterministic cache identity for a logical request. Segments are joined
// with `:`; separators inside a segment are escaped so two different
// parameter sets can never render to the same key.

use std::fmt;

/// Placeholder for an absent optional segment.
const ABSENT: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn builder() -> QueryKeyBuilder {
        QueryKeyBuilder::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct QueryKeyBuilder {
    segments: Vec<String>,
}

impl QueryKeyBuilder {
    pub fn segment(mut self, value: impl fmt::Display) -> Self {
        self.segments.push(escape(&value.to_string()));
        self
    }

    pub fn optional(mut self, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(v) => self.segment(v),
            None => {
                self.segments.push(ABSENT.to_owned());
                self
            }
        }
    }

    /// A set-valued segment: order-insensitive, so it is sorted and deduplicated.
    pub fn set<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: Vec<String> = values
            .into_iter()
            .map(|v| escape(v.as_ref()).replace(',', "%2C"))
            .collect();
        values.sort();
        values.dedup();
        self.segments.push(values.join(","));
        self
    }

    pub fn build(self) -> QueryKey {
        QueryKey(self.segments.join(":"))
    }
}

fn escape(raw: &str) -> String {
    if raw == ABSENT {
        return "%2D".to_owned();
    }
    raw.replace('%', "%25").replace(':', "%3A")
}
