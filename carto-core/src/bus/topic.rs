use compact_str::CompactString;
use std::fmt;

/// Name of a publish/subscribe channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(CompactString);

impl Topic {
    /// The channel every ingested coordinate is published on.
    pub const LOCATIONS: Topic = Topic(CompactString::const_new("main:write_loc"));

    pub fn new(name: impl Into<CompactString>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
