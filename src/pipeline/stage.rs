use serde::{Deserialize, Serialize};
use std::fmt;

/// One node of the fixed pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Search,
    Filter,
    Crawl,
    Extract,
    Compare,
    Report,
}

impl Stage {
    /// Name used in error records and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Search => "search",
            Self::Filter => "filter",
            Self::Crawl => "crawl",
            Self::Extract => "extract",
            Self::Compare => "compare",
            Self::Report => "report",
        }
    }

    /// Parses a stage from its name
    pub fn from_name(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|stage| stage.as_str() == s)
    }

    /// The stage that runs after this one, `None` after report
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Plan => Some(Self::Search),
            Self::Search => Some(Self::Filter),
            Self::Filter => Some(Self::Crawl),
            Self::Crawl => Some(Self::Extract),
            Self::Extract => Some(Self::Compare),
            Self::Compare => Some(Self::Report),
            Self::Report => None,
        }
    }

    /// Returns all stages in execution order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Plan,
            Self::Search,
            Self::Filter,
            Self::Crawl,
            Self::Extract,
            Self::Compare,
            Self::Report,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
