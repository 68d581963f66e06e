//! Test-category tags

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Category a test can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tag {
    /// Asserts current, possibly defective, behavior of the application
    KnownBug,
    Smoke,
    Api,
    Ui,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::KnownBug => "known-bug",
            Tag::Smoke => "smoke",
            Tag::Api => "api",
            Tag::Ui => "ui",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('@').to_ascii_lowercase().as_str() {
            "known-bug" | "known_bug" | "knownbug" => Ok(Tag::KnownBug),
            "smoke" => Ok(Tag::Smoke),
            "api" => Ok(Tag::Api),
            "ui" | "e2e" => Ok(Tag::Ui),
            _ => Err(Error::UnknownTag(s.to_string())),
        }
    }
}

/// Decides which tagged tests take part in a run
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    excluded: HashSet<Tag>,
}

impl TagFilter {
    pub fn new(excluded: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            excluded: excluded.into_iter().collect(),
        }
    }

    /// Build from the configured `exclude_tags`
    pub fn from_config(config: &crate::HarnessConfig) -> Result<Self> {
        let excluded = config
            .exclude_tags
            .iter()
            .map(|t| t.parse())
            .collect::<Result<HashSet<Tag>>>()?;
        Ok(Self { excluded })
    }

    /// A test runs unless one of its tags is excluded
    pub fn allows(&self, tags: &[Tag]) -> bool {
        !tags.iter().any(|t| self.excluded.contains(t))
    }

    pub fn excludes(&self, tag: Tag) -> bool {
        self.excluded.contains(&tag)
    }
}
