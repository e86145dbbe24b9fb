//! # Job Id Set
//!
//! Ordered, duplicate-free set of the external job identifiers owned by one task.
//! Legacy rows stored this as a comma-delimited string; [`JobIds::parse_delimited`]
//! accepts that form so membership checks are always set lookups, never substring scans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobIds(BTreeSet<String>);

impl JobIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a delimited list such as `"id1,id2, id3"`, skipping blanks
    pub fn parse_delimited(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn to_delimited(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Returns `true` if the id was not already present
    pub fn insert(&mut self, job_id: impl Into<String>) -> bool {
        self.0.insert(job_id.into())
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.0.contains(job_id)
    }

    /// Exact match: this set holds `job_id` and nothing else
    pub fn is_exactly(&self, job_id: &str) -> bool {
        self.0.len() == 1 && self.0.contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl fmt::Display for JobIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delimited())
    }
}

impl<S: Into<String>> FromIterator<S> for JobIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for JobIds {
    fn from(ids: Vec<String>) -> Self {
        ids.into_iter().collect()
    }
}
