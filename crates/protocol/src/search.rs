use crate::types::{ContextSource, UniqueId};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// One keyword hit: byte index into the searched text plus the span the
/// match covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMatch {
    pub index: usize,
    pub span: usize,
}

/// All hits for one search, grouped by the key that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet {
    by_key: BTreeMap<String, Vec<KeyMatch>>,
}

impl MatchSet {
    pub fn insert(&mut self, key: impl Into<String>, m: KeyMatch) {
        self.by_key.entry(key.into()).or_default().push(m);
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Total hit count across all keys.
    pub fn match_count(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    /// The match with the greatest index, if any.
    pub fn highest_index(&self) -> Option<KeyMatch> {
        self.by_key
            .values()
            .flatten()
            .copied()
            .max_by_key(|m| (m.index, m.span))
    }

    /// The match with the smallest index, if any.
    pub fn lowest_index(&self) -> Option<KeyMatch> {
        self.by_key
            .values()
            .flatten()
            .copied()
            .min_by_key(|m| (m.index, m.span))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[KeyMatch])> {
        self.by_key.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn matches(&self) -> impl Iterator<Item = KeyMatch> + '_ {
        self.by_key.values().flatten().copied()
    }

    pub fn merge(&mut self, other: MatchSet) {
        for (key, mut hits) in other.by_key {
            self.by_key.entry(key).or_default().append(&mut hits);
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchFailure {
    #[error("malformed entry configuration: {0}")]
    MalformedEntry(String),
}

/// Keyword search, consumed as a service. The batch form must be equivalent
/// to calling [`SearchService::search`] per entry; the default body makes
/// that true by construction, implementors overriding it for speed must
/// preserve it.
pub trait SearchService: Send + Sync {
    fn search(&self, text: &str, keys: &[String]) -> Result<MatchSet, SearchFailure>;

    fn search_for_lore(
        &self,
        text: &str,
        sources: &[&ContextSource],
    ) -> Result<HashMap<UniqueId, MatchSet>, SearchFailure> {
        let mut out = HashMap::with_capacity(sources.len());
        for source in sources {
            let matches = self.search(text, &source.entry.keys)?;
            if !matches.is_empty() {
                out.insert(source.unique_id, matches);
            }
        }
        Ok(out)
    }
}
