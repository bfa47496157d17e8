use loreweave_protocol::{ContextSource, MatchSet, ReportReason};
use std::collections::BTreeMap;

/// Which rule produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvidenceKind {
    Forced,
    Ephemeral,
    Keyed,
    Cascade,
}

/// Proof that activation occurred via another already-activated entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeMatch {
    /// Cascade depth at first match. Fixed once set.
    pub initial_degree: u32,
    /// Depth at the most recent match; later passes that re-match this
    /// entry against newly activated text bump it.
    pub final_degree: u32,
    pub match_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    Forced,
    Ephemeral,
    Keyed(MatchSet),
    Cascade(CascadeMatch),
}

impl Evidence {
    pub fn kind(&self) -> EvidenceKind {
        match self {
            Evidence::Forced => EvidenceKind::Forced,
            Evidence::Ephemeral => EvidenceKind::Ephemeral,
            Evidence::Keyed(_) => EvidenceKind::Keyed,
            Evidence::Cascade(_) => EvidenceKind::Cascade,
        }
    }
}

/// Terminal activation state for one source. A source is activated iff it
/// holds at least one evidence entry; a rejected record keeps its empty map
/// for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRecord {
    pub source: ContextSource,
    pub evidence: BTreeMap<EvidenceKind, Evidence>,
}

impl ActivationRecord {
    pub fn new(source: ContextSource) -> Self {
        Self {
            source,
            evidence: BTreeMap::new(),
        }
    }

    pub fn is_activated(&self) -> bool {
        !self.evidence.is_empty()
    }

    /// Evidence entries only accumulate; a kind is recorded at most once.
    pub fn add(&mut self, evidence: Evidence) {
        debug_assert!(
            !self.evidence.contains_key(&evidence.kind()),
            "evidence kind recorded twice for source {}",
            self.source.unique_id
        );
        self.evidence.insert(evidence.kind(), evidence);
    }

    pub fn keyed_matches(&self) -> Option<&MatchSet> {
        match self.evidence.get(&EvidenceKind::Keyed) {
            Some(Evidence::Keyed(set)) => Some(set),
            _ => None,
        }
    }

    pub fn cascade(&self) -> Option<&CascadeMatch> {
        match self.evidence.get(&EvidenceKind::Cascade) {
            Some(Evidence::Cascade(m)) => Some(m),
            _ => None,
        }
    }

    pub fn cascade_mut(&mut self) -> Option<&mut CascadeMatch> {
        match self.evidence.get_mut(&EvidenceKind::Cascade) {
            Some(Evidence::Cascade(m)) => Some(m),
            _ => None,
        }
    }

    /// True when keyed evidence is the only reason this source qualified.
    pub fn keyed_only(&self) -> bool {
        self.evidence.len() == 1 && self.evidence.contains_key(&EvidenceKind::Keyed)
    }

    pub fn has_kind(&self, kind: EvidenceKind) -> bool {
        self.evidence.contains_key(&kind)
    }

    /// Direct activation (forced/ephemeral/keyed) counts as depth zero;
    /// cascade-only records report their initial cascade depth.
    pub fn activation_degree(&self) -> u32 {
        let direct = self
            .evidence
            .keys()
            .any(|k| matches!(k, EvidenceKind::Forced | EvidenceKind::Ephemeral | EvidenceKind::Keyed));
        if direct {
            0
        } else {
            self.cascade().map(|c| c.initial_degree).unwrap_or(0)
        }
    }

    pub fn story_match_count(&self) -> usize {
        self.keyed_matches().map(MatchSet::match_count).unwrap_or(0)
    }

    pub fn cascade_match_count(&self) -> usize {
        self.cascade().map(|c| c.match_count).unwrap_or(0)
    }

    /// The strongest reason, for reporting. Forced outranks ephemeral
    /// outranks keyed outranks cascade.
    pub fn primary_reason(&self) -> ReportReason {
        if self.has_kind(EvidenceKind::Forced) {
            ReportReason::ForceActivated
        } else if self.has_kind(EvidenceKind::Ephemeral) {
            ReportReason::EphemeralActive
        } else if self.has_kind(EvidenceKind::Keyed) {
            ReportReason::KeyTriggered
        } else if self.has_kind(EvidenceKind::Cascade) {
            ReportReason::KeyTriggeredNonStory
        } else {
            ReportReason::NoKeyMatch
        }
    }
}
