use crate::types::UniqueId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal bucket for one source. Every source resolves to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Entry was disabled in its configuration.
    Disabled,
    /// No activation rule matched.
    Inactive,
    /// Activated but dropped by selection (range filter or lottery).
    Unselected,
    /// Selected but the assembly budget could not fit it.
    Unbudgeted,
    /// Landed in the final text.
    Inserted,
}

/// Human-readable reason attached to every report. Failures are always
/// explainable, never silent drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    ForceActivated,
    EphemeralActive,
    KeyTriggered,
    /// Activated by a key match against another activated entry's text.
    KeyTriggeredNonStory,
    Disabled,
    NoKeyMatch,
    EphemeralInactive,
    OutOfSearchRange,
    ZeroWeight,
    NoSpace,
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReportReason::ForceActivated => "force-activated",
            ReportReason::EphemeralActive => "ephemeral window active",
            ReportReason::KeyTriggered => "key matched story text",
            ReportReason::KeyTriggeredNonStory => "key matched activated entry text",
            ReportReason::Disabled => "entry disabled",
            ReportReason::NoKeyMatch => "no activation rule matched",
            ReportReason::EphemeralInactive => "ephemeral window closed",
            ReportReason::OutOfSearchRange => "no key match within search range",
            ReportReason::ZeroWeight => "selection weight was zero or negative",
            ReportReason::NoSpace => "no token budget remaining",
        };
        f.write_str(text)
    }
}

/// Where an inserted source landed relative to what was already assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionPlacement {
    /// First content in an empty assembly.
    Initial,
    Before(UniqueId),
    After(UniqueId),
    /// Landed inside another source's text; `shunted_chars` is how far the
    /// insertion point moved to reach a clean boundary.
    Inside { target: UniqueId, shunted_chars: usize },
}

/// One contiguous slice of the output owned by a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSegment {
    pub identifier: String,
    pub text: String,
}

/// Point-in-time view of the assembly, attached to each Inserted report and
/// published once more at stream completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblySnapshot {
    pub text: String,
    pub consumed_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedReport {
    pub unique_id: UniqueId,
    pub identifier: String,
    pub reason: ReportReason,
    pub tokens_consumed: usize,
    pub placement: InsertionPlacement,
    pub snapshot: AssemblySnapshot,
    pub segments: Vec<OutputSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedReport {
    pub unique_id: UniqueId,
    pub identifier: String,
    pub status: SourceStatus,
    pub reason: ReportReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceReport {
    Inserted(InsertedReport),
    Rejected(RejectedReport),
}

impl SourceReport {
    pub fn unique_id(&self) -> UniqueId {
        match self {
            SourceReport::Inserted(r) => r.unique_id,
            SourceReport::Rejected(r) => r.unique_id,
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self {
            SourceReport::Inserted(_) => SourceStatus::Inserted,
            SourceReport::Rejected(r) => r.status,
        }
    }

    pub fn tokens_consumed(&self) -> usize {
        match self {
            SourceReport::Inserted(r) => r.tokens_consumed,
            SourceReport::Rejected(_) => 0,
        }
    }
}
