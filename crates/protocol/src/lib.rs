//! Shared data model for the loreweave context pipeline.
//!
//! Holds the source/entry types every stage agrees on, the traits for the
//! externally-provided collaborators (token codec, keyword search, ephemeral
//! window checks), the per-source report types consumed by exporters, and
//! the pipeline configuration.

pub mod config;
pub mod external;
pub mod report;
pub mod search;
pub mod types;

pub use config::{Combine, ContextConfig, SelectionConfig, SubContextConfig, WeightedRandomConfig, WeightingSpec};
pub use external::{CodecError, EphemeralWindow, TokenCodec};
pub use report::{
    AssemblySnapshot, InsertedReport, InsertionPlacement, OutputSegment, RejectedReport, ReportReason, SourceReport,
    SourceStatus,
};
pub use search::{KeyMatch, MatchSet, SearchFailure, SearchService};
pub use types::{
    Anchor, BiasGroup, ContextSource, EntryFields, EphemeralConfig, MatchBias, Placement, SourceType, TrimDirection,
    TrimType, UniqueId,
};
