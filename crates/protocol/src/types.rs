use serde::{Deserialize, Serialize};

/// Globally unique source id, assigned exactly once at source creation.
///
/// Stage outputs are distinct typed values joined by this id; no stage ever
/// mutates another stage's record.
pub type UniqueId = u64;

/// What kind of context a source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Story,
    Memory,
    AuthorsNote,
    Lore,
    Ephemeral,
    Unknown,
}

impl SourceType {
    /// Story, memory, author's note and unknown sources always activate.
    pub fn is_always_forced(self) -> bool {
        matches!(
            self,
            SourceType::Story | SourceType::Memory | SourceType::AuthorsNote | SourceType::Unknown
        )
    }

    /// Fixed rank used by the `type` ordering rule.
    pub fn rank(self) -> u8 {
        match self {
            SourceType::Story => 0,
            SourceType::Memory => 1,
            SourceType::AuthorsNote => 2,
            SourceType::Lore => 3,
            SourceType::Ephemeral => 4,
            SourceType::Unknown => 5,
        }
    }
}

/// Which end of an entry's text gives way when it must shrink to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrimDirection {
    DoNotTrim,
    TrimTop,
    #[default]
    TrimBottom,
}

/// Trim granularity, coarse to fine. An entry's `maximum_trim_type` caps how
/// fine the assembler may cut: `Token` permits everything, `Newline` permits
/// only whole-line removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrimType {
    Newline,
    Sentence,
    #[default]
    Token,
}

impl TrimType {
    pub fn allows(self, granularity: TrimType) -> bool {
        granularity <= self
    }
}

/// When a key-relative anchor has several matches, which one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchBias {
    TowardTop,
    #[default]
    TowardBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Before,
    After,
    Inside,
}

/// Where an entry asks to land in the assembled document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// Position counted over inserted units, negative values from the
    /// bottom (-1 = very end), clamped to the valid range.
    Absolute { position: i64 },
    /// Relative to the unit containing this entry's own story-key match.
    KeyRelative { placement: Placement, bias: MatchBias },
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Absolute { position: -1 }
    }
}

/// Step window controlling when an ephemeral entry is live. Interpretation
/// belongs to the host's [`crate::EphemeralWindow`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralConfig {
    pub starting_step: u32,
    pub duration: u32,
    pub repeat_every: Option<u32>,
}

/// Logit-bias phrases attached to an entry. Carried through untouched; the
/// pipeline never interprets them, exporters do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasGroup {
    pub phrases: Vec<String>,
    pub bias: f32,
    pub enabled: bool,
}

/// Per-entry configuration, immutable once the source exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryFields {
    pub text: String,
    pub keys: Vec<String>,
    pub budget_priority: i64,
    /// Hard cap on this entry's token cost; `None` means only the shared
    /// pool limits it.
    pub token_budget: Option<usize>,
    /// Tokens provisionally set aside before the exact cost is known.
    pub reserved_tokens: usize,
    pub trim_direction: TrimDirection,
    pub maximum_trim_type: TrimType,
    /// Trailing window of story text (in characters) a key match must fall
    /// inside to count. `None` disables the window.
    pub search_range: Option<usize>,
    pub category: Option<String>,
    pub force_activation: bool,
    pub enabled: bool,
    pub bias_groups: Vec<BiasGroup>,
    pub anchor: Anchor,
    pub ephemeral: Option<EphemeralConfig>,
}

impl Default for EntryFields {
    fn default() -> Self {
        Self {
            text: String::new(),
            keys: Vec::new(),
            budget_priority: 0,
            token_budget: None,
            reserved_tokens: 0,
            trim_direction: TrimDirection::default(),
            maximum_trim_type: TrimType::default(),
            search_range: None,
            category: None,
            force_activation: false,
            enabled: true,
            bias_groups: Vec::new(),
            anchor: Anchor::default(),
            ephemeral: None,
        }
    }
}

/// Identity + content + config wrapper around one candidate entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub unique_id: UniqueId,
    pub identifier: String,
    pub source_type: SourceType,
    pub entry: EntryFields,
}

impl ContextSource {
    pub fn new(unique_id: UniqueId, identifier: impl Into<String>, source_type: SourceType, entry: EntryFields) -> Self {
        Self {
            unique_id,
            identifier: identifier.into(),
            source_type,
            entry,
        }
    }

    pub fn text(&self) -> &str {
        &self.entry.text
    }

    pub fn has_keys(&self) -> bool {
        !self.entry.keys.is_empty()
    }
}
