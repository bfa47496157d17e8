use serde::{Deserialize, Serialize};

/// Pipeline configuration. Loading is host territory; this crate only
/// defines the shape and the defaults. Unknown rule or weigher names are
/// rejected when the engines are constructed, before any source is
/// processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Total token budget for the assembled context.
    pub context_size: usize,
    pub selection: SelectionConfig,
    pub weighted_random: WeightedRandomConfig,
    pub sub_context: SubContextConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_size: 2048,
            selection: SelectionConfig::default(),
            weighted_random: WeightedRandomConfig::default(),
            sub_context: SubContextConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Ordered tie-break rule names; first non-zero comparison wins. The
    /// engine always appends `type` and `original_order` terminators.
    pub insertion_ordering: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            insertion_ordering: vec!["reserved".into(), "budget_priority".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedRandomConfig {
    pub enabled: bool,
    /// Scoring composite; top-level specs fold multiplicatively.
    pub weighting: Vec<WeightingSpec>,
    /// Seed the lottery from the story text for reproducible draws.
    pub seed_with_story: bool,
    /// Grouping key splitting eligible sources into competing pools.
    pub selection_ordering: String,
}

impl Default for WeightedRandomConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weighting: vec![WeightingSpec::Group {
                combine: Combine::Sum,
                of: vec![
                    WeightingSpec::Name("story_count".into()),
                    WeightingSpec::Name("cascade_bonus".into()),
                    WeightingSpec::Name("range_penalty".into()),
                    WeightingSpec::Name("cascade_ratio_penalty".into()),
                ],
            }],
            seed_with_story: true,
            selection_ordering: "budget_priority".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SubContextConfig {
    /// Keep category members contiguous in the assembled output.
    pub grouped_insertion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    Sum,
    Product,
}

/// A weighting spec is either a weigher name or a group folding its
/// children with its own operator. Groups nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightingSpec {
    Name(String),
    Group { combine: Combine, of: Vec<WeightingSpec> },
}
