use crate::budget::BudgetedSource;
use crate::error::{Result, SelectionError};
use loreweave_protocol::{Combine, WeightedRandomConfig, WeightingSpec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One named weight function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Weigher {
    /// +1 per story key match.
    StoryCount,
    /// Cascade matches count more the shallower the cascade.
    CascadeBonus,
    /// Linear penalty for story matches beyond the search range, saturating
    /// at twice the range.
    RangePenalty,
    /// Penalty when cascade activity outnumbers story-triggered activity.
    CascadeRatioPenalty,
}

impl Weigher {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "story_count" => Ok(Weigher::StoryCount),
            "cascade_bonus" => Ok(Weigher::CascadeBonus),
            "range_penalty" => Ok(Weigher::RangePenalty),
            "cascade_ratio_penalty" => Ok(Weigher::CascadeRatioPenalty),
            other => Err(SelectionError::UnknownWeigher(other.to_string())),
        }
    }

    fn evaluate(self, source: &BudgetedSource, story_len: usize) -> f64 {
        match self {
            Weigher::StoryCount => source.record.story_match_count() as f64,
            Weigher::CascadeBonus => source
                .record
                .cascade()
                .map(|c| c.match_count as f64 / c.initial_degree.max(1) as f64)
                .unwrap_or(0.0),
            Weigher::RangePenalty => {
                let Some(range) = source.record.source.entry.search_range.filter(|r| *r > 0) else {
                    return 0.0;
                };
                let Some(matches) = source.record.keyed_matches() else {
                    return 0.0;
                };
                matches
                    .matches()
                    .map(|m| {
                        let distance = story_len.saturating_sub(m.index);
                        if distance <= range {
                            0.0
                        } else {
                            -(((distance - range) as f64 / range as f64).min(1.0))
                        }
                    })
                    .sum()
            }
            Weigher::CascadeRatioPenalty => {
                let story = source.record.story_match_count();
                let cascade = source.record.cascade_match_count();
                if cascade > story {
                    -((cascade - story) as f64 / cascade as f64)
                } else {
                    0.0
                }
            }
        }
    }
}

/// A validated weighting spec tree.
#[derive(Debug, Clone)]
enum Spec {
    Leaf(Weigher),
    Group { combine: Combine, of: Vec<Spec> },
}

impl Spec {
    fn validate(spec: &WeightingSpec) -> Result<Self> {
        match spec {
            WeightingSpec::Name(name) => Ok(Spec::Leaf(Weigher::parse(name)?)),
            WeightingSpec::Group { combine, of } => Ok(Spec::Group {
                combine: *combine,
                of: of.iter().map(Spec::validate).collect::<Result<_>>()?,
            }),
        }
    }

    fn evaluate(&self, source: &BudgetedSource, story_len: usize) -> f64 {
        match self {
            Spec::Leaf(weigher) => weigher.evaluate(source, story_len),
            Spec::Group { combine, of } => {
                let children = of.iter().map(|s| s.evaluate(source, story_len));
                match combine {
                    Combine::Sum => children.sum(),
                    Combine::Product => children.product(),
                }
            }
        }
    }
}

/// Key splitting eligible sources into independently competing pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKey {
    BudgetPriority,
    Category,
}

/// Pool identity; priority pools drain highest first, category pools in
/// name order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PoolKey {
    Priority(i64),
    Category(String),
}

/// Weighted-random strategy state, validated once at engine construction.
#[derive(Debug, Clone)]
pub struct WeightedPlan {
    specs: Vec<Spec>,
    seed_with_story: bool,
    group_key: GroupKey,
}

impl WeightedPlan {
    pub fn from_config(config: &WeightedRandomConfig) -> Result<Self> {
        let specs = config.weighting.iter().map(Spec::validate).collect::<Result<_>>()?;
        let group_key = match config.selection_ordering.as_str() {
            "budget_priority" => GroupKey::BudgetPriority,
            "category" => GroupKey::Category,
            other => return Err(SelectionError::UnknownGroupKey(other.to_string())),
        };
        Ok(Self {
            specs,
            seed_with_story: config.seed_with_story,
            group_key,
        })
    }

    /// Composite score; top-level specs fold multiplicatively.
    fn score(&self, source: &BudgetedSource, story_len: usize) -> f64 {
        self.specs.iter().map(|s| s.evaluate(source, story_len)).product()
    }

    fn rng(&self, story_text: &str) -> StdRng {
        if self.seed_with_story {
            let digest = Sha256::digest(story_text.as_bytes());
            let mut seed = [0u8; 8];
            seed.copy_from_slice(&digest[..8]);
            StdRng::seed_from_u64(u64::from_le_bytes(seed))
        } else {
            StdRng::from_entropy()
        }
    }

    /// Run the lottery. Returns winners tagged with their draw order and
    /// the zero-or-negative-weight sources excluded from their pools.
    /// Scores are computed once, up front, never mid-sampling.
    pub fn draw(
        &self,
        eligible: Vec<BudgetedSource>,
        story_text: &str,
        story_len: usize,
    ) -> (Vec<BudgetedSource>, Vec<BudgetedSource>) {
        let mut excluded = Vec::new();
        let mut pools: BTreeMap<PoolKey, Vec<(BudgetedSource, f64)>> = BTreeMap::new();
        for source in eligible {
            let score = self.score(&source, story_len);
            if score <= 0.0 {
                log::debug!(
                    "source {} excluded from lottery (score {score})",
                    source.record.source.unique_id
                );
                excluded.push(source);
                continue;
            }
            let key = match self.group_key {
                GroupKey::BudgetPriority => PoolKey::Priority(source.record.source.entry.budget_priority),
                GroupKey::Category => {
                    PoolKey::Category(source.record.source.entry.category.clone().unwrap_or_default())
                }
            };
            pools.entry(key).or_default().push((source, score));
        }

        let mut rng = self.rng(story_text);
        let mut winners = Vec::new();
        let mut next_index = 0usize;
        // Priority pools drain highest first; category pools in key order.
        let pool_order: Vec<PoolKey> = match self.group_key {
            GroupKey::BudgetPriority => pools.keys().rev().cloned().collect(),
            GroupKey::Category => pools.keys().cloned().collect(),
        };
        for key in pool_order {
            let mut pool = pools.remove(&key).unwrap_or_default();
            while !pool.is_empty() {
                let winner = roulette(&mut rng, &pool);
                let (mut source, _) = pool.swap_remove(winner);
                source.selection_index = Some(next_index);
                next_index += 1;
                winners.push(source);
            }
        }
        (winners, excluded)
    }
}

/// Roulette wheel: cumulative weight intervals, one uniform draw over the
/// total weight.
fn roulette(rng: &mut StdRng, pool: &[(BudgetedSource, f64)]) -> usize {
    let total: f64 = pool.iter().map(|(_, w)| w).sum();
    let draw = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    for (idx, (_, weight)) in pool.iter().enumerate() {
        cumulative += weight;
        if draw < cumulative {
            return idx;
        }
    }
    pool.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreweave_activation::{ActivationRecord, CascadeMatch, Evidence};
    use loreweave_protocol::{ContextSource, EntryFields, KeyMatch, MatchSet, SourceType};

    fn keyed_source(id: u64, match_indexes: &[usize], search_range: Option<usize>) -> BudgetedSource {
        let mut record = ActivationRecord::new(ContextSource::new(
            id,
            format!("lore:{id}"),
            SourceType::Lore,
            EntryFields {
                search_range,
                ..EntryFields::default()
            },
        ));
        let mut matches = MatchSet::default();
        for &index in match_indexes {
            matches.insert("key", KeyMatch { index, span: 3 });
        }
        record.add(Evidence::Keyed(matches));
        BudgetedSource {
            record,
            token_budget: 10,
            reserved_tokens: 0,
            actual_reserved_tokens: 0,
            selection_index: None,
            order_index: id as usize,
        }
    }

    fn plan(config: &WeightedRandomConfig) -> WeightedPlan {
        WeightedPlan::from_config(config).unwrap()
    }

    #[test]
    fn unknown_weigher_fails_at_construction() {
        let config = WeightedRandomConfig {
            weighting: vec![WeightingSpec::Name("charisma".into())],
            ..WeightedRandomConfig::default()
        };
        assert_eq!(
            WeightedPlan::from_config(&config).unwrap_err(),
            SelectionError::UnknownWeigher("charisma".into())
        );
    }

    #[test]
    fn story_count_scores_one_per_match() {
        let plan = plan(&WeightedRandomConfig::default());
        let source = keyed_source(1, &[10, 20, 30], None);
        assert_eq!(plan.score(&source, 100), 3.0);
    }

    #[test]
    fn range_penalty_scales_linearly_past_the_edge() {
        let source = keyed_source(1, &[850], Some(100));
        // Distance from end = 150, range 100: halfway between edge and 2x.
        assert_eq!(Weigher::RangePenalty.evaluate(&source, 1000), -0.5);

        let source = keyed_source(2, &[700], Some(100));
        // Past twice the range, the penalty saturates.
        assert_eq!(Weigher::RangePenalty.evaluate(&source, 1000), -1.0);

        let source = keyed_source(3, &[950], Some(100));
        assert_eq!(Weigher::RangePenalty.evaluate(&source, 1000), 0.0);
    }

    #[test]
    fn cascade_bonus_decays_with_depth() {
        let mut shallow = keyed_source(1, &[], None);
        shallow.record.add(Evidence::Cascade(CascadeMatch {
            initial_degree: 1,
            final_degree: 1,
            match_count: 2,
        }));
        let mut deep = keyed_source(2, &[], None);
        deep.record.add(Evidence::Cascade(CascadeMatch {
            initial_degree: 4,
            final_degree: 4,
            match_count: 2,
        }));
        assert!(Weigher::CascadeBonus.evaluate(&shallow, 0) > Weigher::CascadeBonus.evaluate(&deep, 0));
    }

    #[test]
    fn cascade_ratio_penalty_applies_when_cascade_dominates() {
        let mut source = keyed_source(1, &[10], None);
        source.record.add(Evidence::Cascade(CascadeMatch {
            initial_degree: 1,
            final_degree: 1,
            match_count: 4,
        }));
        let penalty = Weigher::CascadeRatioPenalty.evaluate(&source, 100);
        assert_eq!(penalty, -0.75);

        let balanced = keyed_source(2, &[10, 20], None);
        assert_eq!(Weigher::CascadeRatioPenalty.evaluate(&balanced, 100), 0.0);
    }

    #[test]
    fn zero_weight_sources_are_excluded() {
        let plan = plan(&WeightedRandomConfig::default());
        // No story matches, no cascade: score 0.
        let silent = keyed_source(1, &[], None);
        let loud = keyed_source(2, &[50], None);
        let (winners, excluded) = plan.draw(vec![silent, loud], "story", 100);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].record.source.unique_id, 2);
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].record.source.unique_id, 1);
    }

    #[test]
    fn seeded_draw_is_reproducible() {
        let plan = plan(&WeightedRandomConfig::default());
        let sources = || (0..8).map(|id| keyed_source(id, &[id as usize * 10], None)).collect();
        let (first, _) = plan.draw(sources(), "the same story", 100);
        let (second, _) = plan.draw(sources(), "the same story", 100);
        let order = |winners: &[BudgetedSource]| {
            winners
                .iter()
                .map(|w| w.record.source.unique_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
        assert!(first.iter().enumerate().all(|(i, w)| w.selection_index == Some(i)));
    }

    #[test]
    fn pools_drain_in_descending_priority() {
        let plan = plan(&WeightedRandomConfig::default());
        let mut low = keyed_source(1, &[10], None);
        low.record.source.entry.budget_priority = -5;
        let mut high = keyed_source(2, &[10], None);
        high.record.source.entry.budget_priority = 5;
        let (winners, _) = plan.draw(vec![low, high], "story", 100);
        assert_eq!(winners[0].record.source.unique_id, 2);
        assert_eq!(winners[1].record.source.unique_id, 1);
    }
}
