use crate::budget::{compute_all, BudgetedSource};
use crate::error::Result;
use crate::ordering::{build_ordering, compare_with, OrderingRule};
use crate::weighted::WeightedPlan;
use loreweave_activation::{ActivationRecord, EvidenceKind};
use loreweave_protocol::{ContextConfig, ReportReason, TokenCodec};
use std::sync::Arc;

/// Ordered, budget-annotated stream for assembly, plus the sources selection
/// dropped along the way.
#[derive(Debug)]
pub struct SelectionOutcome {
    pub selected: Vec<BudgetedSource>,
    pub unselected: Vec<(ActivationRecord, ReportReason)>,
}

/// Converts the activated set into assembly order via one of two strategies.
/// All configured names are validated here, at construction.
pub struct SelectionEngine {
    codec: Arc<dyn TokenCodec>,
    ordering: Vec<OrderingRule>,
    weighted_ordering: Vec<OrderingRule>,
    weighted: Option<WeightedPlan>,
}

impl SelectionEngine {
    pub fn new(codec: Arc<dyn TokenCodec>, config: &ContextConfig) -> Result<Self> {
        let ordering = build_ordering(&config.selection.insertion_ordering)?;
        // In weighted mode the pools have already competed on priority, so
        // draw order stands in for the priority rule.
        let weighted_ordering = ordering
            .iter()
            .map(|rule| match rule {
                OrderingRule::BudgetPriority => OrderingRule::SelectionIndex,
                other => *other,
            })
            .collect();
        let weighted = if config.weighted_random.enabled {
            Some(WeightedPlan::from_config(&config.weighted_random)?)
        } else {
            None
        };
        Ok(Self {
            codec,
            ordering,
            weighted_ordering,
            weighted,
        })
    }

    /// Order the activated set. `activated` must arrive in original source
    /// order; activation may emit out of order, the caller re-imposes it.
    pub async fn select(&self, story_text: &str, activated: Vec<ActivationRecord>) -> Result<SelectionOutcome> {
        match &self.weighted {
            None => self.select_vanilla(story_text, activated).await,
            Some(plan) => self.select_weighted(plan, story_text, activated).await,
        }
    }

    async fn select_vanilla(&self, story_text: &str, activated: Vec<ActivationRecord>) -> Result<SelectionOutcome> {
        let story_len = story_text.len();

        // 1. Range filter: keyed-only sources must match inside the
        //    trailing window.
        let mut kept = Vec::new();
        let mut unselected = Vec::new();
        for (order_index, record) in activated.into_iter().enumerate() {
            if record.keyed_only() && !in_search_range(&record, story_len) {
                unselected.push((record, ReportReason::OutOfSearchRange));
            } else {
                kept.push((order_index, record));
            }
        }

        // 2. Budget stats for the full surviving set.
        let mut budgeted = compute_all(&self.codec, kept).await?;

        // 3. Composite comparator, first non-zero rule wins.
        budgeted.sort_by(|a, b| compare_with(&self.ordering, a, b));

        log::debug!("vanilla selection: {} selected, {} dropped", budgeted.len(), unselected.len());
        Ok(SelectionOutcome {
            selected: budgeted,
            unselected,
        })
    }

    async fn select_weighted(
        &self,
        plan: &WeightedPlan,
        story_text: &str,
        activated: Vec<ActivationRecord>,
    ) -> Result<SelectionOutcome> {
        let story_len = story_text.len();
        let indexed: Vec<(usize, ActivationRecord)> = activated.into_iter().enumerate().collect();
        let budgeted = compute_all(&self.codec, indexed).await?;

        // Forced/ephemeral sources never enter the lottery.
        let (ineligible, eligible): (Vec<_>, Vec<_>) = budgeted.into_iter().partition(|b| {
            b.record.has_kind(EvidenceKind::Forced) || b.record.has_kind(EvidenceKind::Ephemeral)
        });

        let (winners, excluded) = plan.draw(eligible, story_text, story_len);
        let unselected = excluded
            .into_iter()
            .map(|b| (b.record, ReportReason::ZeroWeight))
            .collect();

        let mut selected: Vec<BudgetedSource> = ineligible.into_iter().chain(winners).collect();
        selected.sort_by(|a, b| compare_with(&self.weighted_ordering, a, b));

        log::debug!("weighted selection: {} selected", selected.len());
        Ok(SelectionOutcome {
            selected,
            unselected,
        })
    }
}

fn in_search_range(record: &ActivationRecord, story_len: usize) -> bool {
    let Some(range) = record.source.entry.search_range else {
        return true;
    };
    let Some(matches) = record.keyed_matches() else {
        return true;
    };
    let window_start = story_len.saturating_sub(range);
    matches
        .highest_index()
        .is_some_and(|highest| highest.index >= window_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loreweave_activation::Evidence;
    use loreweave_protocol::{CodecError, ContextSource, EntryFields, KeyMatch, MatchSet, SourceType};

    struct WordCount;

    #[async_trait]
    impl TokenCodec for WordCount {
        async fn encode(&self, text: &str) -> std::result::Result<Vec<u32>, CodecError> {
            Ok(text.split_whitespace().map(|_| 0).collect())
        }

        async fn decode(&self, _tokens: &[u32]) -> std::result::Result<String, CodecError> {
            Ok(String::new())
        }
    }

    fn keyed_record(id: u64, match_index: usize, search_range: Option<usize>) -> ActivationRecord {
        let mut record = ActivationRecord::new(ContextSource::new(
            id,
            format!("lore:{id}"),
            SourceType::Lore,
            EntryFields {
                text: "some entry text".into(),
                search_range,
                ..EntryFields::default()
            },
        ));
        let mut matches = MatchSet::default();
        matches.insert("key", KeyMatch { index: match_index, span: 3 });
        record.add(Evidence::Keyed(matches));
        record
    }

    fn engine(config: &ContextConfig) -> SelectionEngine {
        SelectionEngine::new(Arc::new(WordCount), config).unwrap()
    }

    #[tokio::test]
    async fn range_filter_uses_trailing_window() {
        let config = ContextConfig::default();
        let story = "x".repeat(1000);
        let outcome = engine(&config)
            .select(&story, vec![keyed_record(1, 400, Some(100)), keyed_record(2, 900, Some(100))])
            .await
            .unwrap();

        assert_eq!(outcome.selected.len(), 1);
        assert_eq!(outcome.selected[0].record.source.unique_id, 2);
        assert_eq!(outcome.unselected.len(), 1);
        assert_eq!(outcome.unselected[0].0.source.unique_id, 1);
        assert_eq!(outcome.unselected[0].1, ReportReason::OutOfSearchRange);
    }

    #[tokio::test]
    async fn forced_sources_bypass_the_range_filter() {
        let config = ContextConfig::default();
        let mut record = keyed_record(1, 0, Some(10));
        record.add(Evidence::Forced);
        let story = "x".repeat(1000);
        let outcome = engine(&config).select(&story, vec![record]).await.unwrap();
        assert_eq!(outcome.selected.len(), 1);
    }

    #[tokio::test]
    async fn vanilla_orders_by_priority_then_original_position() {
        let config = ContextConfig::default();
        let mut low = keyed_record(1, 990, None);
        low.source.entry.budget_priority = -1;
        let high = keyed_record(2, 990, None);
        let tied = keyed_record(3, 990, None);

        let story = "x".repeat(1000);
        let outcome = engine(&config).select(&story, vec![low, high, tied]).await.unwrap();
        let ids: Vec<u64> = outcome.selected.iter().map(|b| b.record.source.unique_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn vanilla_is_deterministic() {
        let config = ContextConfig::default();
        let story = "x".repeat(1000);
        let records = || vec![keyed_record(1, 950, None), keyed_record(2, 960, None), keyed_record(3, 970, None)];
        let first = engine(&config).select(&story, records()).await.unwrap();
        let second = engine(&config).select(&story, records()).await.unwrap();
        let ids = |o: &SelectionOutcome| o.selected.iter().map(|b| b.record.source.unique_id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn weighted_emits_ineligible_before_winners() {
        let mut config = ContextConfig::default();
        config.weighted_random.enabled = true;

        let mut forced = ActivationRecord::new(ContextSource::new(
            9,
            "memory",
            SourceType::Memory,
            EntryFields {
                text: "remembered".into(),
                ..EntryFields::default()
            },
        ));
        forced.add(Evidence::Forced);

        let story = "x".repeat(100);
        let outcome = engine(&config)
            .select(&story, vec![keyed_record(1, 50, None), forced, keyed_record(2, 60, None)])
            .await
            .unwrap();

        assert_eq!(outcome.selected[0].record.source.unique_id, 9);
        assert!(outcome.selected[1..]
            .iter()
            .all(|b| b.selection_index.is_some()));
    }

    #[tokio::test]
    async fn weighted_with_story_seed_is_reproducible() {
        let mut config = ContextConfig::default();
        config.weighted_random.enabled = true;
        config.weighted_random.seed_with_story = true;

        let story = "The dragon roared across the valley.";
        let records = || (1..=6).map(|id| keyed_record(id, 5, None)).collect();
        let ids = |o: &SelectionOutcome| o.selected.iter().map(|b| b.record.source.unique_id).collect::<Vec<_>>();

        let first = engine(&config).select(story, records()).await.unwrap();
        let second = engine(&config).select(story, records()).await.unwrap();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn unknown_ordering_rule_fails_at_construction() {
        let mut config = ContextConfig::default();
        config.selection.insertion_ordering = vec!["by_vibes".into()];
        assert!(SelectionEngine::new(Arc::new(WordCount), &config).is_err());
    }
}
