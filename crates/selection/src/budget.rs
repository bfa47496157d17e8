use crate::error::Result;
use futures::future::try_join_all;
use loreweave_activation::ActivationRecord;
use loreweave_protocol::TokenCodec;
use std::sync::Arc;

/// An activated source annotated with its token-budget stats.
#[derive(Debug, Clone)]
pub struct BudgetedSource {
    pub record: ActivationRecord,
    /// Most tokens this source may consume: its declared cap, never more
    /// than its full text costs.
    pub token_budget: usize,
    /// Reservation declared by the entry.
    pub reserved_tokens: usize,
    /// Reservation actually held: capped by the token budget, released
    /// exactly once at insertion or rejection.
    pub actual_reserved_tokens: usize,
    /// Draw order from the weighted lottery; `None` for ineligible sources
    /// and for the vanilla strategy. `None` sorts first.
    pub selection_index: Option<usize>,
    /// Original position in the source list, the final tie-break.
    pub order_index: usize,
}

impl BudgetedSource {
    /// Compute stats for one record via the codec.
    pub async fn compute(codec: &dyn TokenCodec, record: ActivationRecord, order_index: usize) -> Result<Self> {
        let encoded_len = codec.encode(record.source.text()).await?.len();
        let token_budget = record
            .source
            .entry
            .token_budget
            .map_or(encoded_len, |declared| declared.min(encoded_len));
        let reserved_tokens = record.source.entry.reserved_tokens;
        let actual_reserved_tokens = reserved_tokens.min(token_budget);
        Ok(Self {
            record,
            token_budget,
            reserved_tokens,
            actual_reserved_tokens,
            selection_index: None,
            order_index,
        })
    }

    pub fn has_reservation(&self) -> bool {
        self.actual_reserved_tokens > 0
    }
}

/// Fan stats computation out across all candidates. Ordering decisions wait
/// for the entire set; there is no streaming partial order.
pub async fn compute_all(
    codec: &Arc<dyn TokenCodec>,
    records: Vec<(usize, ActivationRecord)>,
) -> Result<Vec<BudgetedSource>> {
    try_join_all(
        records
            .into_iter()
            .map(|(order_index, record)| BudgetedSource::compute(codec.as_ref(), record, order_index)),
    )
    .await
}
