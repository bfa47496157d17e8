use crate::budget::BudgetedSource;
use crate::error::{Result, SelectionError};
use std::cmp::Ordering;

/// One named tie-break rule. A comparator is an ordered list of these;
/// rules apply left to right and the first non-zero result wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingRule {
    /// Sources holding a reservation come first.
    Reserved,
    /// Higher budget priority first.
    BudgetPriority,
    /// Shallower activation (direct before cascade) first.
    ActivationDegree,
    /// Fixed source-type rank.
    Type,
    /// Original position in the source list. Total, so any list ending
    /// here is a total order.
    OriginalOrder,
    /// Lottery draw order; `None` (ineligible) sorts first.
    SelectionIndex,
}

impl OrderingRule {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "reserved" => Ok(OrderingRule::Reserved),
            "budget_priority" => Ok(OrderingRule::BudgetPriority),
            "activation_degree" => Ok(OrderingRule::ActivationDegree),
            "type" => Ok(OrderingRule::Type),
            "original_order" => Ok(OrderingRule::OriginalOrder),
            "selection_index" => Ok(OrderingRule::SelectionIndex),
            other => Err(SelectionError::UnknownOrderingRule(other.to_string())),
        }
    }

    pub fn compare(self, a: &BudgetedSource, b: &BudgetedSource) -> Ordering {
        match self {
            OrderingRule::Reserved => b.has_reservation().cmp(&a.has_reservation()),
            OrderingRule::BudgetPriority => b
                .record
                .source
                .entry
                .budget_priority
                .cmp(&a.record.source.entry.budget_priority),
            OrderingRule::ActivationDegree => a.record.activation_degree().cmp(&b.record.activation_degree()),
            OrderingRule::Type => a
                .record
                .source
                .source_type
                .rank()
                .cmp(&b.record.source.source_type.rank()),
            OrderingRule::OriginalOrder => a.order_index.cmp(&b.order_index),
            OrderingRule::SelectionIndex => match (a.selection_index, b.selection_index) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y),
            },
        }
    }
}

/// Build a comparator list from configured names, failing fast on unknown
/// names. The list is always terminated with `type` then `original_order`
/// so the resulting order is total.
pub fn build_ordering(names: &[String]) -> Result<Vec<OrderingRule>> {
    let mut rules: Vec<OrderingRule> = names.iter().map(|n| OrderingRule::parse(n)).collect::<Result<_>>()?;
    for terminator in [OrderingRule::Type, OrderingRule::OriginalOrder] {
        if !rules.contains(&terminator) {
            rules.push(terminator);
        }
    }
    Ok(rules)
}

pub fn compare_with(rules: &[OrderingRule], a: &BudgetedSource, b: &BudgetedSource) -> Ordering {
    for rule in rules {
        let ordering = rule.compare(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
