//! Selection: turns the activated set into an ordered, budget-annotated
//! stream for assembly.
//!
//! Two interchangeable strategies, chosen by configuration: a fully
//! deterministic comparator pipeline ("vanilla") and a weighted-random
//! lottery over priority pools. Both resolve budget stats for the entire
//! candidate set before any ordering decision is made.

mod budget;
mod engine;
mod error;
mod ordering;
mod weighted;

pub use budget::BudgetedSource;
pub use engine::{SelectionEngine, SelectionOutcome};
pub use error::{Result, SelectionError};
pub use ordering::OrderingRule;
