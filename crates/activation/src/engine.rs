use crate::error::{ActivationError, Result};
use crate::record::{ActivationRecord, CascadeMatch, Evidence};
use loreweave_protocol::{ContextSource, EphemeralWindow, SearchService, SourceType, UniqueId};
use std::collections::HashMap;
use std::sync::Arc;

/// Runs every activation rule over a batch of sources and emits exactly one
/// terminal [`ActivationRecord`] per source.
pub struct ActivationEngine {
    search: Arc<dyn SearchService>,
    ephemeral: Arc<dyn EphemeralWindow>,
}

/// Terminal activation states, in input order.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub records: Vec<ActivationRecord>,
}

impl ActivationOutcome {
    pub fn activated(&self) -> impl Iterator<Item = &ActivationRecord> {
        self.records.iter().filter(|r| r.is_activated())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ActivationRecord> {
        self.records.iter().filter(|r| !r.is_activated())
    }
}

impl ActivationEngine {
    pub fn new(search: Arc<dyn SearchService>, ephemeral: Arc<dyn EphemeralWindow>) -> Self {
        Self { search, ephemeral }
    }

    /// Evaluate all rules for every source. Direct checks (forced,
    /// ephemeral, keyed) run concurrently into separate buffers and are
    /// coalesced per unique id before the cascade rounds begin.
    pub async fn activate(
        &self,
        story_text: &str,
        sources: Vec<ContextSource>,
        current_step: u32,
    ) -> Result<ActivationOutcome> {
        // 1. Direct rules.
        let (forced, ephemeral, keyed) = tokio::join!(
            self.forced_round(&sources),
            self.ephemeral_round(&sources, current_step),
            self.keyed_round(story_text, &sources),
        );
        let keyed = keyed?;

        // 2. Coalesce all evidence for one unique id.
        let mut records: Vec<ActivationRecord> = sources.into_iter().map(ActivationRecord::new).collect();
        let by_id: HashMap<UniqueId, usize> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.source.unique_id, idx))
            .collect();
        for (id, evidence) in forced.into_iter().chain(ephemeral).chain(keyed) {
            if let Some(&idx) = by_id.get(&id) {
                records[idx].add(evidence);
            }
        }

        log::debug!(
            "direct round: {}/{} sources activated",
            records.iter().filter(|r| r.is_activated()).count(),
            records.len()
        );

        // 3. Cascade fixed point.
        self.cascade(&mut records)?;

        Ok(ActivationOutcome { records })
    }

    async fn forced_round(&self, sources: &[ContextSource]) -> Vec<(UniqueId, Evidence)> {
        sources
            .iter()
            .filter(|s| s.source_type.is_always_forced() || s.entry.force_activation)
            .map(|s| (s.unique_id, Evidence::Forced))
            .collect()
    }

    async fn ephemeral_round(&self, sources: &[ContextSource], current_step: u32) -> Vec<(UniqueId, Evidence)> {
        sources
            .iter()
            .filter(|s| s.source_type == SourceType::Ephemeral)
            .filter(|s| {
                s.entry
                    .ephemeral
                    .as_ref()
                    .is_some_and(|cfg| self.ephemeral.check_activation(cfg, current_step))
            })
            .map(|s| (s.unique_id, Evidence::Ephemeral))
            .collect()
    }

    async fn keyed_round(
        &self,
        story_text: &str,
        sources: &[ContextSource],
    ) -> Result<Vec<(UniqueId, Evidence)>> {
        let keyed: Vec<&ContextSource> = sources.iter().filter(|s| s.has_keys()).collect();
        let matched = self.search.search_for_lore(story_text, &keyed)?;
        Ok(matched
            .into_iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(id, set)| (id, Evidence::Keyed(set)))
            .collect())
    }

    /// Repeatedly search still-unactivated keyed entries against the text
    /// activated by the previous pass, merging results only at pass
    /// boundaries. Terminates because every continued pass activates at
    /// least one new entry from a finite set; the pass bound is defensive.
    fn cascade(&self, records: &mut [ActivationRecord]) -> Result<()> {
        let max_passes = records.len() as u32 + 1;
        let mut pass: u32 = 0;
        // An entry that matched earlier activated text would already be
        // activated, so each pass only needs the previous pass's text.
        let mut fresh_text = cascade_text(records.iter().filter(|r| r.is_activated()));

        loop {
            if fresh_text.trim().is_empty() {
                break;
            }
            let pending: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| !r.is_activated() && r.source.has_keys())
                .map(|(idx, _)| idx)
                .collect();
            let earlier: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_activated() && r.cascade().is_some())
                .map(|(idx, _)| idx)
                .collect();
            if pending.is_empty() && earlier.is_empty() {
                break;
            }

            pass += 1;
            if pass > max_passes {
                return Err(ActivationError::CascadeNonTermination {
                    passes: pass,
                    sources: records.len(),
                });
            }

            // Fresh per-pass buffers; shared state is untouched until the
            // pass boundary below.
            let mut newly: Vec<(usize, usize)> = Vec::new();
            for idx in pending {
                let matches = self.search.search(&fresh_text, &records[idx].source.entry.keys)?;
                if !matches.is_empty() {
                    newly.push((idx, matches.match_count()));
                }
            }
            let mut bumps: Vec<(usize, usize)> = Vec::new();
            for idx in earlier {
                let matches = self.search.search(&fresh_text, &records[idx].source.entry.keys)?;
                if !matches.is_empty() {
                    bumps.push((idx, matches.match_count()));
                }
            }

            if newly.is_empty() {
                // Degree bumps alone never justify another pass.
                for (idx, count) in bumps {
                    if let Some(cascade) = records[idx].cascade_mut() {
                        cascade.final_degree = pass;
                        cascade.match_count += count;
                    }
                }
                break;
            }

            log::debug!("cascade pass {pass}: {} new activations", newly.len());

            for (idx, count) in bumps {
                if let Some(cascade) = records[idx].cascade_mut() {
                    cascade.final_degree = pass;
                    cascade.match_count += count;
                }
            }
            fresh_text = cascade_text(newly.iter().map(|&(idx, _)| &records[idx]));
            for (idx, count) in newly {
                records[idx].add(Evidence::Cascade(CascadeMatch {
                    initial_degree: pass,
                    final_degree: pass,
                    match_count: count,
                }));
            }
        }
        Ok(())
    }
}

/// Text cascade passes search: every activated entry's text except the
/// story itself, which the keyed round already covered.
fn cascade_text<'a>(records: impl Iterator<Item = &'a ActivationRecord>) -> String {
    let mut out = String::new();
    for record in records {
        if record.source.source_type == SourceType::Story {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(record.source.text());
    }
    out
}
