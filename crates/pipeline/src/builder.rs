use crate::defaults::{KeywordSearcher, StepWindow, WordCodec};
use crate::error::Result;
use loreweave_activation::{ActivationEngine, ActivationRecord};
use loreweave_assembly::Assembler;
use loreweave_protocol::{
    ContextConfig, ContextSource, EphemeralWindow, OutputSegment, RejectedReport, ReportReason, SearchService,
    SourceReport, SourceStatus, SourceType, TokenCodec,
};
use loreweave_selection::SelectionEngine;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything one build produces: the final text, its exact token cost, the
/// per-source slices in output order and one report per input source.
#[derive(Debug)]
pub struct BuiltContext {
    pub text: String,
    pub consumed_tokens: usize,
    pub segments: Vec<OutputSegment>,
    /// One report per input source, in input order. Every source lands in
    /// exactly one terminal status.
    pub reports: Vec<SourceReport>,
}

/// Front door for the whole pipeline. Construction validates the config;
/// a build never mutates the builder, so one builder serves many builds.
pub struct ContextBuilder {
    activation: ActivationEngine,
    selection: SelectionEngine,
    assembler: Assembler,
    context_size: usize,
}

impl ContextBuilder {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        search: Arc<dyn SearchService>,
        ephemeral: Arc<dyn EphemeralWindow>,
        config: &ContextConfig,
    ) -> Result<Self> {
        Ok(Self {
            activation: ActivationEngine::new(search, ephemeral),
            selection: SelectionEngine::new(Arc::clone(&codec), config)?,
            assembler: Assembler::new(codec, config),
            context_size: config.context_size,
        })
    }

    /// Builder backed by the in-process defaults: word tokenizer, substring
    /// keyword search and the step-window policy.
    pub fn with_defaults(config: &ContextConfig) -> Result<Self> {
        Self::new(
            Arc::new(WordCodec::new()),
            Arc::new(KeywordSearcher),
            Arc::new(StepWindow),
            config,
        )
    }

    /// Run one batch of sources through activation, selection and assembly.
    /// The story text searched for activation keys is the text of the first
    /// enabled story-typed source.
    pub async fn build(&self, sources: Vec<ContextSource>, current_step: u32) -> Result<BuiltContext> {
        let input_order: HashMap<_, _> = sources
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.unique_id, idx))
            .collect();

        // 1. Disabled sources never reach activation.
        let (enabled, disabled): (Vec<_>, Vec<_>) = sources.into_iter().partition(|s| s.entry.enabled);
        let mut reports: Vec<SourceReport> = disabled
            .into_iter()
            .map(|s| {
                SourceReport::Rejected(RejectedReport {
                    unique_id: s.unique_id,
                    identifier: s.identifier,
                    status: SourceStatus::Disabled,
                    reason: ReportReason::Disabled,
                })
            })
            .collect();

        let story_text: String = enabled
            .iter()
            .find(|s| s.source_type == SourceType::Story)
            .map(|s| s.entry.text.clone())
            .unwrap_or_default();

        // 2. Activation.
        let outcome = self.activation.activate(&story_text, enabled, current_step).await?;
        let (activated, inactive): (Vec<_>, Vec<_>) =
            outcome.records.into_iter().partition(ActivationRecord::is_activated);
        reports.extend(inactive.into_iter().map(|r| {
            let reason = if r.source.source_type == SourceType::Ephemeral {
                ReportReason::EphemeralInactive
            } else {
                ReportReason::NoKeyMatch
            };
            SourceReport::Rejected(RejectedReport {
                unique_id: r.source.unique_id,
                identifier: r.source.identifier,
                status: SourceStatus::Inactive,
                reason,
            })
        }));

        // 3. Selection.
        let selection = self.selection.select(&story_text, activated).await?;
        reports.extend(selection.unselected.into_iter().map(|(r, reason)| {
            SourceReport::Rejected(RejectedReport {
                unique_id: r.source.unique_id,
                identifier: r.source.identifier,
                status: SourceStatus::Unselected,
                reason,
            })
        }));

        // 4. Assembly.
        let assembled = self.assembler.assemble(self.context_size, selection.selected).await?;
        reports.extend(assembled.reports);

        reports.sort_by_key(|r| input_order.get(&r.unique_id()).copied().unwrap_or(usize::MAX));

        let inserted = reports
            .iter()
            .filter(|r| matches!(r, SourceReport::Inserted(_)))
            .count();
        log::info!(
            "context built: {inserted}/{} sources inserted, {}/{} tokens",
            reports.len(),
            assembled.assembly.consumed_tokens(),
            self.context_size
        );

        Ok(BuiltContext {
            text: assembled.assembly.full_text(),
            consumed_tokens: assembled.assembly.consumed_tokens(),
            segments: assembled.assembly.segments(),
            reports,
        })
    }
}
