use crate::compound::CompoundAssembly;
use crate::error::Result;
use crate::trim::trim_to_budget;
use loreweave_protocol::{
    Anchor, ContextConfig, InsertedReport, InsertionPlacement, MatchBias, Placement, RejectedReport, ReportReason,
    SourceReport, SourceStatus, SourceType, TokenCodec, TrimDirection, UniqueId,
};
use loreweave_selection::BudgetedSource;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Where the story landed, for key-relative anchoring. Story-local match
/// offsets only map into the assembly for the retained slice.
#[derive(Debug, Clone, Copy)]
struct StoryLanding {
    owner: UniqueId,
    /// Characters cut from the story's top during trimming.
    top_cut: usize,
    /// Length of the joining separator prefixed to the story fragment.
    prefix_len: usize,
    /// Characters of story text actually inserted.
    kept_len: usize,
}

#[derive(Debug)]
pub struct AssemblyOutcome {
    pub reports: Vec<SourceReport>,
    pub assembly: CompoundAssembly,
}

/// Sequential, token-budgeted inserter. Consumes the ordered stream one
/// source at a time; never parallel, since each step's budget depends on
/// the previous one.
pub struct Assembler {
    codec: Arc<dyn TokenCodec>,
    grouped_insertion: bool,
}

impl Assembler {
    pub fn new(codec: Arc<dyn TokenCodec>, config: &ContextConfig) -> Self {
        Self {
            codec,
            grouped_insertion: config.sub_context.grouped_insertion,
        }
    }

    /// Insert every source in stream order. Reports come out in exactly
    /// that order; the final assembly is the published snapshot.
    pub async fn assemble(&self, context_size: usize, stream: Vec<BudgetedSource>) -> Result<AssemblyOutcome> {
        let initial_reserved = stream.iter().map(|s| s.actual_reserved_tokens).sum();
        let mut assembly = CompoundAssembly::new(context_size, initial_reserved);
        let mut reports = Vec::with_capacity(stream.len());
        let mut story: Option<StoryLanding> = None;
        let mut last_in_category: HashMap<String, UniqueId> = HashMap::new();

        for source in stream {
            let report = self
                .insert_one(&mut assembly, &source, &mut story, &mut last_in_category)
                .await?;
            reports.push(report);
        }

        log::debug!(
            "assembly complete: {} tokens of {} consumed, {} sources inserted",
            assembly.consumed_tokens(),
            context_size,
            assembly.owners().len()
        );
        Ok(AssemblyOutcome { reports, assembly })
    }

    async fn insert_one(
        &self,
        assembly: &mut CompoundAssembly,
        source: &BudgetedSource,
        story: &mut Option<StoryLanding>,
        last_in_category: &mut HashMap<String, UniqueId>,
    ) -> Result<SourceReport> {
        let id = source.record.source.unique_id;
        let identifier = source.record.source.identifier.clone();
        let rejected = |reason| {
            SourceReport::Rejected(RejectedReport {
                unique_id: id,
                identifier: identifier.clone(),
                status: SourceStatus::Unbudgeted,
                reason,
            })
        };

        // 1. Exhausted budget rejects immediately. The reservation is still
        //    released, exactly once.
        if assembly.available_tokens() == 0 {
            assembly.release_reservation(source.actual_reserved_tokens);
            return Ok(rejected(ReportReason::NoSpace));
        }

        // 2. Release this source's own reservation before budgeting.
        assembly.release_reservation(source.actual_reserved_tokens);

        // 3. Pool allowance: a reservation guarantees at least the reserved
        //    amount even when free space is smaller, but never more than
        //    the physically available tokens.
        let available = assembly.available_tokens();
        let free = assembly.free_tokens();
        let pool = if source.actual_reserved_tokens > 0 {
            source.actual_reserved_tokens.max(free)
        } else {
            free
        }
        .min(available);

        // 4. Resolve the landing site. Joining newlines are pool overhead,
        //    not part of the entry's own token budget.
        let (offset, placement) = self.resolve_anchor(assembly, source, story, last_in_category);
        let full = assembly.full_text();
        let wants_prefix = offset > 0 && !full[..offset].ends_with('\n');
        let wants_suffix = offset < full.len() && !full[offset..].starts_with('\n');
        let newline_cost = self.codec.encode("\n").await?.len();
        let separator_budget = (usize::from(wants_prefix) + usize::from(wants_suffix)) * newline_cost;
        if pool <= separator_budget {
            return Ok(rejected(ReportReason::NoSpace));
        }

        let entry = &source.record.source.entry;
        let Some(trimmed) = trim_to_budget(
            self.codec.as_ref(),
            &entry.text,
            source.token_budget.min(pool - separator_budget),
            entry.trim_direction,
            entry.maximum_trim_type,
        )
        .await?
        else {
            return Ok(rejected(ReportReason::NoSpace));
        };

        // 5. Merge and charge. A trimmed edge that already carries a newline
        //    makes the joining one redundant.
        let prefix = if wants_prefix && !trimmed.text.starts_with('\n') { "\n" } else { "" };
        let suffix = if wants_suffix && !trimmed.text.ends_with('\n') { "\n" } else { "" };
        let final_text = format!("{prefix}{}{suffix}", trimmed.text);
        let separators = usize::from(!prefix.is_empty()) + usize::from(!suffix.is_empty());
        let cost = separators * newline_cost + trimmed.tokens;
        assembly.insert(offset, id, &identifier, &final_text)?;
        assembly.charge(cost);

        if source.record.source.source_type == SourceType::Story {
            let cut = entry.text.len() - trimmed.text.len();
            *story = Some(StoryLanding {
                owner: id,
                top_cut: if entry.trim_direction == TrimDirection::TrimTop { cut } else { 0 },
                prefix_len: prefix.len(),
                kept_len: trimmed.text.len(),
            });
        }
        if let Some(category) = entry.category.clone() {
            last_in_category.insert(category, id);
        }

        Ok(SourceReport::Inserted(InsertedReport {
            unique_id: id,
            identifier,
            reason: source.record.primary_reason(),
            tokens_consumed: cost,
            placement,
            snapshot: assembly.snapshot(),
            segments: assembly.segments(),
        }))
    }

    /// Full-text insertion offset plus the placement to report. Falls back
    /// to the document bottom whenever a relative anchor cannot be
    /// resolved against what is actually inserted.
    fn resolve_anchor(
        &self,
        assembly: &CompoundAssembly,
        source: &BudgetedSource,
        story: &Option<StoryLanding>,
        last_in_category: &HashMap<String, UniqueId>,
    ) -> (usize, InsertionPlacement) {
        if assembly.is_empty() {
            return (0, InsertionPlacement::Initial);
        }

        // Grouped insertion keeps category members contiguous, overriding
        // the entry's own anchor once a sibling is in.
        let entry = &source.record.source.entry;
        if self.grouped_insertion && source.record.source.source_type == SourceType::Lore {
            if let Some(sibling) = entry.category.as_ref().and_then(|c| last_in_category.get(c)) {
                if let Some((_, end)) = assembly.owner_range(*sibling) {
                    return (end, InsertionPlacement::After(*sibling));
                }
            }
        }

        match entry.anchor {
            Anchor::Absolute { position } => self.resolve_absolute(assembly, position),
            Anchor::KeyRelative { placement, bias } => self
                .resolve_key_relative(assembly, source, story, placement, bias)
                .unwrap_or_else(|| bottom_of(assembly)),
        }
    }

    fn resolve_absolute(&self, assembly: &CompoundAssembly, position: i64) -> (usize, InsertionPlacement) {
        let owners = assembly.owners();
        let n = owners.len() as i64;
        let slot = if position >= 0 {
            position.min(n)
        } else {
            (n + 1 + position).max(0)
        } as usize;

        if slot == 0 {
            (0, InsertionPlacement::Before(owners[0]))
        } else if slot >= owners.len() {
            (assembly.total_len(), InsertionPlacement::After(owners[owners.len() - 1]))
        } else {
            let end = assembly.owner_range(owners[slot - 1]).map(|(_, e)| e).unwrap_or(0);
            (end, InsertionPlacement::After(owners[slot - 1]))
        }
    }

    fn resolve_key_relative(
        &self,
        assembly: &CompoundAssembly,
        source: &BudgetedSource,
        story: &Option<StoryLanding>,
        placement: Placement,
        bias: MatchBias,
    ) -> Option<(usize, InsertionPlacement)> {
        let landing = story.as_ref()?;
        let matches = source.record.keyed_matches()?;
        let hit = match bias {
            MatchBias::TowardTop => matches.lowest_index()?,
            MatchBias::TowardBottom => matches.highest_index()?,
        };

        // Story-local offset -> offset into the inserted story content.
        if hit.index < landing.top_cut || hit.index - landing.top_cut >= landing.kept_len {
            return None;
        }
        let local = landing.prefix_len + (hit.index - landing.top_cut);

        match placement {
            Placement::Before => {
                let (start, _) = assembly.owner_range(landing.owner)?;
                Some((start, InsertionPlacement::Before(landing.owner)))
            }
            Placement::After => {
                let (_, end) = assembly.owner_range(landing.owner)?;
                Some((end, InsertionPlacement::After(landing.owner)))
            }
            Placement::Inside => {
                let (content, fragment_local) = assembly.owner_fragment_at(landing.owner, local)?;
                let boundary = next_word_boundary(content, fragment_local);
                let shunted = boundary - fragment_local;
                let full = assembly.resolve_owner_local(landing.owner, local)?;
                Some((
                    full + shunted,
                    InsertionPlacement::Inside {
                        target: landing.owner,
                        shunted_chars: shunted,
                    },
                ))
            }
        }
    }
}

fn bottom_of(assembly: &CompoundAssembly) -> (usize, InsertionPlacement) {
    let owners = assembly.owners();
    match owners.last() {
        Some(&last) => (assembly.total_len(), InsertionPlacement::After(last)),
        None => (0, InsertionPlacement::Initial),
    }
}

/// Smallest word boundary at or after `from`, so an inside insertion never
/// splits a word (or a multi-byte character).
fn next_word_boundary(content: &str, from: usize) -> usize {
    content
        .split_word_bound_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(content.len()))
        .find(|&idx| idx >= from)
        .unwrap_or(content.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loreweave_activation::{ActivationRecord, Evidence};
    use loreweave_protocol::{CodecError, ContextSource, EntryFields, KeyMatch, MatchSet, TrimType};
    use std::sync::Mutex;

    struct WordCodec {
        vocab: Mutex<Vec<String>>,
    }

    impl WordCodec {
        fn new() -> Self {
            Self {
                vocab: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TokenCodec for WordCodec {
        async fn encode(&self, text: &str) -> std::result::Result<Vec<u32>, CodecError> {
            let mut vocab = self.vocab.lock().unwrap();
            Ok(text
                .split_word_bounds()
                .map(|word| {
                    if let Some(pos) = vocab.iter().position(|v| v == word) {
                        pos as u32
                    } else {
                        vocab.push(word.to_string());
                        (vocab.len() - 1) as u32
                    }
                })
                .collect())
        }

        async fn decode(&self, tokens: &[u32]) -> std::result::Result<String, CodecError> {
            let vocab = self.vocab.lock().unwrap();
            tokens
                .iter()
                .map(|&t| {
                    vocab
                        .get(t as usize)
                        .cloned()
                        .ok_or_else(|| CodecError::Unrecognized(format!("token {t}")))
                })
                .collect()
        }
    }

    fn assembler() -> Assembler {
        Assembler::new(Arc::new(WordCodec::new()), &ContextConfig::default())
    }

    fn forced(id: u64, identifier: &str, source_type: SourceType, text: &str) -> BudgetedSource {
        let mut record = ActivationRecord::new(ContextSource::new(
            id,
            identifier,
            source_type,
            EntryFields {
                text: text.into(),
                ..EntryFields::default()
            },
        ));
        record.add(Evidence::Forced);
        budgeted(record)
    }

    fn budgeted(record: ActivationRecord) -> BudgetedSource {
        // Word-bound token count, matching WordCodec.
        let cost = record.source.entry.text.split_word_bounds().count();
        let token_budget = record.source.entry.token_budget.map_or(cost, |b| b.min(cost));
        let reserved = record.source.entry.reserved_tokens;
        BudgetedSource {
            token_budget,
            reserved_tokens: reserved,
            actual_reserved_tokens: reserved.min(token_budget),
            selection_index: None,
            order_index: record.source.unique_id as usize,
            record,
        }
    }

    fn keyed(id: u64, text: &str, match_index: usize, anchor: Anchor) -> BudgetedSource {
        let mut record = ActivationRecord::new(ContextSource::new(
            id,
            format!("lore:{id}"),
            SourceType::Lore,
            EntryFields {
                text: text.into(),
                anchor,
                ..EntryFields::default()
            },
        ));
        let mut matches = MatchSet::default();
        matches.insert("key", KeyMatch { index: match_index, span: 3 });
        record.add(Evidence::Keyed(matches));
        budgeted(record)
    }

    #[tokio::test]
    async fn first_insertion_is_initial() {
        let outcome = assembler()
            .assemble(100, vec![forced(1, "story", SourceType::Story, "The dragon roared.")])
            .await
            .unwrap();
        match &outcome.reports[0] {
            SourceReport::Inserted(r) => {
                assert_eq!(r.placement, InsertionPlacement::Initial);
                assert_eq!(r.snapshot.text, "The dragon roared.");
            }
            other => panic!("expected insertion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absolute_top_anchor_lands_before_everything() {
        let mut memory = forced(2, "memory", SourceType::Memory, "Long ago.");
        memory.record.source.entry.anchor = Anchor::Absolute { position: 0 };
        let outcome = assembler()
            .assemble(
                100,
                vec![forced(1, "story", SourceType::Story, "The dragon roared."), memory],
            )
            .await
            .unwrap();
        assert_eq!(outcome.assembly.full_text(), "Long ago.\nThe dragon roared.");
        match &outcome.reports[1] {
            SourceReport::Inserted(r) => assert_eq!(r.placement, InsertionPlacement::Before(1)),
            other => panic!("expected insertion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn budget_is_conserved_across_the_stream() {
        let sources = vec![
            forced(1, "story", SourceType::Story, "one two three four five six"),
            forced(2, "memory", SourceType::Memory, "seven eight nine ten"),
            forced(3, "an", SourceType::AuthorsNote, "eleven twelve"),
        ];
        let outcome = assembler().assemble(12, sources).await.unwrap();
        let total: usize = outcome.reports.iter().map(|r| r.tokens_consumed()).sum();
        assert_eq!(total, outcome.assembly.consumed_tokens());
        assert!(outcome.assembly.consumed_tokens() <= 12);
    }

    #[tokio::test]
    async fn exhausted_budget_rejects_with_no_space() {
        let sources = vec![
            forced(1, "story", SourceType::Story, "one two three"),
            forced(2, "memory", SourceType::Memory, "four five six"),
        ];
        // Story costs 5 tokens (words + spaces); budget of 5 leaves zero.
        let outcome = assembler().assemble(5, sources).await.unwrap();
        assert!(matches!(outcome.reports[0], SourceReport::Inserted(_)));
        match &outcome.reports[1] {
            SourceReport::Rejected(r) => {
                assert_eq!(r.status, SourceStatus::Unbudgeted);
                assert_eq!(r.reason, ReportReason::NoSpace);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reservation_returns_unused_tokens_to_the_pool() {
        let mut reserving = forced(2, "reserving", SourceType::Memory, "small note");
        reserving.record.source.entry.reserved_tokens = 20;
        reserving.reserved_tokens = 20;
        // Reservation is capped by the entry's own cost.
        reserving.actual_reserved_tokens = 20.min(reserving.token_budget);

        let big = forced(3, "big", SourceType::AuthorsNote, "a b c d e f g h i j k l m n o p");
        let story = forced(1, "story", SourceType::Story, "tiny story");

        let outcome = assembler().assemble(40, vec![story, reserving, big]).await.unwrap();
        // All three fit once the reservation is released.
        assert!(outcome.reports.iter().all(|r| matches!(r, SourceReport::Inserted(_))));
        assert_eq!(outcome.assembly.reserved_tokens(), 0);
    }

    #[tokio::test]
    async fn released_reservation_funds_later_sources() {
        // Holds 20 tokens, consumes 7 after a newline trim; the difference
        // must be spendable by the filler that follows.
        let mut record = ActivationRecord::new(ContextSource::new(
            2,
            "reserving",
            SourceType::Memory,
            EntryFields {
                text: "r1 r2 r3\nlong line with many extra words here now".into(),
                reserved_tokens: 20,
                maximum_trim_type: TrimType::Newline,
                ..EntryFields::default()
            },
        ));
        record.add(Evidence::Forced);
        let reserving = budgeted(record);
        assert_eq!(reserving.actual_reserved_tokens, 20);

        let story = forced(1, "story", SourceType::Story, "s1 s2 s3");
        let filler = forced(3, "filler", SourceType::AuthorsNote, "f1 f2 f3 f4 f5 f6");

        let outcome = assembler().assemble(26, vec![story, reserving, filler]).await.unwrap();
        assert!(outcome.reports.iter().all(|r| matches!(r, SourceReport::Inserted(_))));
        assert_eq!(outcome.assembly.full_text(), "s1 s2 s3\nr1 r2 r3\nf1 f2 f3 f4 f5 f6");
        assert_eq!(outcome.assembly.consumed_tokens(), 23);
        assert_eq!(outcome.assembly.reserved_tokens(), 0);
    }

    #[tokio::test]
    async fn key_relative_inside_shunts_to_a_word_boundary() {
        let story = forced(1, "story", SourceType::Story, "The dragon roared loudly tonight.");
        // Match lands mid-word ("dra|gon", index 7); the insert must shunt
        // to the next boundary.
        let lore = keyed(
            2,
            "(a red dragon)",
            7,
            Anchor::KeyRelative {
                placement: Placement::Inside,
                bias: MatchBias::TowardBottom,
            },
        );
        let outcome = assembler().assemble(100, vec![story, lore]).await.unwrap();
        match &outcome.reports[1] {
            SourceReport::Inserted(r) => match r.placement {
                InsertionPlacement::Inside { target, shunted_chars } => {
                    assert_eq!(target, 1);
                    assert_eq!(shunted_chars, 3);
                }
                other => panic!("expected inside placement, got {other:?}"),
            },
            other => panic!("expected insertion, got {other:?}"),
        }
        let text = outcome.assembly.full_text();
        assert!(text.contains("dragon"), "host word must stay intact: {text}");
    }

    #[tokio::test]
    async fn key_relative_without_story_falls_back_to_bottom() {
        let memory = forced(1, "memory", SourceType::Memory, "Long ago.");
        let lore = keyed(
            2,
            "dragon lore",
            4,
            Anchor::KeyRelative {
                placement: Placement::After,
                bias: MatchBias::TowardBottom,
            },
        );
        let outcome = assembler().assemble(100, vec![memory, lore]).await.unwrap();
        match &outcome.reports[1] {
            SourceReport::Inserted(r) => assert_eq!(r.placement, InsertionPlacement::After(1)),
            other => panic!("expected insertion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn grouped_insertion_keeps_categories_contiguous() {
        let config = ContextConfig {
            sub_context: loreweave_protocol::SubContextConfig { grouped_insertion: true },
            ..ContextConfig::default()
        };
        let assembler = Assembler::new(Arc::new(WordCodec::new()), &config);

        let story = forced(1, "story", SourceType::Story, "The dragon roared.");
        let mut first = keyed(2, "dragons breathe fire", 4, Anchor::Absolute { position: 0 });
        first.record.source.entry.category = Some("dragons".into());
        let mut second = keyed(3, "dragons hoard gold", 4, Anchor::Absolute { position: -1 });
        second.record.source.entry.category = Some("dragons".into());

        let outcome = assembler.assemble(100, vec![story, first, second]).await.unwrap();
        let text = outcome.assembly.full_text();
        let fire = text.find("breathe fire").unwrap();
        let gold = text.find("hoard gold").unwrap();
        let story_pos = text.find("roared").unwrap();
        // The second member lands right after the first, not at its own
        // bottom anchor.
        assert!(fire < gold && gold < story_pos, "unexpected layout: {text}");
        match &outcome.reports[2] {
            SourceReport::Inserted(r) => assert_eq!(r.placement, InsertionPlacement::After(2)),
            other => panic!("expected insertion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversize_untrimmable_entry_is_rejected_not_fatal() {
        let story = forced(1, "story", SourceType::Story, "a b c");
        let mut rigid = forced(2, "rigid", SourceType::Memory, "this text is far too long to fit at all");
        rigid.record.source.entry.trim_direction = TrimDirection::DoNotTrim;
        let after = forced(3, "an", SourceType::AuthorsNote, "fine");

        let outcome = assembler().assemble(10, vec![story, rigid, after]).await.unwrap();
        assert!(matches!(outcome.reports[0], SourceReport::Inserted(_)));
        assert!(matches!(outcome.reports[1], SourceReport::Rejected(_)));
        // Processing continues after a recoverable failure.
        assert!(matches!(outcome.reports[2], SourceReport::Inserted(_)));
    }
}
