// WHY: parsing is two-phase (scan boundaries first, resolve speakers after)
// because a quotation's full extent may only be known several blocks later

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use crate::block::{
    Block, BlockElement, CharacterId, MultiBlockQuote, SentinelCharacter, StyleCategory, VerseNum,
};
use crate::character_verse::{CharacterVerseLookup, HypotheticalSpeakerProvider};
use crate::quote_system::QuotationSystem;

pub(crate) mod resolver;
pub(crate) mod scanner;
pub(crate) mod tracker;

use resolver::{ResolvedPart, SpeakerResolver};
use scanner::{scan_cluster, ScanCarry, ScanResult, ScannedBlock, SegmentKind};
use tracker::{link_chains, part_states};

/// Parses a book's block sequence into single-speaker blocks.
///
/// One invocation is a pure function of (blocks, quotation system, lookup
/// snapshot); no state is retained between invocations, so independent
/// callers may parse books in parallel.
pub struct QuoteParser<'a> {
    system: &'a QuotationSystem,
    lookup: &'a dyn CharacterVerseLookup,
    hypothetical: Option<&'a dyn HypotheticalSpeakerProvider>,
}

impl<'a> QuoteParser<'a> {
    pub fn new(system: &'a QuotationSystem, lookup: &'a dyn CharacterVerseLookup) -> Self {
        Self {
            system,
            lookup,
            hypothetical: None,
        }
    }

    pub fn with_hypothetical_provider(
        mut self,
        provider: &'a dyn HypotheticalSpeakerProvider,
    ) -> Self {
        self.hypothetical = Some(provider);
        self
    }

    /// Parse a block sequence into a finer-grained sequence where every
    /// block has exactly one assigned speaker and continuation state.
    ///
    /// Malformed text never fails; every unresolvable situation degrades to
    /// a review sentinel. Panics only on the one programmer error: a block
    /// carrying an upstream-confirmed speaker being reassigned.
    pub fn parse(&self, blocks: &[Block]) -> Vec<Block> {
        info!(blocks = blocks.len(), "parsing block document");
        let scanned = self.scan_document(blocks);
        let out = self.resolve_document(scanned);
        info!(blocks_out = out.len(), "quote parse complete");
        out
    }

    /// Phase one: cluster and scan, carrying open-quote state across
    /// cluster boundaries and through structural interruptions.
    fn scan_document(&self, blocks: &[Block]) -> Vec<ScannedBlock> {
        let mut out = Vec::new();
        let mut carry = ScanCarry::default();
        let mut ordinal = 0usize;
        let mut i = 0usize;

        while i < blocks.len() {
            let block = &blocks[i];

            if block.confirmed.is_some() || !block.style.is_scannable() {
                let kind = if block.confirmed.is_some() {
                    SegmentKind::Confirmed
                } else {
                    SegmentKind::NonScannable
                };
                out.push(ScannedBlock {
                    block: block.clone(),
                    kind,
                    paragraph_ordinal: ordinal,
                    open_at_start: false,
                    open_at_end: false,
                    continued_from_prior: false,
                });
                ordinal += 1;
                i += 1;
                continue;
            }

            // Consecutive poetry lines without sentence-final punctuation
            // are tentatively one scanning unit
            let start = i;
            let mut end = i + 1;
            if block.style == StyleCategory::PoetryLine {
                while end < blocks.len()
                    && blocks[end].style == StyleCategory::PoetryLine
                    && blocks[end].confirmed.is_none()
                    && !blocks[end - 1].ends_sentence()
                {
                    end += 1;
                }
            }
            let cluster = &blocks[start..end];

            let mut result = scan_cluster(self.system, cluster, ordinal, carry);
            if cluster.len() > 1 && self.join_needs_undo(&result) {
                debug!(ordinal, lines = cluster.len(), "undoing poetry-line join");
                result = self.rescan_unjoined(cluster, ordinal, carry);
            }

            carry = result.carry;
            out.extend(result.blocks);
            ordinal += cluster.len();
            i = end;
        }

        out
    }

    /// A speculative poetry join is undone when a quotation spanning the
    /// joined lines covers verses whose (non-empty) candidate sets share no
    /// speaker.
    fn join_needs_undo(&self, result: &ScanResult) -> bool {
        for chain in link_chains(&result.blocks) {
            let ordinals: BTreeSet<usize> = chain
                .quote_blocks
                .iter()
                .map(|&i| result.blocks[i].paragraph_ordinal)
                .collect();
            if ordinals.len() < 2 {
                continue;
            }

            let first = &result.blocks[chain.quote_blocks[0]].block;
            let mut unique: Vec<VerseNum> = Vec::new();
            for &i in &chain.quote_blocks {
                for v in result.blocks[i].block.covered_verses() {
                    if unique.last() != Some(&v) {
                        unique.push(v);
                    }
                }
            }

            let sets: Vec<BTreeSet<String>> = unique
                .iter()
                .map(|v| {
                    self.lookup
                        .get_candidates(&first.book, first.chapter, &[*v], false)
                        .into_iter()
                        .map(|e| e.character)
                        .collect()
                })
                .filter(|s: &BTreeSet<String>| !s.is_empty())
                .collect();

            if sets.len() >= 2 {
                let mut inter = sets[0].clone();
                for set in &sets[1..] {
                    inter = inter.intersection(set).cloned().collect();
                }
                if inter.is_empty() {
                    return true;
                }
            }
        }
        false
    }

    fn rescan_unjoined(
        &self,
        cluster: &[Block],
        base_ordinal: usize,
        carry: ScanCarry,
    ) -> ScanResult {
        let mut blocks = Vec::new();
        let mut carry = carry;
        let mut continued = false;
        for (offset, block) in cluster.iter().enumerate() {
            let result = scan_cluster(
                self.system,
                std::slice::from_ref(block),
                base_ordinal + offset,
                carry,
            );
            if offset == 0 {
                continued = result.continued;
            }
            carry = result.carry;
            blocks.extend(result.blocks);
        }
        ScanResult {
            blocks,
            carry,
            continued,
        }
    }

    /// Phase two: link quotation chains, resolve speakers, split where data
    /// disagrees with boundaries, and emit the final sequence.
    fn resolve_document(&self, scanned: Vec<ScannedBlock>) -> Vec<Block> {
        let resolver = SpeakerResolver::new(self.lookup, self.hypothetical);
        let chains = link_chains(&scanned);

        let mut assignments: HashMap<usize, Vec<Block>> = HashMap::new();
        for chain in &chains {
            if chain.dangling {
                // Never-continued quote: parts collapse to independent
                // quotations with no continuation states
                for &idx in &chain.quote_blocks {
                    for (src, pieces) in self.resolve_quote_extent(&resolver, &scanned, &[idx]) {
                        assignments.insert(src, pieces);
                    }
                }
            } else {
                for (src, pieces) in
                    self.resolve_quote_extent(&resolver, &scanned, &chain.quote_blocks)
                {
                    assignments.insert(src, pieces);
                }
            }
        }

        let mut out = Vec::new();
        for (idx, scanned_block) in scanned.iter().enumerate() {
            match &scanned_block.kind {
                SegmentKind::Narration => {
                    out.extend(self.finish_narration(&resolver, scanned_block));
                }
                SegmentKind::Quote => match assignments.remove(&idx) {
                    Some(pieces) => out.extend(pieces),
                    None => out.push(apply_assignment(
                        scanned_block.block.clone(),
                        CharacterId::Sentinel(SentinelCharacter::Unexpected),
                        None,
                        MultiBlockQuote::None,
                    )),
                },
                SegmentKind::ReportingClause => {
                    out.push(apply_assignment(
                        scanned_block.block.clone(),
                        CharacterId::narrator(),
                        None,
                        MultiBlockQuote::None,
                    ));
                }
                SegmentKind::Interruption => {
                    // Unlike a reporting clause, narrator-ness is not
                    // certain; force human review
                    out.push(apply_assignment(
                        scanned_block.block.clone(),
                        CharacterId::Sentinel(SentinelCharacter::Ambiguous),
                        None,
                        MultiBlockQuote::None,
                    ));
                }
                SegmentKind::Predetermined {
                    character,
                    narrator,
                } => {
                    out.push(self.finish_predetermined(
                        &resolver,
                        scanned_block,
                        character.as_deref(),
                        *narrator,
                    ));
                }
                SegmentKind::NonScannable => {
                    out.push(apply_assignment(
                        scanned_block.block.clone(),
                        style_sentinel(scanned_block.block.style),
                        None,
                        MultiBlockQuote::None,
                    ));
                }
                SegmentKind::Confirmed => {
                    // Only ever passed through; reassignment is the one loud
                    // failure, enforced in apply_assignment
                    out.push(scanned_block.block.clone());
                }
            }
        }
        out
    }

    /// Resolve one quotation extent (one or more quote blocks) and map the
    /// resolved parts back onto blocks, splitting blocks whose verses
    /// straddle a part boundary.
    fn resolve_quote_extent(
        &self,
        resolver: &SpeakerResolver,
        scanned: &[ScannedBlock],
        indices: &[usize],
    ) -> Vec<(usize, Vec<Block>)> {
        let first = &scanned[indices[0]].block;
        let book = first.book.clone();
        let chapter = first.chapter;

        // Unique verse sequence across the extent; a verse flowing over a
        // block boundary appears once
        let mut unique: Vec<VerseNum> = Vec::new();
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for &idx in indices {
            let mut lo = None;
            let mut hi = 0usize;
            for v in scanned[idx].block.covered_verses() {
                if unique.last() != Some(&v) {
                    unique.push(v);
                }
                let u = unique.len() - 1;
                lo.get_or_insert(u);
                hi = u;
            }
            ranges.push((lo.unwrap_or(hi), hi));
        }

        let parts = resolver.resolve_quotation(&book, chapter, &unique);

        struct Piece {
            src_idx: usize,
            part_no: usize,
            ordinal: usize,
            block: Block,
            delivery: Option<String>,
        }

        let mut pieces: Vec<Piece> = Vec::new();
        for (bi, &idx) in indices.iter().enumerate() {
            let (lo, hi) = ranges[bi];
            let covering: Vec<(usize, &ResolvedPart)> = parts
                .iter()
                .enumerate()
                .filter(|(_, p)| p.verse_start <= hi && p.verse_end >= lo)
                .collect();

            let mut remaining = Some(scanned[idx].block.clone());
            for (k, (part_no, part)) in covering.iter().enumerate() {
                let Some(current) = remaining.take() else {
                    break;
                };
                let block = if k + 1 < covering.len() {
                    let boundary = unique[covering[k + 1].1.verse_start];
                    match split_block_at_verse(&current, boundary) {
                        Some((head, tail)) => {
                            remaining = Some(tail);
                            head
                        }
                        // Boundary marker not in this block: the rest of the
                        // block stays with the current part
                        None => current,
                    }
                } else {
                    current
                };

                let delivery = part.delivery.clone().or_else(|| {
                    resolver.block_delivery(&book, chapter, &block.covered_verses(), &part.character)
                });
                pieces.push(Piece {
                    src_idx: idx,
                    part_no: *part_no,
                    ordinal: scanned[idx].paragraph_ordinal,
                    block,
                    delivery,
                });
            }
        }

        // Continuation states per resolved part
        for part_no in 0..parts.len() {
            let member_positions: Vec<usize> = pieces
                .iter()
                .enumerate()
                .filter(|(_, p)| p.part_no == part_no)
                .map(|(i, _)| i)
                .collect();
            let ordinals: Vec<usize> = member_positions.iter().map(|&i| pieces[i].ordinal).collect();
            let deliveries: Vec<Option<String>> = member_positions
                .iter()
                .map(|&i| pieces[i].delivery.clone())
                .collect();
            let states = part_states(&ordinals, &deliveries);
            for (pos, state) in member_positions.into_iter().zip(states) {
                pieces[pos].block.multi_block_quote = state;
            }
        }

        let mut grouped: BTreeMap<usize, Vec<Block>> = BTreeMap::new();
        for piece in pieces {
            let part = &parts[piece.part_no];
            let state = piece.block.multi_block_quote;
            let block =
                apply_assignment(piece.block, part.character.clone(), piece.delivery, state);
            grouped.entry(piece.src_idx).or_default().push(block);
        }
        grouped.into_iter().collect()
    }

    /// Narration defaults to the narrator, but a verse whose only entry is
    /// implicit speech claims its plain text, splitting the block at the
    /// verse boundary where the attribution changes.
    fn finish_narration(&self, resolver: &SpeakerResolver, scanned: &ScannedBlock) -> Vec<Block> {
        let block = &scanned.block;
        let verses = block.covered_verses();
        let per_verse: Vec<(CharacterId, Option<String>)> = verses
            .iter()
            .map(|v| resolver.resolve_narration_verse(&block.book, block.chapter, *v))
            .collect();

        // Runs of consecutive verses with the same assignment
        let mut runs: Vec<(usize, CharacterId, Option<String>)> = Vec::new();
        for (i, (character, delivery)) in per_verse.iter().enumerate() {
            match runs.last() {
                Some((_, c, d)) if c == character && d == delivery => {}
                _ => runs.push((i, character.clone(), delivery.clone())),
            }
        }

        if runs.len() <= 1 {
            let (character, delivery) = per_verse
                .into_iter()
                .next()
                .unwrap_or((CharacterId::narrator(), None));
            return vec![apply_assignment(
                block.clone(),
                character,
                delivery,
                MultiBlockQuote::None,
            )];
        }

        let mut out = Vec::new();
        let mut remaining = Some(block.clone());
        for (k, (_, character, delivery)) in runs.iter().enumerate() {
            let Some(current) = remaining.take() else {
                break;
            };
            let piece = if k + 1 < runs.len() {
                let boundary = verses[runs[k + 1].0];
                match split_block_at_verse(&current, boundary) {
                    Some((head, tail)) => {
                        remaining = Some(tail);
                        head
                    }
                    None => current,
                }
            } else {
                current
            };
            out.push(apply_assignment(
                piece,
                character.clone(),
                delivery.clone(),
                MultiBlockQuote::None,
            ));
        }
        out
    }

    /// Milestone spans keep the upstream speaker when the lookup
    /// corroborates it; otherwise they are flagged for review with the
    /// upstream id preserved for the output script.
    fn finish_predetermined(
        &self,
        resolver: &SpeakerResolver,
        scanned: &ScannedBlock,
        character: Option<&str>,
        narrator: bool,
    ) -> Block {
        let block = scanned.block.clone();
        if narrator {
            return apply_assignment(block, CharacterId::narrator(), None, MultiBlockQuote::None);
        }
        match character {
            Some(name) => {
                let verses = block.covered_verses();
                if resolver.corroborate_milestone(&block.book, block.chapter, &verses, name) {
                    apply_assignment(
                        block,
                        CharacterId::named(name),
                        None,
                        MultiBlockQuote::None,
                    )
                } else {
                    let mut block = apply_assignment(
                        block,
                        CharacterId::Sentinel(SentinelCharacter::NeedsReview),
                        None,
                        MultiBlockQuote::None,
                    );
                    block.character_id_for_script = Some(name.to_string());
                    block
                }
            }
            None => apply_assignment(
                block,
                CharacterId::Sentinel(SentinelCharacter::NeedsReview),
                None,
                MultiBlockQuote::None,
            ),
        }
    }
}

fn style_sentinel(style: StyleCategory) -> CharacterId {
    match style {
        StyleCategory::ChapterLabel => CharacterId::Sentinel(SentinelCharacter::BookOrChapter),
        StyleCategory::Intro => CharacterId::Sentinel(SentinelCharacter::Intro),
        StyleCategory::SectionHeading | StyleCategory::OtherNonNarrative => {
            CharacterId::Sentinel(SentinelCharacter::ExtraBiblical)
        }
        // Scannable styles never reach here
        StyleCategory::ProseParagraph | StyleCategory::PoetryLine => CharacterId::narrator(),
    }
}

/// Split a block at the marker where `verse` begins. None when the verse
/// starts the block or its marker is absent (nothing to split on).
fn split_block_at_verse(block: &Block, verse: VerseNum) -> Option<(Block, Block)> {
    let pos = block.elements.iter().position(|e| {
        matches!(e, BlockElement::Verse { number, end_number }
            if *number == verse.number && *end_number == verse.end_number)
    })?;
    if pos == 0 {
        return None;
    }

    let mut head = block.clone();
    let mut tail = block.clone();
    head.elements = block.elements[..pos].to_vec();
    head.predetermined_quote_end = false;
    tail.elements = block.elements[pos..].to_vec();
    tail.initial_verse = verse;
    tail.paragraph_start = false;
    tail.predetermined_quote_start = false;
    Some((head, tail))
}

/// The single loud failure in the whole pipeline: a block already carrying a
/// human-confirmed speaker must never be reassigned.
fn apply_assignment(
    mut block: Block,
    character: CharacterId,
    delivery: Option<String>,
    state: MultiBlockQuote,
) -> Block {
    if let Some(confirmed) = &block.confirmed {
        assert_eq!(
            *confirmed, character,
            "attempted to reassign a block with an upstream-confirmed speaker"
        );
    }
    block.character = Some(character);
    block.delivery = delivery;
    block.multi_block_quote = state;
    block
}
