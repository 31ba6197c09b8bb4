// WHY: continuation is decided per quotation, not per block, so open-quote
// state is linked into chains first and block states are assigned only once
// the resolver has told us who is speaking each part

use tracing::debug;

use crate::block::MultiBlockQuote;

use super::scanner::{ScannedBlock, SegmentKind};

/// One quotation, possibly spanning several output blocks and paragraphs.
/// `quote_blocks` holds indices into the scanned-block stream; reporting
/// clauses and interruptions sit between them without breaking the chain.
#[derive(Debug, Default)]
pub(crate) struct QuoteChain {
    pub quote_blocks: Vec<usize>,
    /// Quote left open but never re-opened by a continuer (or still open at
    /// document end): parts collapse to independent quotations
    pub dangling: bool,
}

/// Link scanned blocks into quotation chains.
///
/// A chain starts at a quote block that did not inherit an open quote, and
/// follows while the quote stays open. Section headings and other
/// non-scannable blocks pass through without closing it; narration arriving
/// while a quote is still nominally open means the continuation never
/// happened, so the chain ends dangling.
pub(crate) fn link_chains(blocks: &[ScannedBlock]) -> Vec<QuoteChain> {
    let mut chains = Vec::new();
    let mut current: Option<QuoteChain> = None;

    for (idx, scanned) in blocks.iter().enumerate() {
        match &scanned.kind {
            SegmentKind::Quote => {
                if current.is_some() && !scanned.open_at_start {
                    // A fresh quote while one was pending: the pending quote
                    // was never continued
                    let mut chain = current.take().expect("checked is_some");
                    chain.dangling = true;
                    chains.push(chain);
                }
                let chain = current.get_or_insert_with(QuoteChain::default);
                chain.quote_blocks.push(idx);
                if !scanned.open_at_end {
                    chains.push(current.take().expect("just inserted"));
                }
            }
            SegmentKind::ReportingClause | SegmentKind::Interruption => {
                // Inside the quote region; the chain is unaffected
            }
            SegmentKind::NonScannable => {
                // Structural interruption does not close an open quote
            }
            SegmentKind::Narration
            | SegmentKind::Predetermined { .. }
            | SegmentKind::Confirmed => {
                if let Some(mut chain) = current.take() {
                    chain.dangling = true;
                    chains.push(chain);
                }
            }
        }
    }

    if let Some(mut chain) = current.take() {
        chain.dangling = true;
        chains.push(chain);
    }

    debug!(chains = chains.len(), "linked quotation chains");
    chains
}

/// Continuation states for the blocks of one resolved part of a chain,
/// given each block's source-paragraph ordinal and resolved delivery.
///
/// Blocks from a single paragraph stay None; a part spanning paragraphs gets
/// Start then Continuation, with Change-of-delivery replacing Continuation
/// where the per-block delivery departs from the previous block's.
pub(crate) fn part_states(
    ordinals: &[usize],
    deliveries: &[Option<String>],
) -> Vec<MultiBlockQuote> {
    debug_assert_eq!(ordinals.len(), deliveries.len());
    if ordinals.len() < 2 || ordinals.iter().all(|&o| o == ordinals[0]) {
        return vec![MultiBlockQuote::None; ordinals.len()];
    }

    let mut states = Vec::with_capacity(ordinals.len());
    states.push(MultiBlockQuote::Start);
    for window in deliveries.windows(2) {
        if window[1] != window[0] {
            states.push(MultiBlockQuote::ChangeOfDelivery);
        } else {
            states.push(MultiBlockQuote::Continuation);
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, StyleCategory, VerseNum};

    fn scanned(kind: SegmentKind, ordinal: usize, open_start: bool, open_end: bool) -> ScannedBlock {
        ScannedBlock {
            block: Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(1)),
            kind,
            paragraph_ordinal: ordinal,
            open_at_start: open_start,
            open_at_end: open_end,
            continued_from_prior: open_start,
        }
    }

    #[test]
    fn test_single_closed_quote_one_chain() {
        let blocks = vec![
            scanned(SegmentKind::Narration, 0, false, false),
            scanned(SegmentKind::Quote, 0, false, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].quote_blocks, vec![1]);
        assert!(!chains[0].dangling);
    }

    #[test]
    fn test_cross_paragraph_chain() {
        let blocks = vec![
            scanned(SegmentKind::Narration, 0, false, false),
            scanned(SegmentKind::Quote, 0, false, true),
            scanned(SegmentKind::Quote, 1, true, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].quote_blocks, vec![1, 2]);
        assert!(!chains[0].dangling);
    }

    #[test]
    fn test_heading_does_not_close_chain() {
        let blocks = vec![
            scanned(SegmentKind::Quote, 0, false, true),
            scanned(SegmentKind::NonScannable, 1, false, false),
            scanned(SegmentKind::Quote, 2, true, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].quote_blocks, vec![0, 2]);
    }

    #[test]
    fn test_never_continued_quote_dangles() {
        let blocks = vec![
            scanned(SegmentKind::Quote, 0, false, true),
            scanned(SegmentKind::Narration, 1, false, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert!(chains[0].dangling);
    }

    #[test]
    fn test_open_at_document_end_dangles() {
        let blocks = vec![scanned(SegmentKind::Quote, 0, false, true)];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert!(chains[0].dangling);
    }

    #[test]
    fn test_fresh_quote_closes_pending_chain() {
        let blocks = vec![
            scanned(SegmentKind::Quote, 0, false, true),
            scanned(SegmentKind::Quote, 1, false, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 2);
        assert!(chains[0].dangling);
        assert!(!chains[1].dangling);
    }

    #[test]
    fn test_reporting_clause_keeps_chain_open() {
        let blocks = vec![
            scanned(SegmentKind::Quote, 0, false, true),
            scanned(SegmentKind::ReportingClause, 0, true, true),
            scanned(SegmentKind::Quote, 0, true, false),
        ];
        let chains = link_chains(&blocks);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].quote_blocks, vec![0, 2]);
    }

    #[test]
    fn test_single_paragraph_part_states_none() {
        let states = part_states(&[0, 0], &[None, None]);
        assert_eq!(states, vec![MultiBlockQuote::None, MultiBlockQuote::None]);
    }

    #[test]
    fn test_cross_paragraph_part_states() {
        let states = part_states(&[0, 1, 2], &[None, None, None]);
        assert_eq!(
            states,
            vec![
                MultiBlockQuote::Start,
                MultiBlockQuote::Continuation,
                MultiBlockQuote::Continuation
            ]
        );
    }

    #[test]
    fn test_delivery_change_state() {
        let states = part_states(
            &[0, 1],
            &[Some("shouting".to_string()), Some("whispering".to_string())],
        );
        assert_eq!(
            states,
            vec![MultiBlockQuote::Start, MultiBlockQuote::ChangeOfDelivery]
        );
    }
}
