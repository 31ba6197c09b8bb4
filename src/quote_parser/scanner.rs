// WHY: quote marks are runtime configuration supplied per translation, so the
// scanner walks configured strings directly instead of compiling patterns;
// the open-level stack is a fixed-capacity array because nesting is bounded

use tracing::debug;

use crate::block::{Block, BlockElement, VerseNum};
use crate::quote_system::{QuotationSystem, MAX_QUOTE_DEPTH};

/// What a scanned output block contains, before speaker resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Narration,
    Quote,
    /// Narrator insertion inside an open quote, delimited by the configured
    /// reporting-clause punctuation
    ReportingClause,
    /// Aside inside an open quote whose narrator-ness is not certain
    Interruption,
    /// Span pinned by an upstream quote milestone
    Predetermined {
        character: Option<String>,
        narrator: bool,
    },
    /// Heading/label/intro block passed through unscanned
    NonScannable,
    /// Block whose speaker was already confirmed upstream; never re-parsed
    Confirmed,
}

/// Scanner output: a finer-grained block plus the state needed by the
/// tracker and resolver
#[derive(Debug, Clone)]
pub(crate) struct ScannedBlock {
    pub block: Block,
    pub kind: SegmentKind,
    /// Which input paragraph this block came from (document-wide ordinal)
    pub paragraph_ordinal: usize,
    /// Effective quote state at the block edges
    pub open_at_start: bool,
    pub open_at_end: bool,
    /// First block of a cluster that re-opened a carried quote via continuer
    pub continued_from_prior: bool,
}

/// Open-quote state carried across cluster boundaries
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanCarry {
    pub open_depth: usize,
}

#[derive(Debug)]
pub(crate) struct ScanResult {
    pub blocks: Vec<ScannedBlock>,
    pub carry: ScanCarry,
    /// Whether this cluster re-opened the carried quote
    pub continued: bool,
}

/// Fixed-capacity open-level stack with explicit top index.
/// Levels are contiguous from 1, so the stack contents are the numbers
/// 1..=top; keeping the array makes the transitions explicit and cheap.
#[derive(Debug, Clone, Copy)]
struct LevelStack {
    levels: [u8; MAX_QUOTE_DEPTH],
    top: usize,
}

impl LevelStack {
    fn new() -> Self {
        Self {
            levels: [0; MAX_QUOTE_DEPTH],
            top: 0,
        }
    }

    fn with_depth(depth: usize) -> Self {
        let mut stack = Self::new();
        for level in 1..=depth.min(MAX_QUOTE_DEPTH) {
            stack.push(level as u8);
        }
        stack
    }

    fn depth(&self) -> usize {
        self.top
    }

    fn push(&mut self, level: u8) {
        if self.top < MAX_QUOTE_DEPTH {
            self.levels[self.top] = level;
            self.top += 1;
        }
    }

    /// Pop down so that `level` is closed; recovers skipped closes
    fn pop_to_below(&mut self, level: u8) {
        while self.top > 0 && self.levels[self.top - 1] >= level {
            self.top -= 1;
        }
    }
}

/// Opening brackets and inverted punctuation that travel with an upcoming
/// quote rather than staying on the narration side of a split
fn is_open_attachable(c: char) -> bool {
    matches!(c, '(' | '[' | '{' | '\u{00BF}' | '\u{00A1}')
}

/// Punctuation that stays attached to a just-closed quote
fn is_close_attachable(c: char) -> bool {
    matches!(
        c,
        '!' | '?' | '.' | ',' | ';' | ':' | ')' | ']' | '}' | '\u{2026}'
    )
}

fn is_sentence_dash(c: char) -> bool {
    matches!(c, '\u{2014}' | '\u{2013}')
}

const INTERRUPTION_PAIRS: &[(char, char)] = &[('(', ')'), ('[', ']'), ('{', '}')];

/// In-progress output block
#[derive(Debug)]
struct BlockBuilder {
    kind: SegmentKind,
    initial_verse: VerseNum,
    elements: Vec<BlockElement>,
    text_buf: String,
    paragraph_start: bool,
    paragraph_ordinal: usize,
    open_at_start: bool,
    continued_from_prior: bool,
    predetermined_quote_start: bool,
    predetermined_quote_end: bool,
}

impl BlockBuilder {
    fn new(kind: SegmentKind, verse: VerseNum, ordinal: usize, open_at_start: bool) -> Self {
        Self {
            kind,
            initial_verse: verse,
            elements: Vec::new(),
            text_buf: String::new(),
            paragraph_start: false,
            paragraph_ordinal: ordinal,
            open_at_start,
            continued_from_prior: false,
            predetermined_quote_start: false,
            predetermined_quote_end: false,
        }
    }

    fn push_char(&mut self, c: char) {
        self.text_buf.push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.text_buf.push_str(s);
    }

    fn flush_text(&mut self) {
        if !self.text_buf.is_empty() {
            self.elements.push(BlockElement::ScriptText {
                content: std::mem::take(&mut self.text_buf),
            });
        }
    }

    fn push_element(&mut self, element: BlockElement) {
        self.flush_text();
        self.elements.push(element);
    }

    fn has_text(&self) -> bool {
        if !self.text_buf.is_empty() {
            return true;
        }
        self.elements
            .iter()
            .any(|e| matches!(e, BlockElement::ScriptText { content } if !content.is_empty()))
    }

    fn has_markers(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, BlockElement::Verse { .. } | BlockElement::Chapter { .. }))
    }

    /// Detach the trailing run of open-attachable characters so it can move
    /// to the quote block about to start. A single space stays behind with
    /// this (preceding) block.
    fn take_open_attachables(&mut self) -> String {
        let split_at = self
            .text_buf
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_open_attachable(*c))
            .last()
            .map(|(i, _)| i)
            .unwrap_or(self.text_buf.len());
        self.text_buf.split_off(split_at)
    }
}

/// Scans one paragraph cluster, producing finer-grained blocks.
pub(crate) struct ClusterScanner<'a> {
    system: &'a QuotationSystem,
    stack: LevelStack,
    dialogue_open: bool,
    /// Milestone span in effect, suspending mark scanning
    predetermined: Option<(Option<String>, bool)>,
    current_verse: VerseNum,
    builder: BlockBuilder,
    out: Vec<ScannedBlock>,
    /// Markers from an otherwise-empty finalized builder, re-homed onto the
    /// next block so no content is lost
    carried_elements: Vec<BlockElement>,
    continued: bool,
    template: Block,
    paragraph_starts_pending: bool,
}

impl<'a> ClusterScanner<'a> {
    fn new(system: &'a QuotationSystem, first: &Block, base_ordinal: usize) -> Self {
        let template = Block::new(first.style, &first.book, first.chapter, first.initial_verse);
        Self {
            system,
            stack: LevelStack::new(),
            dialogue_open: false,
            predetermined: None,
            current_verse: first.initial_verse,
            builder: BlockBuilder::new(
                SegmentKind::Narration,
                first.initial_verse,
                base_ordinal,
                false,
            ),
            out: Vec::new(),
            carried_elements: Vec::new(),
            continued: false,
            template,
            paragraph_starts_pending: true,
        }
    }

    fn in_quote(&self) -> bool {
        self.stack.depth() > 0 || self.dialogue_open
    }

    /// Finalize the current builder into an output block and start a new one
    /// of `next_kind`. Empty builders surrender their markers to the next
    /// block instead of producing empty output.
    fn finalize(&mut self, next_kind: SegmentKind, next_open_at_start: bool) {
        self.builder.flush_text();

        let ordinal = self.builder.paragraph_ordinal;
        let mut next = BlockBuilder::new(next_kind, self.current_verse, ordinal, next_open_at_start);

        if !self.builder.has_text() && !self.builder.predetermined_quote_start {
            // Nothing worth emitting; markers ride along to the next block
            next.paragraph_start = self.builder.paragraph_start;
            next.continued_from_prior = self.builder.continued_from_prior;
            next.initial_verse = self.builder.initial_verse;
            let mut markers = std::mem::take(&mut self.builder.elements);
            self.carried_elements.append(&mut markers);
            next.elements = std::mem::take(&mut self.carried_elements);
            self.builder = next;
            return;
        }

        let mut elements = std::mem::take(&mut self.carried_elements);
        elements.append(&mut self.builder.elements);

        let mut block = self.template.clone();
        block.paragraph_start = self.builder.paragraph_start;
        block.initial_verse = self.builder.initial_verse;
        block.elements = elements;
        block.predetermined_quote_start = self.builder.predetermined_quote_start;
        block.predetermined_quote_end = self.builder.predetermined_quote_end;

        let open_at_end = self.in_quote();
        self.out.push(ScannedBlock {
            block,
            kind: self.builder.kind.clone(),
            paragraph_ordinal: self.builder.paragraph_ordinal,
            open_at_start: self.builder.open_at_start,
            open_at_end,
            continued_from_prior: self.builder.continued_from_prior,
        });
        self.builder = next;
    }

    fn begin_paragraph(&mut self, block: &Block, ordinal: usize) {
        self.template = Block::new(block.style, &block.book, block.chapter, block.initial_verse);
        self.builder.paragraph_ordinal = ordinal;
        if !self.builder.has_text() {
            self.builder.paragraph_start = block.paragraph_start;
            self.builder.initial_verse = block.initial_verse;
        }
        self.current_verse = block.initial_verse;
        self.paragraph_starts_pending = true;
    }

    /// Try to consume the carried quote's continuers at cluster start.
    /// The outermost open level's continuer decides; inner continuers are
    /// consumed greedily when present.
    fn try_continue_carry(&mut self, cluster: &[Block], carry: ScanCarry) -> bool {
        if carry.open_depth == 0 {
            return false;
        }
        let first_text = cluster.iter().flat_map(|b| b.elements.iter()).find_map(|e| {
            if let BlockElement::ScriptText { content } = e {
                Some(content.as_str())
            } else {
                None
            }
        });
        let Some(text) = first_text else {
            return false;
        };
        let trimmed = text.trim_start();
        let outer = match self.system.level(1) {
            Some(level) if !level.continuer.is_empty() => level,
            _ => return false,
        };
        if !trimmed.starts_with(outer.continuer.as_str()) {
            return false;
        }

        self.stack = LevelStack::with_depth(carry.open_depth);
        self.builder.kind = SegmentKind::Quote;
        self.builder.open_at_start = true;
        self.builder.continued_from_prior = true;
        self.continued = true;
        true
    }

    /// Consume continuer marks at a paragraph start while a quote is open,
    /// so they are not re-parsed as fresh openers.
    fn consume_continuers(&mut self, text: &str, mut i: usize) -> usize {
        let depth = self.stack.depth();
        for level_num in 1..=depth as u8 {
            // Leading whitespace between stacked continuers stays in the text
            while let Some(c) = text[i..].chars().next() {
                if c.is_whitespace() {
                    self.builder.push_char(c);
                    i += c.len_utf8();
                } else {
                    break;
                }
            }
            if let Some(level) = self.system.level(level_num) {
                if !level.continuer.is_empty() && text[i..].starts_with(level.continuer.as_str()) {
                    self.builder.push_str(&level.continuer);
                    i += level.continuer.len();
                    continue;
                }
            }
            break;
        }
        i
    }

    fn scan_text(&mut self, text: &str) {
        let mut i = 0usize;
        let at_paragraph_start = self.paragraph_starts_pending;

        if at_paragraph_start && self.in_quote() {
            i = self.consume_continuers(text, i);
        }

        while i < text.len() {
            let rest = &text[i..];
            let c = rest.chars().next().expect("index on char boundary");

            // Dialogue dash opens only at the very start of a paragraph
            if !self.in_quote() {
                if self.paragraph_starts_pending && !self.builder.has_text() {
                    if let Some(dash) = self.system.dialogue_dash_open() {
                        if !dash.is_empty() && rest.starts_with(dash) {
                            self.open_dialogue(dash);
                            i += dash.len();
                            self.paragraph_starts_pending = false;
                            continue;
                        }
                    }
                }
                if let Some(len) = self.try_open_level(rest) {
                    i += len;
                    self.paragraph_starts_pending = false;
                    continue;
                }
                if !c.is_whitespace() {
                    self.paragraph_starts_pending = false;
                }
                self.builder.push_char(c);
                i += c.len_utf8();
                continue;
            }

            // Inside a quote: reporting clause first (an em-dash reporting
            // delimiter must win over a dialogue closer using the same glyph)
            if let Some(consumed) = self.try_reporting_clause(text, i) {
                i = consumed;
                continue;
            }

            if let Some((len, closed_all)) = self.try_close_level(rest) {
                i += len;
                if closed_all && !self.dialogue_open {
                    i = self.attach_close_trailers(text, i);
                    self.finalize(SegmentKind::Narration, false);
                }
                continue;
            }

            if let Some(len) = self.try_open_level(rest) {
                i += len;
                continue;
            }

            if self.dialogue_open && self.stack.depth() == 0 {
                if let Some(len) = self.try_close_dialogue(text, i) {
                    i += len;
                    i = self.attach_close_trailers(text, i);
                    self.finalize(SegmentKind::Narration, false);
                    continue;
                }
            }

            if let Some(consumed) = self.try_interruption(text, i) {
                i = consumed;
                continue;
            }

            self.builder.push_char(c);
            i += c.len_utf8();
        }
    }

    /// An open mark for level L is recognized only at stack depth L-1,
    /// keeping nesting well-formed; concatenated openers resolve greedily
    /// because each push makes the next level's opener eligible.
    fn try_open_level(&mut self, rest: &str) -> Option<usize> {
        let next_level = self.stack.depth() as u8 + 1;
        let level = self.system.level(next_level)?;
        if level.is_degenerate() || !rest.starts_with(level.open.as_str()) {
            return None;
        }

        if self.stack.depth() == 0 && !self.dialogue_open {
            let moved = self.builder.take_open_attachables();
            self.finalize(SegmentKind::Quote, false);
            self.builder.push_str(&moved);
        }
        self.stack.push(next_level);
        self.builder.push_str(&level.open);
        Some(level.open.len())
    }

    /// A close mark pops its level; a close for a level that is not on top
    /// closes the nearest open level with a matching shape instead of
    /// failing on sloppy data. Returns (consumed, closed_to_zero).
    fn try_close_level(&mut self, rest: &str) -> Option<(usize, bool)> {
        let depth = self.stack.depth() as u8;
        for level_num in (1..=depth).rev() {
            let Some(level) = self.system.level(level_num) else {
                continue;
            };
            if level.is_degenerate() || !rest.starts_with(level.close.as_str()) {
                continue;
            }
            self.builder.push_str(&level.close);
            self.stack.pop_to_below(level_num);
            return Some((level.close.len(), self.stack.depth() == 0));
        }
        None
    }

    fn open_dialogue(&mut self, dash: &str) {
        let moved = self.builder.take_open_attachables();
        self.finalize(SegmentKind::Quote, false);
        self.builder.push_str(&moved);
        self.builder.push_str(dash);
        self.dialogue_open = true;
    }

    /// Dialogue close rules, in order: a configured closer distinct from the
    /// opener always ends the span; an identical closer ends it only as a
    /// pair (no further dash before paragraph end); otherwise the span stays
    /// open to cluster end.
    fn try_close_dialogue(&mut self, text: &str, i: usize) -> Option<usize> {
        let open = self.system.dialogue_dash_open()?;
        let close = self.system.dialogue_dash_close()?;
        let rest = &text[i..];
        if close.is_empty() || !rest.starts_with(close) {
            return None;
        }
        if close != open || !text[i + close.len()..].contains(close) {
            self.builder.push_str(close);
            self.dialogue_open = false;
            return Some(close.len());
        }
        None
    }

    /// Pull trailing punctuation and a single following space into the
    /// just-closed quote block.
    fn attach_close_trailers(&mut self, text: &str, mut i: usize) -> usize {
        while let Some(c) = text[i..].chars().next() {
            if is_close_attachable(c) {
                self.builder.push_char(c);
                i += c.len_utf8();
            } else {
                break;
            }
        }
        if text[i..].starts_with(' ') {
            self.builder.push_char(' ');
            i += 1;
        }
        i
    }

    /// Reporting clause: configured delimiter pair inside an open quote.
    /// Content becomes a narrator block; the quote resumes afterward. An
    /// unterminated clause in a dialogue span runs to the paragraph end and
    /// closes the span (trailing attribution).
    fn try_reporting_clause(&mut self, text: &str, i: usize) -> Option<usize> {
        let (start, end) = self.system.reporting_clause()?;
        let rest = &text[i..];
        if !rest.starts_with(start) {
            return None;
        }

        let body_start = i + start.len_utf8();
        let end_offset = text[body_start..].find(end);

        // A close mark arriving before the end delimiter means this was
        // ordinary punctuation, not a reporting clause
        if let Some(level) = self.stack_top_level() {
            if let Some(close_pos) = text[body_start..].find(level.close.as_str()) {
                if end_offset.is_none() || close_pos < end_offset.unwrap() {
                    return None;
                }
            }
        }

        match end_offset {
            Some(off) => {
                let clause_end = body_start + off + end.len_utf8();
                self.finalize(SegmentKind::ReportingClause, true);
                self.builder.push_str(&text[i..clause_end]);
                self.finalize(SegmentKind::Quote, true);
                Some(clause_end)
            }
            None if self.dialogue_open && self.stack.depth() == 0 => {
                self.dialogue_open = false;
                self.finalize(SegmentKind::ReportingClause, false);
                self.builder.push_str(&text[i..]);
                self.finalize(SegmentKind::Narration, false);
                Some(text.len())
            }
            None => None,
        }
    }

    fn stack_top_level(&self) -> Option<&crate::quote_system::QuotationLevel> {
        if self.stack.top == 0 {
            return None;
        }
        self.system.level(self.stack.levels[self.stack.top - 1])
    }

    /// Interruption: a bracketed aside, or a dash pair not matching the
    /// reporting-clause delimiters, inside an open quote. Tagged for human
    /// review by the resolver; the quote resumes unchanged.
    fn try_interruption(&mut self, text: &str, i: usize) -> Option<usize> {
        let rest = &text[i..];
        let c = rest.chars().next()?;

        if let Some((_, close)) = INTERRUPTION_PAIRS.iter().find(|(open, _)| *open == c) {
            let body_start = i + c.len_utf8();
            let end = text[body_start..]
                .find(*close)
                .map(|off| body_start + off + close.len_utf8())
                .unwrap_or(text.len());
            return Some(self.emit_interruption(text, i, end));
        }

        if is_sentence_dash(c) {
            // The configured reporting delimiter was already tried; an exact
            // same-shape pair of any other dash is an interruption
            if self
                .system
                .reporting_clause()
                .is_some_and(|(start, _)| start == c)
            {
                return None;
            }
            let body_start = i + c.len_utf8();
            if let Some(off) = text[body_start..].find(c) {
                let end = body_start + off + c.len_utf8();
                return Some(self.emit_interruption(text, i, end));
            }
        }
        None
    }

    fn emit_interruption(&mut self, text: &str, start: usize, end: usize) -> usize {
        self.finalize(SegmentKind::Interruption, true);
        self.builder.push_str(&text[start..end]);
        // The quote resumes its prior state immediately afterward
        self.finalize(SegmentKind::Quote, true);
        end
    }

    fn scan_element(&mut self, element: &BlockElement) {
        match element {
            BlockElement::ScriptText { content } => {
                if self.predetermined.is_some() {
                    self.builder.push_str(content);
                } else {
                    self.scan_text(content);
                }
            }
            BlockElement::Verse { number, end_number } => {
                self.current_verse = VerseNum {
                    number: *number,
                    end_number: *end_number,
                };
                if !self.builder.has_text() && !self.builder.has_markers() {
                    self.builder.initial_verse = self.current_verse;
                }
                self.builder.push_element(element.clone());
            }
            BlockElement::Chapter { .. } => {
                self.builder.push_element(element.clone());
            }
            BlockElement::QuoteMilestone {
                character,
                start,
                narrator,
            } => {
                if *start {
                    let kind = SegmentKind::Predetermined {
                        character: character.clone(),
                        narrator: *narrator,
                    };
                    self.finalize(kind, self.in_quote());
                    self.predetermined = Some((character.clone(), *narrator));
                    self.builder.predetermined_quote_start = true;
                } else if self.predetermined.take().is_some() {
                    self.builder.predetermined_quote_end = true;
                    let next = if self.in_quote() {
                        SegmentKind::Quote
                    } else {
                        SegmentKind::Narration
                    };
                    self.finalize(next, self.in_quote());
                }
            }
        }
    }
}

/// Scan one paragraph cluster. `cluster` is non-empty and all of one
/// scannable run; `carry` is the open-quote state from the previous cluster.
pub(crate) fn scan_cluster(
    system: &QuotationSystem,
    cluster: &[Block],
    base_ordinal: usize,
    carry: ScanCarry,
) -> ScanResult {
    debug!(
        blocks = cluster.len(),
        carry_depth = carry.open_depth,
        "scanning paragraph cluster"
    );

    let mut scanner = ClusterScanner::new(system, &cluster[0], base_ordinal);
    scanner.try_continue_carry(cluster, carry);

    for (offset, block) in cluster.iter().enumerate() {
        if offset > 0 {
            // Joined lines share scanning state but remain separate output
            // blocks; a quote flowing across the boundary spans two blocks
            let kind = if scanner.in_quote() {
                SegmentKind::Quote
            } else {
                SegmentKind::Narration
            };
            let open = scanner.in_quote();
            scanner.finalize(kind, open);
        }
        scanner.begin_paragraph(block, base_ordinal + offset);
        for element in &block.elements {
            scanner.scan_element(element);
        }
    }

    // An unterminated milestone span still produces its block
    if scanner.predetermined.take().is_some() {
        scanner.builder.predetermined_quote_end = true;
    }

    // A dialogue span never closed by marker ends with its cluster
    if scanner.dialogue_open {
        scanner.dialogue_open = false;
    }

    let carry_out = ScanCarry {
        open_depth: scanner.stack.depth(),
    };
    scanner.finalize(SegmentKind::Narration, false);

    // Markers left dangling with no final block to carry them: emit as a
    // trailing block so no input content is dropped
    if !scanner.carried_elements.is_empty() {
        let mut block = scanner.template.clone();
        block.initial_verse = scanner.current_verse;
        block.elements = std::mem::take(&mut scanner.carried_elements);
        scanner.out.push(ScannedBlock {
            block,
            kind: SegmentKind::Narration,
            paragraph_ordinal: base_ordinal + cluster.len() - 1,
            open_at_start: false,
            open_at_end: false,
            continued_from_prior: false,
        });
    }

    ScanResult {
        blocks: scanner.out,
        carry: carry_out,
        continued: scanner.continued,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::StyleCategory;
    use crate::quote_system::QuotationLevel;

    fn guillemet_system() -> QuotationSystem {
        QuotationSystem::new(vec![
            QuotationLevel::new(1, "\u{00AB}", "\u{00BB}", "\u{00AB}"),
            QuotationLevel::new(2, "\u{2039}", "\u{203A}", "\u{2039}"),
        ])
        .unwrap()
    }

    fn prose(text: &str) -> Block {
        Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(1)).with_text(text)
    }

    fn scan_one(system: &QuotationSystem, text: &str) -> Vec<ScannedBlock> {
        scan_cluster(system, &[prose(text)], 0, ScanCarry::default()).blocks
    }

    fn texts(blocks: &[ScannedBlock]) -> Vec<String> {
        blocks.iter().map(|b| b.block.text()).collect()
    }

    #[test]
    fn test_narration_only_single_block() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "In the beginning God created the heavens.");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, SegmentKind::Narration);
        assert_eq!(blocks[0].block.text(), "In the beginning God created the heavens.");
    }

    #[test]
    fn test_leading_space_stays_with_narration() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "He said, \u{00AB}Go!\u{00BB}");
        assert_eq!(
            texts(&blocks),
            vec!["He said, ", "\u{00AB}Go!\u{00BB}"],
            "kinds: {:?}",
            blocks.iter().map(|b| &b.kind).collect::<Vec<_>>()
        );
        assert_eq!(blocks[0].kind, SegmentKind::Narration);
        assert_eq!(blocks[1].kind, SegmentKind::Quote);
    }

    #[test]
    fn test_trailing_punctuation_stays_with_quote() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "\u{00AB}Go\u{00BB}!! he said.");
        assert_eq!(texts(&blocks), vec!["\u{00AB}Go\u{00BB}!! ", "he said."]);
        assert_eq!(blocks[0].kind, SegmentKind::Quote);
        assert_eq!(blocks[1].kind, SegmentKind::Narration);
    }

    #[test]
    fn test_inverted_punctuation_moves_with_quote() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "Dijo, \u{00BF}\u{00AB}Vas?\u{00BB}");
        assert_eq!(texts(&blocks), vec!["Dijo, ", "\u{00BF}\u{00AB}Vas?\u{00BB}"]);
    }

    #[test]
    fn test_nested_levels_stay_one_block() {
        let system = guillemet_system();
        let blocks = scan_one(
            &system,
            "\u{00AB}She said, \u{2039}go home\u{203A} to me.\u{00BB} Then he left.",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0].block.text(),
            "\u{00AB}She said, \u{2039}go home\u{203A} to me.\u{00BB} "
        );
        assert_eq!(blocks[1].block.text(), "Then he left.");
    }

    #[test]
    fn test_concatenated_openers_greedy() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "\u{00AB}\u{2039}Deep start\u{203A}\u{00BB} after.");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, SegmentKind::Quote);
        assert!(blocks[0].block.text().starts_with("\u{00AB}\u{2039}"));
    }

    #[test]
    fn test_skipped_close_recovers() {
        // Level 2 never closed; the level-1 closer recovers the whole stack
        let system = guillemet_system();
        let blocks = scan_one(&system, "\u{00AB}a \u{2039}b\u{00BB} after.");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block.text(), "\u{00AB}a \u{2039}b\u{00BB} ");
        assert!(!blocks[0].open_at_end);
        assert_eq!(blocks[1].kind, SegmentKind::Narration);
    }

    #[test]
    fn test_unclosed_quote_open_at_end() {
        let system = guillemet_system();
        let result = scan_cluster(
            &system,
            &[prose("He said, \u{00AB}Go forth")],
            0,
            ScanCarry::default(),
        );
        assert_eq!(result.carry.open_depth, 1);
        let last = result.blocks.last().unwrap();
        assert_eq!(last.kind, SegmentKind::Quote);
        assert!(last.open_at_end);
    }

    #[test]
    fn test_continuer_reopens_carried_quote() {
        let system = guillemet_system();
        let result = scan_cluster(
            &system,
            &[prose("\u{00AB}Get up and go.\u{00BB}")],
            1,
            ScanCarry { open_depth: 1 },
        );
        assert!(result.continued);
        assert_eq!(result.blocks.len(), 1);
        assert!(result.blocks[0].continued_from_prior);
        assert_eq!(result.blocks[0].kind, SegmentKind::Quote);
        assert!(!result.blocks[0].open_at_end);
        assert_eq!(result.blocks[0].block.text(), "\u{00AB}Get up and go.\u{00BB}");
    }

    #[test]
    fn test_no_continuer_starts_fresh() {
        let system = guillemet_system();
        let result = scan_cluster(
            &system,
            &[prose("Plain narration follows.")],
            1,
            ScanCarry { open_depth: 1 },
        );
        assert!(!result.continued);
        assert_eq!(result.blocks[0].kind, SegmentKind::Narration);
    }

    #[test]
    fn test_interruption_splits_and_resumes() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "\u{00AB}Part one (narrator aside) part two\u{00BB}");
        assert_eq!(
            texts(&blocks),
            vec!["\u{00AB}Part one ", "(narrator aside)", " part two\u{00BB}"]
        );
        assert_eq!(blocks[0].kind, SegmentKind::Quote);
        assert_eq!(blocks[1].kind, SegmentKind::Interruption);
        assert_eq!(blocks[2].kind, SegmentKind::Quote);
    }

    #[test]
    fn test_interruption_dash_pair() {
        let system = guillemet_system();
        let blocks = scan_one(
            &system,
            "\u{00AB}Go \u{2014}he was shouting\u{2014} right now\u{00BB}",
        );
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].kind, SegmentKind::Interruption);
        assert_eq!(blocks[1].block.text(), "\u{2014}he was shouting\u{2014}");
    }

    #[test]
    fn test_unpaired_dash_is_plain_text() {
        let system = guillemet_system();
        let blocks = scan_one(&system, "\u{00AB}Go \u{2014}now!\u{00BB}");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block.text(), "\u{00AB}Go \u{2014}now!\u{00BB}");
    }

    #[test]
    fn test_reporting_clause_extracted() {
        let system = guillemet_system()
            .with_reporting_clause('\u{2014}', '\u{2014}')
            .unwrap();
        let blocks = scan_one(
            &system,
            "\u{00AB}Go \u{2014}he said\u{2014} and do not return\u{00BB}",
        );
        assert_eq!(
            texts(&blocks),
            vec!["\u{00AB}Go ", "\u{2014}he said\u{2014}", " and do not return\u{00BB}"]
        );
        assert_eq!(blocks[1].kind, SegmentKind::ReportingClause);
        // The surrounding quote is not interrupted
        assert!(blocks[0].open_at_end);
        assert!(blocks[2].open_at_start);
    }

    #[test]
    fn test_unterminated_reporting_delimiter_before_close_is_plain() {
        let system = guillemet_system()
            .with_reporting_clause('\u{2014}', '\u{2014}')
            .unwrap();
        let blocks = scan_one(&system, "\u{00AB}Go \u{2014}now\u{00BB} he said.");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block.text(), "\u{00AB}Go \u{2014}now\u{00BB} ");
    }

    #[test]
    fn test_dialogue_dash_with_distinct_closer() {
        let system = guillemet_system().with_dialogue_dash("\u{2014}", Some("\u{201D}"));
        let blocks = scan_one(&system, "\u{2014}Follow me\u{201D} and he rose.");
        assert_eq!(texts(&blocks), vec!["\u{2014}Follow me\u{201D} ", "and he rose."]);
        assert_eq!(blocks[0].kind, SegmentKind::Quote);
    }

    #[test]
    fn test_dialogue_dash_identical_closer_pairs() {
        let system = guillemet_system().with_dialogue_dash("\u{2014}", Some("\u{2014}"));
        let blocks = scan_one(&system, "\u{2014}Follow me\u{2014} and he rose.");
        assert_eq!(texts(&blocks), vec!["\u{2014}Follow me\u{2014} ", "and he rose."]);
    }

    #[test]
    fn test_dialogue_dash_without_closer_runs_to_cluster_end() {
        let system = guillemet_system().with_dialogue_dash("\u{2014}", None);
        let result = scan_cluster(
            &system,
            &[prose("\u{2014}Follow me and learn.")],
            0,
            ScanCarry::default(),
        );
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, SegmentKind::Quote);
        assert_eq!(result.carry.open_depth, 0);
    }

    #[test]
    fn test_dialogue_dash_mid_paragraph_not_opener() {
        let system = guillemet_system().with_dialogue_dash("\u{2014}", None);
        let blocks = scan_one(&system, "The range 4\u{2014}6 is narration.");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, SegmentKind::Narration);
    }

    #[test]
    fn test_dialogue_trailing_attribution_closes_span() {
        let system = guillemet_system()
            .with_dialogue_dash("\u{2014}", None)
            .with_reporting_clause('\u{2014}', '\u{2014}')
            .unwrap();
        let blocks = scan_one(&system, "\u{2014}I am ready \u{2014}said Peter.");
        assert_eq!(texts(&blocks), vec!["\u{2014}I am ready ", "\u{2014}said Peter."]);
        assert_eq!(blocks[0].kind, SegmentKind::Quote);
        assert_eq!(blocks[1].kind, SegmentKind::ReportingClause);
        assert!(!blocks[1].open_at_end);
    }

    #[test]
    fn test_degenerate_system_produces_no_boundaries() {
        let system = QuotationSystem::new(vec![QuotationLevel::new(1, ":", "", "")]).unwrap();
        let blocks = scan_one(&system, "He said: go and do not return.");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, SegmentKind::Narration);
        assert_eq!(blocks[0].block.text(), "He said: go and do not return.");
    }

    #[test]
    fn test_verse_marker_inside_quote_stays_in_quote_block() {
        let system = guillemet_system();
        let block = Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(3))
            .with_text("He said, \u{00AB}Let there be light. ")
            .with_verse(4)
            .with_text("And go.\u{00BB}");
        let result = scan_cluster(&system, &[block], 0, ScanCarry::default());
        assert_eq!(result.blocks.len(), 2);
        let quote = &result.blocks[1];
        assert_eq!(quote.kind, SegmentKind::Quote);
        assert!(quote
            .block
            .elements
            .iter()
            .any(|e| matches!(e, BlockElement::Verse { number: 4, .. })));
        assert_eq!(
            quote.block.covered_verses(),
            vec![VerseNum::single(3), VerseNum::single(4)]
        );
    }

    #[test]
    fn test_split_block_initial_verse_tracks_current() {
        let system = guillemet_system();
        let block = Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(3))
            .with_text("Narration here. ")
            .with_verse(4)
            .with_text("Then he said, \u{00AB}Go.\u{00BB}");
        let result = scan_cluster(&system, &[block], 0, ScanCarry::default());
        let quote = result.blocks.last().unwrap();
        assert_eq!(quote.block.initial_verse, VerseNum::single(4));
    }

    #[test]
    fn test_milestone_span_predetermined() {
        let system = guillemet_system();
        let mut block = Block::new(StyleCategory::ProseParagraph, "GEN", 1, VerseNum::single(1));
        block.elements = vec![
            BlockElement::ScriptText {
                content: "Intro text ".to_string(),
            },
            BlockElement::QuoteMilestone {
                character: Some("God".to_string()),
                start: true,
                narrator: false,
            },
            BlockElement::ScriptText {
                content: "Let there be light".to_string(),
            },
            BlockElement::QuoteMilestone {
                character: Some("God".to_string()),
                start: false,
                narrator: false,
            },
            BlockElement::ScriptText {
                content: " and there was light.".to_string(),
            },
        ];
        let result = scan_cluster(&system, &[block], 0, ScanCarry::default());
        assert_eq!(result.blocks.len(), 3);
        assert!(matches!(
            result.blocks[1].kind,
            SegmentKind::Predetermined { ref character, .. } if character.as_deref() == Some("God")
        ));
        assert!(result.blocks[1].block.predetermined_quote_start);
        assert!(result.blocks[1].block.predetermined_quote_end);
        assert_eq!(result.blocks[1].block.text(), "Let there be light");
    }

    #[test]
    fn test_text_content_preserved_across_splits() {
        let system = guillemet_system()
            .with_reporting_clause('\u{2014}', '\u{2014}')
            .unwrap();
        let input = "Start \u{00AB}one \u{2014}said he\u{2014} two (x) three\u{00BB}!? tail.";
        let blocks = scan_one(&system, input);
        let recombined: String = blocks.iter().map(|b| b.block.text()).collect();
        assert_eq!(recombined, input);
    }
}
