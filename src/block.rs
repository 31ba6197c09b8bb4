// WHY: the block is both the scanner's input and its output; the model keeps
// upstream-supplied data (markers, milestones, confirmed speakers) as
// immutable side-channels so a parse can only ever replace blocks, not
// corrupt what upstream already decided

use serde::{Deserialize, Serialize};

/// Structural style category assigned by the upstream block supplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyleCategory {
    ProseParagraph,
    PoetryLine,
    SectionHeading,
    ChapterLabel,
    Intro,
    OtherNonNarrative,
}

impl StyleCategory {
    /// Only prose and poetry carry speakable text; everything else passes
    /// through the parser with a fixed sentinel speaker.
    pub fn is_scannable(&self) -> bool {
        matches!(self, StyleCategory::ProseParagraph | StyleCategory::PoetryLine)
    }
}

/// Reserved speaker ids that are never real character names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentinelCharacter {
    /// Default voice for all narration in a book
    Narrator,
    /// Book titles and chapter labels
    BookOrChapter,
    /// Introductory material
    Intro,
    /// Section headings and other extra-biblical material
    ExtraBiblical,
    /// A quotation of another Scripture passage rather than a speech
    ScriptureQuotation,
    /// Two or more equally plausible speakers
    Ambiguous,
    /// The text's quote boundaries do not match any known speaker
    Unexpected,
    /// Speaker known but uncertain enough to flag for a human
    NeedsReview,
}

/// Speaker identity as a closed set of sentinels plus open named characters.
/// Keeping the sentinels out of the string space prevents collisions with
/// real character names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterId {
    Sentinel(SentinelCharacter),
    Named(String),
}

impl CharacterId {
    pub fn named(name: impl Into<String>) -> Self {
        CharacterId::Named(name.into())
    }

    pub fn narrator() -> Self {
        CharacterId::Sentinel(SentinelCharacter::Narrator)
    }

    pub fn is_narrator(&self) -> bool {
        matches!(self, CharacterId::Sentinel(SentinelCharacter::Narrator))
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, CharacterId::Sentinel(_))
    }

    /// True for the sentinels that mean "a human must look at this"
    pub fn needs_review(&self) -> bool {
        matches!(
            self,
            CharacterId::Sentinel(SentinelCharacter::Ambiguous)
                | CharacterId::Sentinel(SentinelCharacter::Unexpected)
                | CharacterId::Sentinel(SentinelCharacter::NeedsReview)
        )
    }

    /// Script-facing rendering. Per-book sentinels carry the book code so
    /// each book's narrator remains a distinct voice part.
    pub fn script_id(&self, book: &str) -> String {
        match self {
            CharacterId::Named(name) => name.clone(),
            CharacterId::Sentinel(SentinelCharacter::Narrator) => format!("narrator-{book}"),
            CharacterId::Sentinel(SentinelCharacter::BookOrChapter) => format!("BC-{book}"),
            CharacterId::Sentinel(SentinelCharacter::Intro) => format!("intro-{book}"),
            CharacterId::Sentinel(SentinelCharacter::ExtraBiblical) => format!("extra-{book}"),
            CharacterId::Sentinel(SentinelCharacter::ScriptureQuotation) => "scripture".to_string(),
            CharacterId::Sentinel(SentinelCharacter::Ambiguous) => "Ambiguous".to_string(),
            CharacterId::Sentinel(SentinelCharacter::Unexpected) => "Unexpected".to_string(),
            CharacterId::Sentinel(SentinelCharacter::NeedsReview) => "Needs Review".to_string(),
        }
    }
}

/// One element of a block, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockElement {
    /// A run of translated text
    ScriptText { content: String },
    /// Verse marker; `end_number` present for a verse bridge
    Verse { number: u32, end_number: Option<u32> },
    /// Chapter marker; upstream guarantees chapter changes begin a new block
    Chapter { number: u32 },
    /// Pre-existing speaker annotation from upstream markup
    QuoteMilestone {
        character: Option<String>,
        start: bool,
        narrator: bool,
    },
}

/// Continuation state of a quotation spanning multiple output blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultiBlockQuote {
    #[default]
    None,
    Start,
    Continuation,
    /// Same speaker continuing, but the resolved delivery changed
    ChangeOfDelivery,
}

/// A verse or verse bridge covered by a block, used for lookup queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerseNum {
    pub number: u32,
    pub end_number: Option<u32>,
}

impl VerseNum {
    pub fn single(number: u32) -> Self {
        Self {
            number,
            end_number: None,
        }
    }

    pub fn bridge(start: u32, end: u32) -> Self {
        Self {
            number: start,
            end_number: Some(end),
        }
    }

    pub fn last(&self) -> u32 {
        self.end_number.unwrap_or(self.number)
    }

    /// Individual verse numbers covered, bridges expanded
    pub fn expand(&self) -> impl Iterator<Item = u32> {
        self.number..=self.last()
    }
}

/// A paragraph-like unit of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub style: StyleCategory,
    pub paragraph_start: bool,
    pub book: String,
    pub chapter: u32,
    /// Verse in effect at the start of this block
    pub initial_verse: VerseNum,
    pub elements: Vec<BlockElement>,
    /// Speaker assigned by the parser; None until resolution
    pub character: Option<CharacterId>,
    /// Output-only override, e.g. the uncorroborated milestone speaker
    pub character_id_for_script: Option<String>,
    pub delivery: Option<String>,
    pub multi_block_quote: MultiBlockQuote,
    pub predetermined_quote_start: bool,
    pub predetermined_quote_end: bool,
    pub predetermined_interruption: bool,
    /// Upstream-confirmed speaker; consulted, never written, by the parser
    pub confirmed: Option<CharacterId>,
}

impl Block {
    pub fn new(style: StyleCategory, book: &str, chapter: u32, initial_verse: VerseNum) -> Self {
        Self {
            style,
            paragraph_start: true,
            book: book.to_string(),
            chapter,
            initial_verse,
            elements: Vec::new(),
            character: None,
            character_id_for_script: None,
            delivery: None,
            multi_block_quote: MultiBlockQuote::None,
            predetermined_quote_start: false,
            predetermined_quote_end: false,
            predetermined_interruption: false,
            confirmed: None,
        }
    }

    pub fn with_text(mut self, content: &str) -> Self {
        self.elements.push(BlockElement::ScriptText {
            content: content.to_string(),
        });
        self
    }

    pub fn with_verse(mut self, number: u32) -> Self {
        self.elements.push(BlockElement::Verse {
            number,
            end_number: None,
        });
        self
    }

    pub fn with_verse_bridge(mut self, start: u32, end: u32) -> Self {
        self.elements.push(BlockElement::Verse {
            number: start,
            end_number: Some(end),
        });
        self
    }

    /// Concatenated text content, ignoring markers
    pub fn text(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            if let BlockElement::ScriptText { content } = element {
                out.push_str(content);
            }
        }
        out
    }

    /// All verses/bridges this block's text touches, in order.
    /// The initial verse counts only if any text precedes the first marker.
    pub fn covered_verses(&self) -> Vec<VerseNum> {
        let mut verses = Vec::new();
        let mut saw_marker = false;
        let mut text_before_marker = false;
        for element in &self.elements {
            match element {
                BlockElement::Verse { number, end_number } => {
                    saw_marker = true;
                    verses.push(VerseNum {
                        number: *number,
                        end_number: *end_number,
                    });
                }
                BlockElement::ScriptText { .. } if !saw_marker => {
                    text_before_marker = true;
                }
                _ => {}
            }
        }
        if text_before_marker || !saw_marker {
            verses.insert(0, self.initial_verse);
        }
        verses
    }

    pub fn last_verse(&self) -> VerseNum {
        self.covered_verses()
            .last()
            .copied()
            .unwrap_or(self.initial_verse)
    }

    /// True when block text ends with sentence-final punctuation (closing
    /// quote marks skipped), which stops poetry-line joining
    pub fn ends_sentence(&self) -> bool {
        let text = self.text();
        let trimmed = text.trim_end().trim_end_matches(|c: char| {
            matches!(
                c,
                '\u{00BB}' | '\u{203A}' | '"' | '\'' | '\u{201D}' | '\u{2019}' | ')' | ']'
            )
        });
        trimmed
            .chars()
            .last()
            .is_some_and(|c| matches!(c, '.' | '!' | '?' | '\u{061F}' | '\u{3002}'))
    }

    /// True when this block was attributed to someone other than a
    /// narration/structural voice (including unresolved quotations)
    pub fn is_quote(&self) -> bool {
        match &self.character {
            Some(CharacterId::Named(_)) => true,
            Some(CharacterId::Sentinel(s)) => matches!(
                s,
                SentinelCharacter::ScriptureQuotation
                    | SentinelCharacter::Ambiguous
                    | SentinelCharacter::Unexpected
            ),
            _ => false,
        }
    }
}
