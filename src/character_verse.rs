// WHY: the expected-speaker data source is an external collaborator; the
// parser takes it as an explicit trait object so tests and tools inject
// their own data instead of swapping a process-wide control file

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::block::VerseNum;

/// Well-known control-data id meaning "this span quotes another Scripture
/// passage"; resolved to the ScriptureQuotation sentinel, never to a voice.
pub const SCRIPTURE_CHARACTER: &str = "scripture";

/// Confidence/kind tag on an expected-speaker entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteKind {
    /// Ordinary expected quotation
    Normal,
    /// Speech attributed without quotation marks in most translations
    Implicit,
    /// Implicit speech that may itself quote another speaker
    ImplicitWithPotentialSelfQuote,
    /// Lower-confidence candidate, consulted only as a fallback
    Alternate,
    /// Rarely-used candidate, likewise fallback-only
    Rare,
}

impl QuoteKind {
    pub fn is_fallback_only(&self) -> bool {
        matches!(self, QuoteKind::Alternate | QuoteKind::Rare)
    }

    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            QuoteKind::Implicit | QuoteKind::ImplicitWithPotentialSelfQuote
        )
    }
}

/// One expected-speaker record for a verse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterVerseEntry {
    pub character: String,
    /// Manner of delivery, empty when unspecified
    #[serde(default)]
    pub delivery: String,
    pub kind: QuoteKind,
    /// Entry represents the narrator speaking as a character
    #[serde(default)]
    pub narrator: bool,
}

impl CharacterVerseEntry {
    pub fn normal(character: &str) -> Self {
        Self {
            character: character.to_string(),
            delivery: String::new(),
            kind: QuoteKind::Normal,
            narrator: false,
        }
    }

    pub fn with_delivery(mut self, delivery: &str) -> Self {
        self.delivery = delivery.to_string();
        self
    }

    pub fn with_kind(mut self, kind: QuoteKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Read-only expected-speaker lookup.
///
/// Contract: returns the empty set, not an error, when nothing is known for
/// a reference; a multi-verse query returns the union over the verses.
pub trait CharacterVerseLookup: Send + Sync {
    fn get_candidates(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
        include_alternates: bool,
    ) -> Vec<CharacterVerseEntry>;
}

/// Optional collaborator supplying hypothetical-speech candidates (e.g. the
/// rhetorical "if the foot says..." device) when the primary lookup has
/// nothing. Absence only reduces precision.
pub trait HypotheticalSpeakerProvider: Send + Sync {
    fn hypothetical_candidates(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
    ) -> Vec<CharacterVerseEntry>;
}

/// One row of the CLI's expected-speaker data file. This is the repo's own
/// convenience format, not the external control-data format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterVerseRecord {
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub character: String,
    #[serde(default)]
    pub delivery: String,
    pub kind: QuoteKind,
    #[serde(default)]
    pub narrator: bool,
}

/// In-memory lookup keyed by (book, chapter, verse); used by tests and the
/// CLI's data loader.
#[derive(Debug, Default)]
pub struct InMemoryCharacterVerse {
    entries: HashMap<(String, u32, u32), Vec<CharacterVerseEntry>>,
}

impl InMemoryCharacterVerse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CharacterVerseRecord>) -> Self {
        let mut lookup = Self::new();
        for record in records {
            lookup.add(
                &record.book,
                record.chapter,
                record.verse,
                CharacterVerseEntry {
                    character: record.character,
                    delivery: record.delivery,
                    kind: record.kind,
                    narrator: record.narrator,
                },
            );
        }
        lookup
    }

    pub fn add(&mut self, book: &str, chapter: u32, verse: u32, entry: CharacterVerseEntry) {
        self.entries
            .entry((book.to_string(), chapter, verse))
            .or_default()
            .push(entry);
    }

    pub fn add_normal(&mut self, book: &str, chapter: u32, verse: u32, character: &str) {
        self.add(book, chapter, verse, CharacterVerseEntry::normal(character));
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CharacterVerseLookup for InMemoryCharacterVerse {
    fn get_candidates(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
        include_alternates: bool,
    ) -> Vec<CharacterVerseEntry> {
        let mut out = Vec::new();
        for verse in verses {
            for v in verse.expand() {
                if let Some(entries) = self.entries.get(&(book.to_string(), chapter, v)) {
                    for entry in entries {
                        if !include_alternates && entry.kind.is_fallback_only() {
                            continue;
                        }
                        // Union semantics: no duplicates across bridged verses
                        if !out.contains(entry) {
                            out.push(entry.clone());
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lookup() -> InMemoryCharacterVerse {
        let mut lookup = InMemoryCharacterVerse::new();
        lookup.add_normal("GEN", 1, 3, "God");
        lookup.add(
            "GEN",
            1,
            4,
            CharacterVerseEntry::normal("God").with_delivery("declaring"),
        );
        lookup.add(
            "GEN",
            1,
            5,
            CharacterVerseEntry::normal("angel").with_kind(QuoteKind::Alternate),
        );
        lookup
    }

    #[test]
    fn test_empty_set_not_error() {
        let lookup = InMemoryCharacterVerse::new();
        let candidates = lookup.get_candidates("GEN", 1, &[VerseNum::single(1)], false);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_alternates_excluded_by_default() {
        let lookup = sample_lookup();
        let candidates = lookup.get_candidates("GEN", 1, &[VerseNum::single(5)], false);
        assert!(candidates.is_empty());

        let candidates = lookup.get_candidates("GEN", 1, &[VerseNum::single(5)], true);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].character, "angel");
    }

    #[test]
    fn test_bridge_query_returns_union() {
        let lookup = sample_lookup();
        let candidates = lookup.get_candidates("GEN", 1, &[VerseNum::bridge(3, 4)], false);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|e| e.character == "God"));
        assert!(candidates.iter().any(|e| e.delivery == "declaring"));
    }

    #[test]
    fn test_multi_verse_query_deduplicates() {
        let mut lookup = InMemoryCharacterVerse::new();
        lookup.add_normal("EXO", 3, 5, "God");
        lookup.add_normal("EXO", 3, 6, "God");
        let candidates = lookup.get_candidates(
            "EXO",
            3,
            &[VerseNum::single(5), VerseNum::single(6)],
            false,
        );
        assert_eq!(candidates.len(), 1);
    }
}
