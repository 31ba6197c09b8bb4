// WHY: resolution never throws; production texts reliably contain
// inconsistent punctuation and incomplete expected-speaker data, so every
// dead end maps to a sentinel a human can review later

use std::collections::BTreeSet;

use tracing::debug;

use crate::block::{CharacterId, SentinelCharacter, VerseNum};
use crate::character_verse::{
    CharacterVerseEntry, CharacterVerseLookup, HypotheticalSpeakerProvider, SCRIPTURE_CHARACTER,
};

/// One resolved stretch of a quotation. Indices refer to the verse list the
/// quotation covers; a part boundary is always a verse boundary.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedPart {
    pub verse_start: usize,
    pub verse_end: usize,
    pub character: CharacterId,
    pub delivery: Option<String>,
}

pub(crate) struct SpeakerResolver<'a> {
    lookup: &'a dyn CharacterVerseLookup,
    hypothetical: Option<&'a dyn HypotheticalSpeakerProvider>,
}

impl<'a> SpeakerResolver<'a> {
    pub fn new(
        lookup: &'a dyn CharacterVerseLookup,
        hypothetical: Option<&'a dyn HypotheticalSpeakerProvider>,
    ) -> Self {
        Self {
            lookup,
            hypothetical,
        }
    }

    /// Resolve a finished quotation covering `verses` (in text order, each a
    /// verse or bridge). Candidates are intersected across the covered
    /// verses; a verse that breaks the intersection splits the quotation
    /// there, and the remainder falls back to alternate entries before being
    /// marked Unexpected.
    pub fn resolve_quotation(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
    ) -> Vec<ResolvedPart> {
        if verses.is_empty() {
            return Vec::new();
        }

        let sets: Vec<Vec<CharacterVerseEntry>> = verses
            .iter()
            .map(|v| self.lookup.get_candidates(book, chapter, &[*v], false))
            .collect();

        if sets.iter().all(Vec::is_empty) {
            return vec![self.resolve_without_primary_data(book, chapter, verses)];
        }

        let mut inter = characters_of(&sets[0]);
        if inter.is_empty() {
            // Nothing to anchor the quotation on its first verse
            return vec![self.rescue_part(book, chapter, verses, 0, verses.len() - 1)];
        }

        let mut end = 0usize;
        while end + 1 < verses.len() {
            let next: BTreeSet<String> = inter
                .intersection(&characters_of(&sets[end + 1]))
                .cloned()
                .collect();
            if next.is_empty() {
                break;
            }
            inter = next;
            end += 1;
        }

        let mut parts = vec![self.make_part(&sets, &inter, 0, end)];
        if end + 1 < verses.len() {
            debug!(
                book,
                chapter,
                verse = verses[end + 1].number,
                "speaker data contradicts quotation continuing; splitting"
            );
            parts.push(self.rescue_part(book, chapter, verses, end + 1, verses.len() - 1));
        }
        parts
    }

    /// No verse has any primary entry: consult the hypothetical-speaker
    /// provider if present, otherwise the quote boundaries do not match any
    /// known speaker.
    fn resolve_without_primary_data(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
    ) -> ResolvedPart {
        if let Some(provider) = self.hypothetical {
            let entries = provider.hypothetical_candidates(book, chapter, verses);
            if !entries.is_empty() {
                let chars = characters_of(&entries);
                let sets = vec![entries];
                let mut part = self.make_part(&sets, &chars, 0, 0);
                part.verse_end = verses.len() - 1;
                return part;
            }
        }
        ResolvedPart {
            verse_start: 0,
            verse_end: verses.len() - 1,
            character: CharacterId::Sentinel(SentinelCharacter::Unexpected),
            delivery: None,
        }
    }

    /// Remainder after a contradiction: alternate/rare entries get one
    /// chance to keep a legitimately-continuing quotation before Unexpected.
    fn rescue_part(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
        start: usize,
        end: usize,
    ) -> ResolvedPart {
        let alt_sets: Vec<Vec<CharacterVerseEntry>> = verses[start..=end]
            .iter()
            .map(|v| {
                self.lookup
                    .get_candidates(book, chapter, &[*v], true)
                    .into_iter()
                    .filter(|e| e.kind.is_fallback_only())
                    .collect()
            })
            .collect();

        let mut inter = characters_of(&alt_sets[0]);
        for set in &alt_sets[1..] {
            inter = inter.intersection(&characters_of(set)).cloned().collect();
        }

        if inter.len() == 1 {
            let mut part = self.make_part(&alt_sets, &inter, 0, alt_sets.len() - 1);
            part.verse_start = start;
            part.verse_end = end;
            return part;
        }

        ResolvedPart {
            verse_start: start,
            verse_end: end,
            character: CharacterId::Sentinel(SentinelCharacter::Unexpected),
            delivery: None,
        }
    }

    /// Turn an intersection over verse range [start..=end] into a part.
    fn make_part(
        &self,
        sets: &[Vec<CharacterVerseEntry>],
        inter: &BTreeSet<String>,
        start: usize,
        end: usize,
    ) -> ResolvedPart {
        if inter.len() != 1 {
            return ResolvedPart {
                verse_start: start,
                verse_end: end,
                character: CharacterId::Sentinel(SentinelCharacter::Ambiguous),
                delivery: None,
            };
        }

        let name = inter.iter().next().expect("len checked").clone();
        let matching: Vec<&CharacterVerseEntry> = sets[start..=end]
            .iter()
            .flatten()
            .filter(|e| e.character == name)
            .collect();

        let character = if name == SCRIPTURE_CHARACTER {
            CharacterId::Sentinel(SentinelCharacter::ScriptureQuotation)
        } else if !matching.is_empty() && matching.iter().all(|e| e.narrator) {
            CharacterId::narrator()
        } else {
            CharacterId::Named(name.clone())
        };

        let delivery = agreed_delivery(&sets[start..=end], &name);
        ResolvedPart {
            verse_start: start,
            verse_end: end,
            character,
            delivery,
        }
    }

    /// Narration resolution for a single verse: plain text belongs to the
    /// narrator unless the verse's only candidate is implicit speech.
    pub fn resolve_narration_verse(
        &self,
        book: &str,
        chapter: u32,
        verse: VerseNum,
    ) -> (CharacterId, Option<String>) {
        let entries = self.lookup.get_candidates(book, chapter, &[verse], false);
        let chars = characters_of(&entries);
        if chars.len() == 1 && !entries.is_empty() && entries.iter().all(|e| e.kind.is_implicit()) {
            let entry = &entries[0];
            let character = if entry.narrator {
                CharacterId::narrator()
            } else {
                CharacterId::Named(entry.character.clone())
            };
            let delivery = if entry.delivery.is_empty() {
                None
            } else {
                Some(entry.delivery.clone())
            };
            return (character, delivery);
        }
        (CharacterId::narrator(), None)
    }

    /// Delivery for one block's own verse span, used when delivery shifts
    /// mid-continuation. Alternates are included so a rescued remainder
    /// still reads its delivery.
    pub fn block_delivery(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
        character: &CharacterId,
    ) -> Option<String> {
        let CharacterId::Named(name) = character else {
            return None;
        };
        let sets: Vec<Vec<CharacterVerseEntry>> = verses
            .iter()
            .map(|v| self.lookup.get_candidates(book, chapter, &[*v], true))
            .collect();
        agreed_delivery(&sets, name)
    }

    /// Whether an upstream milestone speaker is supported by any entry
    /// (alternates included) for the covered verses.
    pub fn corroborate_milestone(
        &self,
        book: &str,
        chapter: u32,
        verses: &[VerseNum],
        character: &str,
    ) -> bool {
        self.lookup
            .get_candidates(book, chapter, verses, true)
            .iter()
            .any(|e| e.character == character)
    }
}

fn characters_of(entries: &[CharacterVerseEntry]) -> BTreeSet<String> {
    entries.iter().map(|e| e.character.clone()).collect()
}

/// The single delivery string all verses in the range agree on for
/// `character`, if there is one.
fn agreed_delivery(sets: &[Vec<CharacterVerseEntry>], character: &str) -> Option<String> {
    let mut agreed: Option<BTreeSet<String>> = None;
    for set in sets {
        let deliveries: BTreeSet<String> = set
            .iter()
            .filter(|e| e.character == character)
            .map(|e| e.delivery.clone())
            .collect();
        agreed = Some(match agreed {
            None => deliveries,
            Some(prev) => prev.intersection(&deliveries).cloned().collect(),
        });
    }
    let agreed = agreed?;
    if agreed.len() == 1 {
        let delivery = agreed.into_iter().next().expect("len checked");
        if delivery.is_empty() {
            None
        } else {
            Some(delivery)
        }
    } else {
        None
    }
}
