// WHY: quotation-mark configuration is runtime data supplied per translation,
// validated eagerly so the scanner never has to defend against bad config mid-parse

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Maximum supported nesting depth for paired quotation levels.
/// Observed real-world systems top out at 3; 5 leaves headroom without
/// giving up the fixed-capacity stack in the scanner.
pub const MAX_QUOTE_DEPTH: usize = 5;

/// How a quotation level behaves during scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteLevelKind {
    /// Paired marks that nest (level 2 opens only inside an open level 1)
    Normal,
    /// Line-initial dialogue marker instead of paired brackets
    NarrativeDialogue,
}

/// One nesting depth of quotation marks (1 = outermost)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLevel {
    pub level: u8,
    pub open: String,
    pub close: String,
    /// Mark expected at the start of a paragraph that continues this level
    pub continuer: String,
    pub kind: QuoteLevelKind,
}

impl QuotationLevel {
    pub fn new(level: u8, open: &str, close: &str, continuer: &str) -> Self {
        Self {
            level,
            open: open.to_string(),
            close: close.to_string(),
            continuer: continuer.to_string(),
            kind: QuoteLevelKind::Normal,
        }
    }

    pub fn narrative_dialogue(level: u8, open: &str, close: &str) -> Self {
        Self {
            level,
            open: open.to_string(),
            close: close.to_string(),
            continuer: String::new(),
            kind: QuoteLevelKind::NarrativeDialogue,
        }
    }

    /// A level with no usable pair of marks produces no boundaries
    pub fn is_degenerate(&self) -> bool {
        self.open.trim().is_empty() || self.close.trim().is_empty()
    }
}

/// Ordered set of quotation levels plus the optional dialogue-dash and
/// reporting-clause configuration for one translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationSystem {
    levels: Vec<QuotationLevel>,
    dialogue_dash_open: Option<String>,
    dialogue_dash_close: Option<String>,
    reporting_clause_start: Option<char>,
    reporting_clause_end: Option<char>,
}

impl QuotationSystem {
    /// Build a system from its levels, validating the invariants the scanner
    /// relies on: contiguous level numbers starting at 1, bounded depth, and
    /// at most one narrative-dialogue level.
    pub fn new(levels: Vec<QuotationLevel>) -> Result<Self> {
        if levels.len() > MAX_QUOTE_DEPTH {
            anyhow::bail!(
                "quotation system has {} levels; at most {} are supported",
                levels.len(),
                MAX_QUOTE_DEPTH
            );
        }

        let mut dialogue_levels = 0usize;
        let mut expected = 1u8;
        for level in &levels {
            if level.level != expected {
                anyhow::bail!(
                    "quotation levels must be contiguous starting at 1; found level {} where {} was expected",
                    level.level,
                    expected
                );
            }
            expected += 1;
            if level.kind == QuoteLevelKind::NarrativeDialogue {
                dialogue_levels += 1;
            }
        }

        if dialogue_levels > 1 {
            anyhow::bail!("at most one narrative-dialogue level may be configured");
        }

        // A narrative-dialogue level doubles as the system's dialogue dash
        let (dialogue_dash_open, dialogue_dash_close) = levels
            .iter()
            .find(|l| l.kind == QuoteLevelKind::NarrativeDialogue)
            .map(|l| {
                let close = if l.close.trim().is_empty() {
                    None
                } else {
                    Some(l.close.clone())
                };
                (Some(l.open.clone()), close)
            })
            .unwrap_or((None, None));

        Ok(Self {
            levels,
            dialogue_dash_open,
            dialogue_dash_close,
            reporting_clause_start: None,
            reporting_clause_end: None,
        })
    }

    /// Configure a dialogue-dash marker pair directly. The closer may equal
    /// the opener, which the scanner disambiguates by pairing (see scanner).
    pub fn with_dialogue_dash(mut self, open: &str, close: Option<&str>) -> Self {
        self.dialogue_dash_open = Some(open.to_string());
        self.dialogue_dash_close = close.map(str::to_string);
        self
    }

    /// Configure reporting-clause delimiters. Both must be punctuation;
    /// letters, digits, and whitespace are rejected here so the scanner can
    /// match them without re-checking.
    pub fn with_reporting_clause(mut self, start: char, end: char) -> Result<Self> {
        if !is_punctuation_delimiter(start) {
            anyhow::bail!(
                "reporting clause start delimiter {start:?} is not a punctuation character"
            );
        }
        if !is_punctuation_delimiter(end) {
            anyhow::bail!("reporting clause end delimiter {end:?} is not a punctuation character");
        }
        self.reporting_clause_start = Some(start);
        self.reporting_clause_end = Some(end);
        Ok(self)
    }

    pub fn levels(&self) -> &[QuotationLevel] {
        &self.levels
    }

    /// Levels that participate in paired-mark scanning
    pub fn normal_levels(&self) -> impl Iterator<Item = &QuotationLevel> {
        self.levels
            .iter()
            .filter(|l| l.kind == QuoteLevelKind::Normal)
    }

    pub fn level(&self, number: u8) -> Option<&QuotationLevel> {
        self.levels
            .iter()
            .find(|l| l.level == number && l.kind == QuoteLevelKind::Normal)
    }

    pub fn dialogue_dash_open(&self) -> Option<&str> {
        self.dialogue_dash_open.as_deref()
    }

    pub fn dialogue_dash_close(&self) -> Option<&str> {
        self.dialogue_dash_close.as_deref()
    }

    pub fn reporting_clause(&self) -> Option<(char, char)> {
        match (self.reporting_clause_start, self.reporting_clause_end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    /// True when no level has a usable open/close pair, so only
    /// dialogue-dash and reporting-clause logic can produce boundaries.
    pub fn is_degenerate(&self) -> bool {
        self.normal_levels().all(|l| l.is_degenerate())
    }
}

fn is_punctuation_delimiter(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}
