pub mod batch;
pub mod block;
pub mod character_verse;
pub mod discovery;
pub mod document_io;
pub mod quote_parser;
pub mod quote_system;

// Re-export main types for convenient access
pub use block::{
    Block, BlockElement, CharacterId, MultiBlockQuote, SentinelCharacter, StyleCategory, VerseNum,
};
pub use character_verse::{
    CharacterVerseEntry, CharacterVerseLookup, HypotheticalSpeakerProvider, InMemoryCharacterVerse,
    QuoteKind,
};
pub use quote_parser::QuoteParser;
pub use quote_system::{QuotationLevel, QuotationSystem, QuoteLevelKind};

// Re-export batch processing types for the CLI and external callers
pub use batch::{process_books, BatchConfig, BookStats};
pub use discovery::{collect_discovered_files, DiscoveryConfig, FileValidation};
pub use document_io::{load_blocks, store_blocks, DocumentReader, ReaderConfig};
