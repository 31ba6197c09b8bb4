use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use versecast::{
    Block, InMemoryCharacterVerse, QuotationLevel, QuotationSystem, QuoteParser, StyleCategory,
    VerseNum,
};

fn bench_system() -> QuotationSystem {
    QuotationSystem::new(vec![
        QuotationLevel::new(1, "\u{00AB}", "\u{00BB}", "\u{00AB}"),
        QuotationLevel::new(2, "\u{2039}", "\u{203A}", "\u{2039}"),
    ])
    .unwrap()
    .with_reporting_clause('\u{2014}', '\u{2014}')
    .unwrap()
}

fn bench_lookup(chapters: u32, verses: u32) -> InMemoryCharacterVerse {
    let mut lookup = InMemoryCharacterVerse::new();
    for chapter in 1..=chapters {
        for verse in 1..=verses {
            if verse % 3 == 0 {
                lookup.add_normal("GEN", chapter, verse, "God");
            }
        }
    }
    lookup
}

/// A chapter's worth of mixed narration and quotation blocks
fn bench_blocks(chapter: u32, verses: u32) -> Vec<Block> {
    let mut blocks = Vec::new();
    for verse in 1..=verses {
        let block = Block::new(
            StyleCategory::ProseParagraph,
            "GEN",
            chapter,
            VerseNum::single(verse),
        );
        let block = if verse % 3 == 0 {
            block.with_text(
                "And God said, \u{00AB}Let there be light \u{2014}he declared\u{2014} \
                 in the expanse of the heavens\u{00BB} and it was so.",
            )
        } else {
            block.with_text("And there was evening and there was morning, one day.")
        };
        blocks.push(block);
    }
    blocks
}

fn quote_parser_benchmark(c: &mut Criterion) {
    let system = bench_system();
    let lookup = bench_lookup(50, 30);

    let mut group = c.benchmark_group("quote_parser");

    let single = bench_blocks(1, 1);
    group.bench_function("single_narration_block", |b| {
        let parser = QuoteParser::new(&system, &lookup);
        b.iter(|| black_box(parser.parse(black_box(&single))))
    });

    let chapter = bench_blocks(1, 30);
    let chapter_bytes: usize = chapter.iter().map(|bl| bl.text().len()).sum();
    group.throughput(Throughput::Bytes(chapter_bytes as u64));
    group.bench_function("chapter_mixed_blocks", |b| {
        let parser = QuoteParser::new(&system, &lookup);
        b.iter(|| black_box(parser.parse(black_box(&chapter))))
    });

    let book: Vec<Block> = (1..=50).flat_map(|ch| bench_blocks(ch, 30)).collect();
    let book_bytes: usize = book.iter().map(|bl| bl.text().len()).sum();
    group.throughput(Throughput::Bytes(book_bytes as u64));
    group.sample_size(20);
    group.bench_function("whole_book", |b| {
        let parser = QuoteParser::new(&system, &lookup);
        b.iter(|| black_box(parser.parse(black_box(&book))))
    });

    group.finish();
}

criterion_group!(benches, quote_parser_benchmark);
criterion_main!(benches);
