//! Benchmarks for the line index and edit translation
//!
//! Run with: cargo bench --bench line_tree

use strata::{Buffer, LineTree};

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

fn lines_text(lines: usize) -> String {
    "foo bar baz\n".repeat(lines)
}

// ============================================================================
// Construction
// ============================================================================

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn build_from_text(bencher: divan::Bencher, lines: usize) {
    let text = lines_text(lines);
    bencher.bench_local(|| LineTree::from_text(divan::black_box(&text)));
}

// ============================================================================
// Lookups
// ============================================================================

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn line_containing_offset(bencher: divan::Bencher, lines: usize) {
    let tree = LineTree::from_text(&lines_text(lines));
    let total = tree.total_len();
    let mut offset = 0;
    bencher.bench_local(|| {
        offset = (offset + 7919) % total;
        divan::black_box(tree.line_containing(offset))
    });
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn line_at_row(bencher: divan::Bencher, lines: usize) {
    let tree = LineTree::from_text(&lines_text(lines));
    let count = tree.line_count();
    let mut row = 0;
    bencher.bench_local(|| {
        row = (row + 613) % count;
        divan::black_box(tree.line_at(row))
    });
}

#[divan::bench]
fn iterate_all_lines_10k(bencher: divan::Bencher) {
    let tree = LineTree::from_text(&lines_text(10_000));
    bencher.bench_local(|| tree.iter().map(|l| l.raw_len).sum::<usize>());
}

// ============================================================================
// Edits
// ============================================================================

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn type_char_middle(bencher: divan::Bencher, lines: usize) {
    bencher
        .with_inputs(|| Buffer::new(&lines_text(lines)))
        .bench_local_values(|mut buffer| {
            let mid = buffer.len_utf16() / 2;
            buffer.replace(mid..mid, "x");
            buffer
        });
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn insert_line_break_middle(bencher: divan::Bencher, lines: usize) {
    bencher
        .with_inputs(|| Buffer::new(&lines_text(lines)))
        .bench_local_values(|mut buffer| {
            let mid = buffer.len_utf16() / 2;
            buffer.replace(mid..mid, "\r\n");
            buffer
        });
}

#[divan::bench]
fn delete_hundred_lines(bencher: divan::Bencher) {
    bencher
        .with_inputs(|| Buffer::new(&lines_text(10_000)))
        .bench_local_values(|mut buffer| {
            let start = buffer.line_geometry(4_000).offset;
            let end = buffer.line_geometry(4_100).offset;
            buffer.replace(start..end, "");
            buffer
        });
}

#[divan::bench]
fn paste_thousand_lines(bencher: divan::Bencher) {
    let paste = lines_text(1_000);
    bencher
        .with_inputs(|| Buffer::new(&lines_text(10_000)))
        .bench_local_values(|mut buffer| {
            buffer.replace(0..0, &paste);
            buffer
        });
}
