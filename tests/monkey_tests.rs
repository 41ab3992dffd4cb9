//! Monkey tests - long sequences of random edits checked against a
//! plain String model

mod common;

use common::{buffer, buffer_to_string};
use strata::{Buffer, LineTree};

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            (self.next() % n as u64) as usize
        }
    }
}

const PIECES: &[&str] = &["a", "xyz", "\n", "\r", "\r\n", "é", "😀", "\n\n", " {", "}", ""];

fn utf16_offset(text: &str, char_index: usize) -> usize {
    text.chars().take(char_index).map(char::len_utf16).sum()
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(byte, _)| byte)
}

/// Apply one random edit to both the buffer and the model
fn random_edit(rng: &mut Lcg, buffer: &mut Buffer, model: &mut String) {
    let chars = model.chars().count();
    let start = rng.below(chars + 1);
    let end = (start + rng.below(4)).min(chars);
    let insert = PIECES[rng.below(PIECES.len())];

    let range = utf16_offset(model, start)..utf16_offset(model, end);
    let bytes = byte_offset(model, start)..byte_offset(model, end);
    buffer.replace(range, insert);
    model.replace_range(bytes, insert);
}

fn assert_matches_model(buffer: &Buffer, model: &str, step: usize) {
    assert_eq!(buffer_to_string(buffer), model, "text diverged at step {step}");

    let fresh = LineTree::from_text(model);
    let lines = buffer.lines();
    let current: Vec<_> = lines
        .iter()
        .map(|l| (l.location, l.byte_location, l.raw_len, l.terminator))
        .collect();
    let expected: Vec<_> = fresh
        .iter()
        .map(|l| (l.location, l.byte_location, l.raw_len, l.terminator))
        .collect();
    assert_eq!(current, expected, "lines diverged at step {step} for {model:?}");

    if let Err(e) = lines.check_invariants() {
        panic!("invariant broken at step {step}: {e}");
    }
}

// ========================================================================
// Plain text
// ========================================================================

#[test]
fn test_random_edits_keep_line_index_in_sync() {
    for seed in 0..8 {
        let mut rng = Lcg(seed);
        let mut model = String::from("start\r\nmiddle\rend\n");
        let mut buffer = Buffer::new(&model);

        for step in 0..400 {
            random_edit(&mut rng, &mut buffer, &mut model);
            assert_matches_model(&buffer, &model, step);
        }
    }
}

#[test]
fn test_random_edits_from_empty_buffer() {
    let mut rng = Lcg(42);
    let mut model = String::new();
    let mut buffer = Buffer::new("");

    for step in 0..1000 {
        random_edit(&mut rng, &mut buffer, &mut model);
        // Occasionally clear everything
        if step % 250 == 249 {
            let end = buffer.len_utf16();
            buffer.replace(0..end, "");
            model.clear();
        }
        assert_matches_model(&buffer, &model, step);
    }
}

// ========================================================================
// With syntax
// ========================================================================

#[test]
fn test_random_edits_keep_layers_covering_text() {
    let mut rng = Lcg(7);
    let mut model = String::from("<p>x</p>\n<script>let a = {};</script>\n<style>p { }</style>");
    let mut buffer = buffer(&model, "html");

    for step in 0..150 {
        random_edit(&mut rng, &mut buffer, &mut model);
        assert_matches_model(&buffer, &model, step);

        let layers = buffer.layers().unwrap();
        assert_eq!(layers.root().byte_range(), 0..model.len(), "step {step}");
        for layer in layers.layers() {
            let range = layer.byte_range();
            assert!(range.end <= model.len(), "layer past end at step {step}");
            for child in layer.children() {
                let inner = child.byte_range();
                assert!(
                    range.start <= inner.start && inner.end <= range.end,
                    "child {inner:?} escapes {range:?} at step {step}"
                );
            }
        }

        // Highlighting the whole text never panics and stays in bounds
        let tokens = buffer.highlight_tokens(0..model.len());
        assert!(tokens.iter().all(|t| t.local_range.end <= model.len()));
        assert!(tokens.windows(2).all(|w| w[0].local_range.end <= w[1].local_range.start));
    }
}
