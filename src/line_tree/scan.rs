//! Line terminator scanning
//!
//! CR, LF and CRLF all end a line. A CR immediately followed by LF is a
//! single two-unit terminator.

/// Measurements of one line produced by [`scan_lines`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineSpan {
    /// UTF-16 code units including the terminator
    pub raw_len: usize,
    /// 0, 1 or 2 UTF-16 code units
    pub terminator: u8,
    /// UTF-8 bytes including the terminator
    pub byte_len: usize,
}

/// Split `chars` into lines.
///
/// The result always ends with the unterminated remainder, which is empty
/// when the input ends with a terminator (or is empty).
pub fn scan_lines<I>(chars: I) -> Vec<LineSpan>
where
    I: IntoIterator<Item = char>,
{
    let mut spans = Vec::new();
    let mut current = LineSpan::default();
    let mut chars = chars.into_iter().peekable();

    while let Some(ch) = chars.next() {
        current.raw_len += ch.len_utf16();
        current.byte_len += ch.len_utf8();
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    current.raw_len += 1;
                    current.byte_len += 1;
                    current.terminator = 2;
                } else {
                    current.terminator = 1;
                }
                spans.push(std::mem::take(&mut current));
            }
            '\n' => {
                current.terminator = 1;
                spans.push(std::mem::take(&mut current));
            }
            _ => {}
        }
    }

    spans.push(current);
    spans
}
