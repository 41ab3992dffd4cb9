//! Text predicates for query matches
//!
//! Tree-sitter would apply `#eq?` and `#match?` itself and let a match
//! through when the named capture is absent. Query sources are rewritten
//! so those operators arrive as general predicates instead, and every text
//! predicate is evaluated here with the same rule: `eq?`, `match?`, the
//! `lua-match?` and `vim-match?` dialects, `contains?`, and their `not-`
//! and `any-` forms. `#any-of?` is still left to tree-sitter.

use std::borrow::Cow;

use regex::Regex;
use ropey::Rope;
use tree_sitter::{Language, Query, QueryCapture, QueryPredicate, QueryPredicateArg};

use crate::error::{Error, QueryKind, Result};

/// A filter on the text of captured nodes.
///
/// `positive == false` is the negated form. With `any`, one satisfying
/// node is enough; otherwise every node of a quantified capture must
/// satisfy it.
#[derive(Debug, Clone)]
pub enum TextPredicate {
    CaptureEqualsString {
        capture: u32,
        value: Box<str>,
        positive: bool,
        any: bool,
    },
    CaptureEqualsCapture {
        capture: u32,
        other: u32,
        positive: bool,
        any: bool,
    },
    CaptureMatchesPattern {
        capture: u32,
        regex: Regex,
        positive: bool,
        any: bool,
    },
}

impl TextPredicate {
    /// Evaluate against the captures of one match.
    ///
    /// A predicate naming a capture the match does not contain fails,
    /// whatever its polarity.
    pub fn evaluate(&self, captures: &[QueryCapture<'_>], text: &Rope) -> bool {
        let text_of = |capture: &QueryCapture<'_>| node_text(text, capture);
        let nodes_of = |index: u32| captures.iter().filter(move |c| c.index == index);

        match self {
            TextPredicate::CaptureEqualsString {
                capture,
                value,
                positive,
                any,
            } => quantify(nodes_of(*capture), *positive, *any, |c| {
                text_of(c) == **value
            }),
            TextPredicate::CaptureMatchesPattern {
                capture,
                regex,
                positive,
                any,
            } => quantify(nodes_of(*capture), *positive, *any, |c| {
                regex.is_match(&text_of(c))
            }),
            TextPredicate::CaptureEqualsCapture {
                capture,
                other,
                positive,
                any,
            } => {
                // Quantified captures compare pairwise, in match order
                let pairs = nodes_of(*capture).zip(nodes_of(*other));
                quantify(pairs, *positive, *any, |(left, right)| {
                    text_of(left) == text_of(right)
                })
            }
        }
    }
}

fn node_text<'a>(text: &'a Rope, capture: &QueryCapture<'_>) -> Cow<'a, str> {
    text.byte_slice(capture.node.byte_range()).into()
}

fn quantify<T>(
    nodes: impl Iterator<Item = T>,
    positive: bool,
    any: bool,
    mut test: impl FnMut(T) -> bool,
) -> bool {
    let mut seen = false;
    let mut satisfied_any = false;
    let mut satisfied_all = true;
    for capture in nodes {
        seen = true;
        let ok = test(capture) == positive;
        satisfied_any |= ok;
        satisfied_all &= ok;
    }
    seen && if any { satisfied_any } else { satisfied_all }
}

/// Translate a Lua pattern into an equivalent `regex` pattern
fn lua_pattern_to_regex(pattern: &str) -> String {
    fn class(c: char, in_set: bool) -> Option<&'static str> {
        Some(match (c, in_set) {
            ('a', false) => "[[:alpha:]]",
            ('a', true) => "[:alpha:]",
            ('d', _) => r"\d",
            ('D', false) => r"\D",
            ('l', false) => "[[:lower:]]",
            ('l', true) => "[:lower:]",
            ('u', false) => "[[:upper:]]",
            ('u', true) => "[:upper:]",
            ('s', _) => r"\s",
            ('S', false) => r"\S",
            ('w', false) => "[[:alnum:]]",
            ('w', true) => "[:alnum:]",
            ('x', false) => "[[:xdigit:]]",
            ('x', true) => "[:xdigit:]",
            ('p', false) => "[[:punct:]]",
            ('p', true) => "[:punct:]",
            ('c', false) => "[[:cntrl:]]",
            ('c', true) => "[:cntrl:]",
            ('A', false) => "[^[:alpha:]]",
            ('W', false) => "[^[:alnum:]]",
            _ => return None,
        })
    }

    let mut out = String::with_capacity(pattern.len() + 8);
    let mut in_set = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' => match chars.next() {
                Some(next) => match class(next, in_set) {
                    Some(translated) => out.push_str(translated),
                    None => out.push_str(&regex::escape(&next.to_string())),
                },
                None => out.push_str("%"),
            },
            '[' if !in_set => {
                in_set = true;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
            }
            ']' if in_set => {
                in_set = false;
                out.push(']');
            }
            '-' if !in_set => out.push_str("*?"),
            '{' | '}' | '|' | '\\' => out.push_str(&regex::escape(&c.to_string())),
            '[' | '&' | '~' if in_set => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Operator prefix for predicates taken over from tree-sitter
const ROUTED_PREFIX: &str = "strata-";

/// Built-in operators whose missing-capture handling differs from ours
const ROUTED_OPERATORS: &[&str] = &[
    "eq?",
    "not-eq?",
    "any-eq?",
    "any-not-eq?",
    "match?",
    "not-match?",
    "any-match?",
    "any-not-match?",
];

/// Rename built-in text predicates in a query source so tree-sitter hands
/// them over as general predicates. Strings and comments are copied as is.
fn route_text_predicates(source: &str) -> Cow<'_, str> {
    if !source.contains('#') {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(source.len() + 32);
    let mut chars = source.char_indices();
    while let Some((i, c)) = chars.next() {
        out.push(c);
        match c {
            '"' => {
                while let Some((_, c)) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            ';' => {
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if c == '\n' {
                        break;
                    }
                }
            }
            '#' => {
                let rest = &source[i + 1..];
                let len = rest
                    .find(|c: char| {
                        !(c.is_alphanumeric() || matches!(c, '-' | '_' | '?' | '!' | '.'))
                    })
                    .unwrap_or(rest.len());
                if ROUTED_OPERATORS.contains(&&rest[..len]) {
                    out.push_str(ROUTED_PREFIX);
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

/// Operator as written in the query source
fn operator_name(predicate: &QueryPredicate) -> &str {
    let operator = &*predicate.operator;
    operator.strip_prefix(ROUTED_PREFIX).unwrap_or(operator)
}

/// A compiled query plus the per-pattern data the resolver needs
#[derive(Debug)]
pub struct CompiledQuery {
    query: Query,
    predicates: Vec<Vec<TextPredicate>>,
    overrides: Vec<bool>,
}

impl CompiledQuery {
    pub fn new(
        language_name: &str,
        language: &Language,
        source: &str,
        kind: QueryKind,
    ) -> Result<Self> {
        let routed = route_text_predicates(source);
        let query = Query::new(language, &routed).map_err(|source| Error::Query {
            language: language_name.to_string(),
            kind,
            source,
        })?;

        let mut predicates = Vec::with_capacity(query.pattern_count());
        let mut overrides = Vec::with_capacity(query.pattern_count());
        for pattern in 0..query.pattern_count() {
            let mut parsed = Vec::new();
            for predicate in query.general_predicates(pattern) {
                match parse_predicate(predicate) {
                    Ok(Some(p)) => parsed.push(p),
                    Ok(None) => tracing::trace!(
                        "Ignoring unsupported predicate #{} in {} query for {}",
                        operator_name(predicate),
                        kind,
                        language_name
                    ),
                    Err(source) => {
                        return Err(Error::Predicate {
                            language: language_name.to_string(),
                            kind,
                            predicate: operator_name(predicate).to_string(),
                            source,
                        })
                    }
                }
            }
            predicates.push(parsed);
            overrides.push(
                query
                    .property_settings(pattern)
                    .iter()
                    .any(|p| &*p.key == "override" && p.value.as_deref() == Some("true")),
            );
        }

        Ok(Self {
            query,
            predicates,
            overrides,
        })
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn capture_index(&self, name: &str) -> Option<u32> {
        self.query.capture_index_for_name(name)
    }

    pub fn capture_name(&self, index: u32) -> &str {
        self.query.capture_names()[index as usize]
    }

    /// Patterns marked with `#set! override "true"` may replace an earlier
    /// pattern's capture of the same node
    pub fn is_override(&self, pattern_index: usize) -> bool {
        self.overrides.get(pattern_index).copied().unwrap_or(false)
    }

    /// Value of a `#set! key "value"` property on a pattern
    pub fn property(&self, pattern_index: usize, key: &str) -> Option<&str> {
        self.query
            .property_settings(pattern_index)
            .iter()
            .find(|p| &*p.key == key)
            .and_then(|p| p.value.as_deref())
    }

    pub fn text_predicates(&self, pattern_index: usize) -> &[TextPredicate] {
        self.predicates
            .get(pattern_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a match passes all of its pattern's text predicates
    pub fn satisfies(
        &self,
        pattern_index: usize,
        captures: &[QueryCapture<'_>],
        text: &Rope,
    ) -> bool {
        self.text_predicates(pattern_index)
            .iter()
            .all(|p| p.evaluate(captures, text))
    }
}

fn parse_predicate(predicate: &QueryPredicate) -> Result<Option<TextPredicate>, regex::Error> {
    let Some(mut op) = operator_name(predicate).strip_suffix('?') else {
        return Ok(None);
    };
    let any = match op.strip_prefix("any-") {
        Some(rest) => {
            op = rest;
            true
        }
        None => false,
    };
    let positive = match op.strip_prefix("not-") {
        Some(rest) => {
            op = rest;
            false
        }
        None => true,
    };

    let (Some(QueryPredicateArg::Capture(capture)), Some(second), 2) = (
        predicate.args.first(),
        predicate.args.get(1),
        predicate.args.len(),
    ) else {
        return Ok(None);
    };
    let capture = *capture;

    let predicate = match (op, second) {
        ("eq", QueryPredicateArg::String(value)) => TextPredicate::CaptureEqualsString {
            capture,
            value: value.clone(),
            positive,
            any,
        },
        ("eq", QueryPredicateArg::Capture(other)) => TextPredicate::CaptureEqualsCapture {
            capture,
            other: *other,
            positive,
            any,
        },
        ("match" | "vim-match", QueryPredicateArg::String(pattern)) => {
            TextPredicate::CaptureMatchesPattern {
                capture,
                regex: Regex::new(pattern)?,
                positive,
                any,
            }
        }
        ("lua-match", QueryPredicateArg::String(pattern)) => {
            TextPredicate::CaptureMatchesPattern {
                capture,
                regex: Regex::new(&lua_pattern_to_regex(pattern))?,
                positive,
                any,
            }
        }
        ("contains", QueryPredicateArg::String(needle)) => TextPredicate::CaptureMatchesPattern {
            capture,
            regex: Regex::new(&regex::escape(needle))?,
            positive,
            any,
        },
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}
