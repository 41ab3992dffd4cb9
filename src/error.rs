//! Error type for setup paths
//!
//! Only construction and configuration return errors. Parse failures,
//! failed predicates and cancelled jobs degrade to plain text and are
//! logged instead.

use std::path::PathBuf;

use thiserror::Error;

/// Which query document of a language failed to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Highlights,
    Injections,
    Indents,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            QueryKind::Highlights => "highlights",
            QueryKind::Injections => "injections",
            QueryKind::Indents => "indents",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("grammar for `{language}` is incompatible with this tree-sitter: {source}")]
    Language {
        language: String,
        #[source]
        source: tree_sitter::LanguageError,
    },

    #[error("{kind} query for `{language}` failed to compile: {source}")]
    Query {
        language: String,
        kind: QueryKind,
        #[source]
        source: tree_sitter::QueryError,
    },

    #[error("invalid `#{predicate}` pattern in {kind} query for `{language}`: {source}")]
    Predicate {
        language: String,
        kind: QueryKind,
        predicate: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown language `{0}`")]
    UnknownLanguage(String),

    #[error("failed to parse config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start parse worker: {0}")]
    Worker(#[source] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
