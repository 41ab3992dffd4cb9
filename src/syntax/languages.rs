//! Language configurations and the registry that names them
//!
//! A language is an opaque id plus three query documents: highlights,
//! injections and indents. Only the highlights query is mandatory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::{Language, Parser};

use super::predicates::CompiledQuery;
use crate::error::{Error, QueryKind, Result};

const RUST_INDENTS: &str = include_str!("../../queries/rust/indents.scm");
const JAVASCRIPT_INDENTS: &str = include_str!("../../queries/javascript/indents.scm");
const HTML_INDENTS: &str = include_str!("../../queries/html/indents.scm");
const CSS_INDENTS: &str = include_str!("../../queries/css/indents.scm");
const JSON_INDENTS: &str = include_str!("../../queries/json/indents.scm");

/// Grammar plus compiled queries for one language
#[derive(Debug)]
pub struct LanguageConfig {
    id: String,
    language: Language,
    highlights: CompiledQuery,
    injections: Option<CompiledQuery>,
    indents: Option<CompiledQuery>,
}

impl LanguageConfig {
    /// Compile the queries for `language`.
    ///
    /// Empty injection or indent documents mean the language has none.
    pub fn new(
        id: impl Into<String>,
        language: Language,
        highlights: &str,
        injections: &str,
        indents: &str,
    ) -> Result<Self> {
        let id = id.into();

        // Reject grammars built for an incompatible ABI up front
        Parser::new()
            .set_language(&language)
            .map_err(|source| Error::Language {
                language: id.clone(),
                source,
            })?;

        let compile = |source: &str, kind: QueryKind| -> Result<Option<CompiledQuery>> {
            if source.trim().is_empty() {
                return Ok(None);
            }
            CompiledQuery::new(&id, &language, source, kind).map(Some)
        };

        let highlights = CompiledQuery::new(&id, &language, highlights, QueryKind::Highlights)?;
        let injections = compile(injections, QueryKind::Injections)?;
        let indents = compile(indents, QueryKind::Indents)?;

        tracing::debug!(
            "Compiled {} ({} highlight patterns, injections: {}, indents: {})",
            id,
            highlights.query().pattern_count(),
            injections.is_some(),
            indents.is_some()
        );

        Ok(Self {
            id,
            language,
            highlights,
            injections,
            indents,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn highlights(&self) -> &CompiledQuery {
        &self.highlights
    }

    pub fn injections(&self) -> Option<&CompiledQuery> {
        self.injections.as_ref()
    }

    pub fn indents(&self) -> Option<&CompiledQuery> {
        self.indents.as_ref()
    }
}

/// Language configs by id, alias and file extension
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    configs: HashMap<String, Arc<LanguageConfig>>,
    aliases: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a config under its id, replacing any previous one
    pub fn register(&mut self, config: LanguageConfig) -> Arc<LanguageConfig> {
        let config = Arc::new(config);
        if self
            .configs
            .insert(config.id.to_lowercase(), Arc::clone(&config))
            .is_some()
        {
            tracing::warn!("Replaced existing language config `{}`", config.id);
        }
        config
    }

    /// Make `alias` (a short name or a file extension) resolve to `id`
    pub fn add_alias(&mut self, alias: &str, id: &str) {
        self.aliases.insert(alias.to_lowercase(), id.to_lowercase());
    }

    /// Look up by id or alias, case-insensitively
    pub fn get(&self, name: &str) -> Option<Arc<LanguageConfig>> {
        let name = name.trim().to_lowercase();
        let id = self.aliases.get(&name).unwrap_or(&name);
        self.configs.get(id).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<LanguageConfig>> {
        self.get(name)
            .ok_or_else(|| Error::UnknownLanguage(name.to_string()))
    }

    /// Detect the language of a file from its extension
    pub fn for_path(&self, path: &Path) -> Option<Arc<LanguageConfig>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.configs.values().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids
    }

    /// Rust, JavaScript, HTML, CSS and JSON with the grammars' bundled
    /// queries. HTML injects JavaScript into `<script>` and CSS into
    /// `<style>`.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();

        registry.register(LanguageConfig::new(
            "rust",
            tree_sitter_rust::LANGUAGE.into(),
            tree_sitter_rust::HIGHLIGHTS_QUERY,
            tree_sitter_rust::INJECTIONS_QUERY,
            RUST_INDENTS,
        )?);
        registry.register(LanguageConfig::new(
            "javascript",
            tree_sitter_javascript::LANGUAGE.into(),
            tree_sitter_javascript::HIGHLIGHT_QUERY,
            tree_sitter_javascript::INJECTIONS_QUERY,
            JAVASCRIPT_INDENTS,
        )?);
        registry.register(LanguageConfig::new(
            "html",
            tree_sitter_html::LANGUAGE.into(),
            tree_sitter_html::HIGHLIGHTS_QUERY,
            tree_sitter_html::INJECTIONS_QUERY,
            HTML_INDENTS,
        )?);
        registry.register(LanguageConfig::new(
            "css",
            tree_sitter_css::LANGUAGE.into(),
            tree_sitter_css::HIGHLIGHTS_QUERY,
            "",
            CSS_INDENTS,
        )?);
        registry.register(LanguageConfig::new(
            "json",
            tree_sitter_json::LANGUAGE.into(),
            tree_sitter_json::HIGHLIGHTS_QUERY,
            "",
            JSON_INDENTS,
        )?);

        for (alias, id) in [
            ("rs", "rust"),
            ("js", "javascript"),
            ("mjs", "javascript"),
            ("cjs", "javascript"),
            ("jsx", "javascript"),
            ("htm", "html"),
        ] {
            registry.add_alias(alias, id);
        }

        Ok(registry)
    }
}
