//! Highlight scopes
//!
//! Capture names in highlight queries are dot-separated
//! (`keyword.control.import`). A theme only styles a fixed set of
//! [`Scope`]s; [`ScopeTable::resolve`] maps a raw capture name to the most
//! specific one the theme recognizes.

macro_rules! scopes {
    ($($variant:ident => $name:literal,)*) => {
        /// Every highlight scope a theme can style
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Scope {
            $($variant,)*
        }

        impl Scope {
            pub const ALL: &'static [Scope] = &[$(Scope::$variant,)*];

            /// Dot-separated name as written in queries and themes
            pub fn name(self) -> &'static str {
                match self {
                    $(Scope::$variant => $name,)*
                }
            }

            /// Exact name lookup, no fallback
            pub fn from_name(name: &str) -> Option<Scope> {
                match name {
                    $($name => Some(Scope::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

scopes! {
    Attribute => "attribute",
    Boolean => "boolean",
    Comment => "comment",
    Constant => "constant",
    ConstantBuiltin => "constant.builtin",
    ConstantCharacter => "constant.character",
    Constructor => "constructor",
    Embedded => "embedded",
    Escape => "escape",
    Function => "function",
    FunctionBuiltin => "function.builtin",
    FunctionMethod => "function.method",
    Keyword => "keyword",
    KeywordFunction => "keyword.function",
    KeywordOperator => "keyword.operator",
    KeywordReturn => "keyword.return",
    Label => "label",
    Number => "number",
    Operator => "operator",
    Property => "property",
    Punctuation => "punctuation",
    PunctuationBracket => "punctuation.bracket",
    PunctuationDelimiter => "punctuation.delimiter",
    PunctuationSpecial => "punctuation.special",
    String => "string",
    StringSpecial => "string.special",
    Tag => "tag",
    TagAttribute => "tag.attribute",
    Text => "text",
    TextEmphasis => "text.emphasis",
    TextStrong => "text.strong",
    TextTitle => "text.title",
    TextUri => "text.uri",
    Type => "type",
    TypeBuiltin => "type.builtin",
    Variable => "variable",
    VariableBuiltin => "variable.builtin",
    VariableParameter => "variable.parameter",
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// The set of scopes the active theme recognizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeTable {
    recognized: Vec<bool>,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::all()
    }
}

impl ScopeTable {
    pub fn all() -> Self {
        Self {
            recognized: vec![true; Scope::ALL.len()],
        }
    }

    /// Build from scope names. Unknown names are logged and ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut recognized = vec![false; Scope::ALL.len()];
        for name in names {
            match Scope::from_name(name) {
                Some(scope) => recognized[scope as usize] = true,
                None => tracing::warn!("Ignoring unknown scope name `{}`", name),
            }
        }
        Self { recognized }
    }

    pub fn recognizes(&self, scope: Scope) -> bool {
        self.recognized[scope as usize]
    }

    /// Resolve a capture name by trying the full name, then progressively
    /// shorter prefixes (`keyword.control.import` -> `keyword.control` ->
    /// `keyword`).
    pub fn resolve(&self, name: &str) -> Option<Scope> {
        let mut current = name;
        loop {
            if let Some(scope) = Scope::from_name(current).filter(|s| self.recognizes(*s)) {
                return Some(scope);
            }

            let dot_pos = current.rfind('.')?;
            current = &current[..dot_pos];
        }
    }
}
