use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use super::builders::{FollowBuilder, StartBuilder};

/// Highest follow-up priority a dialect may register.
pub const MAX_PRIORITY: u8 = 15;

/// Start/end/separator triple describing one bracketed region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeMarker {
    pub start: &'static str,
    pub end: &'static str,
    pub separator: Option<&'static str>,
}

impl ScopeMarker {
    pub const fn new(start: &'static str, end: &'static str, separator: Option<&'static str>) -> Self {
        Self {
            start,
            end,
            separator,
        }
    }
}

/// The markers builders use for each bracket kind.
#[derive(Clone, Copy, Debug)]
pub struct Markers {
    pub paren: ScopeMarker,
    pub bracket: ScopeMarker,
    pub brace: ScopeMarker,
    /// Array initializer list.
    pub initializer: ScopeMarker,
    pub ternary: ScopeMarker,
    pub case: ScopeMarker,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            paren: ScopeMarker::new("(", ")", Some(",")),
            bracket: ScopeMarker::new("[", "]", Some(",")),
            brace: ScopeMarker::new("{", "}", Some(";")),
            initializer: ScopeMarker::new("{", "}", Some(",")),
            ternary: ScopeMarker::new("?", ":", None),
            case: ScopeMarker::new("case", ":", None),
        }
    }
}

/// Custom literal forms, tried in the order a dialect lists them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiteralReader {
    RawString { delimiter: &'static str },
    InterpolatedString { prefix: &'static str },
    VerbatimString { prefix: &'static str },
    QuotedString { quote: char },
    CharLiteral { quote: char },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FollowEntry {
    pub(crate) priority: u8,
    pub(crate) builder: FollowBuilder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialectError {
    /// A builder or marker names punctuation missing from the symbol table.
    UnknownSymbol(String),
    DuplicateBuilder(String),
    InvalidPriority { text: String, priority: u8 },
    InvalidRadix { prefix: String, radix: u32 },
    EmptySymbol,
}

impl fmt::Display for DialectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectError::UnknownSymbol(text) => {
                write!(f, "'{text}' is not in the dialect's symbol table")
            }
            DialectError::DuplicateBuilder(text) => {
                write!(f, "builder for '{text}' registered twice")
            }
            DialectError::InvalidPriority { text, priority } => write!(
                f,
                "priority {priority} for '{text}' is outside 1..={MAX_PRIORITY}"
            ),
            DialectError::InvalidRadix { prefix, radix } => {
                write!(f, "radix {radix} for prefix '{prefix}' is outside 2..=36")
            }
            DialectError::EmptySymbol => write!(f, "symbols must not be empty"),
        }
    }
}

impl std::error::Error for DialectError {}

/// A concrete surface syntax: symbols, literal readers, radix prefixes,
/// comments, bracket markers and the builder registry.
#[derive(Debug)]
pub struct Dialect {
    name: String,
    symbols: Vec<&'static str>,
    literal_readers: Vec<LiteralReader>,
    radix_prefixes: Vec<(&'static str, u32)>,
    line_comment: Option<&'static str>,
    block_comment: Option<(&'static str, &'static str)>,
    markers: Markers,
    closers: Vec<&'static str>,
    arrow: &'static str,
    unary_priority: u8,
    starts: HashMap<&'static str, StartBuilder>,
    follows: HashMap<&'static str, FollowEntry>,
}

impl Dialect {
    pub fn builder(name: impl Into<String>) -> DialectBuilder {
        DialectBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn arrow(&self) -> &'static str {
        self.arrow
    }

    /// Minimum priority for the operand of a prefix operator.
    pub fn unary_priority(&self) -> u8 {
        self.unary_priority
    }

    pub(crate) fn literal_readers(&self) -> &[LiteralReader] {
        &self.literal_readers
    }

    pub(crate) fn radix_prefixes(&self) -> &[(&'static str, u32)] {
        &self.radix_prefixes
    }

    pub(crate) fn line_comment(&self) -> Option<&'static str> {
        self.line_comment
    }

    pub(crate) fn block_comment(&self) -> Option<(&'static str, &'static str)> {
        self.block_comment
    }

    /// Longest registered symbol at the start of `rest`.
    pub(crate) fn match_symbol(&self, rest: &str) -> Option<&'static str> {
        self.symbols
            .iter()
            .copied()
            .find(|symbol| rest.starts_with(symbol))
    }

    pub(crate) fn has_symbol(&self, text: &str) -> bool {
        self.symbols.contains(&text)
    }

    pub(crate) fn is_closer(&self, text: &str) -> bool {
        self.closers.contains(&text)
    }

    pub(crate) fn start(&self, text: &str) -> Option<StartBuilder> {
        self.starts.get(text).copied()
    }

    pub(crate) fn follow(&self, text: &str) -> Option<FollowEntry> {
        self.follows.get(text).copied()
    }
}

pub struct DialectBuilder {
    name: String,
    symbols: Vec<&'static str>,
    literal_readers: Vec<LiteralReader>,
    radix_prefixes: Vec<(&'static str, u32)>,
    line_comment: Option<&'static str>,
    block_comment: Option<(&'static str, &'static str)>,
    markers: Markers,
    closers: Vec<&'static str>,
    arrow: &'static str,
    unary_priority: u8,
    starts: Vec<(&'static str, StartBuilder)>,
    follows: Vec<(&'static str, FollowEntry)>,
}

impl DialectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: Vec::new(),
            literal_readers: Vec::new(),
            radix_prefixes: Vec::new(),
            line_comment: None,
            block_comment: None,
            markers: Markers::default(),
            closers: vec![")"],
            arrow: "=>",
            unary_priority: MAX_PRIORITY - 1,
            starts: Vec::new(),
            follows: Vec::new(),
        }
    }

    pub fn symbols(mut self, symbols: &[&'static str]) -> Self {
        self.symbols.extend_from_slice(symbols);
        self
    }

    pub fn literal_reader(mut self, reader: LiteralReader) -> Self {
        self.literal_readers.push(reader);
        self
    }

    pub fn radix_prefix(mut self, prefix: &'static str, radix: u32) -> Self {
        self.radix_prefixes.push((prefix, radix));
        self
    }

    pub fn line_comment(mut self, marker: &'static str) -> Self {
        self.line_comment = Some(marker);
        self
    }

    pub fn block_comment(mut self, open: &'static str, close: &'static str) -> Self {
        self.block_comment = Some((open, close));
        self
    }

    pub fn markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    /// Closing brackets; one that does not end the active scope is an error.
    pub fn closers(mut self, closers: &[&'static str]) -> Self {
        self.closers = closers.to_vec();
        self
    }

    pub fn arrow(mut self, arrow: &'static str) -> Self {
        self.arrow = arrow;
        self
    }

    pub fn unary_priority(mut self, priority: u8) -> Self {
        self.unary_priority = priority;
        self
    }

    pub fn start(mut self, text: &'static str, builder: StartBuilder) -> Self {
        self.starts.push((text, builder));
        self
    }

    pub fn follow(mut self, text: &'static str, priority: u8, builder: FollowBuilder) -> Self {
        self.follows.push((text, FollowEntry { priority, builder }));
        self
    }

    pub fn build(self) -> Result<Dialect, DialectError> {
        let mut symbols = self.symbols;
        if symbols.iter().any(|symbol| symbol.is_empty()) {
            return Err(DialectError::EmptySymbol);
        }
        symbols.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        symbols.dedup();

        let known = |text: &str| is_word(text) || symbols.contains(&text);
        let markers = self.markers;
        let marker_tokens = [
            markers.paren,
            markers.bracket,
            markers.brace,
            markers.initializer,
            markers.ternary,
            markers.case,
        ]
        .into_iter()
        .flat_map(|marker| [Some(marker.start), Some(marker.end), marker.separator])
        .flatten();
        for text in marker_tokens
            .chain(self.closers.iter().copied())
            .chain(std::iter::once(self.arrow))
        {
            if !known(text) {
                return Err(DialectError::UnknownSymbol(text.to_string()));
            }
        }
        for (prefix, radix) in &self.radix_prefixes {
            if !(2..=36).contains(radix) {
                return Err(DialectError::InvalidRadix {
                    prefix: prefix.to_string(),
                    radix: *radix,
                });
            }
        }
        if !(1..=MAX_PRIORITY).contains(&self.unary_priority) {
            return Err(DialectError::InvalidPriority {
                text: "unary".to_string(),
                priority: self.unary_priority,
            });
        }

        let mut starts = HashMap::new();
        for (text, builder) in self.starts {
            if !known(text) {
                return Err(DialectError::UnknownSymbol(text.to_string()));
            }
            if starts.insert(text, builder).is_some() {
                return Err(DialectError::DuplicateBuilder(text.to_string()));
            }
        }
        let mut follows = HashMap::new();
        for (text, entry) in self.follows {
            if !known(text) {
                return Err(DialectError::UnknownSymbol(text.to_string()));
            }
            if !(1..=MAX_PRIORITY).contains(&entry.priority) {
                return Err(DialectError::InvalidPriority {
                    text: text.to_string(),
                    priority: entry.priority,
                });
            }
            if follows.insert(text, entry).is_some() {
                return Err(DialectError::DuplicateBuilder(text.to_string()));
            }
        }

        trace!(
            dialect = %self.name,
            symbols = symbols.len(),
            starts = starts.len(),
            follows = follows.len(),
            "built builder registry"
        );
        Ok(Dialect {
            name: self.name,
            symbols,
            literal_readers: self.literal_readers,
            radix_prefixes: self.radix_prefixes,
            line_comment: self.line_comment,
            block_comment: self.block_comment,
            markers,
            closers: self.closers,
            arrow: self.arrow,
            unary_priority: self.unary_priority,
            starts,
            follows,
        })
    }
}

pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

pub(crate) fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_word(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::BinaryOp;

    fn minimal() -> DialectBuilder {
        Dialect::builder("mini").symbols(&["(", ")", "[", "]", "{", "}", ",", ";", "?", ":", "=>", "+", "++"])
    }

    #[test]
    fn symbols_match_longest_first() {
        let dialect = minimal().build().expect("dialect should build");
        assert_eq!(dialect.match_symbol("++x"), Some("++"));
        assert_eq!(dialect.match_symbol("+x"), Some("+"));
        assert_eq!(dialect.match_symbol("x"), None);
    }

    #[test]
    fn follow_for_unknown_symbol_is_rejected() {
        let err = minimal()
            .follow("*", 13, FollowBuilder::Binary(BinaryOp::Mul))
            .build()
            .expect_err("'*' is not a symbol");
        assert_eq!(err, DialectError::UnknownSymbol("*".to_string()));
    }

    #[test]
    fn keyword_builders_need_no_symbol_entry() {
        let dialect = minimal()
            .follow("is", 10, FollowBuilder::Is)
            .build()
            .expect("word operators are lexed as names");
        assert!(dialect.follow("is").is_some());
    }

    #[test]
    fn duplicate_and_out_of_range_entries_are_rejected() {
        let duplicate = minimal()
            .follow("+", 12, FollowBuilder::Binary(BinaryOp::Add))
            .follow("+", 12, FollowBuilder::Binary(BinaryOp::Add))
            .build()
            .expect_err("duplicate follow-up");
        assert_eq!(duplicate, DialectError::DuplicateBuilder("+".to_string()));

        let priority = minimal()
            .follow("+", 0, FollowBuilder::Binary(BinaryOp::Add))
            .build()
            .expect_err("priority 0 is reserved");
        assert!(matches!(priority, DialectError::InvalidPriority { .. }));
    }
}
