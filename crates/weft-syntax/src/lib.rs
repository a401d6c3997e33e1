//! Incremental, multi-language syntax highlighting over Tree-sitter.
//!
//! A [`LanguageMode`] parses a [`TextBuffer`] with a root [`Grammar`] and
//! keeps a tree of language layers: each injection point in a grammar (a
//! `<script>` element in HTML, a template literal tagged `html` in
//! JavaScript) spawns a child layer parsed by another grammar over just the
//! embedded ranges. Edits re-parse only the layers they touch.
//!
//! Grammars carry Tree-sitter queries for highlights, folds, indents and
//! locals. Captures may carry `#set!` adjustments, `#is?` tests and
//! properties that refine which range a scope covers, whether it applies at
//! all, and how folds and indentation are computed.
//!
//! # Supported Languages
//!
//! Grammars can be built for Rust, Python, TypeScript, JavaScript and HTML.
//! Queries are supplied by the caller through [`GrammarBuilder`].
//!
//! # Example
//!
//! ```
//! use weft_config::Config;
//! use weft_syntax::{Grammar, GrammarRegistry, LanguageMode, Point, SupportedLanguage, TextBuffer};
//!
//! let mut grammars = GrammarRegistry::new();
//! grammars.add_grammar(
//!     Grammar::builder(SupportedLanguage::JavaScript)
//!         .highlights_query("(comment) @comment")
//!         .build(),
//! );
//! let buffer = TextBuffer::new("// hello\nlet x = 1;\n");
//! let mut mode = LanguageMode::new(buffer, grammars, "source.js", Config::default())?;
//!
//! let scopes = mode.scope_descriptor_for_position(Point::new(0, 3));
//! assert_eq!(scopes, ["source.js", "comment"]);
//! # Ok::<(), weft_syntax::SyntaxError>(())
//! ```

mod buffer;
mod error;
mod fold;
mod grammar;
mod indent;
mod injection;
mod iterator;
mod language;
mod layer;
mod locals;
mod mode;
mod parser;
mod position;
mod range;
mod scope;

pub use buffer::{EditDescriptor, TextBuffer};
pub use error::SyntaxError;
pub use grammar::{CompiledQuery, Grammar, GrammarBuilder, GrammarRegistry, QueryKind};
pub use indent::indent_level_for_line;
pub use injection::{ContentSelector, InjectionPoint, LanguageScope, LanguageSelector, ScopeSelector};
pub use iterator::HighlightIterator;
pub use language::{LanguageParseError, SupportedLanguage};
pub use mode::{ChangeNotice, LanguageMode, LayerSummary, TransactionSummary};
pub use range::BufferRange;
pub use scope::{ScopeId, ScopeRegistry};
pub use tree_sitter::Point;

#[cfg(test)]
mod tests;
