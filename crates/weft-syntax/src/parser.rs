//! Incremental Tree-sitter parsing for one language layer.
//!
//! Every layer owns exactly one [`LayerParser`]. Injection layers restrict
//! parsing to their included ranges; the root layer parses the whole buffer.
//! Parsing is incremental whenever the caller supplies the previous tree,
//! which must already have been patched with every edit since it was made.

use tree_sitter::{Range, Tree};

use crate::error::SyntaxError;
use crate::language::SupportedLanguage;

/// Tree-sitter parser bound to a single language.
pub(crate) struct LayerParser {
    inner: tree_sitter::Parser,
    language: SupportedLanguage,
}

impl std::fmt::Debug for LayerParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerParser")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl LayerParser {
    /// Creates a parser for `language`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Tree-sitter parser cannot be initialised
    /// with the language grammar.
    pub(crate) fn new(language: SupportedLanguage) -> Result<Self, SyntaxError> {
        let mut inner = tree_sitter::Parser::new();
        inner
            .set_language(&language.tree_sitter_language())
            .map_err(|e| SyntaxError::parser_init(language, e.to_string()))?;

        Ok(Self { inner, language })
    }

    pub(crate) const fn language(&self) -> SupportedLanguage {
        self.language
    }

    /// Parses `text`, reusing `old_tree` when given.
    ///
    /// `ranges` of `None` parses the whole text. Tree-sitter is
    /// error-tolerant, so a failure here means the parser could not run at
    /// all (for instance because the ranges overlap), not that the text is
    /// malformed.
    ///
    /// # Errors
    ///
    /// Returns an error if the included ranges are rejected or no tree is
    /// produced.
    pub(crate) fn parse(
        &mut self,
        text: &str,
        old_tree: Option<&Tree>,
        ranges: Option<&[Range]>,
    ) -> Result<Tree, SyntaxError> {
        self.inner
            .set_included_ranges(ranges.unwrap_or_default())
            .map_err(|e| {
                SyntaxError::parse(
                    self.language,
                    format!("included range {} is out of order", e.0),
                )
            })?;
        self.inner
            .parse(text, old_tree)
            .ok_or_else(|| SyntaxError::parse(self.language, "parsing failed"))
    }
}

/// Whether `node` or any of its descendants is an ERROR or MISSING node.
pub(crate) fn has_error_nodes(node: tree_sitter::Node<'_>) -> bool {
    if node.is_error() || node.is_missing() {
        return true;
    }
    if !node.has_error() {
        return false;
    }

    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(has_error_nodes);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ts_range;
    use rstest::rstest;
    use tree_sitter::Point;

    #[rstest]
    #[case(SupportedLanguage::Rust, "fn main() {}")]
    #[case(SupportedLanguage::Python, "def hello():\n    pass")]
    #[case(SupportedLanguage::JavaScript, "function hello() { return 'hi'; }")]
    #[case(SupportedLanguage::Html, "<p>hi</p>")]
    fn parser_parses_valid_source(#[case] language: SupportedLanguage, #[case] source: &str) {
        let mut parser = LayerParser::new(language).expect("parser init");
        let tree = parser.parse(source, None, None).expect("parse");

        assert!(!has_error_nodes(tree.root_node()));
        assert_eq!(parser.language(), language);
    }

    #[rstest]
    #[case(SupportedLanguage::Rust, "fn broken() {")]
    #[case(SupportedLanguage::Python, "def broken(")]
    #[case(SupportedLanguage::JavaScript, "function broken( {")]
    fn parser_detects_syntax_errors(#[case] language: SupportedLanguage, #[case] source: &str) {
        let mut parser = LayerParser::new(language).expect("parser init");
        let tree = parser.parse(source, None, None).expect("parse");

        assert!(has_error_nodes(tree.root_node()));
    }

    #[test]
    fn included_ranges_limit_the_tree() {
        let source = "<b>let x = 1;</b>";
        let mut parser = LayerParser::new(SupportedLanguage::JavaScript).expect("parser init");
        let range = ts_range(3, 13, Point::new(0, 3), Point::new(0, 13));
        let tree = parser
            .parse(source, None, Some(&[range]))
            .expect("parse");

        let root = tree.root_node();
        assert_eq!(root.start_byte(), 3);
        assert_eq!(root.end_byte(), 13);
        assert!(!has_error_nodes(root));
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let mut parser = LayerParser::new(SupportedLanguage::JavaScript).expect("parser init");
        let first = ts_range(0, 5, Point::new(0, 0), Point::new(0, 5));
        let second = ts_range(2, 4, Point::new(0, 2), Point::new(0, 4));

        let result = parser.parse("let x = 1;", None, Some(&[first, second]));
        assert!(matches!(result, Err(SyntaxError::ParseError { .. })));
    }
}
