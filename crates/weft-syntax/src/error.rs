//! Error types for the highlighting engine.
//!
//! Errors surface only from construction-time operations (creating parsers,
//! compiling queries, registering grammars). The highlighting path itself
//! never fails: problems found there are logged and the offending capture or
//! injection is skipped.

use thiserror::Error;

use crate::grammar::QueryKind;
use crate::language::SupportedLanguage;

/// Errors from engine set-up and grammar loading.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SyntaxError {
    /// Failed to initialise the Tree-sitter parser for a language.
    #[error("failed to initialise parser for {language}: {message}")]
    ParserInitError {
        /// The language that failed to initialise.
        language: SupportedLanguage,
        /// Description of the failure.
        message: String,
    },

    /// Failed to parse source code.
    #[error("failed to parse {language}: {message}")]
    ParseError {
        /// The language that failed to parse.
        language: SupportedLanguage,
        /// Description of the failure.
        message: String,
    },

    /// A grammar query did not compile.
    #[error("invalid {kind} query for {language}: {message}")]
    QueryCompileError {
        /// The language the query was compiled for.
        language: SupportedLanguage,
        /// Which of the grammar's queries failed.
        kind: QueryKind,
        /// Description of the compilation failure.
        message: String,
    },

    /// A range adjustment moved a capture outside its node.
    #[error("adjustment on @{capture} escapes its node: {message}")]
    AdjustmentOutOfBounds {
        /// Name of the capture carrying the adjustment.
        capture: String,
        /// Description of the computed range.
        message: String,
    },

    /// A grammar's injection regex did not compile.
    #[error("invalid injection regex for {scope_name}: {message}")]
    InjectionRegexError {
        /// Scope name of the grammar declaring the regex.
        scope_name: String,
        /// Description of the compilation failure.
        message: String,
    },

    /// No grammar is registered under a scope name.
    #[error("no grammar registered for scope {scope_name}")]
    UnknownGrammar {
        /// The requested scope name.
        scope_name: String,
    },
}

impl SyntaxError {
    /// Creates a parser initialisation error.
    #[must_use]
    pub fn parser_init(language: SupportedLanguage, message: impl Into<String>) -> Self {
        Self::ParserInitError {
            language,
            message: message.into(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(language: SupportedLanguage, message: impl Into<String>) -> Self {
        Self::ParseError {
            language,
            message: message.into(),
        }
    }

    /// Creates a query compilation error.
    #[must_use]
    pub fn query_compile(
        language: SupportedLanguage,
        kind: QueryKind,
        message: impl Into<String>,
    ) -> Self {
        Self::QueryCompileError {
            language,
            kind,
            message: message.into(),
        }
    }

    /// Creates an adjustment bounds error.
    #[must_use]
    pub fn adjustment_out_of_bounds(
        capture: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AdjustmentOutOfBounds {
            capture: capture.into(),
            message: message.into(),
        }
    }

    /// Creates an injection regex error.
    #[must_use]
    pub fn injection_regex(scope_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InjectionRegexError {
            scope_name: scope_name.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown grammar error.
    #[must_use]
    pub fn unknown_grammar(scope_name: impl Into<String>) -> Self {
        Self::UnknownGrammar {
            scope_name: scope_name.into(),
        }
    }
}
