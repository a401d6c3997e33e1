//! The closed table of capture settings.
//!
//! Query authors attach behaviour to captures with `#set!`, `#is?`, and
//! `#is-not?`. Keys are normalised here, once per pattern when the query is
//! compiled, into typed adjustments, tests, and capture flags. Legacy
//! spellings (`onlyIfFirst`, bare `startAt`, `test.final`) map onto the same
//! variants. Anything unrecognised is kept as a raw property so it can be
//! recorded as claim data and read by fold and indent resolution.

use tree_sitter::{Node, Query, QueryProperty};

/// A range adjustment named by a `#set!` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdjustmentKind {
    StartAt,
    EndAt,
    OffsetStart,
    OffsetEnd,
    StartAndEndAroundFirstMatchOf,
    StartBeforeFirstMatchOf,
    StartAfterFirstMatchOf,
    EndBeforeFirstMatchOf,
    EndAfterFirstMatchOf,
}

impl AdjustmentKind {
    fn from_key(key: &str) -> Option<Self> {
        let bare = key.strip_prefix("adjust.").unwrap_or(key);
        Some(match bare {
            "startAt" => Self::StartAt,
            "endAt" => Self::EndAt,
            "offsetStart" => Self::OffsetStart,
            "offsetEnd" => Self::OffsetEnd,
            "startAndEndAroundFirstMatchOf" => Self::StartAndEndAroundFirstMatchOf,
            "startBeforeFirstMatchOf" => Self::StartBeforeFirstMatchOf,
            "startAfterFirstMatchOf" => Self::StartAfterFirstMatchOf,
            "endBeforeFirstMatchOf" => Self::EndBeforeFirstMatchOf,
            "endAfterFirstMatchOf" => Self::EndAfterFirstMatchOf,
            _ => return None,
        })
    }
}

/// An adjustment together with its argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Adjustment {
    pub(crate) kind: AdjustmentKind,
    pub(crate) value: String,
}

/// A predicate named by an `#is?`/`#is-not?` key or a legacy `onlyIf*` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TestKind {
    Type,
    HasError,
    IsError,
    Root,
    First,
    Last,
    FirstOfType,
    LastOfType,
    FirstTextOnRow,
    LastTextOnRow,
    DescendantOfType,
    AncestorOfType,
    AncestorTypeNearerThan,
    DescendantTypeNearerThan,
    ChildOfType,
    DescendantOfNodeWithData,
    RangeWithData,
    StartsOnSameRowAs,
    EndsOnSameRowAs,
    TextStartsWith,
    TextEndsWith,
    Config,
    Injection,
}

impl TestKind {
    /// Maps a key onto a test, returning whether the legacy spelling negates
    /// it (`onlyIfNotFirst`).
    fn from_key(key: &str) -> Option<(Self, bool)> {
        let bare = key.strip_prefix("test.").unwrap_or(key);
        if let Some(legacy) = bare.strip_prefix("onlyIf") {
            return Self::from_legacy(legacy);
        }
        let kind = match bare {
            "type" => Self::Type,
            "hasError" => Self::HasError,
            "error" => Self::IsError,
            "root" => Self::Root,
            "first" => Self::First,
            "last" => Self::Last,
            "firstOfType" => Self::FirstOfType,
            "lastOfType" => Self::LastOfType,
            "firstTextOnRow" => Self::FirstTextOnRow,
            "lastTextOnRow" => Self::LastTextOnRow,
            "descendantOfType" => Self::DescendantOfType,
            "ancestorOfType" => Self::AncestorOfType,
            "ancestorTypeNearerThan" => Self::AncestorTypeNearerThan,
            "descendantTypeNearerThan" => Self::DescendantTypeNearerThan,
            "childOfType" => Self::ChildOfType,
            "descendantOfNodeWithData" => Self::DescendantOfNodeWithData,
            "rangeWithData" => Self::RangeWithData,
            "startsOnSameRowAs" => Self::StartsOnSameRowAs,
            "endsOnSameRowAs" => Self::EndsOnSameRowAs,
            "textStartsWith" => Self::TextStartsWith,
            "textEndsWith" => Self::TextEndsWith,
            "config" => Self::Config,
            "injection" => Self::Injection,
            _ => return None,
        };
        Some((kind, false))
    }

    fn from_legacy(name: &str) -> Option<(Self, bool)> {
        let (negated, rest) = match name.strip_prefix("Not") {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let kind = match rest {
            "First" => Self::First,
            "Last" => Self::Last,
            "FirstOfType" => Self::FirstOfType,
            "LastOfType" => Self::LastOfType,
            "Error" => Self::IsError,
            "HasError" => Self::HasError,
            "Root" => Self::Root,
            "Injection" => Self::Injection,
            "TextStartsWith" => Self::TextStartsWith,
            "TextEndsWith" => Self::TextEndsWith,
            "ChildOfType" => Self::ChildOfType,
            "DescendantOfType" => Self::DescendantOfType,
            "AncestorOfType" => Self::AncestorOfType,
            "Config" => Self::Config,
            _ => return None,
        };
        Some((kind, negated))
    }
}

/// A predicate with its argument and polarity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Test {
    pub(crate) kind: TestKind,
    pub(crate) value: Option<String>,
    pub(crate) negated: bool,
}

/// Everything a pattern declares about its captures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PatternSettings {
    pub(crate) adjustments: Vec<Adjustment>,
    pub(crate) tests: Vec<Test>,
    pub(crate) is_final: bool,
    pub(crate) is_shy: bool,
    /// Every `#set!` entry, verbatim, in declaration order.
    pub(crate) properties: Vec<(String, Option<String>)>,
}

pub(crate) static EMPTY_SETTINGS: PatternSettings = PatternSettings {
    adjustments: Vec::new(),
    tests: Vec::new(),
    is_final: false,
    is_shy: false,
    properties: Vec::new(),
};

impl PatternSettings {
    /// Whether a `#set!` entry with this exact key exists.
    pub(crate) fn has_property(&self, key: &str) -> bool {
        self.properties.iter().any(|(name, _)| name == key)
    }

    /// Value of the last `#set!` entry with this key.
    pub(crate) fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .and_then(|(_, value)| value.as_deref())
    }

    /// `#set!` entries whose key starts with `prefix`, prefix removed.
    pub(crate) fn properties_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
        self.properties.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .map(|rest| (rest, value.as_deref()))
        })
    }

    fn absorb_set(&mut self, key: &str, value: Option<&str>) {
        self.properties
            .push((key.to_owned(), value.map(str::to_owned)));
        match key {
            "capture.final" | "test.final" | "final" => self.is_final = true,
            "capture.shy" | "test.shy" | "shy" => self.is_shy = true,
            _ => {
                if let Some(kind) = AdjustmentKind::from_key(key) {
                    self.adjustments.push(Adjustment {
                        kind,
                        value: value.unwrap_or_default().to_owned(),
                    });
                } else if key.contains("onlyIf")
                    && let Some((kind, negated)) = TestKind::from_key(key)
                {
                    self.tests.push(Test {
                        kind,
                        value: legacy_test_value(value),
                        negated,
                    });
                }
            }
        }
    }

    fn absorb_predicate(&mut self, property: &QueryProperty, positive: bool) {
        let Some((kind, legacy_negated)) = TestKind::from_key(&property.key) else {
            tracing::debug!(
                target: "weft_syntax::scope",
                key = %property.key,
                "ignoring unknown predicate"
            );
            return;
        };
        self.tests.push(Test {
            kind,
            value: property.value.as_deref().map(str::to_owned),
            negated: legacy_negated == positive,
        });
    }
}

/// `#set! onlyIfFirst true` carries a placeholder value, not an argument.
fn legacy_test_value(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| *text != "true")
        .map(str::to_owned)
}

/// Normalises every setting declared by one pattern of `query`.
pub(crate) fn settings_for_pattern(query: &Query, pattern_index: usize) -> PatternSettings {
    let mut settings = PatternSettings::default();
    for property in query.property_settings(pattern_index) {
        settings.absorb_set(&property.key, property.value.as_deref());
    }
    for (property, positive) in query.property_predicates(pattern_index) {
        settings.absorb_predicate(property, *positive);
    }
    settings
}

/// One query capture, ready for resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Capture<'tree, 'q> {
    pub(crate) node: Node<'tree>,
    pub(crate) name: &'q str,
    pub(crate) settings: &'q PatternSettings,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn compile(source: &str) -> Query {
        Query::new(&tree_sitter_javascript::LANGUAGE.into(), source).expect("query")
    }

    #[test]
    fn set_entries_are_normalised() {
        let query = compile(
            r#"((identifier) @x
                (#set! capture.final)
                (#set! adjust.offsetStart "1")
                (#set! endAt "firstChild.endPosition")
                (#set! fold.endAt "lastChild.startPosition"))"#,
        );
        let settings = settings_for_pattern(&query, 0);
        assert!(settings.is_final);
        assert!(!settings.is_shy);
        let kinds: Vec<_> = settings.adjustments.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AdjustmentKind::OffsetStart, AdjustmentKind::EndAt]);
        assert_eq!(settings.property("fold.endAt"), Some("lastChild.startPosition"));
        assert_eq!(
            settings.properties_with_prefix("fold.").collect::<Vec<_>>(),
            vec![("endAt", Some("lastChild.startPosition"))]
        );
    }

    #[rstest]
    #[case("(#is? test.first)", TestKind::First, false)]
    #[case("(#is-not? test.first)", TestKind::First, true)]
    #[case("(#is? test.onlyIfNotLast)", TestKind::Last, true)]
    #[case("(#is-not? test.onlyIfNotLast)", TestKind::Last, false)]
    #[case("(#set! onlyIfNotFirst true)", TestKind::First, true)]
    #[case("(#set! test.onlyIfHasError true)", TestKind::HasError, false)]
    fn predicates_map_to_tests(
        #[case] predicate: &str,
        #[case] kind: TestKind,
        #[case] negated: bool,
    ) {
        let query = compile(&format!("((identifier) @x {predicate})"));
        let settings = settings_for_pattern(&query, 0);
        assert_eq!(
            settings.tests,
            vec![Test {
                kind,
                value: None,
                negated
            }]
        );
    }

    #[test]
    fn valued_predicates_keep_their_argument() {
        let query = compile(r#"((identifier) @x (#is? test.type "identifier property_identifier"))"#);
        let settings = settings_for_pattern(&query, 0);
        assert_eq!(
            settings.tests.first().and_then(|t| t.value.as_deref()),
            Some("identifier property_identifier")
        );
    }

    #[test]
    fn unknown_predicates_are_ignored() {
        let query = compile("((identifier) @x (#is? local))");
        assert!(settings_for_pattern(&query, 0).tests.is_empty());
    }
}
