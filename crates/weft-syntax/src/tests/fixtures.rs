//! Grammars and buffers shared by the crate-level tests.

use tree_sitter::Node;
use weft_config::Config;

use crate::{
    Grammar, GrammarRegistry, InjectionPoint, LanguageMode, Point, SupportedLanguage, TextBuffer,
};

pub(super) const JS_HIGHLIGHTS: &str = r#"
    (comment) @comment
    (template_string) @string
    (string) @string.quoted
    (number) @constant.numeric
    (identifier) @variable
    ["let" "const" "function" "return" "if"] @keyword
"#;

pub(super) const JS_FOLDS: &str = "(statement_block) @fold";

pub(super) const JS_INDENTS: &str = r#"
    ["{" "(" "["] @indent
    ["}" ")" "]"] @dedent
"#;

pub(super) const JS_LOCALS: &str = r#"
    [(statement_block) (function_declaration)] @local.scope
    (variable_declarator name: (identifier) @local.definition)
    (formal_parameters (identifier) @local.definition)
    (identifier) @local.reference
"#;

pub(super) const PAGE: &str = "<p>hi</p>\n<script>let a = 1;</script>\n";

/// Direct children of `node` with the given kind.
fn children_of_kind<'tree>(node: Node<'tree>, kind: &str) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    let found: Vec<Node<'tree>> = node
        .children(&mut cursor)
        .filter(|child| child.kind() == kind)
        .collect();
    found
}

/// JavaScript with `html` tagged templates injecting HTML.
pub(super) fn javascript() -> Grammar {
    Grammar::builder(SupportedLanguage::JavaScript)
        .highlights_query(JS_HIGHLIGHTS)
        .folds_query(JS_FOLDS)
        .indents_query(JS_INDENTS)
        .locals_query(JS_LOCALS)
        .injection_point(
            InjectionPoint::new(
                "call_expression",
                |node, text| {
                    let function = node.child_by_field_name("function")?;
                    let name = text.get(function.start_byte()..function.end_byte())?;
                    (name == "html").then(|| "html".to_owned())
                },
                |node, _| {
                    node.child_by_field_name("arguments")
                        .filter(|arguments| arguments.kind() == "template_string")
                        .into_iter()
                        .collect()
                },
            )
            .include_children(true),
        )
        .build()
}

/// HTML with `<script>` bodies injecting JavaScript.
pub(super) fn html(raw_text_scope: Option<&str>, covering: bool) -> Grammar {
    let mut highlights = String::from("(tag_name) @tag\n");
    if let Some(scope) = raw_text_scope {
        highlights.push_str(&format!("(raw_text) @{scope}\n"));
    }
    Grammar::builder(SupportedLanguage::Html)
        .highlights_query(highlights)
        .injection_point(
            InjectionPoint::new(
                "script_element",
                |_, _| Some("javascript".to_owned()),
                |node, _| children_of_kind(node, "raw_text"),
            )
            .cover_shallower_scopes(covering),
        )
        .build()
}

pub(super) fn registry() -> GrammarRegistry {
    let mut grammars = GrammarRegistry::new();
    grammars.add_grammar(javascript());
    grammars.add_grammar(html(None, false));
    grammars
}

pub(super) fn mode_with(grammars: GrammarRegistry, scope: &str, text: &str) -> LanguageMode {
    LanguageMode::new(TextBuffer::new(text), grammars, scope, Config::default())
        .unwrap_or_else(|err| panic!("language mode for {scope}: {err}"))
}

pub(super) fn mode(scope: &str, text: &str) -> LanguageMode {
    mode_with(registry(), scope, text)
}

/// Parses `row:column`.
pub(super) fn point(text: &str) -> Point {
    let (row, column) = text
        .split_once(':')
        .unwrap_or_else(|| panic!("point should be row:column, got {text}"));
    Point::new(
        row.trim().parse().expect("row"),
        column.trim().parse().expect("column"),
    )
}
