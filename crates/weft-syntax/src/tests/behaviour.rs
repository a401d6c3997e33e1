//! Behaviour-driven development (BDD) step definitions for weft-syntax scenarios.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::fixtures::{mode, point};
use crate::{BufferRange, LanguageMode};

// =============================================================================
// Test World
// =============================================================================

/// State shared across BDD steps.
#[derive(Default)]
struct TestWorld {
    /// The language mode under test.
    mode: Option<LanguageMode>,
    /// Scope names from the last descriptor request.
    scopes: Vec<String>,
}

impl TestWorld {
    fn mode(&mut self) -> &mut LanguageMode {
        self.mode
            .as_mut()
            .expect("a buffer should be set up before this step")
    }
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

/// Strips surrounding double quotes and expands `\n` escapes.
fn unquote(s: &str) -> String {
    s.trim_matches('"').replace("\\n", "\n")
}

fn words(s: &str) -> Vec<String> {
    unquote(s).split_whitespace().map(str::to_owned).collect()
}

// =============================================================================
// Given Steps
// =============================================================================

#[given("a {scope} buffer containing {text}")]
fn given_buffer(world: &RefCell<TestWorld>, scope: String, text: String) {
    let mut w = world.borrow_mut();
    w.mode = Some(mode(&unquote(&scope), &unquote(&text)));
}

// =============================================================================
// When Steps
// =============================================================================

#[when("the scopes at {at} are described")]
fn when_scopes_described(world: &RefCell<TestWorld>, at: String) {
    let mut w = world.borrow_mut();
    let scopes = w.mode().scope_descriptor_for_position(point(&unquote(&at)));
    w.scopes = scopes;
}

#[when("the text from {start} to {end} is replaced with {text}")]
fn when_text_replaced(world: &RefCell<TestWorld>, start: String, end: String, text: String) {
    let mut w = world.borrow_mut();
    let range = BufferRange::new(point(&unquote(&start)), point(&unquote(&end)));
    let language_mode = w.mode();
    language_mode.edit(range, &unquote(&text));
    language_mode.finish_transaction();
}

// =============================================================================
// Then Steps
// =============================================================================

#[then("the scopes are {expected}")]
fn then_scopes_are(world: &RefCell<TestWorld>, expected: String) {
    let w = world.borrow();
    assert_eq!(w.scopes, words(&expected));
}

#[then("the layers at {at} are {expected}")]
fn then_layers_are(world: &RefCell<TestWorld>, at: String, expected: String) {
    let mut w = world.borrow_mut();
    let names: Vec<String> = w
        .mode()
        .language_layers_at_point(point(&unquote(&at)), false)
        .into_iter()
        .map(|layer| layer.scope_name)
        .collect();
    assert_eq!(names, words(&expected));
}

#[then("row {row} folds to {start} through {end}")]
fn then_row_folds(world: &RefCell<TestWorld>, row: usize, start: String, end: String) {
    let mut w = world.borrow_mut();
    let expected = BufferRange::new(point(&unquote(&start)), point(&unquote(&end)));
    assert_eq!(w.mode().fold_range_for_row(row), Some(expected));
}

#[then("row {row} does not fold")]
fn then_row_does_not_fold(world: &RefCell<TestWorld>, row: usize) {
    let mut w = world.borrow_mut();
    assert_eq!(w.mode().fold_range_for_row(row), None);
    assert!(!w.mode().is_foldable_at_row(row));
}

#[then("row {row} has indent level {level} with tab length {tab}")]
fn then_row_indented(world: &RefCell<TestWorld>, row: usize, level: usize, tab: usize) {
    let mut w = world.borrow_mut();
    assert_eq!(w.mode().suggested_indent_for_row(row, tab), level);
}

// =============================================================================
// Scenario Bindings
// =============================================================================

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Comments are scoped in a JavaScript buffer"
)]
fn comment_scopes(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Script elements are highlighted as JavaScript"
)]
fn script_scopes(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Tagged templates nest HTML inside JavaScript inside HTML"
)]
fn triple_nesting(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Deleting a script element removes its layer"
)]
fn deleting_script(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Typing a script element adds a layer"
)]
fn typing_script(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Blocks fold from the end of their first row"
)]
fn block_folds(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Deleting a closing brace removes its fold"
)]
fn deleted_fold_delimiter(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/highlighting.feature",
    name = "Rows inside a block are indented"
)]
fn block_indents(world: RefCell<TestWorld>) {
    let _ = world;
}
