//! Tests that drive the crate through [`crate::LanguageMode`].

mod behaviour;
mod fixtures;
