//! Core data model for buildboard.
//!
//! A board is one GitHub issue comment. Its managed section holds the
//! reported builds as embedded JSON; everything around it is free text.

mod document;
mod state;

pub use document::Document;
pub use state::{State, Symbol};
