//! Domain layer types and invariants.

pub mod content;
pub mod error;
pub mod media;
pub mod site;
pub mod slug;
pub mod templates;
