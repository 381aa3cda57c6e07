//! JSON flattening - turn nested documents into flat rows
//!
//! Nested objects become dot-delimited field paths (`contact.email`).
//! Lists are never flattened implicitly: the caller names the list to
//! explode with an [`ExplosionSpec`], and each element of that list becomes
//! its own row carrying a copy of its parent's fields.

pub mod extractor;
pub mod path;

pub use extractor::Flattener;
pub use path::{EmptyListPolicy, ExplosionSpec, PathSegment};
