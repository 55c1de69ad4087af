//! Reactive projection core: a search-filtered, live view of the roster.
//!
//! # Responsibility
//! - Combine the repository's collection stream with the user's search term.
//! - Expose add/update/delete entry points that delegate to the repository.

pub mod filter;
pub mod mutation;
pub mod roster;
