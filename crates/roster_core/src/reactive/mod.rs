//! Push-based notification primitives shared by the store and the
//! projection core.

pub mod feed;

pub use feed::{Feed, Subscription};
