//! Flutter-facing bindings for the student roster core.

pub mod api;
