//! The in-memory stand-in for the meta database (spec §4.2): the registry
//! types (`model`) a server holds in place of a real attached catalog, and
//! the deterministic SQL renderer (`render`) that turns a meta-affecting
//! statement into the exact text that would be replayed against it.

pub mod model;
pub mod render;
