//! The front-end server (spec §4): everything downstream of statement
//! parsing — connection lifecycle, the transaction/write-lock coordinator,
//! and the worker/listener that drives it all over the wire.

pub mod allow_list;
pub mod busy;
pub mod function_registry;
pub mod meta_db;
pub mod processor;
pub mod registry;
pub mod server;
pub mod txn;
pub mod worker;

pub use server::SqliteServer;
