//! Hook store: the authoritative record of session lifecycle and tool
//! invocations, plus rollups.

pub mod commit;
pub mod persistence;
pub mod store;

pub use store::{HookChange, HookStore};
