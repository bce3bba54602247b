//! Periodic scanners (components E, F, G): process, repo, and port.
//!
//! Each scanner runs on its own `tokio::time::interval` and calls
//! `LiveStore::replace_*` with a freshly computed snapshot — whole-table
//! replacement rather than incremental patching, so a scanner crash or
//! restart can never leave stale entries behind.

pub mod port;
pub mod process;
pub mod repo;
