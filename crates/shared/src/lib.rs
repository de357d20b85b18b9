// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ghost Rider: Apex Operations — shared types
//!
//! Types and database plumbing shared between the API server and the
//! billing crate: the service tier table, client billing status, the
//! client record row type, and pool construction.

pub mod db;
pub mod types;

pub use db::create_pool;
pub use types::{ClientRecord, ClientStatus, ServiceTier};
