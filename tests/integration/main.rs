//! Integration Tests
//!
//! Cross-crate scenarios through the public `termstore` API:
//! - Versioning: status, module and time views of one terminology
//! - Branching: edits on a child path over an inherited parent
//! - Persistence: close/reopen across many spines
//! - Exchange: change sets between independent stores

#[path = "../common/mod.rs"]
mod common;

mod branching;
mod exchange;
mod persistence;
mod versioning;
