//! End-to-end lab scenarios
//!
//! Exercises the public `Lab` API across components:
//! - `scenarios`: schema-gated writes, tenant isolation, graph and events together
//! - `durability`: WAL replay after reopen, including pruned events
//! - `concurrency`: parallel appends, optimistic conflicts, racing registrations
//! - `access`: read-only databases and the operator scope
//! - `retention`: scheduled pruning through the `Lab` entry point
//! - `properties`: proptest checks of validation, patching and event order
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test lab_scenarios
//! ```

mod common;

mod access;
mod concurrency;
mod durability;
mod properties;
mod retention;
mod scenarios;
