//! Integration test crate for the Reclaim settlement engine.
//!
//! This crate has no library code. It only contains integration tests
//! that drive purchases, webhooks and wallet operations end to end across
//! the workspace crates, with webhooks signed the way the gateway signs
//! them.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p reclaim-integration-tests
//! ```
