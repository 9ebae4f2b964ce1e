//! Integration test crate for the relay.
//!
//! This crate has no library code — it only contains integration tests
//! under `tests/` that exercise end-to-end flows across multiple workspace
//! crates (classification through routing through outbound delivery,
//! config reload, and supervisor crash detection).
