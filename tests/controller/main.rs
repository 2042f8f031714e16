//! Controller integration tests
//!
//! Drive the public controller API against an in-memory forwarding plane.
//! Time is simulated with explicit `Instant` offsets.
//!
//! Run with: cargo test --test controller

mod expiration;
mod harness;
mod lifecycle;
mod scenarios;
