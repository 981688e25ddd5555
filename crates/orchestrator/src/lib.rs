//! Load orchestrator daemon internals
//!
//! Configuration loading and the status API, shared by the binary and its
//! integration tests.

pub mod api;
pub mod config;
