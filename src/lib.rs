//! ODDSDESK: sports odds board and play-money betting desk.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod engine;
pub mod storage;
pub mod dashboard;
