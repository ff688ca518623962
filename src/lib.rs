//! MAFS: fight-card betting recommendation pipeline.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod stream;
pub mod strategy;
pub mod storage;
pub mod api;
