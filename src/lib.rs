//! tool-accuracy: mech tool accuracy analytics for prediction-market agents.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod cli;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod storage;
pub mod types;
