//! # emberdb Configuration Module
//!
//! This module centralizes all configuration constants for emberdb. Constants
//! are grouped by their functional area and interdependencies are documented
//! and enforced through compile-time assertions.
//!
//! Runtime settings (block size, compaction threshold) are chosen through
//! [`crate::engine::EngineBuilder`] and validated against these bounds.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency documentation

pub mod constants;
pub use constants::*;
