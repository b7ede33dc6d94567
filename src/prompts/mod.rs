//! Prompt module for LLM-based operations.

pub mod affiliations;

pub use affiliations::*;
