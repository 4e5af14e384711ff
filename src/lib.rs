//! release-confidence library crate
//!
//! Risk-aware diff truncation and the retry loop that drives an LLM
//! release-confidence analysis through context-window overflows. The binary
//! is a thin front-end; benchmarks and integration tests use these modules
//! directly.

pub mod analysis;
pub mod config;
pub mod diff;
pub mod keyring;
pub mod llm;
pub mod prompt;
pub mod truncation;
