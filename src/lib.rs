//! Dictionary-based password recovery for encrypted Office documents.
//!
//! The [`pipeline`] module drives the search; [`probe`] holds the
//! decryption probes it calls for each candidate.

pub mod candidates;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod constants;
pub mod document;
pub mod logging;
pub mod pipeline;
pub mod probe;
pub mod report;
