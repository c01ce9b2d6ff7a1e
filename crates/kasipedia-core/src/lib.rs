//! Core types, config, and errors for Kasipedia.

pub mod config;
pub mod error;
pub mod types;
