//! Command handlers.

pub mod config;
pub mod evaluate;
pub mod prompts;
