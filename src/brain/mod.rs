//! Brain
//!
//! Language model access and the prompts the coach uses.

pub mod prompts;
mod provider;

pub use provider::{LanguageModel, OpenAiProvider, Unconfigured};
