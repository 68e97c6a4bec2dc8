//! FitMouv
//!
//! WhatsApp coaching bot: receives WhatsApp Cloud API events and Systeme.io
//! leads, replies through an LLM, and sends the delayed program and the
//! re-engagement nudges.

pub mod brain;
pub mod cli;
pub mod clock;
pub mod coach;
pub mod config;
pub mod contacts;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod phone;
pub mod scheduler;
pub mod whatsapp;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
