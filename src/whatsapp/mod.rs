//! WhatsApp Integration
//!
//! Cloud API client, webhook payload parsing and the text-or-template
//! delivery policy used for every outbound message.

mod client;
mod delivery;
mod payload;

pub use client::{CloudApiClient, MAX_TEXT_LENGTH, Media, MessagingApi, TemplateMessage, truncate_text};
pub use delivery::{AttemptState, Delivery, Fallback, deliver};
pub use payload::{InboundContent, InboundMessage, WebhookNotification, extract_messages};
