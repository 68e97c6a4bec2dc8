//! Webhook payload
//!
//! Meta's notification nests messages under `entry[].changes[].value`. Every
//! field is defaulted so a partial or unexpected payload parses to "nothing to
//! do" instead of an error.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
pub struct WebhookNotification {
    /// `"whatsapp_business_account"` for Cloud API callbacks.
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: Option<WebhookValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub audio: Option<MediaContent>,
    #[serde(default)]
    pub image: Option<MediaContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
    /// Quick-reply button tapped on a template.
    #[serde(default)]
    pub button: Option<ButtonContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MediaContent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractiveContent {
    #[serde(default)]
    pub button_reply: Option<ReplyContent>,
    #[serde(default)]
    pub list_reply: Option<ReplyContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplyContent {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ButtonContent {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<WebhookProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookProfile {
    #[serde(default)]
    pub name: String,
}

/// What the user sent, reduced to what the bot can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    Audio { media_id: String, mime_type: String },
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender id as sent by WhatsApp (not yet canonicalized).
    pub from: String,
    pub message_id: String,
    pub profile_name: Option<String>,
    pub content: InboundContent,
}

impl WebhookMessage {
    fn content(&self) -> InboundContent {
        let text = match self.msg_type.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.clone()),
            "interactive" => self.interactive.as_ref().and_then(|i| {
                i.button_reply
                    .as_ref()
                    .or(i.list_reply.as_ref())
                    .map(|r| r.title.clone())
            }),
            "button" => self.button.as_ref().map(|b| b.text.clone()),
            "image" => self.image.as_ref().and_then(|i| i.caption.clone()),
            "audio" => {
                return match &self.audio {
                    Some(audio) if !audio.id.is_empty() => InboundContent::Audio {
                        media_id: audio.id.clone(),
                        mime_type: audio.mime_type.clone(),
                    },
                    _ => InboundContent::Unsupported(self.msg_type.clone()),
                };
            }
            _ => None,
        };

        match text {
            Some(t) if !t.trim().is_empty() => InboundContent::Text(t.trim().to_string()),
            _ => InboundContent::Unsupported(self.msg_type.clone()),
        }
    }
}

/// Flatten a notification into the messages it carries. Status callbacks
/// and messages without a sender are skipped.
pub fn extract_messages(notification: &WebhookNotification) -> Vec<InboundMessage> {
    let mut messages = Vec::new();

    for entry in &notification.entry {
        for change in &entry.changes {
            let Some(value) = &change.value else {
                continue;
            };

            let names: HashMap<&str, &str> = value
                .contacts
                .iter()
                .filter_map(|c| {
                    c.profile
                        .as_ref()
                        .filter(|p| !p.name.trim().is_empty())
                        .map(|p| (c.wa_id.as_str(), p.name.as_str()))
                })
                .collect();

            for msg in &value.messages {
                let from = msg.from.trim();
                if from.is_empty() {
                    continue;
                }
                let profile_name = names
                    .get(from)
                    .or_else(|| (value.contacts.len() == 1).then(|| names.values().next()).flatten())
                    .map(|n| n.to_string());

                messages.push(InboundMessage {
                    from: from.to_string(),
                    message_id: msg.id.clone(),
                    profile_name,
                    content: msg.content(),
                });
            }
        }
    }

    messages
}
