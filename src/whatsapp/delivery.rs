//! Delivery policy
//!
//! Every outbound message that may land outside the 24h customer-service
//! window goes through [`deliver`]: try free text first, and only if the
//! platform answers "window closed" send the approved template instead.
//! Any other failure is returned as is and never triggers the template.

use super::client::{MessagingApi, TemplateMessage};
use crate::contacts::DeliveryPath;
use crate::error::Result;
use serde_json::Value;

/// Template used when free text is refused.
#[derive(Debug, Clone)]
pub struct Fallback {
    pub template: String,
    pub language: String,
    pub params: Vec<String>,
}

impl Fallback {
    pub fn new(template: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            language: language.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }

    fn to_template(&self) -> TemplateMessage {
        TemplateMessage {
            name: self.template.clone(),
            language: self.language.clone(),
            body_params: self.params.clone(),
        }
    }
}

/// Successful delivery: which path was used and the platform's response.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub path: DeliveryPath,
    pub response: Value,
}

/// In-flight steps of a delivery. Delivered and failed are the `Ok`/`Err`
/// returned by [`deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    AttemptingText,
    FallbackTemplate,
}

/// Send `body` to `to`, falling back to `fallback` once if the window is closed.
pub async fn deliver(
    api: &dyn MessagingApi,
    to: &str,
    body: &str,
    fallback: &Fallback,
) -> Result<Delivery> {
    let mut state = AttemptState::AttemptingText;

    loop {
        match state {
            AttemptState::AttemptingText => match api.send_text(to, body).await {
                Ok(response) => {
                    tracing::debug!("WhatsApp: text delivered to {}", to);
                    return Ok(Delivery {
                        path: DeliveryPath::Text,
                        response,
                    });
                }
                Err(e) if e.is_window_closed() => {
                    tracing::info!(
                        "WhatsApp: window closed for {}, falling back to template '{}'",
                        to,
                        fallback.template
                    );
                    state = AttemptState::FallbackTemplate;
                }
                Err(e) => {
                    tracing::warn!("WhatsApp: text to {} failed: {}", to, e);
                    return Err(e);
                }
            },
            AttemptState::FallbackTemplate => {
                return match api.send_template(to, &fallback.to_template()).await {
                    Ok(response) => {
                        tracing::info!("WhatsApp: template '{}' delivered to {}", fallback.template, to);
                        Ok(Delivery {
                            path: DeliveryPath::Template,
                            response,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(
                            "WhatsApp: template '{}' to {} failed: {}",
                            fallback.template,
                            to,
                            e
                        );
                        Err(e)
                    }
                };
            }
        }
    }
}
