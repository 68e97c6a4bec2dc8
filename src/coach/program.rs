//! Personalized program dispatch

use super::Coach;
use crate::brain::prompts::{PROGRAM_INSTRUCTIONS, program_input};
use crate::clock::Millis;
use crate::contacts::{Contact, DeliveryPath, DeliveryState, MessageClass, Role};
use crate::error::Result;
use crate::scheduler::JobKey;
use crate::whatsapp::TemplateMessage;
use rand::Rng;

impl Coach {
    /// Random delay within the configured program bounds.
    pub fn random_program_delay(&self) -> Millis {
        let (min, max) = self.config.program_delay_range_ms();
        rand::rng().random_range(min..=max)
    }

    /// Schedule the program for a contact that has none yet. Returns the due
    /// time when a job was queued.
    pub(crate) async fn ensure_program_scheduled(&self, id: &str) -> Option<Millis> {
        let due_at = self.clock.now_ms() + self.random_program_delay();
        let mut scheduled = false;
        self.store
            .update(
                id,
                Box::new(|c: &mut Contact| {
                    if c.program == DeliveryState::Pending {
                        scheduled = c.schedule(MessageClass::Program, due_at);
                    }
                }),
            )
            .await;

        if !scheduled {
            return None;
        }
        self.scheduler.schedule(JobKey::program(id), due_at).await;
        tracing::info!("Dispatcher: program for {} scheduled at {}", id, due_at);
        Some(due_at)
    }

    /// Send the program if it is due and nobody else has claimed it.
    pub(crate) async fn run_program(&self, id: &str) {
        let now = self.clock.now_ms();
        let mut claimed = false;
        let contact = self
            .store
            .update(
                id,
                Box::new(|c: &mut Contact| claimed = c.claim_due(MessageClass::Program, now)),
            )
            .await;
        let Some(contact) = contact.filter(|_| claimed) else {
            tracing::debug!("Dispatcher: program for {} not due or already handled", id);
            return;
        };

        let outcome = self.send_program(&contact).await;
        let finished_at = self.clock.now_ms();
        let result = match &outcome {
            Ok((path, _)) => {
                tracing::info!("Dispatcher: program delivered to {} via {:?}", id, path);
                Ok(*path)
            }
            Err(e) => {
                tracing::error!("Dispatcher: program for {} failed: {}", id, e);
                Err(e.to_string())
            }
        };
        let text = outcome
            .ok()
            .and_then(|(path, text)| (path == DeliveryPath::Text).then_some(text).flatten());

        self.store
            .update(
                id,
                Box::new(move |c: &mut Contact| {
                    c.finish(MessageClass::Program, finished_at, result);
                    if let Some(text) = text {
                        c.push_turn(Role::Assistant, text, finished_at);
                    }
                }),
            )
            .await;
    }

    /// Generate and deliver. Returns the path and, when text was sent, the text.
    async fn send_program(&self, contact: &Contact) -> Result<(DeliveryPath, Option<String>)> {
        let id = contact.id.as_str();
        let first_name = contact.first_name_or(&self.config.template_default_name);
        let template = TemplateMessage::new(&self.config.program_template, &self.config.template_language)
            .with_param(&first_name);

        let text = match self.llm.complete(PROGRAM_INSTRUCTIONS, &program_input(contact)).await {
            Ok(text) => text,
            Err(e) => {
                // Without content the template is all we can send.
                tracing::warn!("Dispatcher: program generation for {} failed: {}", id, e);
                self.api.send_template(id, &template).await?;
                return Ok((DeliveryPath::Template, None));
            }
        };

        if let Some(link) = self.config.program_image_url.as_deref() {
            match self.api.send_image(id, link, None).await {
                Ok(_) => {}
                Err(e) if e.is_window_closed() => {
                    tracing::info!("WhatsApp: window closed for {}, sending program template", id);
                    self.api.send_template(id, &template).await?;
                    return Ok((DeliveryPath::Template, None));
                }
                Err(e) => tracing::warn!("WhatsApp: program image for {} failed: {}", id, e),
            }
        }

        let delivery = self
            .deliver_text(id, &text, &self.config.program_template)
            .await?;
        let sent = (delivery.path == DeliveryPath::Text).then_some(text);
        Ok((delivery.path, sent))
    }
}
