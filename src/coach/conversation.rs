//! Inbound conversation handling

use super::Coach;
use crate::brain::prompts::{
    COACH_INSTRUCTIONS, FALLBACK_REPLY, SUMMARY_INSTRUCTIONS, TRANSCRIPTION_APOLOGY,
    UNSUPPORTED_NOTICE, coach_input, summary_input,
};
use crate::contacts::{Contact, DeliveryPath, Role};
use crate::error::Result;
use crate::phone;
use crate::whatsapp::{InboundContent, InboundMessage};

impl Coach {
    /// Handle one inbound WhatsApp message end to end. Failures are logged,
    /// never returned: the webhook has already been acknowledged.
    pub async fn handle_inbound(&self, message: InboundMessage) {
        let Some(id) = phone::canonicalize(&message.from, &self.config.default_country_code) else {
            tracing::warn!("WhatsApp: ignoring message with unusable sender '{}'", message.from);
            return;
        };
        let now = self.clock.now_ms();

        let profile_name = message.profile_name.clone();
        self.store
            .upsert(
                &id,
                now,
                Box::new(move |c: &mut Contact| {
                    c.last_inbound_at = Some(now);
                    if let Some(name) = profile_name.filter(|n| !n.trim().is_empty()) {
                        c.whatsapp_name = Some(name.trim().to_string());
                    }
                }),
            )
            .await;

        // The window is open again: restart the ladder from this message.
        self.restart_nudges(&id, now).await;
        self.ensure_program_scheduled(&id).await;

        let text = match message.content {
            InboundContent::Text(text) => text,
            InboundContent::Audio { media_id, mime_type } => {
                match self.transcribe(&media_id, &mime_type).await {
                    Ok(text) => {
                        tracing::info!("WhatsApp: transcribed voice note from {}", id);
                        text
                    }
                    Err(e) => {
                        tracing::warn!("WhatsApp: voice note from {} not transcribed: {}", id, e);
                        self.reply(&id, TRANSCRIPTION_APOLOGY).await;
                        return;
                    }
                }
            }
            InboundContent::Unsupported(kind) => {
                tracing::info!("WhatsApp: unsupported '{}' message from {}", kind, id);
                self.reply(&id, UNSUPPORTED_NOTICE).await;
                return;
            }
        };

        tracing::info!("WhatsApp: message from {} ({} chars)", id, text.chars().count());

        let contact = self
            .store
            .upsert(
                &id,
                now,
                Box::new(move |c: &mut Contact| c.push_turn(Role::User, text, now)),
            )
            .await;

        let input = coach_input(&contact, self.config.history_keep_turns);
        let answer = match self.llm.complete(COACH_INSTRUCTIONS, &input).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("WhatsApp: generation failed for {}: {}", id, e);
                FALLBACK_REPLY.to_string()
            }
        };

        if self.reply(&id, &answer).await == Some(DeliveryPath::Text) {
            let at = self.clock.now_ms();
            self.store
                .update(
                    &id,
                    Box::new(move |c: &mut Contact| c.push_turn(Role::Assistant, answer, at)),
                )
                .await;
        }

        self.compact_history(&id).await;
    }

    async fn transcribe(&self, media_id: &str, mime_type: &str) -> Result<String> {
        let media = self.api.download_media(media_id).await?;
        let mime = if media.mime_type.is_empty() {
            mime_type.to_string()
        } else {
            media.mime_type
        };
        self.llm.transcribe(media.bytes, &mime).await
    }

    /// Conversational reply through the delivery policy. Returns the path used.
    async fn reply(&self, id: &str, body: &str) -> Option<DeliveryPath> {
        match self
            .deliver_text(id, body, &self.config.reply_fallback_template)
            .await
        {
            Ok(delivery) => Some(delivery.path),
            Err(e) => {
                tracing::error!("WhatsApp: reply to {} failed: {}", id, e);
                None
            }
        }
    }

    /// Fold the oldest turns into the rolling summary once the history is
    /// longer than `history_max_turns`, keeping the last `history_keep_turns`.
    pub(crate) async fn compact_history(&self, id: &str) {
        let Some(contact) = self.store.get(id).await else {
            return;
        };
        if contact.history.len() <= self.config.history_max_turns {
            return;
        }

        let fold = contact.history.len() - self.config.history_keep_turns;
        let folded = &contact.history[..fold];
        let input = summary_input(contact.summary.as_deref(), folded);

        let summary = match self.llm.complete(SUMMARY_INSTRUCTIONS, &input).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("WhatsApp: summary for {} failed, dropping {} turns: {}", id, fold, e);
                None
            }
        };

        let first = folded.first().cloned();
        self.store
            .update(
                id,
                Box::new(move |c: &mut Contact| {
                    // Another compaction got here first.
                    if c.history.first() != first.as_ref() {
                        return;
                    }
                    c.history.drain(..fold.min(c.history.len()));
                    if let Some(summary) = summary {
                        c.summary = Some(summary);
                    }
                }),
            )
            .await;
        tracing::debug!("WhatsApp: folded {} turns for {}", fold, id);
    }
}
