//! CRM lead onboarding

use super::Coach;
use crate::brain::prompts::welcome_text;
use crate::contacts::{Contact, LeadSnapshot, MessageClass, Profile};
use crate::phone;
use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadOutcome {
    /// Profile stored under this canonical id.
    Accepted(String),
    /// No usable phone number in the submission.
    Ignored,
}

impl Coach {
    /// Store a CRM submission: merge the profile, mirror it into the lead
    /// file, queue the program and send the welcome message.
    pub async fn ingest_lead(&self, raw_phone: &str, profile: Profile) -> LeadOutcome {
        let Some(id) = phone::canonicalize(raw_phone, &self.config.default_country_code) else {
            tracing::warn!("CRM: lead without usable phone number ignored");
            return LeadOutcome::Ignored;
        };
        let now = self.clock.now_ms();

        let incoming = profile.clone();
        let contact = self
            .store
            .upsert(&id, now, Box::new(move |c: &mut Contact| c.profile.merge(incoming)))
            .await;
        tracing::info!(
            "CRM: lead {} stored (first name: {})",
            id,
            contact.profile.first_name.as_deref().unwrap_or("-")
        );

        if let Some(file) = &self.leads {
            let snapshot = LeadSnapshot {
                lead_id: Uuid::new_v4(),
                received_at: Utc::now(),
                raw_phone: raw_phone.to_string(),
                profile: contact.profile.clone(),
            };
            if let Err(e) = file.record(&id, snapshot).await {
                tracing::error!("CRM: could not write {}: {}", file.path().display(), e);
            }
        }

        self.ensure_program_scheduled(&id).await;

        if self.config.welcome_enabled {
            self.send_welcome(&id).await;
        }

        LeadOutcome::Accepted(id)
    }

    /// Welcome goes out at most once per contact.
    async fn send_welcome(&self, id: &str) {
        let now = self.clock.now_ms();
        let mut claimed = false;
        self.store
            .update(
                id,
                Box::new(|c: &mut Contact| claimed = c.claim(MessageClass::Welcome, now)),
            )
            .await;
        if !claimed {
            tracing::debug!("CRM: welcome already handled for {}", id);
            return;
        }

        let first_name = self.first_name(id).await;
        let result = match self
            .deliver_text(id, &welcome_text(&first_name), &self.config.welcome_template)
            .await
        {
            Ok(delivery) => {
                tracing::info!("CRM: welcome delivered to {} via {:?}", id, delivery.path);
                Ok(delivery.path)
            }
            Err(e) => {
                tracing::error!("CRM: welcome to {} failed: {}", id, e);
                Err(e.to_string())
            }
        };

        let at = self.clock.now_ms();
        self.store
            .update(
                id,
                Box::new(move |c: &mut Contact| c.finish(MessageClass::Welcome, at, result)),
            )
            .await;
    }

    /// Load profiles saved in the lead file. Conversation and delivery state
    /// are not persisted and start fresh. Returns how many were restored.
    pub async fn restore_leads(&self) -> crate::error::Result<usize> {
        let Some(file) = &self.leads else {
            return Ok(0);
        };
        let leads = file.load().await?;
        let now = self.clock.now_ms();
        for (id, snapshot) in &leads {
            let profile = snapshot.profile.clone();
            self.store
                .upsert(id, now, Box::new(move |c: &mut Contact| c.profile.merge(profile)))
                .await;
        }
        tracing::info!("CRM: restored {} lead(s) from {}", leads.len(), file.path().display());
        Ok(leads.len())
    }
}
