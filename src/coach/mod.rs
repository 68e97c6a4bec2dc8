//! Coach
//!
//! Everything the bot does on its own behalf: answering inbound messages,
//! onboarding CRM leads, and the delayed program and nudge jobs. `Coach`
//! bundles the injected services; the behaviour is split across the
//! submodules as `impl Coach` blocks.

mod conversation;
mod dispatcher;
mod leads;
mod nudges;
mod program;

use crate::brain::LanguageModel;
use crate::clock::Clock;
use crate::config::{Config, NudgeStage};
use crate::contacts::{ContactStore, LeadFile};
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::whatsapp::{Delivery, Fallback, MessagingApi, deliver};
use std::sync::Arc;

pub use leads::LeadOutcome;

pub struct Coach {
    config: Arc<Config>,
    store: Arc<dyn ContactStore>,
    api: Arc<dyn MessagingApi>,
    llm: Arc<dyn LanguageModel>,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    leads: Option<LeadFile>,
    ladder: Vec<NudgeStage>,
}

impl Coach {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ContactStore>,
        api: Arc<dyn MessagingApi>,
        llm: Arc<dyn LanguageModel>,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let leads = config.leads_file.as_ref().map(LeadFile::new);
        let ladder = config.nudge_ladder();
        Self {
            config,
            store,
            api,
            llm,
            scheduler,
            clock,
            leads,
            ladder,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// First name for template parameters, falling back to the configured default.
    async fn first_name(&self, id: &str) -> String {
        match self.store.get(id).await {
            Some(contact) => contact.first_name_or(&self.config.template_default_name),
            None => self.config.template_default_name.clone(),
        }
    }

    /// Deliver free text to `id`, falling back to `template` with the
    /// contact's first name as its only parameter.
    async fn deliver_text(&self, id: &str, body: &str, template: &str) -> Result<Delivery> {
        let fallback = Fallback::new(template, &self.config.template_language)
            .with_param(self.first_name(id).await);
        deliver(self.api.as_ref(), id, body, &fallback).await
    }
}
