//! Coach wired to mocks and a manual clock.

use super::mocks::{MockMessaging, MockModel};
use crate::clock::{ManualClock, Millis};
use crate::coach::Coach;
use crate::config::Config;
use crate::contacts::{Contact, ContactStore, InMemoryStore, MessageClass};
use crate::scheduler::{JobKey, Scheduler};
use std::sync::Arc;

/// 2026-01-05 09:00:00 UTC
pub const START_MS: Millis = 1_767_603_600_000;

pub struct Harness {
    pub config: Arc<Config>,
    pub coach: Arc<Coach>,
    pub api: Arc<MockMessaging>,
    pub model: Arc<MockModel>,
    pub store: Arc<InMemoryStore>,
    pub scheduler: Arc<Scheduler>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn config() -> Config {
        Config {
            access_token: "test-token".to_string(),
            phone_number_id: "1234567890".to_string(),
            verify_token: "fitmouv_verify_123".to_string(),
            systeme_secret: Some("crm-secret".to_string()),
            ..Default::default()
        }
    }

    pub fn new(model: MockModel) -> Self {
        Self::with_config(Self::config(), model)
    }

    pub fn with_config(config: Config, model: MockModel) -> Self {
        let config = Arc::new(config);
        let api = Arc::new(MockMessaging::new());
        let model = Arc::new(model);
        let store = Arc::new(InMemoryStore::new());
        let scheduler = Arc::new(Scheduler::new());
        let clock = ManualClock::new(START_MS);

        let coach = Arc::new(Coach::new(
            config.clone(),
            store.clone(),
            api.clone(),
            model.clone(),
            scheduler.clone(),
            Arc::new(clock.clone()),
        ));

        Self {
            config,
            coach,
            api,
            model,
            store,
            scheduler,
            clock,
        }
    }

    pub fn now(&self) -> Millis {
        use crate::clock::Clock;
        self.clock.now_ms()
    }

    /// Create an empty contact.
    pub async fn contact(&self, id: &str) -> Contact {
        self.store
            .upsert(id, self.now(), Box::new(|_: &mut Contact| {}))
            .await
    }

    pub async fn store_get(&self, id: &str) -> Contact {
        self.store.get(id).await.expect("contact exists")
    }

    /// Force the program due time, bypassing the random delay.
    pub async fn schedule_program(&self, id: &str, due_at: Millis) {
        self.store
            .update(
                id,
                Box::new(move |c: &mut Contact| {
                    c.schedule(MessageClass::Program, due_at);
                }),
            )
            .await;
        self.scheduler.schedule(JobKey::program(id), due_at).await;
    }
}
