//! Re-engagement nudges
//!
//! Stage `i` fires once `nudge_thresholds_hours[i]` have passed since the last
//! inbound message, at least `nudge_min_spacing_hours` after the previous
//! nudge. Nudges are templates: by the time one is due the window is closed.

use super::Coach;
use crate::clock::Millis;
use crate::contacts::{Contact, DeliveryPath, MessageClass};
use crate::scheduler::JobKey;
use crate::whatsapp::TemplateMessage;

enum Decision {
    Skip,
    Requeue(Millis),
    Send {
        first_name: String,
        window: Millis,
    },
}

impl Coach {
    /// Put every ladder stage back to pending and queue it relative to
    /// `last_inbound_at`. Jobs for the previous window are cancelled.
    pub(crate) async fn restart_nudges(&self, id: &str, last_inbound_at: Millis) {
        self.scheduler.cancel_contact_nudges(id).await;

        let due: Vec<Millis> = self
            .ladder
            .iter()
            .map(|stage| last_inbound_at + stage.after_ms)
            .collect();
        let mut queued = Vec::new();
        self.store
            .update(
                id,
                Box::new(|c: &mut Contact| {
                    c.reset_nudges();
                    for (stage, due_at) in due.iter().enumerate() {
                        if c.schedule(MessageClass::Nudge(stage), *due_at) {
                            queued.push((stage, *due_at));
                        }
                    }
                }),
            )
            .await;

        for (stage, due_at) in queued {
            self.scheduler.schedule(JobKey::nudge(id, stage), due_at).await;
        }
    }

    pub(crate) async fn run_nudge(&self, id: &str, stage: usize) {
        let Some(rung) = self.ladder.get(stage) else {
            tracing::warn!("Dispatcher: no nudge stage {} configured", stage);
            return;
        };
        let now = self.clock.now_ms();
        let spacing = self.config.nudge_min_spacing_ms();
        let default_name = self.config.template_default_name.clone();

        let mut decision = Decision::Skip;
        self.store
            .update(
                id,
                Box::new(|c: &mut Contact| {
                    let Some(last_inbound) = c.last_inbound_at else {
                        return;
                    };
                    // A newer inbound message moved the ladder.
                    if now < last_inbound + rung.after_ms {
                        return;
                    }
                    if let Some(previous) = c.last_nudge_at
                        && now < previous + spacing
                    {
                        let at = previous + spacing;
                        if c.schedule(MessageClass::Nudge(stage), at) {
                            decision = Decision::Requeue(at);
                        }
                        return;
                    }
                    if c.claim_due(MessageClass::Nudge(stage), now) {
                        c.last_nudge_at = Some(now);
                        decision = Decision::Send {
                            first_name: c.first_name_or(&default_name),
                            window: last_inbound,
                        };
                    }
                }),
            )
            .await;

        let (first_name, window) = match decision {
            Decision::Skip => return,
            Decision::Requeue(at) => {
                tracing::debug!("Dispatcher: nudge {} for {} deferred to {}", stage, id, at);
                self.scheduler.schedule(JobKey::nudge(id, stage), at).await;
                return;
            }
            Decision::Send { first_name, window } => (first_name, window),
        };

        let template = TemplateMessage::new(&rung.template, &self.config.template_language)
            .with_param(first_name);
        let result = match self.api.send_template(id, &template).await {
            Ok(_) => {
                tracing::info!("Dispatcher: nudge '{}' sent to {}", rung.template, id);
                Ok(DeliveryPath::Template)
            }
            Err(e) => {
                tracing::error!("Dispatcher: nudge '{}' to {} failed: {}", rung.template, id, e);
                Err(e.to_string())
            }
        };

        self.finish_nudge(id, stage, window, result).await;
    }

    /// Record a nudge outcome. `window` is the `last_inbound_at` the send was
    /// claimed under; if the contact wrote again meanwhile, the stage is
    /// queued once more for the new window.
    pub(crate) async fn finish_nudge(
        &self,
        id: &str,
        stage: usize,
        window: Millis,
        result: std::result::Result<DeliveryPath, String>,
    ) {
        let Some(rung) = self.ladder.get(stage) else {
            return;
        };
        let at = self.clock.now_ms();
        let mut requeue = None;
        self.store
            .update(
                id,
                Box::new(|c: &mut Contact| {
                    c.finish(MessageClass::Nudge(stage), at, result);
                    if let Some(latest) = c.last_inbound_at
                        && latest != window
                    {
                        let due_at = latest + rung.after_ms;
                        if c.requeue_nudge(stage, due_at) {
                            requeue = Some(due_at);
                        }
                    }
                }),
            )
            .await;

        if let Some(due_at) = requeue {
            tracing::debug!("Dispatcher: nudge {} for {} requeued for the new window", stage, id);
            self.scheduler.schedule(JobKey::nudge(id, stage), due_at).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::HOUR_MS;
    use crate::contacts::{Contact, ContactStore, DeliveryPath, DeliveryState, MessageClass};
    use crate::scheduler::JobKey;
    use crate::tests::harness::Harness;
    use crate::tests::mocks::{MockModel, Outcome};

    async fn silent_contact(h: &Harness, id: &str) {
        h.contact(id).await;
        let now = h.now();
        h.store
            .update(
                id,
                Box::new(move |c: &mut Contact| {
                    c.last_inbound_at = Some(now);
                    c.profile.first_name = Some("Léa".to_string());
                }),
            )
            .await;
        h.coach.restart_nudges(id, now).await;
    }

    #[tokio::test]
    async fn test_restart_queues_every_stage() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;

        assert_eq!(h.scheduler.len().await, 3);
        assert_eq!(h.scheduler.next_due().await, Some(h.now() + 24 * HOUR_MS));
    }

    #[tokio::test]
    async fn test_nudge_not_sent_before_threshold() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;

        h.clock.advance(23 * HOUR_MS);
        h.coach.run_nudge("33612345678", 0).await;
        assert!(h.api.sent().is_empty());
    }

    #[tokio::test]
    async fn test_first_stage_sent_as_template() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;

        h.clock.advance(24 * HOUR_MS);
        h.coach.run_nudge("33612345678", 0).await;
        h.coach.run_nudge("33612345678", 0).await;

        let templates = h.api.templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "relance_24h");
        assert_eq!(templates[0].body_params, vec!["Léa".to_string()]);
        assert!(h.api.texts().is_empty());

        let contact = h.store_get("33612345678").await;
        assert!(contact.state(MessageClass::Nudge(0)).is_delivered());
        assert_eq!(contact.last_nudge_at, Some(h.now()));
    }

    #[tokio::test]
    async fn test_spacing_defers_next_stage() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;
        let start = h.now();

        // first nudge goes out late, at 60h
        h.clock.advance(60 * HOUR_MS);
        h.coach.run_nudge("33612345678", 0).await;

        // stage 1 is due at 72h but spacing pushes it to 84h
        h.clock.set(start + 72 * HOUR_MS);
        h.scheduler.cancel_contact_nudges("33612345678").await;
        h.coach.run_nudge("33612345678", 1).await;

        assert_eq!(h.api.templates().len(), 1);
        let expected = start + 84 * HOUR_MS;
        assert_eq!(
            h.store_get("33612345678").await.state(MessageClass::Nudge(1)),
            DeliveryState::Scheduled { due_at: expected }
        );
        assert!(h.scheduler.cancel(&JobKey::nudge("33612345678", 1)).await);

        h.clock.set(expected);
        h.coach.run_nudge("33612345678", 1).await;
        assert_eq!(h.api.templates()[1].name, "relance_72h");
    }

    #[tokio::test]
    async fn test_failed_nudge_is_terminal() {
        let h = Harness::new(MockModel::replying("ok"));
        h.api.script_template(Outcome::Fail(132_001));
        silent_contact(&h, "33612345678").await;

        h.clock.advance(24 * HOUR_MS);
        h.coach.run_nudge("33612345678", 0).await;
        h.coach.run_nudge("33612345678", 0).await;

        assert_eq!(h.api.templates().len(), 1);
        assert!(matches!(
            h.store_get("33612345678").await.state(MessageClass::Nudge(0)),
            DeliveryState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_contact_without_inbound_is_never_nudged() {
        let h = Harness::new(MockModel::replying("ok"));
        h.contact("33612345678").await;
        h.clock.advance(200 * HOUR_MS);
        h.coach.run_nudge("33612345678", 0).await;
        assert!(h.api.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stage_in_flight_during_new_inbound_is_requeued() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;
        let window = h.now();

        h.clock.advance(24 * HOUR_MS);
        let now = h.now();
        h.store
            .update(
                "33612345678",
                Box::new(move |c: &mut Contact| {
                    assert!(c.claim_due(MessageClass::Nudge(0), now));
                }),
            )
            .await;

        // the contact writes while stage 0 is being sent
        h.store
            .update(
                "33612345678",
                Box::new(move |c: &mut Contact| c.last_inbound_at = Some(now)),
            )
            .await;
        h.coach.restart_nudges("33612345678", now).await;
        assert!(!h.scheduler.cancel(&JobKey::nudge("33612345678", 0)).await);

        h.coach
            .finish_nudge("33612345678", 0, window, Ok(DeliveryPath::Template))
            .await;

        let expected = now + 24 * HOUR_MS;
        assert_eq!(
            h.store_get("33612345678").await.state(MessageClass::Nudge(0)),
            DeliveryState::Scheduled { due_at: expected }
        );
        assert_eq!(h.scheduler.next_due().await, Some(expected));
    }

    #[tokio::test]
    async fn test_finished_stage_in_same_window_stays_delivered() {
        let h = Harness::new(MockModel::replying("ok"));
        silent_contact(&h, "33612345678").await;
        h.clock.advance(24 * HOUR_MS);
        let due = h.scheduler.take_due(h.now()).await;
        assert_eq!(due.len(), 1);
        h.coach.run_nudge("33612345678", 0).await;

        assert!(
            h.store_get("33612345678")
                .await
                .state(MessageClass::Nudge(0))
                .is_delivered()
        );
        assert!(!h.scheduler.cancel(&JobKey::nudge("33612345678", 0)).await);
    }
}
