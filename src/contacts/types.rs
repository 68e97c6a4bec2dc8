//! Contact model
//!
//! One `Contact` per canonical phone id. Outbound message classes each carry
//! a [`DeliveryState`] instead of loose "already sent" booleans.

use crate::clock::Millis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Profile fields collected by the CRM form. All values are opaque text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub goal: Option<String>,
    pub constraints: Option<String>,
    pub level: Option<String>,
    /// Form fields with no dedicated slot.
    pub extra: BTreeMap<String, String>,
}

impl Profile {
    /// Overwrite with every non-empty value of `other`.
    pub fn merge(&mut self, other: Profile) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value
                && !v.trim().is_empty()
            {
                *slot = Some(v.trim().to_string());
            }
        }

        take(&mut self.first_name, other.first_name);
        take(&mut self.last_name, other.last_name);
        take(&mut self.email, other.email);
        take(&mut self.goal, other.goal);
        take(&mut self.constraints, other.constraints);
        take(&mut self.level, other.level);
        for (key, value) in other.extra {
            if !value.trim().is_empty() {
                self.extra.insert(key, value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Profile::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: Millis,
}

/// Which path the delivery policy ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPath {
    Text,
    Template,
}

/// Per-class delivery state. `Delivered` and `Failed` are terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    Pending,
    Scheduled {
        due_at: Millis,
    },
    Sending {
        since: Millis,
    },
    Delivered {
        at: Millis,
        via: DeliveryPath,
    },
    Failed {
        at: Millis,
        reason: String,
    },
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::Failed { .. })
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn due_at(&self) -> Option<Millis> {
        match self {
            Self::Scheduled { due_at } => Some(*due_at),
            _ => None,
        }
    }
}

/// Outbound message classes that are sent at most once per contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageClass {
    Program,
    Welcome,
    Nudge(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub profile: Profile,
    /// Name from the WhatsApp profile, used when the CRM gave none.
    pub whatsapp_name: Option<String>,
    pub history: Vec<Turn>,
    pub summary: Option<String>,
    pub last_inbound_at: Option<Millis>,
    pub program: DeliveryState,
    pub welcome: DeliveryState,
    pub nudges: Vec<DeliveryState>,
    pub last_nudge_at: Option<Millis>,
    pub created_at: Millis,
}

impl Contact {
    pub fn new(id: impl Into<String>, now: Millis) -> Self {
        Self {
            id: id.into(),
            profile: Profile::default(),
            whatsapp_name: None,
            history: Vec::new(),
            summary: None,
            last_inbound_at: None,
            program: DeliveryState::Pending,
            welcome: DeliveryState::Pending,
            nudges: Vec::new(),
            last_nudge_at: None,
            created_at: now,
        }
    }

    pub fn state(&self, class: MessageClass) -> DeliveryState {
        match class {
            MessageClass::Program => self.program.clone(),
            MessageClass::Welcome => self.welcome.clone(),
            MessageClass::Nudge(stage) => self.nudges.get(stage).cloned().unwrap_or_default(),
        }
    }

    fn state_mut(&mut self, class: MessageClass) -> &mut DeliveryState {
        match class {
            MessageClass::Program => &mut self.program,
            MessageClass::Welcome => &mut self.welcome,
            MessageClass::Nudge(stage) => {
                if self.nudges.len() <= stage {
                    self.nudges.resize(stage + 1, DeliveryState::Pending);
                }
                &mut self.nudges[stage]
            }
        }
    }

    /// Move a non-terminal, idle class to `Scheduled`. Returns false when the
    /// class is already in flight or finished.
    pub fn schedule(&mut self, class: MessageClass, due_at: Millis) -> bool {
        let state = self.state_mut(class);
        match state {
            DeliveryState::Pending | DeliveryState::Scheduled { .. } => {
                *state = DeliveryState::Scheduled { due_at };
                true
            }
            _ => false,
        }
    }

    /// Take ownership of a send. Only one caller can win: the state moves to
    /// `Sending` and every later claim fails until the class is reset.
    pub fn claim(&mut self, class: MessageClass, now: Millis) -> bool {
        let state = self.state_mut(class);
        match state {
            DeliveryState::Pending | DeliveryState::Scheduled { .. } => {
                *state = DeliveryState::Sending { since: now };
                true
            }
            _ => false,
        }
    }

    /// Like [`claim`](Self::claim), but only for a class scheduled at or before `now`.
    pub fn claim_due(&mut self, class: MessageClass, now: Millis) -> bool {
        match self.state(class) {
            DeliveryState::Scheduled { due_at } if due_at <= now => self.claim(class, now),
            _ => false,
        }
    }

    /// Record the outcome of a claimed send.
    pub fn finish(&mut self, class: MessageClass, now: Millis, outcome: Result<DeliveryPath, String>) {
        let state = self.state_mut(class);
        if !matches!(state, DeliveryState::Sending { .. }) {
            return;
        }
        *state = match outcome {
            Ok(via) => DeliveryState::Delivered { at: now, via },
            Err(reason) => DeliveryState::Failed { at: now, reason },
        };
    }

    /// A new inbound message reopens the window: the nudge ladder restarts.
    /// In-flight nudges are left alone so their outcome is still recorded.
    pub fn reset_nudges(&mut self) {
        for state in &mut self.nudges {
            if !matches!(state, DeliveryState::Sending { .. }) {
                *state = DeliveryState::Pending;
            }
        }
    }

    /// Queue a nudge stage again for a window that opened while it was in
    /// flight. Returns false while the stage is still `Sending`.
    pub fn requeue_nudge(&mut self, stage: usize, due_at: Millis) -> bool {
        let class = MessageClass::Nudge(stage);
        if matches!(self.state(class), DeliveryState::Sending { .. }) {
            return false;
        }
        *self.state_mut(class) = DeliveryState::Pending;
        self.schedule(class, due_at)
    }

    pub fn push_turn(&mut self, role: Role, text: impl Into<String>, at: Millis) {
        self.history.push(Turn {
            role,
            text: text.into(),
            at,
        });
    }

    /// First name for templates: CRM first, then WhatsApp profile, then `fallback`.
    pub fn first_name_or(&self, fallback: &str) -> String {
        self.profile
            .first_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.whatsapp_name
                    .as_ref()
                    .and_then(|n| n.split_whitespace().next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback.to_string())
    }
}
