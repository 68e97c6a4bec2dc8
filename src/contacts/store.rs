//! Contact store
//!
//! The store is a trait so the backend can change without touching the
//! handlers. The in-memory implementation runs every mutation under a single
//! write lock, which is what makes [`Contact::claim`] exclusive.

use super::types::Contact;
use crate::clock::Millis;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Mutation applied to a contact under the store's lock.
pub type Mutation<'a> = Box<dyn FnOnce(&mut Contact) + Send + 'a>;

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Contact>;

    /// Apply `f` to the contact, creating it first if needed. Returns the
    /// contact as left by `f`.
    async fn upsert(&self, id: &str, now: Millis, f: Mutation<'_>) -> Contact;

    /// Apply `f` to an existing contact. Returns `None` if there is none.
    async fn update(&self, id: &str, f: Mutation<'_>) -> Option<Contact>;

    async fn ids(&self) -> Vec<String>;

    async fn len(&self) -> usize;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    contacts: RwLock<HashMap<String, Contact>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn get(&self, id: &str) -> Option<Contact> {
        self.contacts.read().await.get(id).cloned()
    }

    async fn upsert(&self, id: &str, now: Millis, f: Mutation<'_>) -> Contact {
        let mut contacts = self.contacts.write().await;
        let contact = contacts.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Store: new contact {}", id);
            Contact::new(id, now)
        });
        f(contact);
        contact.clone()
    }

    async fn update(&self, id: &str, f: Mutation<'_>) -> Option<Contact> {
        let mut contacts = self.contacts.write().await;
        let contact = contacts.get_mut(id)?;
        f(contact);
        Some(contact.clone())
    }

    async fn ids(&self) -> Vec<String> {
        self.contacts.read().await.keys().cloned().collect()
    }

    async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }
}
