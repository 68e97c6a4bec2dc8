//! Contacts
//!
//! Contact model, the store abstraction it lives behind, and the optional
//! CRM lead snapshot file.

mod leads_file;
mod store;
mod types;

pub use leads_file::{LeadFile, LeadSnapshot};
pub use store::{ContactStore, InMemoryStore, Mutation};
pub use types::{Contact, DeliveryPath, DeliveryState, MessageClass, Profile, Role, Turn};
