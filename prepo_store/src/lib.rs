//! prepo_store: the content-addressed program repository.
//!
//! A store file maps digests to fragments (section payloads with fix-ups)
//! and UUIDs to tickets (manifests of `(name, digest, linkage)` members).
//! The store is opened read-only and memory mapped; fragment lookups are
//! zero-copy views into the map.

pub mod fragment;
pub mod repo;
pub mod ticket;
pub mod uuid;

pub use fragment::{ExternalFixup, Fragment, InternalFixup, Section, SectionContent, SectionKind};
pub use repo::{NameAddress, Repository, StoreBuilder, StoreError};
pub use ticket::{Linkage, Ticket, TicketMember};
pub use uuid::Uuid;

#[cfg(test)]
mod tests;
