//! Domain types and DTOs
//!
//! Mirrors of the backend's entities plus the view logic run over them
//! (filters, reconciliation, report rollups).

pub mod common;
pub mod delivery;
pub mod lookups;
pub mod payments;
pub mod products;
pub mod purchases;
pub mod reconciliation;
pub mod reports;
pub mod retailers;
pub mod sales;
pub mod settings;

pub use common::{EntityId, NamedRef};
