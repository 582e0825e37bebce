//! Contact identity reconciliation.
//!
//! Incoming (email, phoneNumber) submissions are matched against stored
//! contacts, linked into a single identity per person (one primary, any
//! number of secondaries) and answered with a consolidated view of that
//! identity.

pub mod db;
pub mod error;
pub mod identity;
mod migrations;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

pub use error::ReconcileError;
pub use identity::Reconciler;
pub use services::ContactService;
pub use types::{Config, ConsolidatedView, ContactInput};
