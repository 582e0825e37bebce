//! Types shared between the engine, the service layer and the HTTP boundary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Service configuration, read from `config.json` (camelCase keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to `~/.identity-reconciler/contacts.db` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Extra attempts after a reconciliation loses a write race.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_conflict_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

/// An incoming (email, phoneNumber) submission.
///
/// Empty or whitespace-only values are stored as `None`, so an empty string
/// behaves exactly like an absent field and never matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactInput {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl ContactInput {
    pub fn new(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email: non_blank(email),
            phone_number: non_blank(phone_number),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone_number.is_none()
    }

    /// Reconciliation needs at least one field to match on.
    pub fn require_any(&self) -> Result<(), ReconcileError> {
        if self.is_empty() {
            return Err(ReconcileError::InvalidInput);
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One identity, as seen from all of its live contact records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedView {
    pub primary_contact_id: i64,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<i64>,
}

/// Response envelope for `POST /identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedView,
}
