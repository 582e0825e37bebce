//! Identity reconciliation engine.
//!
//! `Reconciler::reconcile` runs Matcher → IdentityResolver → Consolidator as a
//! single atomic unit against a [`ContactStore`]. A unit that loses a write
//! race is re-run from matching a bounded number of times.

mod consolidate;
mod matcher;
mod resolver;
pub mod store;

pub use consolidate::Consolidator;
pub use matcher::Matcher;
pub use resolver::IdentityResolver;
pub use store::ContactStore;

use crate::error::ReconcileError;
use crate::types::{ConsolidatedView, ContactInput};

/// Retries after a conflicting concurrent write, unless configured otherwise.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

pub struct Reconciler<'a, S> {
    store: &'a S,
    max_conflict_retries: u32,
}

impl<'a, S: ContactStore> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Reconcile one submission and return the consolidated identity.
    ///
    /// Either the whole unit commits or nothing does; no partial view is ever
    /// returned.
    pub fn reconcile(&self, input: &ContactInput) -> Result<ConsolidatedView, ReconcileError> {
        input.require_any()?;

        let mut attempt = 0;
        loop {
            match self.store.atomically(|tx| reconcile_once(tx, input)) {
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_conflict_retries {
                        return Err(ReconcileError::StoreUnavailable(format!(
                            "gave up after {} conflicting attempt(s): {err}",
                            attempt + 1
                        )));
                    }
                    attempt += 1;
                    log::warn!("Reconciliation attempt {attempt} conflicted, retrying: {err}");
                }
                result => return result,
            }
        }
    }
}

/// One pass of matching, resolution and consolidation against `tx`, the
/// store handle scoped to the enclosing unit of work.
fn reconcile_once<S: ContactStore>(
    tx: &S,
    input: &ContactInput,
) -> Result<ConsolidatedView, ReconcileError> {
    let candidates = Matcher::new(tx).find_candidates(input)?;
    let primary_id = IdentityResolver::new(tx).resolve(input, &candidates)?;
    Consolidator::new(tx).consolidate(primary_id)
}
