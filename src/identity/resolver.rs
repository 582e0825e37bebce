//! Primary selection, demotion and new-record insertion.
//!
//! Given the candidates a submission matched, the resolver settles which
//! primary governs the merged identity:
//!
//! 1. No candidates: the submission becomes a new primary.
//! 2. Otherwise every candidate is traced to the primary governing it, and the
//!    oldest of those primaries (ties by lowest id) is canonical.
//! 3. Every other primary is demoted under the canonical one, taking its own
//!    secondaries along.
//! 4. Unless the exact pair is already on file, the submission is recorded as
//!    a new secondary of the canonical primary.

use std::collections::HashSet;

use crate::db::{DbContact, NewContact};
use crate::error::ReconcileError;
use crate::types::ContactInput;

use super::store::ContactStore;

/// Longest `linked_id` chain followed before the data is declared cyclic.
const MAX_LINK_DEPTH: usize = 16;

/// Where a candidate's `linked_id` chain leads.
#[derive(Debug, Clone, Default, PartialEq)]
struct Trace {
    /// The live primary governing the candidate, if one is reachable.
    primary: Option<DbContact>,
    /// Records whose groups must be re-pointed at the canonical primary:
    /// intermediate secondaries on a multi-hop chain and the dangling end of
    /// a broken one. Empty for well-formed data.
    strays: Vec<i64>,
}

pub struct IdentityResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: ContactStore> IdentityResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve a submission against its candidates and return the id of the
    /// primary that governs the resulting identity group. May write.
    pub fn resolve(
        &self,
        input: &ContactInput,
        candidates: &[DbContact],
    ) -> Result<i64, ReconcileError> {
        if candidates.is_empty() {
            return Ok(self.create_primary(input)?.id);
        }

        let mut primaries: Vec<DbContact> = Vec::new();
        let mut strays: Vec<i64> = Vec::new();
        for candidate in candidates {
            let trace = self.trace_primary(candidate)?;
            if let Some(primary) = trace.primary {
                if !primaries.iter().any(|p| p.id == primary.id) {
                    primaries.push(primary);
                }
            }
            for id in trace.strays {
                if !strays.contains(&id) {
                    strays.push(id);
                }
            }
        }
        primaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        // Only soft-deleted primaries were reachable: this is a first sighting.
        let (canonical_id, created) = match primaries.first() {
            Some(oldest) => (oldest.id, false),
            None => (self.create_primary(input)?.id, true),
        };

        for demoted in primaries.iter().filter(|p| p.id != canonical_id) {
            let moved = self.store.relink_group(demoted.id, canonical_id)?;
            log::info!(
                "Demoted primary contact {} under {} ({moved} record(s) relinked)",
                demoted.id,
                canonical_id
            );
        }

        for stray_id in strays {
            let moved = self.store.relink_group(stray_id, canonical_id)?;
            if moved > 0 {
                log::warn!(
                    "Relinked {moved} record(s) anchored at contact {stray_id} directly under {canonical_id}"
                );
            }
        }

        if !created && needs_new_secondary(input, candidates) {
            let secondary = self.store.insert_contact(&NewContact::secondary(
                input.email.clone(),
                input.phone_number.clone(),
                canonical_id,
            ))?;
            log::info!(
                "Linked new secondary contact {} to primary {}",
                secondary.id,
                canonical_id
            );
        }

        Ok(canonical_id)
    }

    fn create_primary(&self, input: &ContactInput) -> Result<DbContact, ReconcileError> {
        let contact = self.store.insert_contact(&NewContact::primary(
            input.email.clone(),
            input.phone_number.clone(),
        ))?;
        log::info!("Created primary contact {}", contact.id);
        Ok(contact)
    }

    /// Follow `linked_id` from `contact` to the live primary governing it.
    ///
    /// A well-formed secondary reaches its primary in one hop. Longer chains,
    /// dangling links and cycles are integrity violations: they are logged and
    /// the records involved are returned as strays to be re-linked.
    fn trace_primary(&self, contact: &DbContact) -> Result<Trace, ReconcileError> {
        let mut current = contact.clone();
        let mut visited = HashSet::from([current.id]);
        let mut trace = Trace::default();

        for _ in 0..MAX_LINK_DEPTH {
            if current.is_primary() {
                if !trace.strays.is_empty() {
                    report_violation(format!(
                        "contact {} reaches primary {} only through {:?}",
                        contact.id, current.id, trace.strays
                    ));
                }
                trace.primary = Some(current);
                return Ok(trace);
            }

            let Some(next_id) = current.linked_id else {
                report_violation(format!("secondary contact {} has no linked id", current.id));
                trace.strays.push(current.id);
                return Ok(trace);
            };

            if !visited.insert(next_id) {
                report_violation(format!("link cycle through contact {next_id}"));
                trace.strays.push(current.id);
                return Ok(trace);
            }

            match self.store.get_contact(next_id)? {
                Some(next) if !next.is_deleted() => {
                    if !next.is_primary() {
                        trace.strays.push(next.id);
                    }
                    current = next;
                }
                _ => {
                    report_violation(format!(
                        "contact {} links to missing or deleted contact {next_id}",
                        current.id
                    ));
                    trace.strays.push(next_id);
                    return Ok(trace);
                }
            }
        }

        report_violation(format!(
            "link chain from contact {} exceeds {MAX_LINK_DEPTH} hops",
            contact.id
        ));
        trace.strays.push(current.id);
        Ok(trace)
    }
}

/// Whether the submission adds a record to an identity that already exists.
///
/// The submitted pair is new unless some candidate carries exactly that pair,
/// an absent field included. Knowing either field alone is not enough.
fn needs_new_secondary(input: &ContactInput, candidates: &[DbContact]) -> bool {
    !candidates
        .iter()
        .any(|c| c.has_pair(input.email(), input.phone_number()))
}

fn report_violation(detail: String) {
    log::warn!("{}", ReconcileError::IntegrityViolation(detail));
}
