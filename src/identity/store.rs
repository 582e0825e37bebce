//! The persistence seam the reconciliation engine is written against.

use crate::db::{ContactDb, DbContact, DbError, NewContact};
use crate::error::ReconcileError;

/// Everything reconciliation needs from persistent storage.
///
/// Every method may block on I/O; callers never hold an in-process lock
/// across these calls.
pub trait ContactStore {
    /// Live contacts whose email or phone equals a supplied value, oldest
    /// first (ties by id). Absent values contribute no clause.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<DbContact>, DbError>;

    /// A contact by id, soft-deleted or not.
    fn get_contact(&self, id: i64) -> Result<Option<DbContact>, DbError>;

    /// The live primary `primary_id` plus its live secondaries, oldest first.
    fn get_linked_contacts(&self, primary_id: i64) -> Result<Vec<DbContact>, DbError>;

    fn insert_contact(&self, contact: &NewContact) -> Result<DbContact, DbError>;

    /// Make `from_id` and its live secondaries secondaries of `to_primary_id`.
    fn relink_group(&self, from_id: i64, to_primary_id: i64) -> Result<usize, DbError>;

    /// Run `f` as one atomic unit: all of its writes commit or none do.
    fn atomically<T, F>(&self, f: F) -> Result<T, ReconcileError>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, ReconcileError>;
}

impl ContactStore for ContactDb {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<DbContact>, DbError> {
        ContactDb::find_by_email_or_phone(self, email, phone_number)
    }

    fn get_contact(&self, id: i64) -> Result<Option<DbContact>, DbError> {
        ContactDb::get_contact(self, id)
    }

    fn get_linked_contacts(&self, primary_id: i64) -> Result<Vec<DbContact>, DbError> {
        ContactDb::get_linked_contacts(self, primary_id)
    }

    fn insert_contact(&self, contact: &NewContact) -> Result<DbContact, DbError> {
        ContactDb::insert_contact(self, contact)
    }

    fn relink_group(&self, from_id: i64, to_primary_id: i64) -> Result<usize, DbError> {
        ContactDb::relink_group(self, from_id, to_primary_id)
    }

    fn atomically<T, F>(&self, f: F) -> Result<T, ReconcileError>
    where
        F: FnOnce(&Self) -> Result<T, ReconcileError>,
    {
        self.with_transaction(f)
    }
}
