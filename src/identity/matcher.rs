use crate::db::DbContact;
use crate::error::ReconcileError;
use crate::types::ContactInput;

use super::store::ContactStore;

/// Finds the live contacts an incoming submission touches.
pub struct Matcher<'a, S> {
    store: &'a S,
}

impl<'a, S: ContactStore> Matcher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every live contact sharing the submitted email or phone number,
    /// oldest first. Read-only.
    pub fn find_candidates(&self, input: &ContactInput) -> Result<Vec<DbContact>, ReconcileError> {
        let candidates = self
            .store
            .find_by_email_or_phone(input.email(), input.phone_number())?;
        log::debug!(
            "Matched {} candidate contact(s) for email={:?} phone={:?}",
            candidates.len(),
            input.email(),
            input.phone_number()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::NewContact;

    #[test]
    fn test_empty_string_matches_nothing() {
        let db = test_db();
        db.insert_contact(&NewContact::primary(None, Some("111".into())))
            .unwrap();

        let input = ContactInput::new(Some(String::new()), None);
        assert!(Matcher::new(&db).find_candidates(&input).unwrap().is_empty());
    }

    #[test]
    fn test_finds_by_phone_only() {
        let db = test_db();
        let c = db
            .insert_contact(&NewContact::primary(Some("a@a.com".into()), Some("111".into())))
            .unwrap();

        let input = ContactInput::new(None, Some("111".into()));
        let found = Matcher::new(&db).find_candidates(&input).unwrap();
        assert_eq!(found, vec![c]);
    }
}
