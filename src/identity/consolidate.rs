use crate::db::DbContact;
use crate::error::ReconcileError;
use crate::types::ConsolidatedView;

use super::store::ContactStore;

/// Builds the consolidated view of one identity group.
pub struct Consolidator<'a, S> {
    store: &'a S,
}

impl<'a, S: ContactStore> Consolidator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Re-read the live group of `primary_id` and fold it into a view.
    ///
    /// Reading after resolution means demotions and insertions made by the
    /// same reconciliation are reflected.
    pub fn consolidate(&self, primary_id: i64) -> Result<ConsolidatedView, ReconcileError> {
        let group = self.store.get_linked_contacts(primary_id)?;
        build_view(primary_id, &group)
    }
}

/// Fold a group (oldest first) into a view: the primary's own values lead,
/// then secondaries in creation order, each value listed once.
fn build_view(primary_id: i64, group: &[DbContact]) -> Result<ConsolidatedView, ReconcileError> {
    let primary = group
        .iter()
        .find(|c| c.id == primary_id)
        .ok_or_else(|| {
            ReconcileError::IntegrityViolation(format!("primary contact {primary_id} is not live"))
        })?;
    if !primary.is_primary() {
        return Err(ReconcileError::IntegrityViolation(format!(
            "contact {primary_id} is not a primary"
        )));
    }

    let secondaries: Vec<&DbContact> = group
        .iter()
        .filter(|c| c.id != primary_id && !c.is_primary())
        .collect();

    let mut view = ConsolidatedView {
        primary_contact_id: primary_id,
        emails: Vec::new(),
        phone_numbers: Vec::new(),
        secondary_contact_ids: secondaries.iter().map(|c| c.id).collect(),
    };
    for contact in std::iter::once(primary).chain(secondaries.iter().copied()) {
        push_unique(&mut view.emails, contact.email.as_deref());
        push_unique(&mut view.phone_numbers, contact.phone_number.as_deref());
    }
    Ok(view)
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{backdate, test_db};
    use crate::db::{LinkPrecedence, NewContact};

    fn contact(id: i64, email: Option<&str>, phone: Option<&str>, linked: Option<i64>) -> DbContact {
        DbContact {
            id,
            phone_number: phone.map(str::to_string),
            email: email.map(str::to_string),
            linked_id: linked,
            link_precedence: if linked.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at: format!("2024-01-0{id}T00:00:00.000000Z"),
            updated_at: format!("2024-01-0{id}T00:00:00.000000Z"),
            deleted_at: None,
        }
    }

    #[test]
    fn test_primary_values_lead_and_duplicates_collapse() {
        // A secondary older than its primary (demoted group) still trails it.
        let group = vec![
            contact(1, Some("old@a.com"), Some("111"), Some(2)),
            contact(2, Some("lead@a.com"), Some("222"), None),
            contact(3, Some("old@a.com"), Some("222"), Some(2)),
            contact(4, None, Some(""), Some(2)),
        ];

        let view = build_view(2, &group).unwrap();
        assert_eq!(view.primary_contact_id, 2);
        assert_eq!(view.emails, vec!["lead@a.com", "old@a.com"]);
        assert_eq!(view.phone_numbers, vec!["222", "111"]);
        assert_eq!(view.secondary_contact_ids, vec![1, 3, 4]);
    }

    #[test]
    fn test_missing_primary_is_an_integrity_violation() {
        let group = vec![contact(3, Some("a@a.com"), None, Some(2))];
        assert!(matches!(
            build_view(2, &group),
            Err(ReconcileError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_secondary_id_is_not_a_primary() {
        let group = vec![contact(3, Some("a@a.com"), None, Some(2))];
        assert!(matches!(
            build_view(3, &group),
            Err(ReconcileError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_consolidate_reads_live_group_from_store() {
        let db = test_db();
        let p = db
            .insert_contact(&NewContact::primary(Some("a@a.com".into()), Some("111".into())))
            .unwrap();
        let s1 = db
            .insert_contact(&NewContact::secondary(Some("b@b.com".into()), Some("111".into()), p.id))
            .unwrap();
        let s2 = db
            .insert_contact(&NewContact::secondary(Some("c@c.com".into()), Some("333".into()), p.id))
            .unwrap();
        backdate(&db, s1.id, "2099-01-01T00:00:00.000000Z");
        db.soft_delete_contact(s2.id).unwrap();

        let view = Consolidator::new(&db).consolidate(p.id).unwrap();
        assert_eq!(view.emails, vec!["a@a.com", "b@b.com"]);
        assert_eq!(view.phone_numbers, vec!["111"]);
        assert_eq!(view.secondary_contact_ids, vec![s1.id]);
    }
}
