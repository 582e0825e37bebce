use chrono::{SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, types::Value};

use super::*;

const CONTACT_COLUMNS: &str = "id, phone_number, email, linked_id, link_precedence,
     created_at, updated_at, deleted_at";

/// Fixed-width UTC timestamp so that `ORDER BY created_at` sorts chronologically.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ContactDb {
    // =========================================================================
    // Contacts
    // =========================================================================

    /// Live contacts whose email or phone number equals a supplied value.
    ///
    /// An absent value contributes no clause: `email = None` never matches
    /// rows whose email is NULL. Oldest first, ties broken by id.
    pub fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<DbContact>, DbError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(email) = email {
            values.push(Value::Text(email.to_string()));
            clauses.push(format!("email = ?{}", values.len()));
        }
        if let Some(phone) = phone_number {
            values.push(Value::Text(phone.to_string()));
            clauses.push(format!("phone_number = ?{}", values.len()));
        }
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL AND ({})
             ORDER BY created_at ASC, id ASC",
            clauses.join(" OR ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::map_contact_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Get a contact by id, including soft-deleted rows.
    pub fn get_contact(&self, id: i64) -> Result<Option<DbContact>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], Self::map_contact_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// The live identity group of `primary_id`: the primary itself plus every
    /// live record linked to it, oldest first.
    pub fn get_linked_contacts(&self, primary_id: i64) -> Result<Vec<DbContact>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL AND (id = ?1 OR linked_id = ?1)
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![primary_id], Self::map_contact_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert a contact and return the stored row.
    pub fn insert_contact(&self, contact: &NewContact) -> Result<DbContact, DbError> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO contacts (phone_number, email, linked_id, link_precedence, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                contact.phone_number,
                contact.email,
                contact.linked_id,
                contact.link_precedence.as_str(),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_contact(id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Re-point a whole group under `to_primary_id`.
    ///
    /// The live record `from_id` and every live record linked to it become
    /// secondaries of `to_primary_id`. Returns the number of rows changed;
    /// rows already linked to `to_primary_id` are left untouched, so a repeat
    /// call returns 0. `id` and `created_at` are never rewritten.
    pub fn relink_group(&self, from_id: i64, to_primary_id: i64) -> Result<usize, DbError> {
        if from_id == to_primary_id {
            return Ok(0);
        }
        let changed = self.conn.execute(
            "UPDATE contacts
             SET link_precedence = 'secondary', linked_id = ?2, updated_at = ?3
             WHERE deleted_at IS NULL
               AND id <> ?2
               AND (id = ?1 OR linked_id = ?1)
               AND (link_precedence <> 'secondary' OR linked_id IS NOT ?2)",
            params![from_id, to_primary_id, now_timestamp()],
        )?;
        Ok(changed)
    }

    /// Raw listing of live contacts. Supplied filters are ANDed together;
    /// with no filters every live contact is returned.
    pub fn list_contacts(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<DbContact>, DbError> {
        let mut sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL");
        let mut values: Vec<Value> = Vec::new();
        if let Some(email) = email {
            values.push(Value::Text(email.to_string()));
            sql.push_str(&format!(" AND email = ?{}", values.len()));
        }
        if let Some(phone) = phone_number {
            values.push(Value::Text(phone.to_string()));
            sql.push_str(&format!(" AND phone_number = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::map_contact_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Mark a contact as deleted without removing it. Returns false when the
    /// contact does not exist or was already deleted.
    pub fn soft_delete_contact(&self, id: i64) -> Result<bool, DbError> {
        let now = now_timestamp();
        let changed = self.conn.execute(
            "UPDATE contacts SET deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now],
        )?;
        Ok(changed > 0)
    }

    fn map_contact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbContact> {
        Ok(DbContact {
            id: row.get(0)?,
            phone_number: row.get(1)?,
            email: row.get(2)?,
            linked_id: row.get(3)?,
            link_precedence: LinkPrecedence::from_str_lossy(&row.get::<_, String>(4)?),
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{backdate, test_db};
    use super::*;

    fn primary(db: &ContactDb, email: Option<&str>, phone: Option<&str>) -> DbContact {
        db.insert_contact(&NewContact::primary(
            email.map(str::to_string),
            phone.map(str::to_string),
        ))
        .expect("insert primary")
    }

    fn secondary(db: &ContactDb, email: Option<&str>, phone: Option<&str>, to: i64) -> DbContact {
        db.insert_contact(&NewContact::secondary(
            email.map(str::to_string),
            phone.map(str::to_string),
            to,
        ))
        .expect("insert secondary")
    }

    #[test]
    fn test_insert_assigns_id_and_timestamps() {
        let db = test_db();
        let c = primary(&db, Some("a@a.com"), Some("111"));
        assert!(c.id > 0);
        assert!(c.is_primary());
        assert_eq!(c.linked_id, None);
        assert_eq!(c.created_at, c.updated_at);
        assert!(c.deleted_at.is_none());
    }

    #[test]
    fn test_find_matches_either_field() {
        let db = test_db();
        let by_email = primary(&db, Some("a@a.com"), Some("111"));
        let by_phone = primary(&db, Some("b@b.com"), Some("222"));
        primary(&db, Some("c@c.com"), Some("333"));

        let found = db
            .find_by_email_or_phone(Some("a@a.com"), Some("222"))
            .unwrap();
        let ids: Vec<i64> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![by_email.id, by_phone.id]);
    }

    #[test]
    fn test_absent_field_does_not_match_null() {
        let db = test_db();
        primary(&db, None, Some("111"));
        let with_email = primary(&db, Some("a@a.com"), None);

        let found = db.find_by_email_or_phone(Some("a@a.com"), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, with_email.id);

        assert!(db.find_by_email_or_phone(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_find_orders_by_created_at_then_id() {
        let db = test_db();
        let first = primary(&db, Some("a@a.com"), None);
        let second = primary(&db, Some("a@a.com"), None);
        let third = primary(&db, Some("a@a.com"), None);
        backdate(&db, third.id, "2020-01-01T00:00:00.000000Z");
        backdate(&db, first.id, "2021-01-01T00:00:00.000000Z");
        backdate(&db, second.id, "2021-01-01T00:00:00.000000Z");

        let ids: Vec<i64> = db
            .find_by_email_or_phone(Some("a@a.com"), None)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![third.id, first.id, second.id]);
    }

    #[test]
    fn test_soft_deleted_rows_are_not_found() {
        let db = test_db();
        let gone = primary(&db, Some("a@a.com"), Some("111"));
        assert!(db.soft_delete_contact(gone.id).unwrap());
        assert!(!db.soft_delete_contact(gone.id).unwrap(), "second delete is a no-op");

        assert!(db
            .find_by_email_or_phone(Some("a@a.com"), Some("111"))
            .unwrap()
            .is_empty());
        assert!(db.list_contacts(None, None).unwrap().is_empty());
        // still physically present
        assert!(db.get_contact(gone.id).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn test_linked_contacts_excludes_other_groups_and_deleted() {
        let db = test_db();
        let p = primary(&db, Some("a@a.com"), Some("111"));
        let s1 = secondary(&db, Some("a@a.com"), Some("222"), p.id);
        let s2 = secondary(&db, Some("x@a.com"), Some("111"), p.id);
        let other = primary(&db, Some("z@z.com"), Some("999"));
        db.soft_delete_contact(s2.id).unwrap();

        let ids: Vec<i64> = db
            .get_linked_contacts(p.id)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![p.id, s1.id]);
        assert!(!ids.contains(&other.id));
    }

    #[test]
    fn test_relink_group_carries_children() {
        let db = test_db();
        let keep = primary(&db, Some("a@a.com"), Some("111"));
        let demoted = primary(&db, Some("b@b.com"), Some("222"));
        let child = secondary(&db, Some("b@b.com"), Some("333"), demoted.id);

        let changed = db.relink_group(demoted.id, keep.id).unwrap();
        assert_eq!(changed, 2);

        let demoted = db.get_contact(demoted.id).unwrap().unwrap();
        assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(demoted.linked_id, Some(keep.id));
        let child = db.get_contact(child.id).unwrap().unwrap();
        assert_eq!(child.linked_id, Some(keep.id));

        assert_eq!(db.relink_group(demoted.id, keep.id).unwrap(), 0, "idempotent");
    }

    #[test]
    fn test_relink_never_touches_identity_or_creation_time() {
        let db = test_db();
        let keep = primary(&db, Some("a@a.com"), None);
        let demoted = primary(&db, Some("b@b.com"), None);
        backdate(&db, demoted.id, "2022-02-02T00:00:00.000000Z");

        db.relink_group(demoted.id, keep.id).unwrap();
        let after = db.get_contact(demoted.id).unwrap().unwrap();
        assert_eq!(after.id, demoted.id);
        assert_eq!(after.created_at, "2022-02-02T00:00:00.000000Z");
        assert_eq!(db.relink_group(keep.id, keep.id).unwrap(), 0);
    }

    #[test]
    fn test_list_contacts_ands_filters() {
        let db = test_db();
        let both = primary(&db, Some("a@a.com"), Some("111"));
        primary(&db, Some("a@a.com"), Some("222"));
        primary(&db, Some("b@b.com"), Some("111"));

        assert_eq!(db.list_contacts(None, None).unwrap().len(), 3);
        assert_eq!(db.list_contacts(Some("a@a.com"), None).unwrap().len(), 2);
        assert_eq!(db.list_contacts(None, Some("111")).unwrap().len(), 2);

        let exact = db.list_contacts(Some("a@a.com"), Some("111")).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0], both);
    }
}
