// Contacts service: async entry points over the blocking SQLite store.
// Each call opens its own connection on the blocking pool, so concurrent
// requests contend on SQLite's write lock rather than on an in-process mutex.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{ContactDb, DbContact, DbError, NewContact};
use crate::error::ReconcileError;
use crate::identity::Reconciler;
use crate::types::{Config, ConsolidatedView, ContactInput};

#[derive(Clone)]
pub struct ContactService {
    db_path: Arc<PathBuf>,
    busy_timeout: Duration,
    max_conflict_retries: u32,
}

impl ContactService {
    /// Open (creating and migrating if needed) the database named by `config`.
    pub fn open(config: &Config) -> Result<Self, DbError> {
        let path = match &config.database_path {
            Some(path) => path.clone(),
            None => ContactDb::default_path()?,
        };
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        Self::open_at(&path, busy_timeout, config.max_conflict_retries)
    }

    pub fn open_at(
        path: &Path,
        busy_timeout: Duration,
        max_conflict_retries: u32,
    ) -> Result<Self, DbError> {
        // Startup connection: applies migrations, then closes on drop.
        ContactDb::open_at(path, busy_timeout)?;
        log::info!("Contact store ready at {}", path.display());
        Ok(Self {
            db_path: Arc::new(path.to_path_buf()),
            busy_timeout,
            max_conflict_retries,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Reconcile a submission into its consolidated identity.
    pub async fn reconcile(&self, input: ContactInput) -> Result<ConsolidatedView, ReconcileError> {
        input.require_any()?;
        let retries = self.max_conflict_retries;
        self.run_blocking(move |db| {
            Reconciler::new(db)
                .with_max_conflict_retries(retries)
                .reconcile(&input)
        })
        .await
    }

    /// Insert a primary contact without any matching. Administrative seeding
    /// only; it does not reconcile.
    pub async fn create_primary_contact(
        &self,
        input: ContactInput,
    ) -> Result<DbContact, ReconcileError> {
        self.run_blocking(move |db| {
            let contact =
                db.insert_contact(&NewContact::primary(input.email, input.phone_number))?;
            log::info!("Seeded primary contact {}", contact.id);
            Ok(contact)
        })
        .await
    }

    /// Raw live contacts matching every supplied filter.
    pub async fn list_contacts(
        &self,
        email: Option<String>,
        phone_number: Option<String>,
    ) -> Result<Vec<DbContact>, ReconcileError> {
        self.run_blocking(move |db| {
            Ok(db.list_contacts(email.as_deref(), phone_number.as_deref())?)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ReconcileError>
    where
        T: Send + 'static,
        F: FnOnce(&ContactDb) -> Result<T, ReconcileError> + Send + 'static,
    {
        let path = Arc::clone(&self.db_path);
        let busy_timeout = self.busy_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let db = ContactDb::connect(&path, busy_timeout)?;
            f(&db)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(ReconcileError::StoreUnavailable(format!(
                "contact store task failed: {e}"
            ))),
        }
    }
}
