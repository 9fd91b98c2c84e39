//! Storage contracts and their implementations.
//!
//! # Responsibility
//! - Define the storage operations the use-case layer depends on.
//! - Own the physical representation of contacts, groups and memberships,
//!   including the denormalized `group.contact_count`.
//!
//! # Invariants
//! - Every write that touches memberships recomputes the affected groups'
//!   `contact_count` inside the same transaction.
//! - At most one membership exists per `(group, contact)` pair.
//! - Failures are logged where they are detected and returned unchanged;
//!   nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Contact, ContactFilter, Group, QueryParameter};

pub mod membership;
pub mod memory;
pub mod postgres;
pub mod transaction;

pub use memory::MemoryStorage;
pub use postgres::PgRepository;

pub type RepoResult<T> = Result<T, RepoError>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("constraint violation: {message}")]
    Constraint {
        constraint: Option<String>,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("transaction commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    /// The rollback itself failed. `cause` is the error that triggered it.
    #[error("transaction rollback failed: {source} (rolled back because: {cause})")]
    Rollback {
        source: sqlx::Error,
        cause: Box<RepoError>,
    },

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl RepoError {
    /// True when the store could not be reached in time.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RepoError::Timeout(_)
                | RepoError::Database(sqlx::Error::PoolTimedOut)
                | RepoError::Database(sqlx::Error::PoolClosed)
                | RepoError::Database(sqlx::Error::Io(_))
        )
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
            {
                return RepoError::Constraint {
                    constraint: db.constraint().map(str::to_string),
                    message: db.message().to_string(),
                };
            }
        }
        RepoError::Database(err)
    }
}

/// Converts and logs a storage failure at the point of detection. The
/// caller's `#[instrument]` span supplies the operation context.
pub(crate) fn log_error<E: Into<RepoError>>(err: E) -> RepoError {
    let err = err.into();
    tracing::error!(error = %err, "storage operation failed");
    err
}

/// Contact persistence.
#[async_trait]
pub trait ContactStorage: Send + Sync {
    /// Inserts all contacts in one transaction and returns them as stored.
    async fn create_contacts(&self, contacts: Vec<Contact>) -> RepoResult<Vec<Contact>>;
    /// Replaces the editable details of an existing contact.
    async fn update_contact(&self, contact: Contact) -> RepoResult<Contact>;
    /// Deletes a contact and its memberships, keeping group counts in sync.
    async fn delete_contact(&self, id: Uuid) -> RepoResult<()>;
    async fn read_contact(&self, id: Uuid) -> RepoResult<Contact>;
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>>;
    async fn count_contacts(&self, filter: &ContactFilter) -> RepoResult<u64>;
}

/// Group persistence. `contact_count` is never written through this trait.
#[async_trait]
pub trait GroupStorage: Send + Sync {
    async fn create_group(&self, group: Group) -> RepoResult<Group>;
    /// Replaces name and description of an existing group.
    async fn update_group(&self, group: Group) -> RepoResult<Group>;
    /// Deletes a group; its memberships go with it.
    async fn delete_group(&self, id: Uuid) -> RepoResult<()>;
    async fn read_group(&self, id: Uuid) -> RepoResult<Group>;
    async fn list_groups(&self, params: &QueryParameter) -> RepoResult<Vec<Group>>;
    async fn count_groups(&self) -> RepoResult<u64>;
}

/// Group membership reconciliation.
#[async_trait]
pub trait ContactInGroupStorage: Send + Sync {
    /// Creates `contacts` and attaches them to `group_id` in one transaction.
    /// On any failure neither the contacts nor the memberships persist.
    async fn create_contacts_into_group(
        &self,
        group_id: Uuid,
        contacts: Vec<Contact>,
    ) -> RepoResult<Vec<Contact>>;

    /// Attaches existing contacts, skipping the ones already attached.
    /// Returns how many memberships were inserted.
    async fn add_contacts_to_group(&self, group_id: Uuid, contact_ids: Vec<Uuid>)
        -> RepoResult<u64>;

    /// Detaches one contact. A missing membership is not an error.
    async fn delete_contact_from_group(&self, group_id: Uuid, contact_id: Uuid) -> RepoResult<()>;

    /// Lists the contacts attached to `group_id`.
    async fn list_contacts_in_group(
        &self,
        group_id: Uuid,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>>;
}

/// Everything the group use case needs from storage.
pub trait GroupRepository: GroupStorage + ContactInGroupStorage {}

impl<T: GroupStorage + ContactInGroupStorage> GroupRepository for T {}
