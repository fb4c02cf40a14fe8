use async_trait::async_trait;
use contacts_core::{
    CanonicalStatus, Contact, ContactQuery, FieldTooLong, NewContact, UniqueField,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a contact with this {0} already exists")]
    UniquenessViolation(UniqueField),
    /// A value the schema rejects (too wide, failed check constraint).
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("status {0:?} is still referenced by contacts")]
    StatusInUse(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<FieldTooLong> for StoreError {
    fn from(err: FieldTooLong) -> Self {
        StoreError::InvalidValue(err.to_string())
    }
}

/// Durable contact store. Phone and email are unique across contacts,
/// status names are unique across the taxonomy, and a status cannot be
/// deleted while a contact references it.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StoreError>;

    async fn update_contact(&self, id: i64, contact: NewContact) -> Result<Contact, StoreError>;

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, StoreError>;

    async fn delete_contact(&self, id: i64) -> Result<(), StoreError>;

    async fn list_contacts(&self, query: &ContactQuery) -> Result<Vec<Contact>, StoreError>;

    /// Insert-or-fetch-existing; concurrent callers with the same name get
    /// the same row.
    async fn find_or_create_status(&self, name: &str) -> Result<CanonicalStatus, StoreError>;

    async fn find_status(&self, name: &str) -> Result<Option<CanonicalStatus>, StoreError>;

    /// First status by name ordering.
    async fn first_status(&self) -> Result<Option<CanonicalStatus>, StoreError>;

    async fn list_statuses(&self) -> Result<Vec<CanonicalStatus>, StoreError>;

    /// Moves every contact from one status to another; returns how many moved.
    async fn reassign_status(&self, from_id: i64, to_id: i64) -> Result<u64, StoreError>;

    async fn delete_status(&self, id: i64) -> Result<(), StoreError>;
}
