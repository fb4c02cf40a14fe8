use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contacts_core::{
    check_status_name, CanonicalStatus, Contact, ContactQuery, ContactSort, NewContact,
    UniqueField,
};
use tokio::sync::Mutex;

use crate::records::{ContactStore, StoreError};

#[derive(Debug, Clone)]
struct StoredContact {
    id: i64,
    fields: NewContact,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    statuses: Vec<CanonicalStatus>,
    contacts: Vec<StoredContact>,
    next_status_id: i64,
    next_contact_id: i64,
}

impl MemoryState {
    fn status(&self, id: i64) -> Option<&CanonicalStatus> {
        self.statuses.iter().find(|s| s.id == id)
    }

    fn materialize(&self, stored: &StoredContact) -> Result<Contact, StoreError> {
        let status = self
            .status(stored.fields.status_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "status",
                id: stored.fields.status_id,
            })?;
        Ok(Contact {
            id: stored.id,
            first_name: stored.fields.first_name.clone(),
            last_name: stored.fields.last_name.clone(),
            phone: stored.fields.phone.clone(),
            email: stored.fields.email.clone(),
            city: stored.fields.city.clone(),
            status,
            created_at: stored.created_at,
        })
    }

    /// Uniqueness check against every contact except `exclude_id`.
    fn check_unique(&self, fields: &NewContact, exclude_id: Option<i64>) -> Result<(), StoreError> {
        let others = self
            .contacts
            .iter()
            .filter(|c| Some(c.id) != exclude_id);
        for other in others {
            if other.fields.phone == fields.phone {
                return Err(StoreError::UniquenessViolation(UniqueField::Phone));
            }
            if other.fields.email == fields.email {
                return Err(StoreError::UniquenessViolation(UniqueField::Email));
            }
        }
        Ok(())
    }

    fn require_status(&self, id: i64) -> Result<(), StoreError> {
        match self.status(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                entity: "status",
                id,
            }),
        }
    }
}

/// In-process record store with the same constraints as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    state: Mutex<MemoryState>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contact_count(&self) -> usize {
        self.state.lock().await.contacts.len()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StoreError> {
        contact.check_lengths()?;
        let mut state = self.state.lock().await;
        state.require_status(contact.status_id)?;
        state.check_unique(&contact, None)?;

        state.next_contact_id += 1;
        let stored = StoredContact {
            id: state.next_contact_id,
            fields: contact,
            created_at: Utc::now(),
        };
        let created = state.materialize(&stored)?;
        state.contacts.push(stored);
        Ok(created)
    }

    async fn update_contact(&self, id: i64, contact: NewContact) -> Result<Contact, StoreError> {
        contact.check_lengths()?;
        let mut state = self.state.lock().await;
        state.require_status(contact.status_id)?;
        state.check_unique(&contact, Some(id))?;

        let idx = state
            .contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or(StoreError::NotFound {
                entity: "contact",
                id,
            })?;
        state.contacts[idx].fields = contact;
        let stored = state.contacts[idx].clone();
        state.materialize(&stored)
    }

    async fn get_contact(&self, id: i64) -> Result<Option<Contact>, StoreError> {
        let state = self.state.lock().await;
        state
            .contacts
            .iter()
            .find(|c| c.id == id)
            .map(|c| state.materialize(c))
            .transpose()
    }

    async fn delete_contact(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let before = state.contacts.len();
        state.contacts.retain(|c| c.id != id);
        if state.contacts.len() == before {
            return Err(StoreError::NotFound {
                entity: "contact",
                id,
            });
        }
        Ok(())
    }

    async fn list_contacts(&self, query: &ContactQuery) -> Result<Vec<Contact>, StoreError> {
        let state = self.state.lock().await;
        let mut contacts = state
            .contacts
            .iter()
            .map(|c| state.materialize(c))
            .collect::<Result<Vec<_>, _>>()?;
        contacts.retain(|c| query.matches(c));

        match query.sort {
            ContactSort::LastName => contacts.sort_by(|a, b| {
                (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name))
            }),
            ContactSort::CreatedAt => {
                contacts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
            }
        }
        Ok(contacts)
    }

    async fn find_or_create_status(&self, name: &str) -> Result<CanonicalStatus, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.statuses.iter().find(|s| s.name == name) {
            return Ok(existing.clone());
        }
        check_status_name(name)?;
        state.next_status_id += 1;
        let status = CanonicalStatus {
            id: state.next_status_id,
            name: name.to_string(),
        };
        state.statuses.push(status.clone());
        Ok(status)
    }

    async fn find_status(&self, name: &str) -> Result<Option<CanonicalStatus>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.statuses.iter().find(|s| s.name == name).cloned())
    }

    async fn first_status(&self) -> Result<Option<CanonicalStatus>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.statuses.iter().min_by(|a, b| a.name.cmp(&b.name)).cloned())
    }

    async fn list_statuses(&self) -> Result<Vec<CanonicalStatus>, StoreError> {
        let state = self.state.lock().await;
        let mut statuses = state.statuses.clone();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }

    async fn reassign_status(&self, from_id: i64, to_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.require_status(to_id)?;
        let mut moved = 0;
        for contact in state.contacts.iter_mut().filter(|c| c.fields.status_id == from_id) {
            contact.fields.status_id = to_id;
            moved += 1;
        }
        Ok(moved)
    }

    async fn delete_status(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let status = state.status(id).cloned().ok_or(StoreError::NotFound {
            entity: "status",
            id,
        })?;
        if state.contacts.iter().any(|c| c.fields.status_id == id) {
            return Err(StoreError::StatusInUse(status.name));
        }
        state.statuses.retain(|s| s.id != id);
        Ok(())
    }
}
