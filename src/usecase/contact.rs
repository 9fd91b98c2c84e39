use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Contact, ContactFilter, QueryParameter};
use crate::repository::{ContactStorage, RepoResult};

/// Contact use cases.
pub struct ContactUseCase {
    storage: Arc<dyn ContactStorage>,
}

impl ContactUseCase {
    pub fn new(storage: Arc<dyn ContactStorage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, contacts: Vec<Contact>) -> RepoResult<Vec<Contact>> {
        self.storage.create_contacts(contacts).await
    }

    pub async fn update(&self, contact: Contact) -> RepoResult<Contact> {
        self.storage.update_contact(contact).await
    }

    pub async fn delete(&self, id: Uuid) -> RepoResult<()> {
        self.storage.delete_contact(id).await
    }

    pub async fn read(&self, id: Uuid) -> RepoResult<Contact> {
        self.storage.read_contact(id).await
    }

    pub async fn list(
        &self,
        filter: &ContactFilter,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        self.storage.list_contacts(filter, params).await
    }

    pub async fn count(&self, filter: &ContactFilter) -> RepoResult<u64> {
        self.storage.count_contacts(filter).await
    }
}
