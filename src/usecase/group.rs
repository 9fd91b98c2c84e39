use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Contact, Group, QueryParameter};
use crate::repository::{GroupRepository, RepoResult};

/// Group and membership use cases. Membership calls go straight to the
/// repository, which owns the reconciliation.
pub struct GroupUseCase {
    storage: Arc<dyn GroupRepository>,
}

impl GroupUseCase {
    pub fn new(storage: Arc<dyn GroupRepository>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, group: Group) -> RepoResult<Group> {
        self.storage.create_group(group).await
    }

    pub async fn update(&self, group: Group) -> RepoResult<Group> {
        self.storage.update_group(group).await
    }

    pub async fn delete(&self, id: Uuid) -> RepoResult<()> {
        self.storage.delete_group(id).await
    }

    pub async fn read(&self, id: Uuid) -> RepoResult<Group> {
        self.storage.read_group(id).await
    }

    pub async fn list(&self, params: &QueryParameter) -> RepoResult<Vec<Group>> {
        self.storage.list_groups(params).await
    }

    pub async fn count(&self) -> RepoResult<u64> {
        self.storage.count_groups().await
    }

    pub async fn create_contacts_into_group(
        &self,
        group_id: Uuid,
        contacts: Vec<Contact>,
    ) -> RepoResult<Vec<Contact>> {
        self.storage
            .create_contacts_into_group(group_id, contacts)
            .await
    }

    pub async fn add_contact_to_group(&self, group_id: Uuid, contact_id: Uuid) -> RepoResult<u64> {
        self.storage
            .add_contacts_to_group(group_id, vec![contact_id])
            .await
    }

    pub async fn add_contacts_to_group(
        &self,
        group_id: Uuid,
        contact_ids: Vec<Uuid>,
    ) -> RepoResult<u64> {
        self.storage.add_contacts_to_group(group_id, contact_ids).await
    }

    pub async fn delete_contact_from_group(
        &self,
        group_id: Uuid,
        contact_id: Uuid,
    ) -> RepoResult<()> {
        self.storage
            .delete_contact_from_group(group_id, contact_id)
            .await
    }

    pub async fn list_contacts(
        &self,
        group_id: Uuid,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        self.storage.list_contacts_in_group(group_id, params).await
    }
}
