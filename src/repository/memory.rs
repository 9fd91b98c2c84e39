//! In-process storage with the same contract as the PostgreSQL repository.
//!
//! Each write works on a copy of the state and publishes it only on success,
//! which gives the all-or-nothing behaviour of a transaction. Used by the
//! use-case and HTTP tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::membership::{existence_map, missing_members, MembershipRow};
use super::{ContactInGroupStorage, ContactStorage, GroupStorage, RepoError, RepoResult};
use crate::domain::{Contact, ContactFilter, Direction, Group, Pagination, QueryParameter, Sorts};

#[derive(Debug, Default, Clone)]
struct State {
    contacts: HashMap<Uuid, Contact>,
    groups: HashMap<Uuid, Group>,
    /// Keyed by `(group_id, contact_id)`.
    memberships: HashMap<(Uuid, Uuid), MembershipRow>,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    existence_checks: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of membership existence lookups performed so far.
    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(AtomicOrdering::Relaxed)
    }

    /// Number of membership rows currently stored for `group_id`.
    pub async fn membership_rows(&self, group_id: Uuid) -> usize {
        self.state.lock().await.member_ids(group_id).len()
    }

    async fn read<T>(&self, op: impl FnOnce(&State) -> RepoResult<T>) -> RepoResult<T> {
        let state = self.state.lock().await;
        op(&state)
    }

    async fn transact<T>(&self, op: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let value = op(&mut draft)?;
        *state = draft;
        Ok(value)
    }

    fn fill_group(&self, state: &mut State, group_id: Uuid, contact_ids: &[Uuid]) -> RepoResult<u64> {
        let existing = self.check_exist_contact_in_group(state, group_id, contact_ids);
        let exists = existence_map(contact_ids, &existing);
        let missing = missing_members(contact_ids, &exists);
        if missing.is_empty() {
            return Ok(0);
        }

        if !state.groups.contains_key(&group_id) {
            return Err(foreign_key("contact_in_group_group_id_fkey", "group", group_id));
        }
        if let Some(&absent) = missing.iter().find(|id| !state.contacts.contains_key(*id)) {
            return Err(foreign_key("contact_in_group_contact_id_fkey", "contact", absent));
        }

        for row in MembershipRow::stamped(group_id, &missing, Utc::now()) {
            state.memberships.insert((row.group_id, row.contact_id), row);
        }
        state.refresh_counts(&[group_id]);
        Ok(missing.len() as u64)
    }

    fn check_exist_contact_in_group(
        &self,
        state: &State,
        group_id: Uuid,
        contact_ids: &[Uuid],
    ) -> Vec<Uuid> {
        if contact_ids.is_empty() {
            return Vec::new();
        }
        self.existence_checks.fetch_add(1, AtomicOrdering::Relaxed);
        contact_ids
            .iter()
            .copied()
            .filter(|id| state.memberships.contains_key(&(group_id, *id)))
            .collect()
    }
}

impl State {
    fn member_ids(&self, group_id: Uuid) -> Vec<Uuid> {
        self.memberships
            .keys()
            .filter(|(group, _)| *group == group_id)
            .map(|(_, contact)| *contact)
            .collect()
    }

    fn refresh_counts(&mut self, group_ids: &[Uuid]) {
        for &group_id in group_ids {
            let count = self.member_ids(group_id).len() as u64;
            if let Some(group) = self.groups.get_mut(&group_id) {
                *group = Group::restore(
                    group.id(),
                    group.created_at(),
                    Utc::now(),
                    group.details().clone(),
                    count,
                );
            }
        }
    }

    fn insert_contacts(&mut self, contacts: Vec<Contact>) -> RepoResult<Vec<Contact>> {
        for contact in &contacts {
            if self.contacts.contains_key(&contact.id()) {
                return Err(RepoError::Constraint {
                    constraint: Some("contact_pkey".to_string()),
                    message: format!("duplicate contact id {}", contact.id()),
                });
            }
            self.contacts.insert(contact.id(), contact.clone());
        }
        Ok(contacts)
    }

    fn group_exists(&self, id: Uuid) -> RepoResult<()> {
        if self.groups.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::NotFound { entity: "group", id })
        }
    }
}

#[async_trait]
impl ContactStorage for MemoryStorage {
    async fn create_contacts(&self, contacts: Vec<Contact>) -> RepoResult<Vec<Contact>> {
        self.transact(|state| state.insert_contacts(contacts)).await
    }

    async fn update_contact(&self, contact: Contact) -> RepoResult<Contact> {
        self.transact(|state| {
            let current = state.contacts.get(&contact.id()).ok_or(RepoError::NotFound {
                entity: "contact",
                id: contact.id(),
            })?;
            let updated = Contact::restore(
                current.id(),
                current.created_at(),
                Utc::now(),
                contact.details().clone(),
            );
            state.contacts.insert(updated.id(), updated.clone());
            Ok(updated)
        })
        .await
    }

    async fn delete_contact(&self, id: Uuid) -> RepoResult<()> {
        self.transact(|state| {
            let groups: Vec<Uuid> = state
                .memberships
                .keys()
                .filter(|(_, contact)| *contact == id)
                .map(|(group, _)| *group)
                .collect();
            state.memberships.retain(|(_, contact), _| *contact != id);
            if state.contacts.remove(&id).is_none() {
                return Err(RepoError::NotFound {
                    entity: "contact",
                    id,
                });
            }
            state.refresh_counts(&groups);
            Ok(())
        })
        .await
    }

    async fn read_contact(&self, id: Uuid) -> RepoResult<Contact> {
        self.read(|state| {
            state.contacts.get(&id).cloned().ok_or(RepoError::NotFound {
                entity: "contact",
                id,
            })
        })
        .await
    }

    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        self.read(|state| {
            let matching = state
                .contacts
                .values()
                .filter(|c| matches_filter(c, filter))
                .cloned()
                .collect();
            Ok(sort_and_page(matching, params, compare_contacts))
        })
        .await
    }

    async fn count_contacts(&self, filter: &ContactFilter) -> RepoResult<u64> {
        self.read(|state| {
            Ok(state
                .contacts
                .values()
                .filter(|c| matches_filter(c, filter))
                .count() as u64)
        })
        .await
    }
}

#[async_trait]
impl GroupStorage for MemoryStorage {
    async fn create_group(&self, group: Group) -> RepoResult<Group> {
        self.transact(|state| {
            if state.groups.contains_key(&group.id()) {
                return Err(RepoError::Constraint {
                    constraint: Some("group_pkey".to_string()),
                    message: format!("duplicate group id {}", group.id()),
                });
            }
            state.groups.insert(group.id(), group.clone());
            Ok(group)
        })
        .await
    }

    async fn update_group(&self, group: Group) -> RepoResult<Group> {
        self.transact(|state| {
            let current = state.groups.get(&group.id()).ok_or(RepoError::NotFound {
                entity: "group",
                id: group.id(),
            })?;
            let updated = Group::restore(
                current.id(),
                current.created_at(),
                Utc::now(),
                group.details().clone(),
                current.contact_count(),
            );
            state.groups.insert(updated.id(), updated.clone());
            Ok(updated)
        })
        .await
    }

    async fn delete_group(&self, id: Uuid) -> RepoResult<()> {
        self.transact(|state| {
            if state.groups.remove(&id).is_none() {
                return Err(RepoError::NotFound { entity: "group", id });
            }
            state.memberships.retain(|(group, _), _| *group != id);
            Ok(())
        })
        .await
    }

    async fn read_group(&self, id: Uuid) -> RepoResult<Group> {
        self.read(|state| {
            state
                .groups
                .get(&id)
                .cloned()
                .ok_or(RepoError::NotFound { entity: "group", id })
        })
        .await
    }

    async fn list_groups(&self, params: &QueryParameter) -> RepoResult<Vec<Group>> {
        self.read(|state| {
            let groups = state.groups.values().cloned().collect();
            Ok(sort_and_page(groups, params, compare_groups))
        })
        .await
    }

    async fn count_groups(&self) -> RepoResult<u64> {
        self.read(|state| Ok(state.groups.len() as u64)).await
    }
}

#[async_trait]
impl ContactInGroupStorage for MemoryStorage {
    async fn create_contacts_into_group(
        &self,
        group_id: Uuid,
        contacts: Vec<Contact>,
    ) -> RepoResult<Vec<Contact>> {
        self.transact(|state| {
            let created = state.insert_contacts(contacts)?;
            let contact_ids: Vec<Uuid> = created.iter().map(Contact::id).collect();
            self.fill_group(state, group_id, &contact_ids)?;
            Ok(created)
        })
        .await
    }

    async fn add_contacts_to_group(
        &self,
        group_id: Uuid,
        contact_ids: Vec<Uuid>,
    ) -> RepoResult<u64> {
        self.transact(|state| self.fill_group(state, group_id, &contact_ids))
            .await
    }

    async fn delete_contact_from_group(&self, group_id: Uuid, contact_id: Uuid) -> RepoResult<()> {
        self.transact(|state| {
            state.memberships.remove(&(group_id, contact_id));
            state.refresh_counts(&[group_id]);
            Ok(())
        })
        .await
    }

    async fn list_contacts_in_group(
        &self,
        group_id: Uuid,
        params: &QueryParameter,
    ) -> RepoResult<Vec<Contact>> {
        self.read(|state| {
            state.group_exists(group_id)?;
            let members = state
                .member_ids(group_id)
                .iter()
                .filter_map(|id| state.contacts.get(id).cloned())
                .collect();
            Ok(sort_and_page(members, params, compare_contacts))
        })
        .await
    }
}

fn foreign_key(constraint: &str, entity: &str, id: Uuid) -> RepoError {
    RepoError::Constraint {
        constraint: Some(constraint.to_string()),
        message: format!("{entity} {id} does not exist"),
    }
}

fn matches_filter(contact: &Contact, filter: &ContactFilter) -> bool {
    match filter.phone_number.as_deref() {
        Some(phone) if !phone.is_empty() => contact.phone_number().contains(phone),
        _ => true,
    }
}

fn sort_and_page<T>(
    mut items: Vec<T>,
    params: &QueryParameter,
    compare: fn(&T, &T, &Sorts) -> Ordering,
) -> Vec<T> {
    items.sort_by(|a, b| compare(a, b, &params.sorts));
    page(items, params.pagination)
}

fn page<T>(items: Vec<T>, pagination: Pagination) -> Vec<T> {
    let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(pagination.limit()).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

fn compare_contacts(a: &Contact, b: &Contact, sorts: &Sorts) -> Ordering {
    let (x, y) = (a.details(), b.details());
    for sort in sorts.iter() {
        let ordering = match sort.column {
            "created_at" => a.created_at().cmp(&b.created_at()),
            "modified_at" => a.modified_at().cmp(&b.modified_at()),
            "phone_number" => x.phone_number.cmp(&y.phone_number),
            "email" => x.email.cmp(&y.email),
            "name" => x.name.cmp(&y.name),
            "surname" => x.surname.cmp(&y.surname),
            "patronymic" => x.patronymic.cmp(&y.patronymic),
            "age" => x.age.cmp(&y.age),
            _ => Ordering::Equal,
        };
        let ordering = directed(ordering, sort.direction);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.id().cmp(&b.id()))
}

fn compare_groups(a: &Group, b: &Group, sorts: &Sorts) -> Ordering {
    for sort in sorts.iter() {
        let ordering = match sort.column {
            "created_at" => a.created_at().cmp(&b.created_at()),
            "modified_at" => a.modified_at().cmp(&b.modified_at()),
            "name" => a.details().name.cmp(&b.details().name),
            "contact_count" => a.contact_count().cmp(&b.contact_count()),
            _ => Ordering::Equal,
        };
        let ordering = directed(ordering, sort.direction);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.created_at()
        .cmp(&b.created_at())
        .then_with(|| a.id().cmp(&b.id()))
}
