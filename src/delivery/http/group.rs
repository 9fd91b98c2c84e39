use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, ContactRequest, ListQuery, Page};
use crate::domain::{Contact, Group, GroupDetails, ValidationError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupRequest {
    pub name: String,
    pub description: String,
}

impl From<GroupRequest> for GroupDetails {
    fn from(req: GroupRequest) -> Self {
        GroupDetails {
            name: req.name,
            description: req.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub contact_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachResponse {
    /// Memberships actually inserted; already attached contacts are skipped.
    pub added: u64,
}

pub(super) async fn create(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = Group::new(body.into())?;
    let group = state.groups.create(group).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<Group>>, ApiError> {
    let params = query.parameters(Group::SORT_COLUMNS)?;
    let (items, total) = tokio::try_join!(state.groups.list(&params), state.groups.count())?;
    Ok(Json(Page::new(items, total, &params)))
}

pub(super) async fn read(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Group>, ApiError> {
    Ok(Json(state.groups.read(id).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<GroupRequest>,
) -> Result<Json<Group>, ApiError> {
    let group = Group::with_id(id, body.into())?;
    Ok(Json(state.groups.update(group).await?))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.groups.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn create_contacts(
    State(state): State<AppState>,
    ApiPath(group_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<Vec<ContactRequest>>,
) -> Result<(StatusCode, Json<Vec<Contact>>), ApiError> {
    let contacts = body
        .into_iter()
        .map(|req| Contact::new(req.into()))
        .collect::<Result<Vec<_>, ValidationError>>()?;
    let created = state
        .groups
        .create_contacts_into_group(group_id, contacts)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `total` is the group's stored `contact_count`.
pub(super) async fn list_contacts(
    State(state): State<AppState>,
    ApiPath(group_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<Contact>>, ApiError> {
    let params = query.parameters(Contact::SORT_COLUMNS)?;
    let group = state.groups.read(group_id).await?;
    let items = state.groups.list_contacts(group_id, &params).await?;
    Ok(Json(Page::new(items, group.contact_count(), &params)))
}

pub(super) async fn add_contacts(
    State(state): State<AppState>,
    ApiPath(group_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AttachRequest>,
) -> Result<Json<AttachResponse>, ApiError> {
    let added = state
        .groups
        .add_contacts_to_group(group_id, body.contact_ids)
        .await?;
    Ok(Json(AttachResponse { added }))
}

pub(super) async fn add_contact(
    State(state): State<AppState>,
    ApiPath((group_id, contact_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<AttachResponse>, ApiError> {
    let added = state
        .groups
        .add_contact_to_group(group_id, contact_id)
        .await?;
    Ok(Json(AttachResponse { added }))
}

pub(super) async fn delete_contact(
    State(state): State<AppState>,
    ApiPath((group_id, contact_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .groups
        .delete_contact_from_group(group_id, contact_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
