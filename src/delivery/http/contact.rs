use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, ListQuery, Page};
use crate::domain::{Contact, ContactDetails, ContactFilter};

/// Request body for creating or replacing a contact. Missing fields are
/// reported by validation rather than by the JSON extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub phone_number: String,
    pub email: Option<String>,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub age: u8,
}

impl From<ContactRequest> for ContactDetails {
    fn from(req: ContactRequest) -> Self {
        ContactDetails {
            phone_number: req.phone_number,
            email: req.email.filter(|e| !e.is_empty()),
            name: req.name,
            surname: req.surname,
            patronymic: req.patronymic,
            age: req.age,
        }
    }
}

pub(super) async fn create(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let contact = Contact::new(body.into())?;
    let mut created = state.contacts.create(vec![contact]).await?;
    let contact = created
        .pop()
        .ok_or(ApiError::Internal("insert returned no contact"))?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<Contact>>, ApiError> {
    let params = query.parameters(Contact::SORT_COLUMNS)?;
    let filter = ContactFilter {
        phone_number: query.phone_number,
    };
    let (items, total) = tokio::try_join!(
        state.contacts.list(&filter, &params),
        state.contacts.count(&filter)
    )?;
    Ok(Json(Page::new(items, total, &params)))
}

pub(super) async fn read(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Contact>, ApiError> {
    Ok(Json(state.contacts.read(id).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ContactRequest>,
) -> Result<Json<Contact>, ApiError> {
    let contact = Contact::with_id(id, body.into())?;
    Ok(Json(state.contacts.update(contact).await?))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.contacts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
