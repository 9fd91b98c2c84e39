//! HTTP delivery: axum routes over the use-case layer.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::domain::{Pagination, QueryError, QueryParameter, Sorts};
use crate::usecase::{ContactUseCase, GroupUseCase};

mod contact;
mod error;
mod extract;
mod group;

pub use contact::ContactRequest;
pub use error::ApiError;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use group::{AttachRequest, AttachResponse, GroupRequest};

#[derive(Clone)]
pub struct AppState {
    contacts: Arc<ContactUseCase>,
    groups: Arc<GroupUseCase>,
}

impl AppState {
    pub fn new(contacts: ContactUseCase, groups: GroupUseCase) -> Self {
        Self {
            contacts: Arc::new(contacts),
            groups: Arc::new(groups),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/contacts", post(contact::create).get(contact::list))
        .route(
            "/contacts/:id",
            get(contact::read)
                .put(contact::update)
                .delete(contact::delete),
        )
        .route("/groups", post(group::create).get(group::list))
        .route(
            "/groups/:id",
            get(group::read).put(group::update).delete(group::delete),
        )
        .route(
            "/groups/:id/contacts",
            post(group::create_contacts)
                .get(group::list_contacts)
                .put(group::add_contacts),
        )
        .route(
            "/groups/:id/contacts/:contact_id",
            put(group::add_contact).delete(group::delete_contact),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Query string shared by listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Comma-separated columns, `-` prefix for descending.
    pub sort: Option<String>,
    /// Substring filter, contacts only.
    pub phone_number: Option<String>,
}

impl ListQuery {
    pub fn parameters(&self, sort_columns: &[&'static str]) -> Result<QueryParameter, QueryError> {
        Ok(QueryParameter {
            sorts: Sorts::parse(self.sort.as_deref().unwrap_or(""), sort_columns)?,
            pagination: Pagination::new(self.limit, self.offset)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, total: u64, params: &QueryParameter) -> Self {
        Self {
            items,
            total,
            limit: params.pagination.limit(),
            offset: params.pagination.offset(),
        }
    }
}
