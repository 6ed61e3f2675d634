//! HTTP adapter exposing the repository over axum.
//!
//! # Routes
//!
//! - `POST /{child_name}` (optional `?parentID=`) - create a node
//! - `POST /{parent_id}/{child_name}` - create a node under a parent
//! - `GET /` - list the roots
//! - `GET /{id}` - fetch a node with its children; `0` lists the roots
//! - `PUT /{id}?parentID=` - move a node under a new parent
//! - `DELETE /{id}` - delete a node and its subtree
//!
//! Errors are returned as `{"error": "<message>"}`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::OrgTreeError;
use crate::node::{Node, NodeId};
use crate::repository::{Lookup, OrgTreeRepository};
use crate::traits::NodeStore;

type SharedRepository<S> = Arc<OrgTreeRepository<S>>;

/// Error body shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<OrgTreeError> for HttpError {
    fn from(err: OrgTreeError) -> Self {
        let status = match &err {
            OrgTreeError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrgTreeError::NameConflict { .. }
            | OrgTreeError::CycleRejected { .. }
            | OrgTreeError::Validation(_) => StatusCode::BAD_REQUEST,
            OrgTreeError::InvalidTree(_)
            | OrgTreeError::UnsupportedBackend
            | OrgTreeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if err.is_internal() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ParentQuery {
    #[serde(rename = "parentID")]
    parent_id: Option<String>,
}

/// Builds the router over a shared repository.
pub fn router<S: NodeStore>(repository: SharedRepository<S>) -> Router {
    Router::new()
        .route("/", get(list_roots::<S>))
        .route(
            "/{key}",
            post(create_root::<S>)
                .get(lookup::<S>)
                .put(change_parent::<S>)
                .delete(delete_subtree::<S>),
        )
        .route("/{parent_id}/{child_name}", post(create_child::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(repository)
}

/// A missing or empty id means `0`.
fn parse_id(raw: Option<&str>) -> Result<NodeId, HttpError> {
    match raw {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| HttpError::bad_request(format!("invalid id '{raw}'"))),
    }
}

async fn create_root<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
    Path(child_name): Path<String>,
    Query(query): Query<ParentQuery>,
) -> Result<(StatusCode, Json<Node>), HttpError> {
    let parent_id = parse_id(query.parent_id.as_deref())?;
    let node = repository.create(&child_name, parent_id).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn create_child<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
    Path((parent_id, child_name)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Node>), HttpError> {
    let parent_id = parse_id(Some(&parent_id))?;
    let node = repository.create(&child_name, parent_id).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn list_roots<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
) -> Result<Json<Vec<Node>>, HttpError> {
    Ok(Json(repository.roots().await?))
}

async fn lookup<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
    Path(id): Path<String>,
) -> Result<Json<Lookup>, HttpError> {
    let id = parse_id(Some(&id))?;
    Ok(Json(repository.lookup(id).await?))
}

async fn change_parent<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
    Path(id): Path<String>,
    Query(query): Query<ParentQuery>,
) -> Result<Json<()>, HttpError> {
    let id = parse_id(Some(&id))?;
    let parent_id = parse_id(query.parent_id.as_deref())?;
    repository.change_parent(id, parent_id).await?;
    Ok(Json(()))
}

async fn delete_subtree<S: NodeStore>(
    State(repository): State<SharedRepository<S>>,
    Path(id): Path<String>,
) -> Result<Json<()>, HttpError> {
    let id = parse_id(Some(&id))?;
    repository.delete(id).await?;
    Ok(Json(()))
}
