//! HTTP API handlers
//!
//! Generic CRUD handlers work for any [`Entity`]; the routes instantiate
//! them once per record type.

pub mod admin;
pub mod public;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
};
use encore_core::{Entity, ListQuery};
use tracing::debug;

use crate::error::Result;
use crate::server::AppState;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// `GET /{entity}?q=&limit=&offset=&order_by=&desc=`
pub async fn list<E: Entity>(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<E>>> {
    let Query(query) = query?;
    Ok(Json(state.store.list::<E>(&query)?))
}

/// `GET /{entity}/{id}`
pub async fn get_one<E: Entity>(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<E>> {
    Ok(Json(state.store.get::<E>(id)?))
}

/// `POST /{entity}`
pub async fn create<E: Entity>(
    State(state): State<AppState>,
    payload: std::result::Result<Json<E>, JsonRejection>,
) -> Result<(StatusCode, Json<E>)> {
    let Json(record) = payload?;
    let created = state.store.create(record)?;
    debug!("Created {} #{}", E::KIND, created.id());
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /{entity}/{id}`
pub async fn update<E: Entity>(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: std::result::Result<Json<E>, JsonRejection>,
) -> Result<Json<E>> {
    let Json(record) = payload?;
    Ok(Json(state.store.update(id, record)?))
}

/// `DELETE /{entity}/{id}`
pub async fn delete<E: Entity>(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    state.store.delete::<E>(id)?;
    Ok(StatusCode::NO_CONTENT)
}
