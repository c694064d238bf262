//! Admin-only endpoints beyond plain CRUD: ordered joins and sync control

use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
};
use encore_core::store::{
    CALENDAR_COLLABORATORS, CALENDAR_PIECES, Link, LinkTable, PROGRAM_PIECES,
};
use encore_core::{
    Calendar, CalendarAggregate, JobStatus, LinkedCollaborator, LinkedPiece, SyncJob,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, Result};
use crate::server::AppState;

/// A join table addressable from the admin routes.
pub trait Join: Send + Sync + 'static {
    const TABLE: &'static LinkTable;
}

pub struct CalendarPieces;
pub struct CalendarCollaborators;
pub struct ProgramPieces;

impl Join for CalendarPieces {
    const TABLE: &'static LinkTable = &CALENDAR_PIECES;
}

impl Join for CalendarCollaborators {
    const TABLE: &'static LinkTable = &CALENDAR_COLLABORATORS;
}

impl Join for ProgramPieces {
    const TABLE: &'static LinkTable = &PROGRAM_PIECES;
}

/// Body of `POST /{parent}/{id}/{children}`
#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    /// Child id
    pub id: i64,
    /// Position; appended when absent
    pub order: Option<i64>,
}

/// Body of `PUT /{parent}/{id}/{children}/{child_id}`
#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order: i64,
}

/// Body of `PUT /{parent}/{id}/{children}`: every linked child id in display order
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub queued: usize,
}

pub async fn calendar_pieces(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Vec<LinkedPiece>>> {
    state.store.get::<Calendar>(id)?;
    Ok(Json(state.store.calendar_pieces(id)?))
}

pub async fn calendar_collaborators(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LinkedCollaborator>>> {
    state.store.get::<Calendar>(id)?;
    Ok(Json(state.store.calendar_collaborators(id)?))
}

pub async fn program_pieces(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Vec<LinkedPiece>>> {
    Ok(Json(state.store.program_pieces(id)?))
}

pub async fn link<J: Join>(
    State(state): State<AppState>,
    Path(parent): Path<i64>,
    payload: std::result::Result<Json<LinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Link>)> {
    let Json(request) = payload?;
    let link = state.store.link(J::TABLE, parent, request.id, request.order)?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn set_order<J: Join>(
    State(state): State<AppState>,
    Path((parent, child)): Path<(i64, i64)>,
    payload: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<Link>> {
    let Json(request) = payload?;
    Ok(Json(state.store.set_link_order(J::TABLE, parent, child, request.order)?))
}

pub async fn reorder<J: Join>(
    State(state): State<AppState>,
    Path(parent): Path<i64>,
    payload: std::result::Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<Vec<Link>>> {
    let Json(request) = payload?;
    Ok(Json(state.store.reorder_links(J::TABLE, parent, &request.ids)?))
}

pub async fn unlink<J: Join>(
    State(state): State<AppState>,
    Path((parent, child)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    state.store.unlink(J::TABLE, parent, child)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace a calendar's pieces with a program's.
pub async fn apply_program(
    State(state): State<AppState>,
    Path((calendar_id, program_id)): Path<(i64, i64)>,
) -> Result<Json<CalendarAggregate>> {
    Ok(Json(state.store.apply_program(calendar_id, program_id)?))
}

/// `GET /sync/jobs?status=pending|failed`
pub async fn sync_jobs(
    State(state): State<AppState>,
    query: std::result::Result<Query<JobsQuery>, QueryRejection>,
) -> Result<Json<Vec<SyncJob>>> {
    let Query(query) = query?;
    Ok(Json(state.store.sync_jobs(query.status)?))
}

/// Without a dispatcher queued jobs would never run.
fn require_sync(state: &AppState) -> Result<()> {
    if state.config.gcal.enabled {
        Ok(())
    } else {
        Err(ApiError::SyncDisabled)
    }
}

/// Queue a push of one calendar.
pub async fn sync_calendar(State(state): State<AppState>, Path(id): Path<i64>) -> Result<(StatusCode, Json<SyncJob>)> {
    require_sync(&state)?;
    let job = state.store.enqueue_sync(id)?;
    info!("Manual sync queued for calendar #{}", id);
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Queue every calendar and revive failed jobs.
pub async fn resync(State(state): State<AppState>) -> Result<(StatusCode, Json<ResyncResponse>)> {
    require_sync(&state)?;
    let queued = state.store.enqueue_all_calendars()?;
    Ok((StatusCode::ACCEPTED, Json(ResyncResponse { queued })))
}
