//! Read-only endpoints used by the public site

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use encore_core::model::DATE_TIME_FORMAT;
use encore_core::store::{Cmp, Filter};
use encore_core::{Calendar, CalendarAggregate, ListQuery, Photo, Product, Store};

use crate::error::Result;
use crate::server::AppState;

/// Midnight `days` away from the current UTC date, in stored date-time format.
fn utc_midnight(now: DateTime<Utc>, days: i64) -> String {
    (now.date_naive() + Duration::days(days))
        .and_time(NaiveTime::MIN)
        .format(DATE_TIME_FORMAT)
        .to_string()
}

/// Filters selecting upcoming (or past) events.
///
/// Today's date differs by at most one day between any timezone and UTC, so
/// only events dated yesterday or today (UTC) need their own timezone to
/// decide; those that fall on the other side are excluded by id.
fn day_filters(store: &Store, now: DateTime<Utc>, upcoming: bool) -> Result<Vec<Filter>> {
    let borderline = store.list::<Calendar>(
        &ListQuery::default()
            .with_filter(Filter::new("date_time", Cmp::Ge, utc_midnight(now, -1)))
            .with_filter(Filter::new("date_time", Cmp::Lt, utc_midnight(now, 1))),
    )?;

    let mut filters = vec![if upcoming {
        Filter::new("date_time", Cmp::Ge, utc_midnight(now, -1))
    } else {
        Filter::new("date_time", Cmp::Lt, utc_midnight(now, 1))
    }];
    filters.extend(
        borderline
            .iter()
            .filter(|calendar| calendar.is_upcoming(now) != upcoming)
            .map(|calendar| Filter::new("id", Cmp::Ne, calendar.id)),
    );
    Ok(filters)
}

fn aggregates(store: &Store, query: &ListQuery) -> Result<Vec<CalendarAggregate>> {
    let calendars = store.list::<Calendar>(query)?;
    let mut out = Vec::with_capacity(calendars.len());
    for calendar in calendars {
        if let Some(aggregate) = store.find_calendar_aggregate(calendar.id)? {
            out.push(aggregate);
        }
    }
    Ok(out)
}

/// Events from today on, soonest first.
pub async fn upcoming(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<CalendarAggregate>>> {
    let Query(mut query) = query?;
    query.order_by.get_or_insert_with(|| "date_time".to_string());
    query.desc.get_or_insert(false);
    query.filters.extend(day_filters(&state.store, Utc::now(), true)?);
    Ok(Json(aggregates(&state.store, &query)?))
}

/// Past events, most recent first.
pub async fn archive(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<CalendarAggregate>>> {
    let Query(mut query) = query?;
    query.filters.extend(day_filters(&state.store, Utc::now(), false)?);
    Ok(Json(aggregates(&state.store, &query)?))
}

/// `GET /api/calendar/search?q=`
pub async fn search(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<CalendarAggregate>>> {
    let Query(query) = query?;
    Ok(Json(aggregates(&state.store, &query)?))
}

/// One event with its pieces and collaborators in order.
pub async fn calendar(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<CalendarAggregate>> {
    Ok(Json(state.store.calendar_aggregate(id)?))
}

/// Photos shown in the gallery.
pub async fn gallery(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Photo>>> {
    let Query(query) = query?;
    let query = query.with_filter(Filter::new("omit_from_gallery", Cmp::Eq, false));
    Ok(Json(state.store.list::<Photo>(&query)?))
}

pub async fn product_by_sku(State(state): State<AppState>, Path(sku): Path<String>) -> Result<Json<Product>> {
    Ok(Json(state.store.product_by_sku(&sku)?))
}
