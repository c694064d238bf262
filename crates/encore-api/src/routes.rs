//! Route definitions

use axum::{Router, middleware, routing::{get, post, put}};
use encore_core::{
    Acclaim, Bio, Calendar, Collaborator, Disc, Entity, Music, Photo, Piece, Product, Program,
};

use crate::handlers::admin::{self, CalendarCollaborators, CalendarPieces, ProgramPieces};
use crate::handlers::{self, public};
use crate::middleware::auth::require_admin;
use crate::server::AppState;

/// Public read-only routes
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/bio", get(handlers::list::<Bio>))
        .route("/api/acclaims", get(handlers::list::<Acclaim>))
        .route("/api/music", get(handlers::list::<Music>))
        .route("/api/photos", get(public::gallery))
        .route("/api/discs", get(handlers::list::<Disc>))
        .route("/api/calendar/upcoming", get(public::upcoming))
        .route("/api/calendar/archive", get(public::archive))
        .route("/api/calendar/search", get(public::search))
        .route("/api/calendar/{id}", get(public::calendar))
        .route("/api/shop/products", get(handlers::list::<Product>))
        .route("/api/shop/products/{id}", get(handlers::get_one::<Product>))
        .route("/api/shop/sku/{sku}", get(public::product_by_sku))
}

/// `GET/POST {base}` and `GET/PUT/DELETE {base}/{id}` for `E`
fn crud<E: Entity>(router: Router<AppState>, base: &str) -> Router<AppState> {
    router
        .route(base, get(handlers::list::<E>).post(handlers::create::<E>))
        .route(
            &format!("{}/{{id}}", base),
            get(handlers::get_one::<E>)
                .put(handlers::update::<E>)
                .delete(handlers::delete::<E>),
        )
}

/// Admin routes, mounted under `/api/admin` behind the admin key
pub fn admin_routes(state: AppState) -> Router<AppState> {
    let mut router = Router::new();
    router = crud::<Calendar>(router, "/calendar");
    router = crud::<Piece>(router, "/pieces");
    router = crud::<Collaborator>(router, "/collaborators");
    router = crud::<Program>(router, "/programs");
    router = crud::<Music>(router, "/music");
    router = crud::<Disc>(router, "/discs");
    router = crud::<Acclaim>(router, "/acclaims");
    router = crud::<Bio>(router, "/bio");
    router = crud::<Photo>(router, "/photos");
    router = crud::<Product>(router, "/products");

    router
        // Ordered joins
        .route(
            "/calendar/{id}/pieces",
            get(admin::calendar_pieces)
                .post(admin::link::<CalendarPieces>)
                .put(admin::reorder::<CalendarPieces>),
        )
        .route(
            "/calendar/{id}/pieces/{piece_id}",
            put(admin::set_order::<CalendarPieces>).delete(admin::unlink::<CalendarPieces>),
        )
        .route(
            "/calendar/{id}/collaborators",
            get(admin::calendar_collaborators)
                .post(admin::link::<CalendarCollaborators>)
                .put(admin::reorder::<CalendarCollaborators>),
        )
        .route(
            "/calendar/{id}/collaborators/{collaborator_id}",
            put(admin::set_order::<CalendarCollaborators>)
                .delete(admin::unlink::<CalendarCollaborators>),
        )
        .route(
            "/programs/{id}/pieces",
            get(admin::program_pieces)
                .post(admin::link::<ProgramPieces>)
                .put(admin::reorder::<ProgramPieces>),
        )
        .route(
            "/programs/{id}/pieces/{piece_id}",
            put(admin::set_order::<ProgramPieces>).delete(admin::unlink::<ProgramPieces>),
        )
        .route("/calendar/{id}/program/{program_id}", post(admin::apply_program))
        // Sync control
        .route("/sync/jobs", get(admin::sync_jobs))
        .route("/calendar/{id}/sync", post(admin::sync_calendar))
        .route("/sync/resync", post(admin::resync))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(public_routes())
        .nest("/api/admin", admin_routes(state))
}
