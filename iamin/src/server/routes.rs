//! Router configuration.

use super::health::readiness_check;
use super::state::AppState;
use crate::api::{attendees, auth, events, payments, waitlist, websocket};
use crate::auth::resolve_session;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, patch, post},
};
use iamin_web::correlation_id_layer;
use iamin_web::handlers::health_check;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete router.
///
/// - `/health`, `/ready`: probes, no session
/// - `/api/...`: JSON API and the roster socket, behind session resolution
///
/// Every request gets a correlation id and a trace span.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Auth
        .route("/auth/sign-in", post(auth::sign_in))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/google", get(auth::google))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/sign-out", post(auth::sign_out))
        .route("/auth/me", get(auth::me))
        // Events
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/mine", get(events::my_events))
        .route("/events/by-slug/:slug", get(events::event_by_slug))
        .route(
            "/events/:id",
            patch(events::update_event).delete(events::delete_event),
        )
        .route("/events/:id/gate", get(events::event_gate))
        .route("/events/:id/payment-links", get(payments::payment_links))
        // Registration and roster
        .route("/events/:id/register", post(attendees::register))
        .route("/events/:id/attendees", get(attendees::list_attendees))
        .route("/attendees/:id/paid", patch(attendees::set_paid))
        .route("/attendees/:id", delete(attendees::delete_attendee))
        // Waitlist
        .route(
            "/events/:id/waitlist",
            get(waitlist::list_waitlist).post(waitlist::request_spot),
        )
        // Live roster
        .route("/ws/events/:id/roster", get(websocket::roster_socket))
        .route_layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            resolve_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .layer(cors(&state.settings.public_base_url))
        .with_state(state)
}

/// Credentialed CORS for the web front end's origin.
fn cors(origin: &str) -> CorsLayer {
    let Ok(origin) = HeaderValue::from_str(origin) else {
        tracing::warn!(%origin, "Public base URL is not a valid origin; CORS disabled");
        return CorsLayer::new();
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}
