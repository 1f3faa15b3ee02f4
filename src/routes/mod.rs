use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::create_cors_layer;
use crate::handlers::{events, health_check, tickets};
use crate::services::Services;

fn api_routes() -> Router<Services> {
    Router::new()
        .route(
            "/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/cancel", put(events::cancel_event))
        .route(
            "/events/:id/capacity",
            get(events::remaining_capacity).put(events::set_capacity),
        )
        .route("/events/:id/tickets", get(events::list_event_tickets))
        .route("/organizer/events", get(events::list_organizer_events))
        .route("/tickets/reserve", post(tickets::reserve_tickets))
        .route("/tickets/my", get(tickets::my_tickets))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/cancel", put(tickets::cancel_ticket))
        .route("/tickets/:id/pay", put(tickets::confirm_payment))
}

pub fn create_routes(services: Services, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(services)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(allowed_origins))
}
