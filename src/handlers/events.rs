use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::tickets::{StatusQuery, TicketResponse};
use crate::handlers::{json_body, parse_id, query_params};
use crate::models::event::{Event, EventDetails, EventStatus};
use crate::models::user::Actor;
use crate::services::Services;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub capacity: i32,
    pub tickets_sold: i32,
    pub remaining_capacity: i64,
    pub price: Decimal,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            remaining_capacity: event.remaining_capacity(),
            id: event.id,
            organizer_id: event.organizer_id,
            title: event.title,
            description: event.description,
            location: event.location,
            date: event.date,
            capacity: event.capacity,
            tickets_sold: event.tickets_sold,
            price: event.price,
            status: event.status,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizerEventsQuery {
    pub organizer_id: Option<Uuid>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetCapacityRequest {
    pub capacity: i32,
}

fn event_list(events: Vec<Event>) -> Vec<EventResponse> {
    events.into_iter().map(EventResponse::from).collect()
}

pub async fn create_event(
    State(services): State<Services>,
    actor: Actor,
    payload: Result<Json<EventDetails>, JsonRejection>,
) -> AppResult<Response> {
    let details = json_body(payload)?;
    let event = services.events.create_event(&actor, details).await?;
    Ok(created(EventResponse::from(event), "Event created"))
}

pub async fn list_events(
    State(services): State<Services>,
    actor: Actor,
    query: Result<Query<EventListQuery>, QueryRejection>,
) -> AppResult<Response> {
    let query = query_params(query)?;
    let events = services.events.list_events(&actor, query.status).await?;
    Ok(success(event_list(events), "Events retrieved"))
}

pub async fn list_organizer_events(
    State(services): State<Services>,
    actor: Actor,
    query: Result<Query<OrganizerEventsQuery>, QueryRejection>,
) -> AppResult<Response> {
    let query = query_params(query)?;
    let events = services
        .events
        .list_organizer_events(&actor, query.organizer_id, query.status)
        .await?;
    Ok(success(event_list(events), "Organizer events retrieved"))
}

pub async fn get_event(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let event = services.events.get_event(&actor, parse_id(&id)?).await?;
    Ok(success(EventResponse::from(event), "Event retrieved"))
}

pub async fn update_event(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<EventDetails>, JsonRejection>,
) -> AppResult<Response> {
    let event_id = parse_id(&id)?;
    let details = json_body(payload)?;
    let event = services.events.update_event(&actor, event_id, details).await?;
    Ok(success(EventResponse::from(event), "Event updated"))
}

pub async fn cancel_event(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let event = services.events.cancel_event(&actor, parse_id(&id)?).await?;
    Ok(success(EventResponse::from(event), "Event cancelled"))
}

pub async fn delete_event(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let event = services.events.delete_event(&actor, parse_id(&id)?).await?;
    Ok(success(EventResponse::from(event), "Event deleted"))
}

pub async fn set_capacity(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<SetCapacityRequest>, JsonRejection>,
) -> AppResult<Response> {
    let event_id = parse_id(&id)?;
    let request = json_body(payload)?;
    let event = services
        .events
        .set_capacity(&actor, event_id, request.capacity)
        .await?;
    Ok(success(EventResponse::from(event), "Capacity updated"))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityResponse {
    pub event_id: Uuid,
    pub remaining_capacity: i64,
}

pub async fn remaining_capacity(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let event_id = parse_id(&id)?;
    let remaining = services.events.remaining_capacity(&actor, event_id).await?;
    let body = CapacityResponse {
        event_id,
        remaining_capacity: remaining,
    };
    Ok(success(body, "Remaining capacity retrieved"))
}

pub async fn list_event_tickets(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> AppResult<Response> {
    let event_id = parse_id(&id)?;
    let query = query_params(query)?;
    let tickets = services
        .tickets
        .list_event_tickets(&actor, event_id, query.status)
        .await?;

    let body: Vec<TicketResponse> = tickets.into_iter().map(TicketResponse::from).collect();
    Ok(success(body, "Event tickets retrieved"))
}
