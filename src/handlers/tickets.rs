use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{json_body, parse_id, query_params};
use crate::models::ticket::{Ticket, TicketStatus};
use crate::models::user::Actor;
use crate::services::Services;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveTicketsRequest {
    #[serde(alias = "eventID", alias = "event_id")]
    pub event_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub status: TicketStatus,
    pub reserved_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub price: Decimal,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            event_id: ticket.event_id,
            status: ticket.status,
            reserved_at: ticket.reserved_at,
            paid_at: ticket.paid_at,
            price: ticket.price,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<TicketStatus>,
}

pub async fn reserve_tickets(
    State(services): State<Services>,
    actor: Actor,
    payload: Result<Json<ReserveTicketsRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = json_body(payload)?;
    let tickets = services
        .tickets
        .reserve(&actor, request.event_id, request.quantity)
        .await?;

    let body: Vec<TicketResponse> = tickets.into_iter().map(TicketResponse::from).collect();
    Ok(created(body, "Tickets reserved"))
}

pub async fn my_tickets(
    State(services): State<Services>,
    actor: Actor,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> AppResult<Response> {
    let query = query_params(query)?;
    let tickets = services.tickets.list_my_tickets(&actor, query.status).await?;

    let body: Vec<TicketResponse> = tickets.into_iter().map(TicketResponse::from).collect();
    Ok(success(body, "Tickets retrieved"))
}

pub async fn get_ticket(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let ticket = services.tickets.get_ticket(&actor, parse_id(&id)?).await?;
    Ok(success(TicketResponse::from(ticket), "Ticket retrieved"))
}

pub async fn cancel_ticket(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let ticket = services.tickets.cancel_ticket(&actor, parse_id(&id)?).await?;
    Ok(success(TicketResponse::from(ticket), "Ticket cancelled"))
}

pub async fn confirm_payment(
    State(services): State<Services>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let ticket = services.tickets.confirm_payment(&actor, parse_id(&id)?).await?;
    Ok(success(TicketResponse::from(ticket), "Payment confirmed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_request_accepts_event_id_spellings() {
        let id = Uuid::new_v4();
        for key in ["eventId", "eventID", "event_id"] {
            let raw = format!(r#"{{"{}":"{}","quantity":2}}"#, key, id);
            let request: ReserveTicketsRequest = serde_json::from_str(&raw).unwrap();
            assert_eq!(request.event_id, id);
            assert_eq!(request.quantity, 2);
        }
    }

    #[test]
    fn test_negative_quantity_does_not_parse() {
        let raw = format!(r#"{{"eventId":"{}","quantity":-1}}"#, Uuid::new_v4());
        assert!(serde_json::from_str::<ReserveTicketsRequest>(&raw).is_err());
    }

    #[test]
    fn test_ticket_response_field_names() {
        let ticket = Ticket::reserved(Uuid::new_v4(), Uuid::new_v4(), Decimal::new(1250, 2), Utc::now());
        let json = serde_json::to_value(TicketResponse::from(ticket)).unwrap();

        for field in ["id", "eventId", "status", "reservedAt", "paidAt", "price"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["status"], "reserved");
    }
}
