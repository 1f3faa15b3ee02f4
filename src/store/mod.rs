//! Storage contract for events, tickets and the per-event capacity ledger.
//!
//! Two backends implement it: [`PgStore`] over a Postgres pool, and
//! [`MemoryStore`] for tests and local runs. Every method that reads and then
//! writes an event row does so inside one atomic unit, so concurrent
//! reservations never oversell.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::event::{Event, EventDetails, EventStatus};
use crate::models::ticket::{NewReservation, Ticket, TicketStatus};
use crate::utils::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Capacity accounting of a single event.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    /// `capacity - tickets_sold`, or `NotFound`.
    async fn remaining_capacity(&self, event_id: Uuid) -> AppResult<i64>;

    /// Advances the sold counter. Fails with `NotFound` if the event row is gone.
    async fn increment_sold(&self, event_id: Uuid, by: u32) -> AppResult<()>;

    /// Administrative override. Not checked against the sold count.
    async fn set_capacity(&self, event_id: Uuid, capacity: i32) -> AppResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub organizer_id: Option<Uuid>,
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, event: &Event) -> AppResult<()>;

    async fn find_event(&self, event_id: Uuid) -> AppResult<Event>;

    /// Events matching `filter`, ordered by date.
    async fn list_events(&self, filter: &EventFilter) -> AppResult<Vec<Event>>;

    /// Replaces the editable fields of an active event.
    async fn update_event_details(
        &self,
        event_id: Uuid,
        details: &EventDetails,
        now: DateTime<Utc>,
    ) -> AppResult<Event>;

    /// Moves an active event to cancelled and cancels its reserved tickets,
    /// releasing their seats.
    async fn cancel_event(&self, event_id: Uuid, now: DateTime<Utc>) -> AppResult<Event>;

    /// Bulk active -> finished for every event dated strictly before `now`.
    async fn finish_past_events(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketFilter {
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Checks status and remaining capacity, creates the tickets and advances
    /// the ledger as one atomic unit. Tickets come back in creation order.
    async fn reserve(&self, reservation: &NewReservation) -> AppResult<Vec<Ticket>>;

    async fn find_ticket(&self, ticket_id: Uuid) -> AppResult<Ticket>;

    /// Tickets matching `filter`, in creation order.
    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<Ticket>>;

    /// reserved -> cancelled, returning the seat to the ledger.
    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket>;

    /// reserved -> paid, stamping `paid_at`.
    async fn mark_paid(&self, ticket_id: Uuid, paid_at: DateTime<Utc>) -> AppResult<Ticket>;

    /// Bulk reserved -> expired for reservations made at or before `cutoff`,
    /// returning their seats to the ledger.
    async fn expire_stale_tickets(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>)
        -> AppResult<u64>;
}

/// Everything the services need from persistence.
pub trait Store: CapacityLedger + EventRepository + TicketRepository {}

impl<T> Store for T where T: CapacityLedger + EventRepository + TicketRepository {}

/// Status and capacity gate applied to the locked event row before any ticket
/// is written.
pub(crate) fn ensure_reservable(event: &Event, reservation: &NewReservation) -> AppResult<()> {
    if !event.is_open_for_sale(reservation.reserved_at) {
        return Err(AppError::EventNotActive(event.id));
    }

    let remaining = event.remaining_capacity();
    if remaining < i64::from(reservation.quantity) {
        return Err(AppError::InsufficientTickets {
            requested: reservation.quantity,
            remaining: remaining.max(0),
        });
    }

    Ok(())
}

/// Editable fields may change only while the event is active, and capacity
/// may not drop below what has already been sold.
pub(crate) fn ensure_editable(event: &Event, details: &EventDetails) -> AppResult<()> {
    if event.status.is_terminal() {
        return Err(AppError::EventAlreadyFinished(event.status));
    }
    if details.capacity < event.tickets_sold {
        return Err(AppError::ValidationError(format!(
            "capacity {} is below the {} tickets already sold",
            details.capacity, event.tickets_sold
        )));
    }
    Ok(())
}

pub(crate) fn quantity_as_i32(quantity: u32) -> AppResult<i32> {
    i32::try_from(quantity)
        .map_err(|_| AppError::ValidationError(format!("quantity {} is too large", quantity)))
}
