use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::event::{Event, EventDetails, EventStatus};
use crate::models::ticket::{NewReservation, Ticket, TicketStatus};
use crate::store::{
    ensure_editable, ensure_reservable, quantity_as_i32, CapacityLedger, EventFilter,
    EventRepository, TicketFilter, TicketRepository,
};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    // Insertion order is creation order
    tickets: Vec<Ticket>,
}

impl Tables {
    fn event_mut(&mut self, event_id: Uuid) -> AppResult<&mut Event> {
        self.events
            .get_mut(&event_id)
            .ok_or_else(|| AppError::event_not_found(event_id))
    }

    fn ticket_mut(&mut self, ticket_id: Uuid) -> AppResult<&mut Ticket> {
        self.tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| AppError::ticket_not_found(ticket_id))
    }

    fn release_seats(&mut self, event_id: Uuid, seats: i32, now: DateTime<Utc>) {
        if let Some(event) = self.events.get_mut(&event_id) {
            event.tickets_sold = (event.tickets_sold - seats).max(0);
            event.updated_at = now;
        }
    }
}

/// Process-local store. A single lock around both tables makes every
/// operation atomic and serializable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapacityLedger for MemoryStore {
    async fn remaining_capacity(&self, event_id: Uuid) -> AppResult<i64> {
        let mut tables = self.tables.lock().await;
        Ok(tables.event_mut(event_id)?.remaining_capacity())
    }

    async fn increment_sold(&self, event_id: Uuid, by: u32) -> AppResult<()> {
        let by = quantity_as_i32(by)?;
        let mut tables = self.tables.lock().await;
        let event = tables.event_mut(event_id)?;
        event.tickets_sold = event.tickets_sold.saturating_add(by);
        Ok(())
    }

    async fn set_capacity(&self, event_id: Uuid, capacity: i32) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.event_mut(event_id)?.capacity = capacity;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: &Event) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.events.contains_key(&event.id) {
            return Err(AppError::ValidationError(format!(
                "Event with id '{}' already exists",
                event.id
            )));
        }
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event(&self, event_id: Uuid) -> AppResult<Event> {
        let mut tables = self.tables.lock().await;
        tables.event_mut(event_id).map(|event| event.clone())
    }

    async fn list_events(&self, filter: &EventFilter) -> AppResult<Vec<Event>> {
        let tables = self.tables.lock().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| filter.status.map_or(true, |s| e.status == s))
            .filter(|e| filter.organizer_id.map_or(true, |id| e.organizer_id == id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        Ok(events)
    }

    async fn update_event_details(
        &self,
        event_id: Uuid,
        details: &EventDetails,
        now: DateTime<Utc>,
    ) -> AppResult<Event> {
        let mut tables = self.tables.lock().await;
        let event = tables.event_mut(event_id)?;
        ensure_editable(event, details)?;

        event.title = details.title.clone();
        event.description = details.description.clone();
        event.location = details.location.clone();
        event.date = details.date;
        event.capacity = details.capacity;
        event.price = details.price;
        event.updated_at = now;
        Ok(event.clone())
    }

    async fn cancel_event(&self, event_id: Uuid, now: DateTime<Utc>) -> AppResult<Event> {
        let mut tables = self.tables.lock().await;
        let event = tables.event_mut(event_id)?;
        let next = event.status.transition(EventStatus::Cancelled)?;
        event.status = next;
        event.updated_at = now;

        let mut released = 0;
        for ticket in tables
            .tickets
            .iter_mut()
            .filter(|t| t.event_id == event_id && t.status == TicketStatus::Reserved)
        {
            ticket.status = TicketStatus::Cancelled;
            ticket.updated_at = now;
            released += 1;
        }
        tables.release_seats(event_id, released, now);

        tables.event_mut(event_id).map(|event| event.clone())
    }

    async fn finish_past_events(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut finished = 0;
        for event in tables
            .events
            .values_mut()
            .filter(|e| e.status == EventStatus::Active && e.date < now)
        {
            event.status = EventStatus::Finished;
            event.updated_at = now;
            finished += 1;
        }
        Ok(finished)
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn reserve(&self, reservation: &NewReservation) -> AppResult<Vec<Ticket>> {
        let mut tables = self.tables.lock().await;
        let event = tables.event_mut(reservation.event_id)?;
        ensure_reservable(event, reservation)?;

        let quantity = quantity_as_i32(reservation.quantity)?;
        event.tickets_sold += quantity;
        let (event_id, price) = (event.id, event.price);

        let tickets: Vec<Ticket> = (0..reservation.quantity)
            .map(|_| Ticket::reserved(event_id, reservation.user_id, price, reservation.reserved_at))
            .collect();
        tables.tickets.extend(tickets.iter().cloned());
        Ok(tickets)
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> AppResult<Ticket> {
        let mut tables = self.tables.lock().await;
        tables.ticket_mut(ticket_id).map(|ticket| ticket.clone())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<Ticket>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .filter(|t| filter.event_id.map_or(true, |id| t.event_id == id))
            .filter(|t| filter.user_id.map_or(true, |id| t.user_id == Some(id)))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
        let mut tables = self.tables.lock().await;
        let ticket = tables.ticket_mut(ticket_id)?;
        ticket.status = ticket.status.transition(TicketStatus::Cancelled)?;
        ticket.updated_at = now;
        let cancelled = ticket.clone();

        tables.release_seats(cancelled.event_id, 1, now);
        Ok(cancelled)
    }

    async fn mark_paid(&self, ticket_id: Uuid, paid_at: DateTime<Utc>) -> AppResult<Ticket> {
        let mut tables = self.tables.lock().await;
        let ticket = tables.ticket_mut(ticket_id)?;
        ticket.status = ticket.status.transition(TicketStatus::Paid)?;
        ticket.paid_at = Some(paid_at);
        ticket.updated_at = paid_at;
        Ok(ticket.clone())
    }

    async fn expire_stale_tickets(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut released: HashMap<Uuid, i32> = HashMap::new();

        for ticket in tables
            .tickets
            .iter_mut()
            .filter(|t| t.is_stale(cutoff))
        {
            ticket.status = TicketStatus::Expired;
            ticket.updated_at = now;
            *released.entry(ticket.event_id).or_default() += 1;
        }

        let mut expired = 0;
        for (event_id, seats) in released {
            tables.release_seats(event_id, seats, now);
            expired += u64::try_from(seats).unwrap_or_default();
        }
        Ok(expired)
    }
}
