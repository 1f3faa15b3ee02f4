use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::event::Event;
use crate::models::ticket::{NewReservation, Ticket, TicketStatus};
use crate::models::user::{Actor, Role};
use crate::services::{bounded, Policy};
use crate::store::{Store, TicketFilter};
use crate::utils::error::{AppError, AppResult};

pub struct TicketService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: Policy,
}

impl TicketService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: Policy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Loads a ticket with its event and checks the caller may act on it.
    async fn load_accessible(&self, actor: &Actor, ticket_id: Uuid) -> AppResult<(Ticket, Event)> {
        let limit = self.policy.operation_timeout;
        let ticket = bounded(limit, self.store.find_ticket(ticket_id)).await?;
        let event = bounded(limit, self.store.find_event(ticket.event_id)).await?;

        if !actor.can_access_ticket(&ticket, &event) {
            return Err(AppError::NotAuthorized(format!(
                "ticket {} does not belong to this caller",
                ticket_id
            )));
        }
        Ok((ticket, event))
    }

    /// Creates `quantity` reserved tickets for the caller.
    ///
    /// The per-purchase cap is checked before storage is touched. The status
    /// check, capacity check, ticket inserts and ledger increment then run as
    /// one atomic unit inside the store.
    pub async fn reserve(
        &self,
        actor: &Actor,
        event_id: Uuid,
        quantity: u32,
    ) -> AppResult<Vec<Ticket>> {
        if quantity == 0 {
            return Err(AppError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        let max = self.policy.max_tickets_per_purchase;
        if quantity > max {
            return Err(AppError::QuantityExceeded {
                requested: quantity,
                max,
            });
        }

        let reservation = NewReservation {
            event_id,
            user_id: actor.user_id,
            quantity,
            reserved_at: self.clock.now(),
        };
        let tickets = bounded(
            self.policy.operation_timeout,
            self.store.reserve(&reservation),
        )
        .await?;

        info!(
            event_id = %event_id,
            user_id = %actor.user_id,
            quantity,
            "Tickets reserved"
        );
        Ok(tickets)
    }

    pub async fn get_ticket(&self, actor: &Actor, ticket_id: Uuid) -> AppResult<Ticket> {
        let (ticket, _) = self.load_accessible(actor, ticket_id).await?;
        Ok(ticket)
    }

    pub async fn list_my_tickets(
        &self,
        actor: &Actor,
        status: Option<TicketStatus>,
    ) -> AppResult<Vec<Ticket>> {
        let filter = TicketFilter {
            user_id: Some(actor.user_id),
            status,
            ..TicketFilter::default()
        };
        bounded(self.policy.operation_timeout, self.store.list_tickets(&filter)).await
    }

    pub async fn list_event_tickets(
        &self,
        actor: &Actor,
        event_id: Uuid,
        status: Option<TicketStatus>,
    ) -> AppResult<Vec<Ticket>> {
        let limit = self.policy.operation_timeout;
        let event = bounded(limit, self.store.find_event(event_id)).await?;
        if !actor.can_manage_event(&event) {
            return Err(AppError::NotAuthorized(format!(
                "tickets of event {} are not visible to this caller",
                event_id
            )));
        }

        let filter = TicketFilter {
            event_id: Some(event_id),
            status,
            ..TicketFilter::default()
        };
        bounded(limit, self.store.list_tickets(&filter)).await
    }

    /// reserved -> cancelled; the seat goes back to the event.
    pub async fn cancel_ticket(&self, actor: &Actor, ticket_id: Uuid) -> AppResult<Ticket> {
        self.load_accessible(actor, ticket_id).await?;

        let cancelled = bounded(
            self.policy.operation_timeout,
            self.store.cancel_ticket(ticket_id, self.clock.now()),
        )
        .await?;

        info!(ticket_id = %ticket_id, actor = %actor.user_id, "Ticket cancelled");
        Ok(cancelled)
    }

    /// reserved -> paid. Stands in for a payment provider callback.
    pub async fn confirm_payment(&self, actor: &Actor, ticket_id: Uuid) -> AppResult<Ticket> {
        match actor.role {
            Role::Admin => {}
            Role::Organizer | Role::User => {
                return Err(AppError::NotAuthorized(
                    "only admins can confirm payments".to_string(),
                ))
            }
        }

        let paid = bounded(
            self.policy.operation_timeout,
            self.store.mark_paid(ticket_id, self.clock.now()),
        )
        .await?;

        debug!(ticket_id = %ticket_id, "Ticket paid");
        Ok(paid)
    }
}
