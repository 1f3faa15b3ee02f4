use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::event::{Event, EventDetails, EventStatus};
use crate::models::user::{Actor, Role};
use crate::services::{bounded, Policy};
use crate::store::{EventFilter, Store};
use crate::utils::error::{AppError, AppResult};

pub struct EventService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: Policy,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: Policy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    async fn load(&self, event_id: Uuid) -> AppResult<Event> {
        bounded(self.policy.operation_timeout, self.store.find_event(event_id)).await
    }

    /// Loads the event and checks the caller may manage it.
    async fn load_managed(&self, actor: &Actor, event_id: Uuid) -> AppResult<Event> {
        let event = self.load(event_id).await?;
        if !actor.can_manage_event(&event) {
            return Err(AppError::NotAuthorized(format!(
                "{} {} may not manage event {}",
                actor.role, actor.user_id, event_id
            )));
        }
        Ok(event)
    }

    pub async fn create_event(&self, actor: &Actor, details: EventDetails) -> AppResult<Event> {
        if !actor.can_create_events() {
            return Err(AppError::NotAuthorized(
                "only organizers and admins can create events".to_string(),
            ));
        }

        let now = self.clock.now();
        details.validate(now)?;

        let event = Event::new(actor.user_id, details, now);
        bounded(self.policy.operation_timeout, self.store.insert_event(&event)).await?;

        info!(event_id = %event.id, organizer_id = %event.organizer_id, "Event created");
        Ok(event)
    }

    pub async fn get_event(&self, actor: &Actor, event_id: Uuid) -> AppResult<Event> {
        let event = self.load(event_id).await?;
        if !actor.can_view_event(&event) {
            return Err(AppError::NotAuthorized(format!(
                "event {} is not visible to this caller",
                event_id
            )));
        }
        Ok(event)
    }

    /// Public listing. Ordinary users only ever see active events.
    pub async fn list_events(
        &self,
        actor: &Actor,
        status: Option<EventStatus>,
    ) -> AppResult<Vec<Event>> {
        let status = match actor.role {
            Role::User => Some(EventStatus::Active),
            Role::Organizer | Role::Admin => status,
        };
        let filter = EventFilter {
            status,
            organizer_id: None,
        };
        let mut events =
            bounded(self.policy.operation_timeout, self.store.list_events(&filter)).await?;

        // Same visibility as a single-event read
        events.retain(|event| actor.can_view_event(event));
        Ok(events)
    }

    /// Events owned by an organizer. Organizers see their own; admins may
    /// name any organizer, or none for every event.
    pub async fn list_organizer_events(
        &self,
        actor: &Actor,
        organizer_id: Option<Uuid>,
        status: Option<EventStatus>,
    ) -> AppResult<Vec<Event>> {
        let organizer_id = match actor.role {
            Role::Admin => organizer_id,
            Role::Organizer => match organizer_id {
                Some(id) if id != actor.user_id => {
                    return Err(AppError::NotAuthorized(
                        "organizers can only list their own events".to_string(),
                    ))
                }
                _ => Some(actor.user_id),
            },
            Role::User => {
                return Err(AppError::NotAuthorized(
                    "only organizers and admins can list organizer events".to_string(),
                ))
            }
        };

        let filter = EventFilter {
            status,
            organizer_id,
        };
        bounded(self.policy.operation_timeout, self.store.list_events(&filter)).await
    }

    pub async fn update_event(
        &self,
        actor: &Actor,
        event_id: Uuid,
        details: EventDetails,
    ) -> AppResult<Event> {
        let existing = self.load_managed(actor, event_id).await?;
        if existing.status.is_terminal() {
            return Err(AppError::EventAlreadyFinished(existing.status));
        }

        let now = self.clock.now();
        details.validate(now)?;

        let updated = bounded(
            self.policy.operation_timeout,
            self.store.update_event_details(event_id, &details, now),
        )
        .await?;

        info!(event_id = %event_id, "Event updated");
        Ok(updated)
    }

    pub async fn cancel_event(&self, actor: &Actor, event_id: Uuid) -> AppResult<Event> {
        self.load_managed(actor, event_id).await?;

        let cancelled = bounded(
            self.policy.operation_timeout,
            self.store.cancel_event(event_id, self.clock.now()),
        )
        .await?;

        info!(event_id = %event_id, actor = %actor.user_id, "Event cancelled");
        Ok(cancelled)
    }

    /// Soft delete: the event is cancelled, never removed.
    pub async fn delete_event(&self, actor: &Actor, event_id: Uuid) -> AppResult<Event> {
        let existing = self.load_managed(actor, event_id).await?;
        if existing.status == EventStatus::Finished {
            return Err(AppError::EventAlreadyFinished(existing.status));
        }

        let deleted = bounded(
            self.policy.operation_timeout,
            self.store.cancel_event(event_id, self.clock.now()),
        )
        .await?;

        info!(event_id = %event_id, actor = %actor.user_id, "Event deleted");
        Ok(deleted)
    }

    /// Administrative capacity override.
    pub async fn set_capacity(
        &self,
        actor: &Actor,
        event_id: Uuid,
        capacity: i32,
    ) -> AppResult<Event> {
        match actor.role {
            Role::Admin => {}
            Role::Organizer | Role::User => {
                return Err(AppError::NotAuthorized(
                    "only admins can override capacity".to_string(),
                ))
            }
        }
        if capacity < 1 {
            return Err(AppError::ValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }

        bounded(
            self.policy.operation_timeout,
            self.store.set_capacity(event_id, capacity),
        )
        .await?;

        let event = self.load(event_id).await?;
        if event.remaining_capacity() < 0 {
            tracing::warn!(
                event_id = %event_id,
                capacity,
                tickets_sold = event.tickets_sold,
                "Capacity set below tickets already sold"
            );
        }
        Ok(event)
    }

    pub async fn remaining_capacity(&self, actor: &Actor, event_id: Uuid) -> AppResult<i64> {
        self.get_event(actor, event_id).await?;
        bounded(
            self.policy.operation_timeout,
            self.store.remaining_capacity(event_id),
        )
        .await
    }
}
