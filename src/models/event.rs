use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

/// Lifecycle of an event. `Finished` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Finished,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Finished => "finished",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            EventStatus::Active => false,
            EventStatus::Finished | EventStatus::Cancelled => true,
        }
    }

    pub fn can_transition_to(self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Active, EventStatus::Finished) | (EventStatus::Active, EventStatus::Cancelled)
        )
    }

    /// Validates a move to `next`, failing with `EventAlreadyFinished` from a
    /// terminal state.
    pub fn transition(self, next: EventStatus) -> AppResult<EventStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::EventAlreadyFinished(self))
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub capacity: i32,
    pub tickets_sold: i32,
    pub price: Decimal,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(organizer_id: Uuid, details: EventDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organizer_id,
            title: details.title,
            description: details.description,
            location: details.location,
            date: details.date,
            capacity: details.capacity,
            tickets_sold: 0,
            price: details.price,
            status: EventStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats left on the ledger. Negative only after a capacity override
    /// below the sold count.
    pub fn remaining_capacity(&self) -> i64 {
        i64::from(self.capacity) - i64::from(self.tickets_sold)
    }

    /// An event accepts reservations while active and not yet started.
    pub fn is_open_for_sale(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Active && self.date > now
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.organizer_id == user_id
    }
}

const PRICE_SCALE: u32 = 2;
const MAX_PRICE_EXCLUSIVE: i64 = 10_000_000_000;

/// Organizer-editable fields of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub capacity: i32,
    pub price: Decimal,
}

impl EventDetails {
    pub fn validate(&self, now: DateTime<Utc>) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("title is required".to_string()));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::ValidationError("location is required".to_string()));
        }
        if self.capacity < 1 {
            return Err(AppError::ValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }
        // Matches the NUMERIC(12, 2) column, which would round or overflow
        if self.price.normalize().scale() > PRICE_SCALE {
            return Err(AppError::ValidationError(format!(
                "price may have at most {} decimal places",
                PRICE_SCALE
            )));
        }
        if self.price >= Decimal::from(MAX_PRICE_EXCLUSIVE) {
            return Err(AppError::ValidationError(format!(
                "price must be below {}",
                MAX_PRICE_EXCLUSIVE
            )));
        }
        if self.date <= now {
            return Err(AppError::ValidationError(
                "event date must be in the future".to_string(),
            ));
        }
        Ok(())
    }
}
