use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

/// Lifecycle of a ticket. Only `Reserved` may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
pub enum TicketStatus {
    Reserved,
    Paid,
    Cancelled,
    Expired,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Reserved => "reserved",
            TicketStatus::Paid => "paid",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Expired => "expired",
        }
    }

    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        self == TicketStatus::Reserved && next != TicketStatus::Reserved
    }

    pub fn transition(self, next: TicketStatus) -> AppResult<TicketStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTicketStatus(self))
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: TicketStatus,
    pub reserved_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Event price at reservation time; never recalculated.
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn reserved(event_id: Uuid, user_id: Uuid, price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id: Some(user_id),
            status: TicketStatus::Reserved,
            reserved_at: now,
            paid_at: None,
            price,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_held_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }

    /// Still reserved, and reserved at or before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Reserved && self.reserved_at <= cutoff
    }
}

/// Request to turn a purchase intent into ticket rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub quantity: u32,
    pub reserved_at: DateTime<Utc>,
}
