use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::{Event, EventStatus};
use crate::models::ticket::Ticket;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Organizer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Organizer => "organizer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "organizer" => Ok(Role::Organizer),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::AuthError(format!("unknown role '{}'", other))),
        }
    }
}

/// The authenticated caller, as supplied by the upstream identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn can_create_events(&self) -> bool {
        match self.role {
            Role::Admin | Role::Organizer => true,
            Role::User => false,
        }
    }

    /// Update, cancel, delete and ticket listings of an event.
    pub fn can_manage_event(&self, event: &Event) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Organizer => event.is_owned_by(self.user_id),
            Role::User => false,
        }
    }

    pub fn can_view_event(&self, event: &Event) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Organizer => {
                event.is_owned_by(self.user_id) || event.status == EventStatus::Active
            }
            Role::User => event.status == EventStatus::Active,
        }
    }

    /// Viewing or cancelling a ticket. `event` is the ticket's event.
    pub fn can_access_ticket(&self, ticket: &Ticket, event: &Event) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Organizer => ticket.is_held_by(self.user_id) || event.is_owned_by(self.user_id),
            Role::User => ticket.is_held_by(self.user_id),
        }
    }
}
