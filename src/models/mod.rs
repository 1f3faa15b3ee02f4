pub mod event;
pub mod ticket;
pub mod user;

pub use event::{Event, EventDetails, EventStatus};
pub use ticket::{NewReservation, Ticket, TicketStatus};
pub use user::{Actor, Role};
