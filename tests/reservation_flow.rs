use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use ticket_booking_server::clock::{Clock, ManualClock};
use ticket_booking_server::models::{Actor, EventDetails, EventStatus, Role, TicketStatus};
use ticket_booking_server::services::{Policy, Services};
use ticket_booking_server::store::{CapacityLedger, EventRepository, MemoryStore, TicketFilter, TicketRepository};
use ticket_booking_server::sweeper::{ExpirySweeper, SweeperConfig};
use ticket_booking_server::utils::AppError;

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    services: Services,
    sweeper: ExpirySweeper,
    organizer: Actor,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let services = Services::new(store.clone(), clock.clone(), Policy::default());
    let sweeper = ExpirySweeper::new(store.clone(), clock.clone(), SweeperConfig::default());

    Harness {
        store,
        clock,
        services,
        sweeper,
        organizer: Actor::new(Uuid::new_v4(), Role::Organizer),
    }
}

fn buyer() -> Actor {
    Actor::new(Uuid::new_v4(), Role::User)
}

async fn create_event(h: &Harness, capacity: i32, starts_in: Duration) -> Uuid {
    let details = EventDetails {
        title: "Jazz night".to_string(),
        description: "Late set".to_string(),
        location: "Blue Room".to_string(),
        date: h.clock.now() + starts_in,
        capacity,
        price: Decimal::new(3500, 2),
    };
    h.services
        .events
        .create_event(&h.organizer, details)
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_last_seats_then_sold_out() {
    let h = harness();
    let event_id = create_event(&h, 2, Duration::days(3)).await;

    let tickets = h.services.tickets.reserve(&buyer(), event_id, 2).await.unwrap();
    assert_eq!(tickets.len(), 2);

    let event = h.store.find_event(event_id).await.unwrap();
    assert_eq!(event.tickets_sold, 2);
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), 0);

    let err = h
        .services
        .tickets
        .reserve(&buyer(), event_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientTickets { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_oversell() {
    let h = harness();
    let event_id = create_event(&h, 10, Duration::days(3)).await;
    let services = h.services.clone();

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let services = services.clone();
        let quantity = i % 3 + 1;
        handles.push(tokio::spawn(async move {
            services
                .tickets
                .reserve(&buyer(), event_id, quantity)
                .await
                .map(|tickets| tickets.len() as i32)
        }));
    }

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(count) => granted += count,
            Err(AppError::InsufficientTickets { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let event = h.store.find_event(event_id).await.unwrap();
    assert!(granted <= 10);
    assert_eq!(event.tickets_sold, granted);

    let stored = h
        .store
        .list_tickets(&TicketFilter {
            event_id: Some(event_id),
            ..TicketFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(stored.len() as i32, granted);
    assert!(stored.iter().all(|t| t.status == TicketStatus::Reserved));
}

#[tokio::test]
async fn test_unpaid_reservation_expires_and_capacity_returns() {
    let h = harness();
    let event_id = create_event(&h, 5, Duration::days(3)).await;
    let holder = buyer();

    let ticket = h.services.tickets.reserve(&holder, event_id, 1).await.unwrap().remove(0);
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), 4);

    h.clock.advance(Duration::minutes(16));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.tickets_expired, 1);

    let expired = h.services.tickets.get_ticket(&holder, ticket.id).await.unwrap();
    assert_eq!(expired.status, TicketStatus::Expired);
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), 5);

    // An expired ticket can be neither cancelled nor paid
    assert!(matches!(
        h.services.tickets.cancel_ticket(&holder, ticket.id).await,
        Err(AppError::InvalidTicketStatus(TicketStatus::Expired))
    ));
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), 5);

    let admin = Actor::new(Uuid::new_v4(), Role::Admin);
    assert!(matches!(
        h.services.tickets.confirm_payment(&admin, ticket.id).await,
        Err(AppError::InvalidTicketStatus(TicketStatus::Expired))
    ));
}

#[tokio::test]
async fn test_paid_tickets_survive_the_sweep() {
    let h = harness();
    let event_id = create_event(&h, 5, Duration::days(3)).await;
    let admin = Actor::new(Uuid::new_v4(), Role::Admin);

    let ticket = h.services.tickets.reserve(&buyer(), event_id, 1).await.unwrap().remove(0);
    h.services.tickets.confirm_payment(&admin, ticket.id).await.unwrap();

    h.clock.advance(Duration::hours(1));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.tickets_expired, 0);
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_past_event_is_finished_and_closed_for_sale() {
    let h = harness();
    let event_id = create_event(&h, 5, Duration::hours(1)).await;

    h.clock.advance(Duration::hours(2));

    // Not yet swept, but already past its date
    assert!(matches!(
        h.services.tickets.reserve(&buyer(), event_id, 1).await,
        Err(AppError::EventNotActive(_))
    ));

    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.events_finished, 1);
    assert_eq!(
        h.store.find_event(event_id).await.unwrap().status,
        EventStatus::Finished
    );

    assert!(matches!(
        h.services.tickets.reserve(&buyer(), event_id, 1).await,
        Err(AppError::EventNotActive(_))
    ));
    assert!(matches!(
        h.services.events.cancel_event(&h.organizer, event_id).await,
        Err(AppError::EventAlreadyFinished(EventStatus::Finished))
    ));
}

#[tokio::test]
async fn test_quantity_over_cap_touches_nothing() {
    let h = harness();
    let event_id = create_event(&h, 50, Duration::days(3)).await;

    let err = h
        .services
        .tickets
        .reserve(&buyer(), event_id, 6)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuantityExceeded { requested: 6, max: 5 }));
    assert_eq!(h.store.find_event(event_id).await.unwrap().tickets_sold, 0);
}

#[tokio::test]
async fn test_capacity_override_below_sold_blocks_sales() {
    let h = harness();
    let event_id = create_event(&h, 10, Duration::days(3)).await;
    let admin = Actor::new(Uuid::new_v4(), Role::Admin);

    h.services.tickets.reserve(&buyer(), event_id, 4).await.unwrap();
    h.services.events.set_capacity(&admin, event_id, 2).await.unwrap();
    assert_eq!(h.store.remaining_capacity(event_id).await.unwrap(), -2);

    assert!(matches!(
        h.services.tickets.reserve(&buyer(), event_id, 1).await,
        Err(AppError::InsufficientTickets { remaining: 0, .. })
    ));
}

#[tokio::test]
async fn test_cancelling_event_releases_outstanding_reservations() {
    let h = harness();
    let event_id = create_event(&h, 10, Duration::days(3)).await;
    let holder = buyer();

    h.services.tickets.reserve(&holder, event_id, 3).await.unwrap();
    let cancelled = h
        .services
        .events
        .cancel_event(&h.organizer, event_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, EventStatus::Cancelled);
    assert_eq!(cancelled.tickets_sold, 0);

    let mine = h
        .services
        .tickets
        .list_my_tickets(&holder, Some(TicketStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);

    let seats_held = h
        .store
        .list_tickets(&TicketFilter {
            event_id: Some(event_id),
            ..TicketFilter::default()
        })
        .await
        .unwrap()
        .iter()
        .filter(|t| matches!(t.status, TicketStatus::Reserved | TicketStatus::Paid))
        .count();
    assert_eq!(seats_held, 0);
}
