use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::event::{Event, EventDetails, EventStatus};
use crate::models::ticket::{NewReservation, Ticket, TicketStatus};
use crate::store::{
    ensure_editable, ensure_reservable, quantity_as_i32, CapacityLedger, EventFilter,
    EventRepository, TicketFilter, TicketRepository,
};
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row-locks the event for the rest of the surrounding transaction.
async fn lock_event(conn: &mut PgConnection, event_id: Uuid) -> AppResult<Event> {
    sqlx::query_as::<_, Event>(
        r#"
        SELECT * FROM events
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::event_not_found(event_id))
}

async fn lock_ticket(conn: &mut PgConnection, ticket_id: Uuid) -> AppResult<Ticket> {
    sqlx::query_as::<_, Ticket>(
        r#"
        SELECT * FROM tickets
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(ticket_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::ticket_not_found(ticket_id))
}

async fn increment_sold_on(conn: &mut PgConnection, event_id: Uuid, by: u32) -> AppResult<()> {
    let by = quantity_as_i32(by)?;
    let result = sqlx::query(
        r#"
        UPDATE events
        SET tickets_sold = tickets_sold + $2
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .bind(by)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::event_not_found(event_id));
    }
    Ok(())
}

async fn release_seats_on(
    conn: &mut PgConnection,
    event_id: Uuid,
    seats: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if seats == 0 {
        return Ok(());
    }
    sqlx::query(
        r#"
        UPDATE events
        SET tickets_sold = GREATEST(tickets_sold - $2, 0), updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .bind(seats)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_ticket(conn: &mut PgConnection, ticket: &Ticket) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tickets
            (id, event_id, user_id, status, reserved_at, paid_at, price, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(ticket.id)
    .bind(ticket.event_id)
    .bind(ticket.user_id)
    .bind(ticket.status)
    .bind(ticket.reserved_at)
    .bind(ticket.paid_at)
    .bind(ticket.price)
    .bind(ticket.created_at)
    .bind(ticket.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl CapacityLedger for PgStore {
    async fn remaining_capacity(&self, event_id: Uuid) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT capacity::BIGINT - tickets_sold::BIGINT
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::event_not_found(event_id))
    }

    async fn increment_sold(&self, event_id: Uuid, by: u32) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        increment_sold_on(&mut conn, event_id, by).await
    }

    async fn set_capacity(&self, event_id: Uuid, capacity: i32) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET capacity = $2
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(capacity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::event_not_found(event_id));
        }
        Ok(())
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn insert_event(&self, event: &Event) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, organizer_id, title, description, location, date, capacity,
                 tickets_sold, price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.date)
        .bind(event.capacity)
        .bind(event.tickets_sold)
        .bind(event.price)
        .bind(event.status)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_event(&self, event_id: Uuid) -> AppResult<Event> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::event_not_found(event_id))
    }

    async fn list_events(&self, filter: &EventFilter) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE ($1::event_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR organizer_id = $2)
            ORDER BY date ASC, created_at ASC
            "#,
        )
        .bind(filter.status)
        .bind(filter.organizer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn update_event_details(
        &self,
        event_id: Uuid,
        details: &EventDetails,
        now: DateTime<Utc>,
    ) -> AppResult<Event> {
        let mut tx = self.pool.begin().await?;

        let existing = lock_event(&mut tx, event_id).await?;
        ensure_editable(&existing, details)?;

        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = $2, description = $3, location = $4, date = $5,
                capacity = $6, price = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(&details.title)
        .bind(&details.description)
        .bind(&details.location)
        .bind(details.date)
        .bind(details.capacity)
        .bind(details.price)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn cancel_event(&self, event_id: Uuid, now: DateTime<Utc>) -> AppResult<Event> {
        let mut tx = self.pool.begin().await?;

        let existing = lock_event(&mut tx, event_id).await?;
        let next = existing.status.transition(EventStatus::Cancelled)?;

        let released = sqlx::query(
            r#"
            UPDATE tickets
            SET status = $3, updated_at = $4
            WHERE event_id = $1 AND status = $2
            "#,
        )
        .bind(event_id)
        .bind(TicketStatus::Reserved)
        .bind(TicketStatus::Cancelled)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let cancelled = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET status = $2,
                tickets_sold = GREATEST(tickets_sold - $3, 0),
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(next)
        .bind(i64::try_from(released).unwrap_or(i64::MAX))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(event_id = %event_id, released, "Event cancelled");
        Ok(cancelled)
    }

    async fn finish_past_events(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $2, updated_at = $3
            WHERE status = $1 AND date < $3
            "#,
        )
        .bind(EventStatus::Active)
        .bind(EventStatus::Finished)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TicketRepository for PgStore {
    async fn reserve(&self, reservation: &NewReservation) -> AppResult<Vec<Ticket>> {
        let mut tx = self.pool.begin().await?;

        // Status, capacity and the counter write all see the same locked row
        let event = lock_event(&mut tx, reservation.event_id).await?;
        ensure_reservable(&event, reservation)?;

        let mut tickets = Vec::with_capacity(reservation.quantity as usize);
        for _ in 0..reservation.quantity {
            let ticket = Ticket::reserved(
                event.id,
                reservation.user_id,
                event.price,
                reservation.reserved_at,
            );
            insert_ticket(&mut tx, &ticket).await?;
            tickets.push(ticket);
        }

        increment_sold_on(&mut tx, event.id, reservation.quantity).await?;

        tx.commit().await?;
        Ok(tickets)
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> AppResult<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::ticket_not_found(ticket_id))
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> AppResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE ($1::uuid IS NULL OR event_id = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::ticket_status IS NULL OR status = $3)
            ORDER BY seq ASC
            "#,
        )
        .bind(filter.event_id)
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
        let event_id = self.find_ticket(ticket_id).await?.event_id;

        let mut tx = self.pool.begin().await?;

        // Event before ticket, the same order reservations and event
        // cancellation take their locks in.
        lock_event(&mut tx, event_id).await?;
        let ticket = lock_ticket(&mut tx, ticket_id).await?;
        let next = ticket.status.transition(TicketStatus::Cancelled)?;

        let cancelled = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(next)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        release_seats_on(&mut tx, event_id, 1, now).await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn mark_paid(&self, ticket_id: Uuid, paid_at: DateTime<Utc>) -> AppResult<Ticket> {
        let mut tx = self.pool.begin().await?;

        let ticket = lock_ticket(&mut tx, ticket_id).await?;
        let next = ticket.status.transition(TicketStatus::Paid)?;

        let paid = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $2, paid_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(next)
        .bind(paid_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(paid)
    }

    async fn expire_stale_tickets(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        // Event rows first, in id order, as every other path that touches
        // both tables does.
        let event_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM events
            WHERE id IN (
                SELECT DISTINCT event_id FROM tickets
                WHERE status = $1 AND reserved_at <= $2
            )
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(TicketStatus::Reserved)
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        if event_ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let expired = sqlx::query_scalar::<_, i64>(
            r#"
            WITH expired AS (
                UPDATE tickets
                SET status = $2, updated_at = $4
                WHERE status = $1 AND reserved_at <= $3 AND event_id = ANY($5)
                RETURNING event_id
            ),
            released AS (
                SELECT event_id, COUNT(*)::INTEGER AS seats
                FROM expired
                GROUP BY event_id
            ),
            ledger AS (
                UPDATE events e
                SET tickets_sold = GREATEST(e.tickets_sold - r.seats, 0),
                    updated_at = $4
                FROM released r
                WHERE e.id = r.event_id
                RETURNING r.seats
            )
            SELECT COALESCE(SUM(seats), 0)::BIGINT FROM ledger
            "#,
        )
        .bind(TicketStatus::Reserved)
        .bind(TicketStatus::Expired)
        .bind(cutoff)
        .bind(now)
        .bind(&event_ids)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(u64::try_from(expired).unwrap_or_default())
    }
}

/// These run against a scratch database named by `DATABASE_URL`.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use sqlx::postgres::PgPoolOptions;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .expect("Failed to connect to database");
        sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");
        PgStore::new(pool)
    }

    fn details(now: DateTime<Utc>, capacity: i32) -> EventDetails {
        EventDetails {
            title: "Integration".to_string(),
            description: String::new(),
            location: "Somewhere".to_string(),
            date: now + Duration::days(3),
            capacity,
            price: Decimal::new(1999, 2),
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_reserve_advances_ledger_atomically() {
        let store = store().await;
        let now = Utc::now();
        let event = Event::new(Uuid::new_v4(), details(now, 2), now);
        store.insert_event(&event).await.unwrap();

        let reservation = NewReservation {
            event_id: event.id,
            user_id: Uuid::new_v4(),
            quantity: 2,
            reserved_at: now,
        };
        let tickets = store.reserve(&reservation).await.unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(store.remaining_capacity(event.id).await.unwrap(), 0);

        let again = store.reserve(&NewReservation { quantity: 1, ..reservation }).await;
        assert!(matches!(again, Err(AppError::InsufficientTickets { .. })));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_reservations_do_not_oversell() {
        let store = store().await;
        let now = Utc::now();
        let event = Event::new(Uuid::new_v4(), details(now, 5), now);
        store.insert_event(&event).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let reservation = NewReservation {
                event_id: event.id,
                user_id: Uuid::new_v4(),
                quantity: 2,
                reserved_at: now,
            };
            handles.push(tokio::spawn(async move { store.reserve(&reservation).await }));
        }

        let mut sold = 0;
        for handle in handles {
            if let Ok(tickets) = handle.await.unwrap() {
                sold += tickets.len();
            }
        }

        assert!(sold <= 5);
        let stored = store.find_event(event.id).await.unwrap();
        assert_eq!(stored.tickets_sold as usize, sold);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_expiry_releases_seats() {
        let store = store().await;
        let now = Utc::now();
        let event = Event::new(Uuid::new_v4(), details(now, 3), now);
        store.insert_event(&event).await.unwrap();

        let reserved_at = now - Duration::minutes(20);
        store
            .reserve(&NewReservation {
                event_id: event.id,
                user_id: Uuid::new_v4(),
                quantity: 3,
                reserved_at,
            })
            .await
            .unwrap();

        let expired = store
            .expire_stale_tickets(now - Duration::minutes(15), now)
            .await
            .unwrap();
        assert!(expired >= 3);
        assert_eq!(store.remaining_capacity(event.id).await.unwrap(), 3);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_expiry_and_event_cancel_run_concurrently_without_deadlock() {
        let store = store().await;
        let now = Utc::now();

        for _ in 0..10 {
            let mut event_ids = Vec::new();
            for _ in 0..4 {
                let event = Event::new(Uuid::new_v4(), details(now, 300), now);
                store.insert_event(&event).await.unwrap();
                for _ in 0..60 {
                    store
                        .reserve(&NewReservation {
                            event_id: event.id,
                            user_id: Uuid::new_v4(),
                            quantity: 5,
                            reserved_at: now - Duration::minutes(30),
                        })
                        .await
                        .unwrap();
                }
                event_ids.push(event.id);
            }

            let sweep = {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .expire_stale_tickets(now - Duration::minutes(15), now)
                        .await
                })
            };
            let cancels: Vec<_> = event_ids
                .iter()
                .map(|&event_id| {
                    let store = store.clone();
                    tokio::spawn(async move { store.cancel_event(event_id, now).await })
                })
                .collect();

            sweep.await.unwrap().unwrap();
            for cancel in cancels {
                cancel.await.unwrap().unwrap();
            }

            for event_id in event_ids {
                let event = store.find_event(event_id).await.unwrap();
                assert_eq!(event.status, EventStatus::Cancelled);
                assert_eq!(event.tickets_sold, 0);
            }
        }
    }
}
