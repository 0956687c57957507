use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use shared::{compute_offset, default_checkout_window, BookingStatus, Page, RoomStatus};

use crate::error::{is_foreign_key_violation, ServiceError};
use crate::models::{merged_stay, Booking, BookingCreate, BookingPatch, MergedStay, NewBooking};
use crate::schema::{bookings, rooms};

pub type DbPool = Pool<AsyncPgConnection>;

/// How often a serializable commit may be retried before the request is
/// surfaced as storage-unavailable.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(25 * (1u64 << attempt.min(6)))
}

/// Outcome of a cancel request. Cancellation is idempotent: already
/// cancelled and checked-out bookings are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
    AlreadyCheckedOut,
}

impl CancelOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "Booking cancelled successfully",
            CancelOutcome::AlreadyCancelled => "Booking already cancelled",
            CancelOutcome::AlreadyCheckedOut => "Booking already checked out",
        }
    }
}

fn cancel_action(status: BookingStatus) -> CancelOutcome {
    match status {
        BookingStatus::Cancelled => CancelOutcome::AlreadyCancelled,
        BookingStatus::CheckedOut => CancelOutcome::AlreadyCheckedOut,
        BookingStatus::Pending | BookingStatus::Booked => CancelOutcome::Cancelled,
    }
}

/// Room writes a booking update requires to keep room availability in
/// step with the bookings on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoomSyncPlan {
    /// Room whose hold the booking no longer backs.
    release: Option<Uuid>,
    /// Whether the patched stay holds `merged.room_id`.
    hold: bool,
}

/// A room's hold belongs to the booking's previous state: it is let go
/// whenever the booking stops being active on that room, whether by
/// status change or by moving to another room. The patched room is only
/// held when the patched stay is itself active.
fn room_sync_plan(existing_room: Uuid, previous: BookingStatus, merged: &MergedStay) -> RoomSyncPlan {
    let still_holds =
        previous == BookingStatus::Booked && merged.status == BookingStatus::Booked
            && merged.room_id == existing_room;
    RoomSyncPlan {
        release: (previous == BookingStatus::Booked && !still_holds).then_some(existing_room),
        hold: merged.status == BookingStatus::Booked,
    }
}

/// Listing parameters for the per-room booking view. Missing window
/// bounds fall back to a month either side of now.
#[derive(Debug, Clone)]
pub struct RoomBookingQuery {
    pub status: BookingStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// The booking lifecycle engine: validates stays, detects overlap
/// conflicts and keeps the room's availability status in step with the
/// bookings on it. Every mutation that both checks and writes runs in a
/// single serializable transaction so two concurrent conflicting requests
/// cannot both pass the conflict check.
#[derive(Clone)]
pub struct BookingEngine {
    pool: DbPool,
}

impl BookingEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: BookingCreate) -> Result<Booking, ServiceError> {
        input.validate()?;
        let mut conn = self.pool.get().await?;

        let mut attempt = 0u32;
        loop {
            let row = NewBooking {
                id: Uuid::new_v4(),
                room_id: input.room_id,
                user_id: input.user_id,
                check_in: input.check_in,
                check_out: input.check_out,
                guest_name: input.guest_name.clone(),
                guest_email: input.guest_email.clone(),
                guest_contact_number: input.guest_contact_number.clone(),
                number_of_guests: input.number_of_guests,
                total_price: input.total_price.clone(),
                status: input.status.as_str().to_string(),
            };
            let status = input.status;

            let result = conn
                .build_transaction()
                .serializable()
                .run(|conn| {
                    Box::pin(async move {
                        if overlap_exists(conn, row.room_id, row.check_in, row.check_out, None)
                            .await?
                        {
                            return Err(ServiceError::DuplicateBooking);
                        }

                        let booking: Booking = diesel::insert_into(bookings::table)
                            .values(&row)
                            .get_result(conn)
                            .await
                            .map_err(reject_unknown_references)?;

                        if status == BookingStatus::Booked {
                            hold_room(conn, booking.room_id, booking.check_in, booking.check_out)
                                .await?;
                        }

                        Ok(booking)
                    })
                })
                .await;

            match result {
                Ok(booking) => {
                    info!("Booking {} created for room {}", booking.id, booking.room_id);
                    return Ok(booking);
                }
                Err(err) if err.is_serialization_failure() => {
                    attempt += 1;
                    if attempt >= MAX_COMMIT_ATTEMPTS {
                        return Err(ServiceError::Unavailable(
                            "booking write kept conflicting with concurrent commits".into(),
                        ));
                    }
                    warn!("Serialization failure on booking create, retry {}", attempt);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn update(&self, id: Uuid, patch: BookingPatch) -> Result<Booking, ServiceError> {
        let mut conn = self.pool.get().await?;

        let mut attempt = 0u32;
        loop {
            let patch = patch.clone();

            let result = conn
                .build_transaction()
                .serializable()
                .run(|conn| {
                    Box::pin(async move {
                        let existing: Booking = bookings::table
                            .find(id)
                            .filter(bookings::deleted_at.is_null())
                            .first(conn)
                            .await
                            .optional()?
                            .ok_or(ServiceError::NotFound("Booking"))?;

                        let previous_status = existing.status_enum()?;
                        let merged = merged_stay(&existing, &patch)?;

                        // Conflict scan against the patched stay, leaving the
                        // booking under update out of its own scan.
                        if overlap_exists(
                            conn,
                            merged.room_id,
                            merged.check_in,
                            merged.check_out,
                            Some(id),
                        )
                        .await?
                        {
                            return Err(ServiceError::DuplicateBooking);
                        }

                        let changes = patch.into_changes(Utc::now());
                        let updated: Booking = diesel::update(bookings::table.find(id))
                            .set(&changes)
                            .get_result(conn)
                            .await
                            .map_err(reject_unknown_references)?;

                        let plan = room_sync_plan(existing.room_id, previous_status, &merged);
                        if let Some(room_id) = plan.release {
                            release_room(conn, room_id).await?;
                        }
                        if plan.hold {
                            hold_room(conn, merged.room_id, merged.check_in, merged.check_out)
                                .await?;
                        }

                        Ok(updated)
                    })
                })
                .await;

            match result {
                Ok(booking) => {
                    info!("Booking {} updated", booking.id);
                    return Ok(booking);
                }
                Err(err) if err.is_serialization_failure() => {
                    attempt += 1;
                    if attempt >= MAX_COMMIT_ATTEMPTS {
                        return Err(ServiceError::Unavailable(
                            "booking update kept conflicting with concurrent commits".into(),
                        ));
                    }
                    warn!("Serialization failure on booking update, retry {}", attempt);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, ServiceError> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                let existing: Booking = bookings::table
                    .find(id)
                    .filter(bookings::deleted_at.is_null())
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(ServiceError::NotFound("Booking"))?;

                let outcome = cancel_action(existing.status_enum()?);
                if outcome == CancelOutcome::Cancelled {
                    diesel::update(bookings::table.find(id))
                        .set((
                            bookings::status.eq(BookingStatus::Cancelled.as_str()),
                            bookings::updated_at.eq(Some(Utc::now())),
                        ))
                        .execute(conn)
                        .await?;
                    release_room(conn, existing.room_id).await?;
                    info!("Booking {} cancelled", id);
                }

                Ok(outcome)
            })
        })
        .await
    }

    /// Soft delete. An administrative action distinct from cancellation:
    /// the room's status is deliberately left alone.
    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await?;

        let touched = diesel::update(
            bookings::table
                .find(id)
                .filter(bookings::deleted_at.is_null()),
        )
        .set(bookings::deleted_at.eq(Some(Utc::now())))
        .execute(&mut conn)
        .await?;

        if touched == 0 {
            return Err(ServiceError::NotFound("Booking"));
        }
        info!("Booking {} deleted", id);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, ServiceError> {
        let mut conn = self.pool.get().await?;

        bookings::table
            .find(id)
            .filter(bookings::deleted_at.is_null())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(ServiceError::NotFound("Booking"))
    }

    pub async fn list(&self, page: u32, items_per_page: u32) -> Result<Page<Booking>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let total = bookings::table
            .filter(bookings::deleted_at.is_null())
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let items = bookings::table
            .filter(bookings::deleted_at.is_null())
            .order(bookings::created_at.desc())
            .offset(compute_offset(page, items_per_page))
            .limit(i64::from(items_per_page))
            .load::<Booking>(&mut conn)
            .await?;

        Ok(Page::new(items, total, page, items_per_page))
    }

    /// Bookings of a room with a given status whose check-out falls inside
    /// the window, check-out ascending.
    pub async fn list_for_room(
        &self,
        room_id: Uuid,
        query: RoomBookingQuery,
        page: u32,
        items_per_page: u32,
    ) -> Result<Page<Booking>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let (default_start, default_end) = default_checkout_window(Utc::now());
        let start = query.start_date.unwrap_or(default_start);
        let end = query.end_date.unwrap_or(default_end);
        let status = query.status.as_str();

        let total = bookings::table
            .filter(bookings::deleted_at.is_null())
            .filter(bookings::room_id.eq(room_id))
            .filter(bookings::status.eq(status))
            .filter(bookings::check_out.ge(start))
            .filter(bookings::check_out.le(end))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let items = bookings::table
            .filter(bookings::deleted_at.is_null())
            .filter(bookings::room_id.eq(room_id))
            .filter(bookings::status.eq(status))
            .filter(bookings::check_out.ge(start))
            .filter(bookings::check_out.le(end))
            .order(bookings::check_out.asc())
            .offset(compute_offset(page, items_per_page))
            .limit(i64::from(items_per_page))
            .load::<Booking>(&mut conn)
            .await?;

        Ok(Page::new(items, total, page, items_per_page))
    }

    /// All live bookings of a user, most recent check-in first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        items_per_page: u32,
    ) -> Result<Page<Booking>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let total = bookings::table
            .filter(bookings::deleted_at.is_null())
            .filter(bookings::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let items = bookings::table
            .filter(bookings::deleted_at.is_null())
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::check_in.desc())
            .offset(compute_offset(page, items_per_page))
            .limit(i64::from(items_per_page))
            .load::<Booking>(&mut conn)
            .await?;

        Ok(Page::new(items, total, page, items_per_page))
    }
}

/// Inclusive-boundary overlap scan over live, active bookings of a room.
async fn overlap_exists(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> Result<bool, diesel::result::Error> {
    let conflicting = bookings::table
        .filter(bookings::room_id.eq(room_id))
        .filter(bookings::deleted_at.is_null())
        .filter(bookings::status.eq(BookingStatus::Booked.as_str()))
        .filter(bookings::check_in.le(check_out))
        .filter(bookings::check_out.ge(check_in));

    match exclude {
        Some(id) => {
            diesel::select(diesel::dsl::exists(
                conflicting.filter(bookings::id.ne(id)),
            ))
            .get_result(conn)
            .await
        }
        None => {
            diesel::select(diesel::dsl::exists(conflicting))
                .get_result(conn)
                .await
        }
    }
}

/// Marks the room as booked and records the active range.
async fn hold_room(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<(), diesel::result::Error> {
    diesel::update(rooms::table.find(room_id))
        .set((
            rooms::status.eq(RoomStatus::Booked.as_str()),
            rooms::from_date.eq(Some(from)),
            rooms::to_date.eq(Some(to)),
            rooms::updated_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Returns the room to availability and clears the active range.
async fn release_room(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
) -> Result<(), diesel::result::Error> {
    diesel::update(rooms::table.find(room_id))
        .set((
            rooms::status.eq(RoomStatus::Available.as_str()),
            rooms::from_date.eq(None::<DateTime<Utc>>),
            rooms::to_date.eq(None::<DateTime<Utc>>),
            rooms::updated_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

fn reject_unknown_references(err: diesel::result::Error) -> ServiceError {
    if is_foreign_key_violation(&err) {
        ServiceError::Validation(
            "room_id or user_id does not reference a known record".into(),
        )
    } else {
        ServiceError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
    }

    fn stay(room_id: Uuid, status: BookingStatus) -> MergedStay {
        MergedStay {
            room_id,
            check_in: day(10),
            check_out: day(12),
            status,
        }
    }

    #[test]
    fn moving_an_active_booking_releases_the_old_room() {
        let old_room = Uuid::new_v4();
        let new_room = Uuid::new_v4();
        let plan = room_sync_plan(old_room, BookingStatus::Booked, &stay(new_room, BookingStatus::Booked));
        assert_eq!(plan.release, Some(old_room));
        assert!(plan.hold);
    }

    #[test]
    fn cancelling_while_moving_releases_the_room_that_was_held() {
        let old_room = Uuid::new_v4();
        let new_room = Uuid::new_v4();
        let plan = room_sync_plan(old_room, BookingStatus::Booked, &stay(new_room, BookingStatus::Cancelled));
        assert_eq!(plan.release, Some(old_room));
        assert!(!plan.hold);
    }

    #[test]
    fn active_patch_on_the_same_room_only_refreshes_the_hold() {
        let room = Uuid::new_v4();
        let plan = room_sync_plan(room, BookingStatus::Booked, &stay(room, BookingStatus::Booked));
        assert_eq!(plan.release, None);
        assert!(plan.hold);
    }

    #[test]
    fn cancelling_a_pending_booking_touches_no_room() {
        let room = Uuid::new_v4();
        let plan = room_sync_plan(room, BookingStatus::Pending, &stay(room, BookingStatus::Cancelled));
        assert_eq!(plan.release, None);
        assert!(!plan.hold);
    }

    #[test]
    fn confirming_a_pending_booking_holds_without_releasing() {
        let room = Uuid::new_v4();
        let plan = room_sync_plan(room, BookingStatus::Pending, &stay(room, BookingStatus::Booked));
        assert_eq!(plan.release, None);
        assert!(plan.hold);
    }

    #[test]
    fn checking_out_releases_the_hold() {
        let room = Uuid::new_v4();
        let plan = room_sync_plan(room, BookingStatus::Booked, &stay(room, BookingStatus::CheckedOut));
        assert_eq!(plan.release, Some(room));
        assert!(!plan.hold);
    }

    #[test]
    fn cancel_transitions_follow_the_state_machine() {
        assert_eq!(
            cancel_action(BookingStatus::Pending),
            CancelOutcome::Cancelled
        );
        assert_eq!(
            cancel_action(BookingStatus::Booked),
            CancelOutcome::Cancelled
        );
        assert_eq!(
            cancel_action(BookingStatus::Cancelled),
            CancelOutcome::AlreadyCancelled
        );
        assert_eq!(
            cancel_action(BookingStatus::CheckedOut),
            CancelOutcome::AlreadyCheckedOut
        );
    }

    #[test]
    fn cancel_outcomes_carry_distinct_messages() {
        assert_eq!(
            CancelOutcome::Cancelled.message(),
            "Booking cancelled successfully"
        );
        assert_eq!(
            CancelOutcome::AlreadyCancelled.message(),
            "Booking already cancelled"
        );
        assert_eq!(
            CancelOutcome::AlreadyCheckedOut.message(),
            "Booking already checked out"
        );
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        assert!(backoff_delay(1) < backoff_delay(2));
        assert!(backoff_delay(2) < backoff_delay(3));
        // attempts past the cap reuse the largest delay
        assert_eq!(backoff_delay(6), backoff_delay(60));
    }
}
