use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use num_traits::FromPrimitive;
use serde::Serialize;
use uuid::Uuid;

use shared::{stay_dates_ordered, BookingStatus, RoomStatus};

use crate::error::ServiceError;

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = crate::schema::rooms)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_2d: String,
    pub image_3d: String,
    pub price: BigDecimal,
    pub feature_ids: Vec<Uuid>,
    pub badge_ids: Vec<Uuid>,
    pub status: String,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn status_enum(&self) -> Result<RoomStatus, ServiceError> {
        RoomStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "room {} carries unknown status {:?}",
                self.id,
                self.status
            ))
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::rooms)]
pub struct NewRoom {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_2d: String,
    pub image_3d: String,
    pub price: BigDecimal,
    pub feature_ids: Vec<Uuid>,
    pub badge_ids: Vec<Uuid>,
    pub status: String,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::rooms)]
pub struct RoomChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_2d: Option<String>,
    pub image_3d: Option<String>,
    pub price: Option<BigDecimal>,
    pub feature_ids: Option<Vec<Uuid>>,
    pub badge_ids: Option<Vec<Uuid>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = crate::schema::bookings)]
pub struct Booking {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_contact_number: String,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn status_enum(&self) -> Result<BookingStatus, ServiceError> {
        BookingStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "booking {} carries unknown status {:?}",
                self.id,
                self.status
            ))
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_contact_number: String,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub status: String,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::bookings)]
pub struct BookingChanges {
    pub room_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_contact_number: Option<String>,
    pub number_of_guests: Option<i32>,
    pub total_price: Option<BigDecimal>,
    pub status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = crate::schema::room_features)]
pub struct RoomFeature {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::room_features)]
pub struct NewRoomFeature {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = crate::schema::room_badges)]
pub struct RoomBadge {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::room_badges)]
pub struct NewRoomBadge {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// A room joined with its resolved feature/badge records. Dangling ids
/// are omitted rather than failing the read.
#[derive(Debug, Clone, Serialize)]
pub struct RoomWithDetails {
    #[serde(flatten)]
    pub room: Room,
    pub features: Vec<RoomFeature>,
    pub badges: Vec<RoomBadge>,
}

/// Validated input for creating a booking.
#[derive(Debug, Clone)]
pub struct BookingCreate {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_contact_number: String,
    pub number_of_guests: i32,
    pub total_price: BigDecimal,
    pub status: BookingStatus,
}

impl BookingCreate {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !stay_dates_ordered(self.check_in, self.check_out) {
            return Err(ServiceError::Validation(
                "Check-in date should be before the check-out date".into(),
            ));
        }
        if self.number_of_guests < 1 {
            return Err(ServiceError::Validation(
                "number_of_guests must be at least 1".into(),
            ));
        }
        if self.total_price < BigDecimal::from(0) {
            return Err(ServiceError::Validation(
                "total_price must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update of a booking: absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub room_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_contact_number: Option<String>,
    pub number_of_guests: Option<i32>,
    pub total_price: Option<BigDecimal>,
    pub status: Option<BookingStatus>,
}

impl BookingPatch {
    pub fn into_changes(self, now: DateTime<Utc>) -> BookingChanges {
        BookingChanges {
            room_id: self.room_id,
            user_id: self.user_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guest_name: self.guest_name,
            guest_email: self.guest_email,
            guest_contact_number: self.guest_contact_number,
            number_of_guests: self.number_of_guests,
            total_price: self.total_price,
            status: self.status.map(|s| s.as_str().to_string()),
            updated_at: Some(now),
        }
    }
}

/// The stay-relevant values a booking would have after a patch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedStay {
    pub room_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub status: BookingStatus,
}

pub fn merged_stay(existing: &Booking, patch: &BookingPatch) -> Result<MergedStay, ServiceError> {
    let previous = existing.status_enum()?;
    let status = patch.status.unwrap_or(previous);
    if status != previous && previous.is_terminal() {
        return Err(ServiceError::Validation(format!(
            "a {previous} booking cannot change status"
        )));
    }
    let merged = MergedStay {
        room_id: patch.room_id.unwrap_or(existing.room_id),
        check_in: patch.check_in.unwrap_or(existing.check_in),
        check_out: patch.check_out.unwrap_or(existing.check_out),
        status,
    };
    if !stay_dates_ordered(merged.check_in, merged.check_out) {
        return Err(ServiceError::Validation(
            "Check-in date should be before the check-out date".into(),
        ));
    }
    if let Some(guests) = patch.number_of_guests {
        if guests < 1 {
            return Err(ServiceError::Validation(
                "number_of_guests must be at least 1".into(),
            ));
        }
    }
    if let Some(price) = &patch.total_price {
        if *price < BigDecimal::from(0) {
            return Err(ServiceError::Validation(
                "total_price must be non-negative".into(),
            ));
        }
    }
    Ok(merged)
}

/// Validated input for creating a room.
#[derive(Debug, Clone)]
pub struct RoomCreate {
    pub name: String,
    pub description: String,
    pub image_2d: String,
    pub image_3d: String,
    pub price: BigDecimal,
    pub feature_ids: Vec<Uuid>,
    pub badge_ids: Vec<Uuid>,
}

impl RoomCreate {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::Validation("name must not be empty".into()));
        }
        if self.price < BigDecimal::from(0) {
            return Err(ServiceError::Validation(
                "price must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_2d: Option<String>,
    pub image_3d: Option<String>,
    pub price: Option<BigDecimal>,
    pub feature_ids: Option<Vec<Uuid>>,
    pub badge_ids: Option<Vec<Uuid>>,
}

impl RoomPatch {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if let Some(price) = &self.price {
            if *price < BigDecimal::from(0) {
                return Err(ServiceError::Validation(
                    "price must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_changes(self, now: DateTime<Utc>) -> RoomChanges {
        RoomChanges {
            name: self.name,
            description: self.description,
            image_2d: self.image_2d,
            image_3d: self.image_3d,
            price: self.price,
            feature_ids: self.feature_ids,
            badge_ids: self.badge_ids,
            updated_at: Some(now),
        }
    }
}

/// Convert an API-side float amount into the stored decimal, rejecting
/// non-finite and negative values.
pub fn money_from_f64(value: f64, field: &str) -> Result<BigDecimal, ServiceError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ServiceError::Validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    BigDecimal::from_f64(value)
        .ok_or_else(|| ServiceError::Validation(format!("{field} is not representable")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
    }

    fn sample_booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            check_in: day(10),
            check_out: day(12),
            guest_name: "John Doe".into(),
            guest_email: "john@example.com".into(),
            guest_contact_number: "+1234567890".into(),
            number_of_guests: 2,
            total_price: BigDecimal::from(299),
            status: "booked".into(),
            created_at: Some(day(1)),
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn create_rejects_inverted_stay() {
        let input = BookingCreate {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            check_in: day(12),
            check_out: day(10),
            guest_name: "John Doe".into(),
            guest_email: "john@example.com".into(),
            guest_contact_number: "+1234567890".into(),
            number_of_guests: 1,
            total_price: BigDecimal::from(100),
            status: BookingStatus::Pending,
        };
        assert!(matches!(
            input.validate(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_zero_guests() {
        let input = BookingCreate {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            check_in: day(10),
            check_out: day(12),
            guest_name: "John Doe".into(),
            guest_email: "john@example.com".into(),
            guest_contact_number: "+1234567890".into(),
            number_of_guests: 0,
            total_price: BigDecimal::from(100),
            status: BookingStatus::Pending,
        };
        assert!(matches!(
            input.validate(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let existing = sample_booking();
        let merged = merged_stay(&existing, &BookingPatch::default()).unwrap();
        assert_eq!(merged.room_id, existing.room_id);
        assert_eq!(merged.check_in, existing.check_in);
        assert_eq!(merged.check_out, existing.check_out);
        assert_eq!(merged.status, BookingStatus::Booked);
    }

    #[test]
    fn merge_applies_patched_dates_and_status() {
        let existing = sample_booking();
        let patch = BookingPatch {
            check_in: Some(day(20)),
            check_out: Some(day(22)),
            status: Some(BookingStatus::Cancelled),
            ..BookingPatch::default()
        };
        let merged = merged_stay(&existing, &patch).unwrap();
        assert_eq!(merged.check_in, day(20));
        assert_eq!(merged.check_out, day(22));
        assert_eq!(merged.status, BookingStatus::Cancelled);
    }

    #[test]
    fn merge_rejects_leaving_checked_out() {
        let mut existing = sample_booking();
        existing.status = "checked_out".into();
        let patch = BookingPatch {
            status: Some(BookingStatus::Booked),
            ..BookingPatch::default()
        };
        assert!(matches!(
            merged_stay(&existing, &patch),
            Err(ServiceError::Validation(_))
        ));
        // the same status is a no-op, not a transition
        let patch = BookingPatch {
            status: Some(BookingStatus::CheckedOut),
            ..BookingPatch::default()
        };
        assert!(merged_stay(&existing, &patch).is_ok());
    }

    #[test]
    fn merge_rejects_reactivating_cancelled() {
        let mut existing = sample_booking();
        existing.status = "cancelled".into();
        for status in [BookingStatus::Pending, BookingStatus::Booked] {
            let patch = BookingPatch {
                status: Some(status),
                ..BookingPatch::default()
            };
            assert!(matches!(
                merged_stay(&existing, &patch),
                Err(ServiceError::Validation(_))
            ));
        }
    }

    #[test]
    fn merge_rejects_inverted_result() {
        let existing = sample_booking();
        let patch = BookingPatch {
            check_in: Some(day(15)),
            ..BookingPatch::default()
        };
        // existing check_out stays at day 12, so the merged stay inverts
        assert!(matches!(
            merged_stay(&existing, &patch),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn patch_changeset_always_touches_updated_at() {
        let now = day(3);
        let changes = BookingPatch::default().into_changes(now);
        assert_eq!(changes.updated_at, Some(now));
        assert!(changes.room_id.is_none());
        assert!(changes.status.is_none());
    }

    #[test]
    fn money_conversion_guards() {
        assert!(money_from_f64(299.0, "price").is_ok());
        assert!(matches!(
            money_from_f64(-1.0, "price"),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            money_from_f64(f64::NAN, "price"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut booking = sample_booking();
        booking.status = "overbooked".into();
        assert!(booking.status_enum().is_err());
    }
}
