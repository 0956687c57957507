use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a booking. Stored as text in the database and
/// converted at the persistence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    /// The active state. The original API used both "booked" and
    /// "confirmed" for this; "confirmed" is accepted on input.
    #[serde(alias = "confirmed")]
    Booked,
    Cancelled,
    CheckedOut,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::CheckedOut => "checked_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "booked" | "confirmed" => Some(BookingStatus::Booked),
            "cancelled" => Some(BookingStatus::Cancelled),
            "checked_out" => Some(BookingStatus::CheckedOut),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::CheckedOut)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Available,
    Booked,
    UnderMaintenance,
    Reserved,
    Unavailable,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Booked => "booked",
            RoomStatus::UnderMaintenance => "under_maintenance",
            RoomStatus::Reserved => "reserved",
            RoomStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(RoomStatus::Available),
            "booked" => Some(RoomStatus::Booked),
            "under_maintenance" => Some(RoomStatus::UnderMaintenance),
            "reserved" => Some(RoomStatus::Reserved),
            "unavailable" => Some(RoomStatus::Unavailable),
            _ => None,
        }
    }

    /// Statuses under which a room can never be offered, regardless of
    /// existing bookings.
    pub fn is_out_of_service(&self) -> bool {
        matches!(self, RoomStatus::UnderMaintenance | RoomStatus::Unavailable)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive-boundary overlap test: ranges that merely touch conflict.
pub fn ranges_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// A stay must check in strictly before it checks out.
pub fn stay_dates_ordered(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> bool {
    check_in < check_out
}

pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Default date window for per-room booking listings: one month either
/// side of now.
pub fn default_checkout_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - Duration::days(DEFAULT_WINDOW_DAYS),
        now + Duration::days(DEFAULT_WINDOW_DAYS),
    )
}

/// Set-subset test used by the room filter: every wanted id must appear.
/// An empty wanted list matches everything.
pub fn contains_all(haystack: &[Uuid], wanted: &[Uuid]) -> bool {
    wanted.iter().all(|id| haystack.contains(id))
}

pub const DEFAULT_ITEMS_PER_PAGE: u32 = 10;
pub const MAX_ITEMS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub items_per_page: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, page: u32, items_per_page: u32) -> Self {
        let has_more = i64::from(page) * i64::from(items_per_page) < total_count;
        Self {
            items,
            total_count,
            page,
            items_per_page,
            has_more,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            items_per_page: self.items_per_page,
            has_more: self.has_more,
        }
    }
}

/// 1-based page to row offset. Page 0 is treated as page 1.
pub fn compute_offset(page: u32, items_per_page: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(items_per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn overlap_is_inclusive_at_boundaries() {
        // [10, 12] vs [12, 14]: touching counts as a conflict.
        assert!(ranges_overlap(day(10), day(12), day(12), day(14)));
        assert!(ranges_overlap(day(12), day(14), day(10), day(12)));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        assert!(!ranges_overlap(day(10), day(11), day(12), day(14)));
        assert!(!ranges_overlap(day(12), day(14), day(10), day(11)));
    }

    #[test]
    fn contained_range_overlaps() {
        assert!(ranges_overlap(day(10), day(20), day(12), day(13)));
        assert!(ranges_overlap(day(12), day(13), day(10), day(20)));
    }

    #[test]
    fn stay_order_is_strict() {
        assert!(stay_dates_ordered(day(10), day(12)));
        assert!(!stay_dates_ordered(day(12), day(12)));
        assert!(!stay_dates_ordered(day(13), day(12)));
    }

    #[test]
    fn booking_status_round_trips() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::Booked,
            BookingStatus::Cancelled,
            BookingStatus::CheckedOut,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("confirmed"), Some(BookingStatus::Booked));
        assert_eq!(BookingStatus::parse("no-show"), None);
    }

    #[test]
    fn only_cancelled_and_checked_out_are_terminal() {
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::CheckedOut.is_terminal());
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Booked.is_terminal());
    }

    #[test]
    fn confirmed_alias_deserializes_as_booked() {
        let status: BookingStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(status, BookingStatus::Booked);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"booked\"");
    }

    #[test]
    fn room_status_round_trips() {
        for s in [
            RoomStatus::Available,
            RoomStatus::Booked,
            RoomStatus::UnderMaintenance,
            RoomStatus::Reserved,
            RoomStatus::Unavailable,
        ] {
            assert_eq!(RoomStatus::parse(s.as_str()), Some(s));
        }
        assert!(RoomStatus::UnderMaintenance.is_out_of_service());
        assert!(!RoomStatus::Booked.is_out_of_service());
    }

    #[test]
    fn default_window_spans_a_month_each_way() {
        let now = day(15);
        let (start, end) = default_checkout_window(now);
        assert_eq!(end - start, Duration::days(60));
        assert!(start < now && now < end);
    }

    #[test]
    fn contains_all_is_a_subset_test() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(contains_all(&[a, b, c], &[a, b]));
        assert!(!contains_all(&[a, c], &[a, b]));
        assert!(contains_all(&[a], &[]));
        assert!(contains_all(&[], &[]));
    }

    #[test]
    fn offset_and_has_more() {
        assert_eq!(compute_offset(1, 10), 0);
        assert_eq!(compute_offset(3, 10), 20);
        assert_eq!(compute_offset(0, 10), 0);

        let page = Page::new(vec![1, 2, 3], 25, 2, 10);
        assert!(page.has_more);
        let page = Page::new(vec![1, 2, 3], 23, 3, 10);
        assert!(!page.has_more);
    }
}
