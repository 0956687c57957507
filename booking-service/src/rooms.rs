use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use shared::{compute_offset, contains_all, ranges_overlap, stay_dates_ordered, BookingStatus, Page, RoomStatus};

use crate::error::{is_unique_violation, ServiceError};
use crate::handlers::DbPool;
use crate::models::{
    NewRoom, NewRoomBadge, NewRoomFeature, Room, RoomBadge, RoomCreate, RoomFeature, RoomPatch,
    RoomWithDetails,
};
use crate::schema::{bookings, room_badges, room_features, rooms};

/// Price and metadata filter for the room listing. The feature/badge
/// subset test runs in memory after the storage fetch.
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub feature_ids: Vec<Uuid>,
    pub badge_ids: Vec<Uuid>,
}

fn matches_filter(room: &Room, filter: &RoomFilter) -> bool {
    contains_all(&room.feature_ids, &filter.feature_ids)
        && contains_all(&room.badge_ids, &filter.badge_ids)
}

fn room_is_free(
    room_id: Uuid,
    status: RoomStatus,
    held: &[(Uuid, DateTime<Utc>, DateTime<Utc>)],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> bool {
    if status.is_out_of_service() {
        return false;
    }
    !held
        .iter()
        .any(|(rid, check_in, check_out)| *rid == room_id && ranges_overlap(*check_in, *check_out, from, to))
}

fn attach_details(
    room: Room,
    features_by_id: &HashMap<Uuid, RoomFeature>,
    badges_by_id: &HashMap<Uuid, RoomBadge>,
) -> RoomWithDetails {
    // dangling references are dropped, order is the room's own
    let features = room
        .feature_ids
        .iter()
        .filter_map(|id| features_by_id.get(id).cloned())
        .collect();
    let badges = room
        .badge_ids
        .iter()
        .filter_map(|id| badges_by_id.get(id).cloned())
        .collect();
    RoomWithDetails {
        room,
        features,
        badges,
    }
}

#[derive(Clone)]
pub struct RoomStore {
    pool: DbPool,
}

impl RoomStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: RoomCreate) -> Result<Room, ServiceError> {
        input.validate()?;
        let mut conn = self.pool.get().await?;

        let taken = diesel::select(diesel::dsl::exists(
            rooms::table
                .filter(rooms::deleted_at.is_null())
                .filter(rooms::name.eq(&input.name)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        if taken {
            return Err(ServiceError::DuplicateValue(
                "Room name is already registered".into(),
            ));
        }

        let row = NewRoom {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            image_2d: input.image_2d,
            image_3d: input.image_3d,
            price: input.price,
            feature_ids: input.feature_ids,
            badge_ids: input.badge_ids,
            status: RoomStatus::Available.as_str().to_string(),
        };

        let room: Room = diesel::insert_into(rooms::table)
            .values(&row)
            .get_result(&mut conn)
            .await
            .map_err(|err| {
                // lost the race against a concurrent create with the same name
                if is_unique_violation(&err) {
                    ServiceError::DuplicateValue("Room name is already registered".into())
                } else {
                    ServiceError::from(err)
                }
            })?;

        info!("Room {} ({:?}) created", room.id, room.name);
        Ok(room)
    }

    pub async fn get(&self, id: Uuid) -> Result<RoomWithDetails, ServiceError> {
        let mut conn = self.pool.get().await?;

        let room: Room = rooms::table
            .find(id)
            .filter(rooms::deleted_at.is_null())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(ServiceError::NotFound("Room"))?;

        let mut enriched = self.enrich(&mut conn, vec![room]).await?;
        Ok(enriched.remove(0))
    }

    pub async fn list(&self, page: u32, items_per_page: u32) -> Result<Page<Room>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let total = rooms::table
            .filter(rooms::deleted_at.is_null())
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let items = rooms::table
            .filter(rooms::deleted_at.is_null())
            .order(rooms::name.asc())
            .offset(compute_offset(page, items_per_page))
            .limit(i64::from(items_per_page))
            .load::<Room>(&mut conn)
            .await?;

        Ok(Page::new(items, total, page, items_per_page))
    }

    pub async fn update(&self, id: Uuid, patch: RoomPatch) -> Result<Room, ServiceError> {
        patch.validate()?;
        let mut conn = self.pool.get().await?;

        let changes = patch.into_changes(Utc::now());
        let updated: Option<Room> = diesel::update(
            rooms::table.find(id).filter(rooms::deleted_at.is_null()),
        )
        .set(&changes)
        .get_result(&mut conn)
        .await
        .optional()?;

        match updated {
            Some(room) => {
                info!("Room {} updated", room.id);
                Ok(room)
            }
            None => Err(ServiceError::NotFound("Room")),
        }
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await?;

        let touched = diesel::update(
            rooms::table.find(id).filter(rooms::deleted_at.is_null()),
        )
        .set(rooms::deleted_at.eq(Some(Utc::now())))
        .execute(&mut conn)
        .await?;

        if touched == 0 {
            return Err(ServiceError::NotFound("Room"));
        }
        info!("Room {} deleted", id);
        Ok(())
    }

    /// Price-ranged listing with feature/badge subset matching. The subset
    /// test and the pagination both run after the fetch.
    pub async fn filter(
        &self,
        filter: RoomFilter,
        page: u32,
        items_per_page: u32,
    ) -> Result<Page<RoomWithDetails>, ServiceError> {
        let mut conn = self.pool.get().await?;

        let mut query = rooms::table
            .filter(rooms::deleted_at.is_null())
            .order(rooms::name.asc())
            .into_boxed();
        if let Some(min) = &filter.min_price {
            query = query.filter(rooms::price.ge(min.clone()));
        }
        if let Some(max) = &filter.max_price {
            query = query.filter(rooms::price.le(max.clone()));
        }

        let candidates: Vec<Room> = query.load(&mut conn).await?;
        let matched: Vec<Room> = candidates
            .into_iter()
            .filter(|room| matches_filter(room, &filter))
            .collect();

        let total = matched.len() as i64;
        let offset = compute_offset(page, items_per_page).max(0) as usize;
        let page_rooms: Vec<Room> = matched
            .into_iter()
            .skip(offset)
            .take(items_per_page as usize)
            .collect();

        let enriched = self.enrich(&mut conn, page_rooms).await?;
        Ok(Page::new(enriched, total, page, items_per_page))
    }

    /// Rooms free across `[from, to]`: in service and without any live
    /// active booking whose range touches the window.
    pub async fn available(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
        items_per_page: u32,
    ) -> Result<Page<Room>, ServiceError> {
        if !stay_dates_ordered(from, to) {
            return Err(ServiceError::Validation(
                "from must be before to".into(),
            ));
        }
        let mut conn = self.pool.get().await?;

        let held: Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)> = bookings::table
            .filter(bookings::deleted_at.is_null())
            .filter(bookings::status.eq(BookingStatus::Booked.as_str()))
            .filter(bookings::check_in.le(to))
            .filter(bookings::check_out.ge(from))
            .select((bookings::room_id, bookings::check_in, bookings::check_out))
            .load(&mut conn)
            .await?;

        let candidates: Vec<Room> = rooms::table
            .filter(rooms::deleted_at.is_null())
            .order(rooms::name.asc())
            .load(&mut conn)
            .await?;

        let mut free = Vec::new();
        for room in candidates {
            let status = room.status_enum()?;
            if room_is_free(room.id, status, &held, from, to) {
                free.push(room);
            }
        }

        let total = free.len() as i64;
        let offset = compute_offset(page, items_per_page).max(0) as usize;
        let items: Vec<Room> = free
            .into_iter()
            .skip(offset)
            .take(items_per_page as usize)
            .collect();

        Ok(Page::new(items, total, page, items_per_page))
    }

    pub async fn create_feature(
        &self,
        name: String,
        description: String,
    ) -> Result<RoomFeature, ServiceError> {
        let mut conn = self.pool.get().await?;

        let taken = diesel::select(diesel::dsl::exists(
            room_features::table.filter(room_features::name.eq(&name)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        if taken {
            return Err(ServiceError::DuplicateValue(
                "Feature name is already registered".into(),
            ));
        }

        let row = NewRoomFeature {
            id: Uuid::new_v4(),
            name,
            description,
        };
        let feature: RoomFeature = diesel::insert_into(room_features::table)
            .values(&row)
            .get_result(&mut conn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    ServiceError::DuplicateValue("Feature name is already registered".into())
                } else {
                    ServiceError::from(err)
                }
            })?;
        Ok(feature)
    }

    pub async fn list_features(&self) -> Result<Vec<RoomFeature>, ServiceError> {
        let mut conn = self.pool.get().await?;
        let features = room_features::table
            .order(room_features::name.asc())
            .load(&mut conn)
            .await?;
        Ok(features)
    }

    pub async fn create_badge(
        &self,
        name: String,
        description: String,
    ) -> Result<RoomBadge, ServiceError> {
        let mut conn = self.pool.get().await?;

        let taken = diesel::select(diesel::dsl::exists(
            room_badges::table.filter(room_badges::name.eq(&name)),
        ))
        .get_result::<bool>(&mut conn)
        .await?;
        if taken {
            return Err(ServiceError::DuplicateValue(
                "Badge name is already registered".into(),
            ));
        }

        let row = NewRoomBadge {
            id: Uuid::new_v4(),
            name,
            description,
        };
        let badge: RoomBadge = diesel::insert_into(room_badges::table)
            .values(&row)
            .get_result(&mut conn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    ServiceError::DuplicateValue("Badge name is already registered".into())
                } else {
                    ServiceError::from(err)
                }
            })?;
        Ok(badge)
    }

    pub async fn list_badges(&self) -> Result<Vec<RoomBadge>, ServiceError> {
        let mut conn = self.pool.get().await?;
        let badges = room_badges::table
            .order(room_badges::name.asc())
            .load(&mut conn)
            .await?;
        Ok(badges)
    }

    async fn enrich(
        &self,
        conn: &mut AsyncPgConnection,
        page_rooms: Vec<Room>,
    ) -> Result<Vec<RoomWithDetails>, ServiceError> {
        let feature_ids: Vec<Uuid> = page_rooms
            .iter()
            .flat_map(|room| room.feature_ids.iter().copied())
            .collect();
        let badge_ids: Vec<Uuid> = page_rooms
            .iter()
            .flat_map(|room| room.badge_ids.iter().copied())
            .collect();

        let features: Vec<RoomFeature> = room_features::table
            .filter(room_features::id.eq_any(&feature_ids))
            .load(conn)
            .await?;
        let badges: Vec<RoomBadge> = room_badges::table
            .filter(room_badges::id.eq_any(&badge_ids))
            .load(conn)
            .await?;

        let features_by_id: HashMap<Uuid, RoomFeature> =
            features.into_iter().map(|f| (f.id, f)).collect();
        let badges_by_id: HashMap<Uuid, RoomBadge> =
            badges.into_iter().map(|b| (b.id, b)).collect();

        Ok(page_rooms
            .into_iter()
            .map(|room| attach_details(room, &features_by_id, &badges_by_id))
            .collect())
    }
}
