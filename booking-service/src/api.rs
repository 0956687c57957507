use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{BookingStatus, Page, DEFAULT_ITEMS_PER_PAGE, MAX_ITEMS_PER_PAGE};

use crate::error::ServiceError;
use crate::handlers::{BookingEngine, RoomBookingQuery};
use crate::models::{
    money_from_f64, Booking, BookingCreate, BookingPatch, Room, RoomBadge, RoomCreate,
    RoomFeature, RoomPatch, RoomWithDetails,
};
use crate::rooms::{RoomFilter, RoomStore};

#[derive(Clone)]
pub struct AppState {
    pub engine: BookingEngine,
    pub rooms: RoomStore,
    pub admin_token: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/booking", post(create_booking))
        .route("/bookings", get(list_bookings))
        .route(
            "/booking/:id",
            get(read_booking).put(update_booking).delete(delete_booking),
        )
        .route("/booking/:id/cancel", post(cancel_booking))
        .route("/user/:user_id/bookings", get(list_user_bookings))
        .route("/room/:room_id/bookings", get(list_room_bookings))
        .route("/room", post(create_room))
        .route("/rooms", get(list_rooms))
        .route("/rooms/filter", get(filter_rooms))
        .route("/rooms/available", get(available_rooms))
        .route(
            "/room/:id",
            get(read_room).patch(patch_room).delete(delete_room),
        )
        .route("/feature", post(create_feature))
        .route("/features", get(list_features))
        .route("/badge", post(create_badge))
        .route("/badges", get(list_badges))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
}

fn paging(params: &PaginationParams) -> (u32, u32) {
    (
        params.page.unwrap_or(1).max(1),
        params
            .items_per_page
            .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
            .clamp(1, MAX_ITEMS_PER_PAGE),
    )
}

/// Query-string id lists arrive comma-separated ("a,b,c").
fn parse_id_list(raw: Option<&str>) -> Result<Vec<Uuid>, ServiceError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| ServiceError::Validation(format!("{part:?} is not a valid id")))
        })
        .collect()
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ServiceError::Forbidden(
            "admin endpoints are disabled".into(),
        ));
    };
    let provided = headers.get("x-admin-token").and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("admin token required".into()))
    }
}

// ---- bookings ----

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_contact_number: String,
    pub number_of_guests: i32,
    pub total_price: f64,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateBookingRequest {
    pub room_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_contact_number: Option<String>,
    pub number_of_guests: Option<i32>,
    pub total_price: Option<f64>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Serialize)]
pub struct BookingRead {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_contact_number: String,
    pub number_of_guests: i32,
    pub total_price: f64,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingRead {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            room_id: booking.room_id,
            user_id: booking.user_id,
            check_in: booking.check_in,
            check_out: booking.check_out,
            guest_name: booking.guest_name,
            guest_email: booking.guest_email,
            guest_contact_number: booking.guest_contact_number,
            number_of_guests: booking.number_of_guests,
            total_price: booking.total_price.to_f64().unwrap_or_default(),
            status: booking.status,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingRead>), ServiceError> {
    let input = BookingCreate {
        room_id: request.room_id,
        user_id: request.user_id,
        check_in: request.check_in,
        check_out: request.check_out,
        guest_name: request.guest_name,
        guest_email: request.guest_email,
        guest_contact_number: request.guest_contact_number,
        number_of_guests: request.number_of_guests,
        total_price: money_from_f64(request.total_price, "total_price")?,
        status: request.status.unwrap_or(BookingStatus::Pending),
    };
    let booking = state.engine.create(input).await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn read_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingRead>, ServiceError> {
    let booking = state.engine.get(id).await?;
    Ok(Json(booking.into()))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Page<BookingRead>>, ServiceError> {
    let (page, items_per_page) = paging(&params);
    let bookings = state.engine.list(page, items_per_page).await?;
    Ok(Json(bookings.map(BookingRead::from)))
}

pub async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBookingRequest>,
) -> Result<Json<BookingRead>, ServiceError> {
    let patch = BookingPatch {
        room_id: request.room_id,
        user_id: request.user_id,
        check_in: request.check_in,
        check_out: request.check_out,
        guest_name: request.guest_name,
        guest_email: request.guest_email,
        guest_contact_number: request.guest_contact_number,
        number_of_guests: request.number_of_guests,
        total_price: request
            .total_price
            .map(|value| money_from_f64(value, "total_price"))
            .transpose()?,
        status: request.status,
    };
    let booking = state.engine.update(id, patch).await?;
    Ok(Json(booking.into()))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.engine.remove(id).await?;
    Ok(message("Booking deleted successfully"))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let outcome = state.engine.cancel(id).await?;
    Ok(message(outcome.message()))
}

#[derive(Debug, Deserialize)]
pub struct RoomBookingsParams {
    pub status: Option<BookingStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
}

pub async fn list_room_bookings(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(params): Query<RoomBookingsParams>,
) -> Result<Json<Page<BookingRead>>, ServiceError> {
    let paging_params = PaginationParams {
        page: params.page,
        items_per_page: params.items_per_page,
    };
    let (page, items_per_page) = paging(&paging_params);
    let query = RoomBookingQuery {
        status: params.status.unwrap_or(BookingStatus::Booked),
        start_date: params.start_date,
        end_date: params.end_date,
    };
    let bookings = state
        .engine
        .list_for_room(room_id, query, page, items_per_page)
        .await?;
    Ok(Json(bookings.map(BookingRead::from)))
}

pub async fn list_user_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Page<BookingRead>>, ServiceError> {
    let (page, items_per_page) = paging(&params);
    let bookings = state
        .engine
        .list_for_user(user_id, page, items_per_page)
        .await?;
    Ok(Json(bookings.map(BookingRead::from)))
}

// ---- rooms ----

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub image_2d: String,
    #[serde(default)]
    pub image_3d: String,
    pub price: f64,
    #[serde(default)]
    pub feature_ids: Vec<Uuid>,
    #[serde(default)]
    pub badge_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_2d: Option<String>,
    pub image_3d: Option<String>,
    pub price: Option<f64>,
    pub feature_ids: Option<Vec<Uuid>>,
    pub badge_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct RoomRead {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_2d: String,
    pub image_3d: String,
    pub price: f64,
    pub feature_ids: Vec<Uuid>,
    pub badge_ids: Vec<Uuid>,
    pub status: String,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Room> for RoomRead {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            description: room.description,
            image_2d: room.image_2d,
            image_3d: room.image_3d,
            price: room.price.to_f64().unwrap_or_default(),
            feature_ids: room.feature_ids,
            badge_ids: room.badge_ids,
            status: room.status,
            from_date: room.from_date,
            to_date: room.to_date,
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LabelRead {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl From<RoomFeature> for LabelRead {
    fn from(feature: RoomFeature) -> Self {
        Self {
            id: feature.id,
            name: feature.name,
            description: feature.description,
        }
    }
}

impl From<RoomBadge> for LabelRead {
    fn from(badge: RoomBadge) -> Self {
        Self {
            id: badge.id,
            name: badge.name,
            description: badge.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoomDetailRead {
    #[serde(flatten)]
    pub room: RoomRead,
    pub features: Vec<LabelRead>,
    pub badges: Vec<LabelRead>,
}

impl From<RoomWithDetails> for RoomDetailRead {
    fn from(detail: RoomWithDetails) -> Self {
        Self {
            room: detail.room.into(),
            features: detail.features.into_iter().map(LabelRead::from).collect(),
            badges: detail.badges.into_iter().map(LabelRead::from).collect(),
        }
    }
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomRead>), ServiceError> {
    let input = RoomCreate {
        name: request.name,
        description: request.description,
        image_2d: request.image_2d,
        image_3d: request.image_3d,
        price: money_from_f64(request.price, "price")?,
        feature_ids: request.feature_ids,
        badge_ids: request.badge_ids,
    };
    let room = state.rooms.create(input).await?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

pub async fn read_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomDetailRead>, ServiceError> {
    let room = state.rooms.get(id).await?;
    Ok(Json(room.into()))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Page<RoomRead>>, ServiceError> {
    let (page, items_per_page) = paging(&params);
    let rooms = state.rooms.list(page, items_per_page).await?;
    Ok(Json(rooms.map(RoomRead::from)))
}

pub async fn patch_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRoomRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let patch = RoomPatch {
        name: request.name,
        description: request.description,
        image_2d: request.image_2d,
        image_3d: request.image_3d,
        price: request
            .price
            .map(|value| money_from_f64(value, "price"))
            .transpose()?,
        feature_ids: request.feature_ids,
        badge_ids: request.badge_ids,
    };
    state.rooms.update(id, patch).await?;
    Ok(message("Room updated"))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.rooms.remove(id).await?;
    Ok(message("Room deleted"))
}

#[derive(Debug, Deserialize)]
pub struct FilterRoomsParams {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub feature_ids: Option<String>,
    pub badge_ids: Option<String>,
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
}

pub async fn filter_rooms(
    State(state): State<AppState>,
    Query(params): Query<FilterRoomsParams>,
) -> Result<Json<Page<RoomDetailRead>>, ServiceError> {
    let paging_params = PaginationParams {
        page: params.page,
        items_per_page: params.items_per_page,
    };
    let (page, items_per_page) = paging(&paging_params);
    let filter = RoomFilter {
        min_price: params
            .min_price
            .map(|value| money_from_f64(value, "min_price"))
            .transpose()?,
        max_price: params
            .max_price
            .map(|value| money_from_f64(value, "max_price"))
            .transpose()?,
        feature_ids: parse_id_list(params.feature_ids.as_deref())?,
        badge_ids: parse_id_list(params.badge_ids.as_deref())?,
    };
    let rooms = state.rooms.filter(filter, page, items_per_page).await?;
    Ok(Json(rooms.map(RoomDetailRead::from)))
}

#[derive(Debug, Deserialize)]
pub struct AvailableRoomsParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page: Option<u32>,
    pub items_per_page: Option<u32>,
}

pub async fn available_rooms(
    State(state): State<AppState>,
    Query(params): Query<AvailableRoomsParams>,
) -> Result<Json<Page<RoomRead>>, ServiceError> {
    let paging_params = PaginationParams {
        page: params.page,
        items_per_page: params.items_per_page,
    };
    let (page, items_per_page) = paging(&paging_params);
    let rooms = state
        .rooms
        .available(params.from, params.to, page, items_per_page)
        .await?;
    Ok(Json(rooms.map(RoomRead::from)))
}

// ---- features & badges ----

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,
    pub description: String,
}

pub async fn create_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<LabelRead>), ServiceError> {
    require_admin(&state, &headers)?;
    let feature = state
        .rooms
        .create_feature(request.name, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(feature.into())))
}

pub async fn list_features(
    State(state): State<AppState>,
) -> Result<Json<Vec<LabelRead>>, ServiceError> {
    let features = state.rooms.list_features().await?;
    Ok(Json(features.into_iter().map(LabelRead::from).collect()))
}

pub async fn create_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<LabelRead>), ServiceError> {
    require_admin(&state, &headers)?;
    let badge = state
        .rooms
        .create_badge(request.name, request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(badge.into())))
}

pub async fn list_badges(
    State(state): State<AppState>,
) -> Result<Json<Vec<LabelRead>>, ServiceError> {
    let badges = state.rooms.list_badges().await?;
    Ok(Json(badges.into_iter().map(LabelRead::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_lists_parse_from_comma_separated_strings() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!("{a}, {b},");
        assert_eq!(parse_id_list(Some(&raw)).unwrap(), vec![a, b]);
        assert_eq!(parse_id_list(None).unwrap(), Vec::<Uuid>::new());
        assert!(parse_id_list(Some("not-an-id")).is_err());
    }

    #[test]
    fn create_request_accepts_the_confirmed_spelling() {
        let raw = serde_json::json!({
            "room_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "check_in": "2025-01-10T12:00:00Z",
            "check_out": "2025-01-12T12:00:00Z",
            "guest_name": "John Doe",
            "guest_email": "abc@gmail.com",
            "guest_contact_number": "+1234567890",
            "number_of_guests": 1,
            "total_price": 299.0,
            "status": "confirmed"
        });
        let request: CreateBookingRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.status, Some(BookingStatus::Booked));
    }

    #[test]
    fn update_request_fields_default_to_unset() {
        let request: UpdateBookingRequest =
            serde_json::from_str("{\"guest_name\": \"Jane Doe\"}").unwrap();
        assert_eq!(request.guest_name.as_deref(), Some("Jane Doe"));
        assert!(request.check_in.is_none());
        assert!(request.status.is_none());
    }

    #[test]
    fn paging_falls_back_to_defaults() {
        let params = PaginationParams {
            page: None,
            items_per_page: None,
        };
        assert_eq!(paging(&params), (1, DEFAULT_ITEMS_PER_PAGE));

        let params = PaginationParams {
            page: Some(0),
            items_per_page: Some(0),
        };
        assert_eq!(paging(&params), (1, 1));
    }

    #[test]
    fn page_size_is_capped() {
        let params = PaginationParams {
            page: Some(1),
            items_per_page: Some(u32::MAX),
        };
        assert_eq!(paging(&params), (1, MAX_ITEMS_PER_PAGE));
    }
}
