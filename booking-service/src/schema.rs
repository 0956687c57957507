diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        created_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    room_features (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    room_badges (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    rooms (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Varchar,
        image_2d -> Varchar,
        image_3d -> Varchar,
        price -> Numeric,
        feature_ids -> Array<Uuid>,
        badge_ids -> Array<Uuid>,
        status -> Varchar,
        from_date -> Nullable<Timestamptz>,
        to_date -> Nullable<Timestamptz>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        room_id -> Uuid,
        user_id -> Uuid,
        check_in -> Timestamptz,
        check_out -> Timestamptz,
        guest_name -> Varchar,
        guest_email -> Varchar,
        guest_contact_number -> Varchar,
        number_of_guests -> Int4,
        total_price -> Numeric,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(bookings -> rooms (room_id));
diesel::joinable!(bookings -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    room_features,
    room_badges,
    rooms,
    bookings,
);
