//! Diesel table definitions for the `transport` schema.
//!
//! `telemetry` is range-partitioned by `"timestamp"` in the database; diesel
//! only ever sees the parent table. Partitions are managed by
//! [`crate::partition`].

diesel::table! {
    transport.cities (id) {
        id -> BigInt,
        #[max_length = 255]
        name -> Varchar,
    }
}

diesel::table! {
    transport.routes (id) {
        id -> Integer,
        #[max_length = 255]
        name -> Varchar,
        #[sql_name = "type"]
        #[max_length = 255]
        route_type -> Varchar,
        city_id -> BigInt,
    }
}

diesel::table! {
    transport.telemetry (uniqueid, timestamp) {
        #[max_length = 64]
        uniqueid -> Varchar,
        timestamp -> Timestamp,
        bus_id -> BigInt,
        heading -> Nullable<Integer>,
        speed -> Nullable<Integer>,
        lon -> Double,
        lat -> Double,
        direction -> Nullable<Integer>,
        #[max_length = 255]
        gosnum -> Nullable<Varchar>,
        #[max_length = 255]
        bortnum -> Nullable<Varchar>,
        probeg -> Nullable<Integer>,
        upload_date -> Timestamp,
    }
}

diesel::table! {
    transport.stops (id) {
        id -> BigInt,
        lat -> Double,
        lon -> Double,
        utm -> Integer,
        #[max_length = 255]
        name -> Nullable<Varchar>,
        city_id -> BigInt,
    }
}

diesel::joinable!(routes -> cities (city_id));

diesel::allow_tables_to_appear_in_same_query!(cities, routes, telemetry, stops);
