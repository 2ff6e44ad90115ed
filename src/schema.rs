// Table layout of a collection database. Every collection lives in its own
// SQLite file, so the table name is the same everywhere.

diesel::table! {
    records (id) {
        id -> Text,
        document -> Text,
        embedding -> Binary,
        extra -> Text,
        created_at -> Text,
        updated_at -> Text,
        hit_count -> BigInt,
        last_hit_time -> Text,
    }
}
