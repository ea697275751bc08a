// Diesel table definitions.
// Kept in sync by hand with src/migrations.

diesel::table! {
    collections (name) {
        name -> Text,
        created_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    records (id) {
        id -> Integer,
        collection -> Text,
        identity -> Text,
        payload -> Text,
        enrichment -> Text,
        ingested_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(collections, records);
