//! Hand-declared Diesel schema (no `diesel print-schema`, since the database
//! only exists at deploy time). Every status column is `Text` and round-trips
//! through the same `#[serde(rename_all = "snake_case")]` string forms the
//! in-process types serialize to, rather than a Diesel-mapped Rust enum.

diesel::table! {
    runs (id) {
        id -> Uuid,
        status -> Text,
        plan -> Nullable<Jsonb>,
        project_id -> Text,
        user_id -> Nullable<Text>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        ended_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    steps (id) {
        id -> Uuid,
        run_id -> Uuid,
        name -> Text,
        tool -> Text,
        inputs -> Jsonb,
        outputs -> Nullable<Jsonb>,
        status -> Text,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        ended_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        idempotency_key -> Nullable<Text>,
    }
}

diesel::table! {
    events (id) {
        id -> Uuid,
        run_id -> Uuid,
        step_id -> Nullable<Uuid>,
        event_type -> Text,
        payload -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    gates (id) {
        id -> Uuid,
        run_id -> Uuid,
        step_id -> Uuid,
        gate_type -> Text,
        status -> Text,
        created_at -> Timestamptz,
        approved_by -> Nullable<Text>,
        approved_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    artifacts (id) {
        id -> Uuid,
        step_id -> Uuid,
        artifact_type -> Text,
        path -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    inbox (key) {
        key -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    outbox (id) {
        id -> Uuid,
        topic -> Text,
        payload -> Jsonb,
        sent -> Bool,
        created_at -> Timestamptz,
        sent_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    migrations (id) {
        id -> Text,
        name -> Text,
        up_sql -> Text,
        down_sql -> Text,
        executed_at -> Timestamptz,
    }
}

diesel::joinable!(artifacts -> steps (step_id));
diesel::joinable!(steps -> runs (run_id));
diesel::joinable!(events -> runs (run_id));
diesel::joinable!(gates -> runs (run_id));

diesel::allow_tables_to_appear_in_same_query!(runs, steps, events, gates, artifacts, inbox, outbox, migrations,);
