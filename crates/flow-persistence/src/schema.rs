//! Esquema Diesel. Reemplazable con `diesel print-schema`.

diesel::table! {
    flows (id) {
        id -> Uuid,
        flow_type -> Text,
        current_state -> Text,
        props -> Jsonb,
        completed_at -> Nullable<Timestamptz>,
        last_errored_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    flow_transitions (id) {
        id -> BigInt,
        flow_id -> Uuid,
        transitioned_from -> Text,
        transitioned_to -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    flow_artefacts (id) {
        id -> BigInt,
        transition_id -> BigInt,
        name -> Text,
        payload -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(flow_transitions -> flows (flow_id));
diesel::joinable!(flow_artefacts -> flow_transitions (transition_id));

diesel::allow_tables_to_appear_in_same_query!(
    flows,
    flow_transitions,
    flow_artefacts,
);
