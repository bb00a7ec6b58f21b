diesel::table! {
    users (id) {
        id -> Uuid,
        full_name -> Varchar,
        email -> Varchar,
        role -> Varchar,
        department_id -> Nullable<Uuid>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    departments (id) {
        id -> Uuid,
        name -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        title -> Varchar,
        description -> Text,
        department_id -> Uuid,
        category_id -> Uuid,
        priority -> Varchar,
        status -> Varchar,
        requester_id -> Uuid,
        assignee_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Uuid,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_audit_logs (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        action -> Varchar,
        old_value -> Nullable<Varchar>,
        new_value -> Nullable<Varchar>,
        actor_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_sequence (id) {
        id -> Int4,
        value -> Int8,
    }
}

diesel::joinable!(tickets -> departments (department_id));
diesel::joinable!(tickets -> categories (category_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_comments -> users (author_id));
diesel::joinable!(ticket_audit_logs -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    departments,
    categories,
    tickets,
    ticket_comments,
    ticket_audit_logs,
);
