diesel::table! {
    client_assets (id) {
        id -> Uuid,
        account_id -> Uuid,
        asset_type -> Varchar,
        name -> Varchar,
        vendor -> Nullable<Varchar>,
        serial_number -> Nullable<Varchar>,
        ip_address -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        specs -> Jsonb,
        status -> Varchar,
        expires_at -> Nullable<Timestamptz>,
        linked_product_id -> Nullable<Uuid>,
        auto_invoice -> Bool,
        pending_renewal_invoice_id -> Nullable<Uuid>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    renewal_deliveries (id) {
        id -> Uuid,
        asset_id -> Uuid,
        account_id -> Uuid,
        sent_to -> Varchar,
        sent_cc -> Array<Text>,
        subject -> Varchar,
        sender -> Varchar,
        recipient_contact_id -> Nullable<Uuid>,
        status -> Varchar,
        error -> Nullable<Text>,
        sent_at -> Timestamptz,
    }
}

diesel::table! {
    crm_accounts (id) {
        id -> Uuid,
        name -> Varchar,
        billing_email -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    crm_contacts (id) {
        id -> Uuid,
        account_id -> Uuid,
        first_name -> Nullable<Varchar>,
        last_name -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        persona -> Nullable<Varchar>,
        is_primary_contact -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Uuid,
        sku -> Nullable<Varchar>,
        name -> Varchar,
        unit_price -> Numeric,
        currency -> Varchar,
        billing_frequency -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    invoices (id) {
        id -> Uuid,
        account_id -> Uuid,
        number -> Varchar,
        status -> Varchar,
        currency -> Varchar,
        total -> Numeric,
        line_items -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    support_tickets (id) {
        id -> Uuid,
        account_id -> Uuid,
        asset_id -> Nullable<Uuid>,
        ticket_number -> Varchar,
        subject -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        source -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    client_assets,
    renewal_deliveries,
    crm_accounts,
    crm_contacts,
    products,
    invoices,
    support_tickets,
);
