diesel::table! {
    orders (order_id) {
        order_id -> Varchar,
        ecwid_order_id -> Nullable<Varchar>,
        payment_id -> Nullable<Varchar>,
        fulfillment_status -> Varchar,
        tracking_number -> Nullable<Varchar>,
        items -> Jsonb,
        subtotal -> Numeric,
        delivery_fee -> Numeric,
        coupon_discount -> Numeric,
        grand_total -> Numeric,
        shipping_address -> Jsonb,
        version -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    email_outbox (id) {
        id -> Uuid,
        order_id -> Varchar,
        status -> Varchar,
        recipient -> Varchar,
        attempts -> Int4,
        next_attempt_at -> Timestamptz,
        state -> Varchar,
        last_error -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    email_outbox,
);
