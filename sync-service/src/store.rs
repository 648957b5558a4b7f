//! Repository over the canonical order table and the email outbox.

use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use shared::FulfillmentStatus;

use crate::models::{EmailNotification, NewEmailNotification, NewOrder, Order};
use crate::schema::{email_outbox, orders};

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct OrderStore {
    pool: DbPool,
}

impl OrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;
        let order = orders::table
            .filter(orders::order_id.eq(order_id))
            .first::<Order>(&mut conn)
            .await
            .optional()?;
        Ok(order)
    }

    /// Checkout-completion insert. A row that already exists is left alone.
    pub async fn insert_if_absent(&self, row: &NewOrder) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(orders::table)
            .values(row)
            .on_conflict(orders::order_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn set_ecwid_order_id(&self, order_id: &str, ecwid_order_id: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(orders::table.filter(orders::order_id.eq(order_id)))
            .set((
                orders::ecwid_order_id.eq(ecwid_order_id),
                orders::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Orders the Poll-Status job must check: linked to the external system
    /// and not yet delivered.
    pub async fn find_needing_status_check(&self) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .filter(orders::ecwid_order_id.is_not_null())
            .filter(orders::fulfillment_status.ne(FulfillmentStatus::Delivered.as_str()))
            .order(orders::created_at.asc())
            .load::<Order>(&mut conn)
            .await?;
        Ok(rows)
    }

    /// Insert-or-update keyed by the derived order id. Mirrors the external
    /// record; the payment id is local-only and never touched here.
    pub async fn upsert_from_remote(&self, row: &NewOrder) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(orders::table)
            .values(row)
            .on_conflict(orders::order_id)
            .do_update()
            .set((
                orders::ecwid_order_id.eq(excluded(orders::ecwid_order_id)),
                orders::fulfillment_status.eq(excluded(orders::fulfillment_status)),
                orders::tracking_number.eq(excluded(orders::tracking_number)),
                orders::items.eq(excluded(orders::items)),
                orders::subtotal.eq(excluded(orders::subtotal)),
                orders::coupon_discount.eq(excluded(orders::coupon_discount)),
                orders::grand_total.eq(excluded(orders::grand_total)),
                orders::shipping_address.eq(excluded(orders::shipping_address)),
                orders::version.eq(orders::version + 1),
                orders::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Compare-and-swap status update. Returns false when another writer got
    /// there first (version moved on) or the order does not exist.
    pub async fn update_status(
        &self,
        order_id: &str,
        expected_version: i32,
        status: FulfillmentStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let target = orders::table
            .filter(orders::order_id.eq(order_id))
            .filter(orders::version.eq(expected_version));

        let updated = match tracking_number {
            Some(tracking) => {
                diesel::update(target)
                    .set((
                        orders::fulfillment_status.eq(status.as_str()),
                        orders::tracking_number.eq(tracking),
                        orders::version.eq(expected_version + 1),
                        orders::updated_at.eq(Some(Utc::now())),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set((
                        orders::fulfillment_status.eq(status.as_str()),
                        orders::version.eq(expected_version + 1),
                        orders::updated_at.eq(Some(Utc::now())),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };
        Ok(updated == 1)
    }

    /// Queue a status-change email, at most once per (order, status). Orders
    /// without a shipping email are skipped. Returns whether a row was queued.
    pub async fn enqueue_notification(
        &self,
        order: &Order,
        status: FulfillmentStatus,
    ) -> Result<bool> {
        let Some(recipient) = order.shipping_email() else {
            debug!("order {} has no shipping email, skipping notification", order.order_id);
            return Ok(false);
        };

        let row = NewEmailNotification::new(&order.order_id, status, &recipient);
        let mut conn = self.pool.get().await?;
        let inserted = diesel::insert_into(email_outbox::table)
            .values(&row)
            .on_conflict((email_outbox::order_id, email_outbox::status))
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted == 1)
    }

    pub async fn due_notifications(&self, limit: i64) -> Result<Vec<EmailNotification>> {
        let mut conn = self.pool.get().await?;
        let rows = email_outbox::table
            .filter(email_outbox::state.eq("pending"))
            .filter(email_outbox::next_attempt_at.le(Utc::now()))
            .order(email_outbox::created_at.asc())
            .limit(limit)
            .load::<EmailNotification>(&mut conn)
            .await?;
        Ok(rows)
    }

    pub async fn mark_notification_sent(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(email_outbox::table.filter(email_outbox::id.eq(id)))
            .set(email_outbox::state.eq("sent"))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn record_notification_failure(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        dead: bool,
        error: &str,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let state = if dead { "dead" } else { "pending" };
        diesel::update(email_outbox::table.filter(email_outbox::id.eq(id)))
            .set((
                email_outbox::attempts.eq(attempts),
                email_outbox::next_attempt_at.eq(next_attempt_at),
                email_outbox::state.eq(state),
                email_outbox::last_error.eq(Some(error)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Orders with a captured payment: the revenue-counted set.
    pub async fn count_paid_orders(&self) -> Result<(i64, BigDecimal)> {
        let mut conn = self.pool.get().await?;
        let count: i64 = orders::table
            .filter(orders::payment_id.is_not_null())
            .count()
            .get_result(&mut conn)
            .await?;
        let revenue: Option<BigDecimal> = orders::table
            .filter(orders::payment_id.is_not_null())
            .select(diesel::dsl::sum(orders::grand_total))
            .first(&mut conn)
            .await?;
        Ok((count, revenue.unwrap_or_default()))
    }

    /// Failed or abandoned attempts: no payment was ever captured.
    pub async fn list_failed_payments(&self, limit: i64) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .filter(orders::payment_id.is_null())
            .order(orders::created_at.desc())
            .limit(limit)
            .load::<Order>(&mut conn)
            .await?;
        Ok(rows)
    }
}
