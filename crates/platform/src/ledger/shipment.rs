use serde::{Deserialize, Serialize};

use crowdnest_common::get_current_timestamp;
use crowdnest_database::{QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};

use super::{Order, OrderStatus, PaymentLedger, Shipment, ShipmentStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentDraft {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery_at: Option<i64>,
}

/// Sets the status and stamps the matching timestamp.
pub(crate) fn apply_shipment_status(shipment: &mut Shipment, status: ShipmentStatus, now: i64) {
    shipment.status = status;
    match status {
        ShipmentStatus::Shipped => shipment.shipped_at = Some(now),
        ShipmentStatus::Delivered => shipment.delivered_at = Some(now),
        ShipmentStatus::NotShipped => {}
    }
}

impl PaymentLedger {
    /// Ships an open order: the shipment row and the order status change together.
    pub async fn create_shipment(&self, order_id: i64, draft: ShipmentDraft) -> PlatformResult<Shipment> {
        let mut tx = self.db.begin().await?;

        let order = Order::find_one_by_criteria(QueryCriteria::by_id(order_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::not_found("order not found"))?;

        // guarded on the status so a refund committing meanwhile wins
        let shipped = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = ANY($3)")
            .bind(OrderStatus::Shipped.to_string())
            .bind(order_id)
            .bind(OrderStatus::open_status_strings())
            .execute(&mut *tx)
            .await?;
        if shipped.rows_affected() == 0 {
            return Err(PlatformError::conflict("order is no longer open and cannot be shipped"));
        }

        let mut shipment = Shipment {
            project_id: order.project_id,
            user_id: order.user_id,
            order_id,
            address_id: order.address_id,
            tracking_number: draft.tracking_number,
            carrier: draft.carrier,
            estimated_delivery_at: draft.estimated_delivery_at,
            ..Default::default()
        };
        apply_shipment_status(&mut shipment, ShipmentStatus::Shipped, get_current_timestamp());
        let shipment = shipment.create(&mut *tx).await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "order already has a shipment"))?;

        tx.commit().await?;
        tracing::info!("[PaymentLedger::create_shipment] shipment {} for order {}", shipment.id, order_id);
        Ok(shipment)
    }

    pub async fn update_shipment_status(&self, shipment_id: i64, status: &str, tracking_number: Option<String>) -> PlatformResult<Shipment> {
        let status: ShipmentStatus = status.parse()
            .map_err(|_| PlatformError::validation("status must be one of not_shipped, shipped, delivered"))?;

        let mut shipment = Shipment::find_one_by_criteria(QueryCriteria::by_id(shipment_id), &self.db).await?
            .ok_or_else(|| PlatformError::not_found("shipment not found"))?;

        apply_shipment_status(&mut shipment, status, get_current_timestamp());
        if let Some(tracking_number) = tracking_number {
            shipment.tracking_number = Some(tracking_number);
        }
        Ok(shipment.update(&self.db).await?)
    }

    pub async fn get_shipment_by_order(&self, order_id: i64) -> PlatformResult<Option<Shipment>> {
        Ok(Shipment::find_one_by_criteria(
            QueryCriteria::new().add_valued_filter("order_id", "=", order_id),
            &self.db,
        ).await?)
    }
}
