use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crowdnest_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::project::{page_window, Project, ProjectStatus};

use super::{Order, OrderStatus, PaymentLedger, RefundRequest, RefundStatus};

pub(crate) const AUTO_REFUND_REASON: &str = "project crowdfunding failed, automatic refund";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefundRequestView {
    pub id: i64,
    pub order_id: i64,
    pub order_number: String,
    pub order_status: String,
    pub amount: Decimal,
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub project_id: i64,
    pub project_title: String,
    pub reason: String,
    pub status: String,
    pub admin_comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Request and order status after an admin decision.
pub(crate) fn refund_outcome(approved: bool) -> (RefundStatus, OrderStatus) {
    if approved {
        (RefundStatus::Approved, OrderStatus::Refunded)
    } else {
        (RefundStatus::Rejected, OrderStatus::RefundRejected)
    }
}

impl PaymentLedger {
    /// Files a pending refund request. The order status only changes once an
    /// admin decides. A second pending request for the same order is a conflict.
    pub async fn request_refund_for_failed_project(&self, order_id: i64, user_id: i64, reason: Option<String>) -> PlatformResult<RefundRequest> {
        let order = self.get_order(order_id).await?
            .ok_or_else(|| PlatformError::not_found("order not found"))?;
        if order.user_id != user_id {
            return Err(PlatformError::forbidden("order does not belong to you"));
        }
        if order.status == OrderStatus::Refunded {
            return Err(PlatformError::conflict("order has already been refunded"));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "project crowdfunding failed".to_string());

        let request = RefundRequest {
            order_id,
            user_id,
            reason,
            status: RefundStatus::Pending,
            admin_comment: None,
            ..Default::default()
        }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceConflict, "a refund request for this order is already pending"))?;

        tracing::info!("[PaymentLedger::request_refund_for_failed_project] refund request {} for order {}", request.id, order_id);
        Ok(request)
    }

    /// Admin decision on a pending request. Request and order change together,
    /// and only while the request is still pending.
    pub async fn process_refund(&self, request_id: i64, approved: bool, comment: Option<String>) -> PlatformResult<RefundRequest> {
        let mut tx = self.db.begin().await?;

        let (request_status, order_status) = refund_outcome(approved);
        let decided = sqlx::query("UPDATE refund_requests SET status = $1, admin_comment = $2 WHERE id = $3 AND status = $4")
            .bind(request_status.to_string())
            .bind(comment)
            .bind(request_id)
            .bind(RefundStatus::Pending.to_string())
            .execute(&mut *tx)
            .await?;
        let request = RefundRequest::find_one_by_criteria(QueryCriteria::by_id(request_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::not_found("refund request not found"))?;
        if decided.rows_affected() == 0 {
            return Err(PlatformError::conflict("refund request has already been processed"));
        }

        let updated = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(order_status.to_string())
            .bind(request.order_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(PlatformError::not_found("order not found"));
        }

        tx.commit().await?;
        tracing::info!("[PaymentLedger::process_refund] request {} -> {}, order {} -> {}", request.id, request_status, request.order_id, order_status);
        Ok(request)
    }

    /// Approves a refund for every refundable order of a failed project in one
    /// transaction. Returns the number of refunded orders.
    pub async fn auto_refund_for_failed_project(&self, project_id: i64) -> PlatformResult<u64> {
        let mut tx = self.db.begin().await?;

        let project = Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))?;
        if project.status != ProjectStatus::Failed {
            return Err(PlatformError::conflict("only failed projects are refunded automatically"));
        }

        let orders = Order::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("project_id", "=", project_id)
                .add_valued_filter("status", "= ANY({})", OrderStatus::refundable_status_strings())
                .order_by("id", OrderDirection::Asc),
            &mut *tx,
        ).await?;

        let mut refunded = 0;
        for order in orders {
            let done = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = ANY($3)")
                .bind(OrderStatus::Refunded.to_string())
                .bind(order.id)
                .bind(OrderStatus::refundable_status_strings())
                .execute(&mut *tx)
                .await?;
            if done.rows_affected() == 0 {
                continue;
            }

            // a user's own pending request is superseded by the automatic one
            sqlx::query("UPDATE refund_requests SET status = $1, admin_comment = $2 WHERE order_id = $3 AND status = $4")
                .bind(RefundStatus::Approved.to_string())
                .bind("approved automatically")
                .bind(order.id)
                .bind(RefundStatus::Pending.to_string())
                .execute(&mut *tx)
                .await?;

            RefundRequest {
                order_id: order.id,
                user_id: order.user_id,
                reason: AUTO_REFUND_REASON.to_string(),
                status: RefundStatus::Approved,
                admin_comment: Some("system".to_string()),
                ..Default::default()
            }.create(&mut *tx).await?;
            refunded += 1;
        }

        tx.commit().await?;
        if refunded > 0 {
            tracing::info!("[PaymentLedger::auto_refund_for_failed_project] project {} refunded {} orders", project_id, refunded);
        }
        Ok(refunded)
    }

    /// Latest refund request of the caller's order.
    pub async fn get_refund_status(&self, user_id: i64, order_id: i64) -> PlatformResult<Option<RefundRequest>> {
        let owned = Order::count_by_criteria(
            QueryCriteria::by_id(order_id).add_valued_filter("user_id", "=", user_id),
            &self.db,
        ).await?;
        if owned == 0 {
            return Ok(None);
        }
        Ok(RefundRequest::find_one_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("order_id", "=", order_id)
                .order_by("id", OrderDirection::Desc),
            &self.db,
        ).await?)
    }

    pub async fn list_refund_requests(&self, page: i64, page_size: i64) -> PlatformResult<(Vec<RefundRequestView>, i64)> {
        let (limit, offset) = page_window(page, page_size);

        let requests = sqlx::query_as::<_, RefundRequestView>(
            "SELECT r.id, r.order_id, o.order_number, o.status AS order_status, o.amount,
                    r.user_id, u.username, u.avatar_url, o.project_id, p.title AS project_title,
                    r.reason, r.status, r.admin_comment, r.created_at, r.updated_at
             FROM refund_requests r
             JOIN orders o ON o.id = r.order_id
             JOIN users u ON u.id = r.user_id
             JOIN projects p ON p.id = o.project_id
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT $1 OFFSET $2"
        )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let total = RefundRequest::count_by_criteria(QueryCriteria::new(), &self.db).await?;
        Ok((requests, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_pair_request_and_order_status() {
        assert_eq!(refund_outcome(true), (RefundStatus::Approved, OrderStatus::Refunded));
        assert_eq!(refund_outcome(false), (RefundStatus::Rejected, OrderStatus::RefundRejected));
    }
}
