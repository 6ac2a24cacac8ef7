use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crowdnest_common::{get_current_timestamp, year_of};
use crowdnest_database::{QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::project::{Project, ProjectStatus};
use crate::user::UserAddress;

use super::{order_number, Order, OrderStatus, PaymentLedger, Pledge, PledgeStatus};

/// An order as the buyer sees it in their order list.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderListItem {
    pub id: i64,
    pub order_number: String,
    pub project_id: i64,
    pub product_name: String,
    pub amount: Decimal,
    pub status: String,
    pub is_reward: bool,
    pub shipping_status: String,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<i64>,
    pub project_status: String,
    pub refund_status: String,
    pub image: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PledgerView {
    pub pledge_id: i64,
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub amount: Decimal,
    pub status: String,
    pub created_at: i64,
}

const ORDER_LIST_SELECT: &str = "SELECT o.id, o.order_number, o.project_id, p.title AS product_name, o.amount, o.status, o.is_reward, \
    COALESCE(s.status, 'not_shipped') AS shipping_status, s.tracking_number, s.estimated_delivery_at AS estimated_delivery, \
    p.status AS project_status, \
    COALESCE((SELECT r.status FROM refund_requests r WHERE r.order_id = o.id ORDER BY r.id DESC LIMIT 1), 'not_requested') AS refund_status, \
    (SELECT i.image_url FROM project_images i WHERE i.project_id = p.id ORDER BY i.is_primary DESC, i.id ASC LIMIT 1) AS image, \
    o.created_at \
    FROM orders o \
    JOIN projects p ON p.id = o.project_id \
    LEFT JOIN shipments s ON s.order_id = o.id";

/// Reasons a pledge is refused before anything is written.
pub(crate) fn check_pledge(project: &Project, amount: Decimal, now: i64) -> PlatformResult<()> {
    if amount <= Decimal::ZERO {
        return Err(PlatformError::validation("pledge amount must be greater than zero"));
    }
    if project.status != ProjectStatus::Active {
        return Err(PlatformError::conflict("project is not accepting pledges"));
    }
    if project.has_ended(now) {
        return Err(PlatformError::conflict("project has ended"));
    }
    Ok(())
}

fn stage(name: &'static str) -> impl FnOnce(sqlx::Error) -> PlatformError {
    move |e| PlatformError::Internal(anyhow::Error::new(e).context(format!("payment failed while {}", name)))
}

impl PaymentLedger {
    /// Pledge, order and project totals are written in one transaction.
    /// Without an explicit address the caller's default address is used.
    pub async fn process_payment(&self, user_id: i64, project_id: i64, amount: Decimal, address_id: Option<i64>) -> PlatformResult<Order> {
        let now = get_current_timestamp();
        let mut tx = self.db.begin().await?;

        let project = Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))?;
        check_pledge(&project, amount, now)?;

        let address_id = match address_id {
            Some(address_id) => {
                let address = UserAddress::find_one_by_criteria(
                    QueryCriteria::by_id(address_id).add_valued_filter("user_id", "=", user_id),
                    &mut *tx,
                ).await?
                    .ok_or_else(|| PlatformError::not_found("address not found"))?;
                Some(address.id)
            }
            None => UserAddress::find_one_by_criteria(
                QueryCriteria::new()
                    .add_valued_filter("user_id", "=", user_id)
                    .add_valued_filter("is_default", "=", true),
                &mut *tx,
            ).await?.map(|a| a.id),
        };

        let mut pledge = Pledge {
            user_id,
            project_id,
            amount,
            status: PledgeStatus::Pending,
            address_id,
            ..Default::default()
        }.create(&mut *tx).await.map_err(stage("creating the pledge"))?;

        let order = Order {
            order_number: order_number(year_of(now), pledge.id),
            user_id,
            project_id,
            pledge_id: pledge.id,
            amount,
            status: OrderStatus::Paid,
            is_reward: project.is_reward_amount(amount),
            address_id,
            ..Default::default()
        }.create(&mut *tx).await.map_err(stage("creating the order"))?;

        pledge.status = PledgeStatus::Paid;
        pledge.update(&mut *tx).await.map_err(stage("settling the pledge"))?;

        sqlx::query(
            "UPDATE projects SET total_amount = total_amount + $1,
                progress = CASE WHEN total_goal_amount > 0
                    THEN ((total_amount + $1) / total_goal_amount * 100)::DOUBLE PRECISION
                    ELSE 0 END
             WHERE id = $2"
        )
            .bind(amount)
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(stage("updating project totals"))?;

        tx.commit().await.context("payment failed while committing")?;

        tracing::info!(
            "[PaymentLedger::process_payment] order {} user={} project={} amount={} reward={}",
            order.order_number, user_id, project_id, amount, order.is_reward
        );
        Ok(order)
    }

    /// Newest first. Orders of failed projects are synced before listing.
    pub async fn get_orders_by_user(&self, user_id: i64) -> PlatformResult<Vec<OrderListItem>> {
        self.sync_orders_for_user(user_id).await?;

        let sql = format!("{} WHERE o.user_id = $1 ORDER BY o.created_at DESC, o.id DESC", ORDER_LIST_SELECT);
        Ok(sqlx::query_as::<_, OrderListItem>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?)
    }

    /// Only the owner sees the order; anyone else gets `None`.
    pub async fn get_order_by_id(&self, user_id: i64, order_id: i64) -> PlatformResult<Option<OrderListItem>> {
        let order = Order::find_one_by_criteria(
            QueryCriteria::by_id(order_id).add_valued_filter("user_id", "=", user_id),
            &self.db,
        ).await?;
        let Some(order) = order else {
            return Ok(None);
        };
        self.sync_orders_with_project_status(order.project_id).await?;

        let sql = format!("{} WHERE o.id = $1", ORDER_LIST_SELECT);
        Ok(sqlx::query_as::<_, OrderListItem>(&sql)
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?)
    }

    pub async fn get_order(&self, order_id: i64) -> PlatformResult<Option<Order>> {
        Ok(Order::find_one_by_criteria(QueryCriteria::by_id(order_id), &self.db).await?)
    }

    /// Moves the open orders of a failed project to `crowdfunding_failed`.
    /// Returns how many orders changed; a second run changes none.
    pub async fn sync_orders_with_project_status(&self, project_id: i64) -> PlatformResult<u64> {
        let done = sqlx::query(
            "UPDATE orders o SET status = $1
             FROM projects p
             WHERE p.id = o.project_id AND o.project_id = $2 AND p.status = $3 AND o.status = ANY($4)"
        )
            .bind(OrderStatus::CrowdfundingFailed.to_string())
            .bind(project_id)
            .bind(ProjectStatus::Failed.to_string())
            .bind(OrderStatus::open_status_strings())
            .execute(&self.db)
            .await?;
        if done.rows_affected() > 0 {
            tracing::info!("[PaymentLedger::sync_orders_with_project_status] project {} marked {} orders failed", project_id, done.rows_affected());
        }
        Ok(done.rows_affected())
    }

    async fn sync_orders_for_user(&self, user_id: i64) -> PlatformResult<u64> {
        let done = sqlx::query(
            "UPDATE orders o SET status = $1
             FROM projects p
             WHERE p.id = o.project_id AND o.user_id = $2 AND p.status = $3 AND o.status = ANY($4)"
        )
            .bind(OrderStatus::CrowdfundingFailed.to_string())
            .bind(user_id)
            .bind(ProjectStatus::Failed.to_string())
            .bind(OrderStatus::open_status_strings())
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected())
    }

    pub async fn get_project_pledgers(&self, project_id: i64) -> PlatformResult<Vec<PledgerView>> {
        Ok(sqlx::query_as::<_, PledgerView>(
            "SELECT pl.id AS pledge_id, pl.user_id, u.username, u.avatar_url, pl.amount, pl.status, pl.created_at
             FROM pledges pl JOIN users u ON u.id = pl.user_id
             WHERE pl.project_id = $1
             ORDER BY pl.created_at DESC, pl.id DESC"
        )
            .bind(project_id)
            .fetch_all(&self.db)
            .await?)
    }
}
