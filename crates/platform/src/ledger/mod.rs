mod payment;
mod refund;
mod shipment;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use strum_macros::{Display, EnumString};

use crowdnest_database::SqlxObject;

use crate::project::Project;
use crate::user::{User, UserAddress};

pub use payment::{OrderListItem, PledgerView};
pub use refund::RefundRequestView;
pub use shipment::ShipmentDraft;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PledgeStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    CrowdfundingFailed,
    Refunded,
    RefundRejected,
}

impl OrderStatus {
    /// Money is held but the order has not moved on yet. A failed project
    /// marks these `crowdfunding_failed`.
    pub const OPEN: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Paid];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    /// Orders a failed project refunds automatically: the open ones and the
    /// ones already marked `crowdfunding_failed`.
    pub const REFUNDABLE: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::CrowdfundingFailed];

    /// Orders whose money the project still holds. Their sum is what the
    /// expiry sweep compares with the lowest goal.
    pub const FUNDED: [OrderStatus; 3] = [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::RefundRejected];

    pub(crate) fn open_status_strings() -> Vec<String> {
        Self::OPEN.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn refundable_status_strings() -> Vec<String> {
        Self::REFUNDABLE.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn funded_status_strings() -> Vec<String> {
        Self::FUNDED.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    NotShipped,
    Shipped,
    Delivered,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "pledges"]
pub struct Pledge {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub user_id: i64,
    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,

    pub amount: Decimal,
    pub status: PledgeStatus,

    #[foreign_key(referenced_table = "user_addresses", related_rust_type = "UserAddress", on_delete = "RESTRICT")]
    pub address_id: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "orders"]
pub struct Order {
    pub id: i64,

    #[unique]
    pub order_number: String,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub user_id: i64,
    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,
    #[foreign_key(referenced_table = "pledges", related_rust_type = "Pledge")]
    #[unique]
    pub pledge_id: i64,

    pub amount: Decimal,
    #[indexed]
    pub status: OrderStatus,
    pub is_reward: bool,

    #[foreign_key(referenced_table = "user_addresses", related_rust_type = "UserAddress", on_delete = "RESTRICT")]
    pub address_id: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "refund_requests"]
#[partial_unique(column = "order_id", predicate = "status = 'pending'")]
pub struct RefundRequest {
    pub id: i64,

    #[foreign_key(referenced_table = "orders", related_rust_type = "Order")]
    #[indexed]
    pub order_id: i64,
    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    pub user_id: i64,

    pub reason: String,
    pub status: RefundStatus,
    pub admin_comment: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "shipments"]
pub struct Shipment {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    pub project_id: i64,
    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    pub user_id: i64,
    #[foreign_key(referenced_table = "orders", related_rust_type = "Order")]
    #[unique]
    pub order_id: i64,
    #[foreign_key(referenced_table = "user_addresses", related_rust_type = "UserAddress", on_delete = "RESTRICT")]
    pub address_id: Option<i64>,

    pub status: ShipmentStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,

    pub shipped_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub estimated_delivery_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// `ORD-<year>-<pledge id, zero padded to 4>`. The pledge id keeps it unique.
pub fn order_number(year: i32, pledge_id: i64) -> String {
    format!("ORD-{}-{:04}", year, pledge_id)
}

/// Pledges, orders, refunds and shipments. Every money-moving operation runs
/// in a single transaction.
#[derive(Clone)]
pub struct PaymentLedger {
    db: PgPool,
}

impl PaymentLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_zero_padded() {
        assert_eq!(order_number(2024, 7), "ORD-2024-0007");
        assert_eq!(order_number(2025, 123456), "ORD-2025-123456");
    }

    #[test]
    fn open_orders_are_pending_or_paid() {
        assert!(OrderStatus::Pending.is_open());
        assert!(OrderStatus::Paid.is_open());
        assert!(!OrderStatus::Shipped.is_open());
        assert!(!OrderStatus::RefundRejected.is_open());
        assert_eq!(OrderStatus::open_status_strings(), vec!["pending", "paid"]);
    }

    #[test]
    fn refunds_and_funding_use_separate_status_sets() {
        assert_eq!(OrderStatus::refundable_status_strings(), vec!["pending", "paid", "crowdfunding_failed"]);
        assert_eq!(OrderStatus::funded_status_strings(), vec!["paid", "shipped", "refund_rejected"]);
        assert!(!OrderStatus::FUNDED.contains(&OrderStatus::Refunded));
    }

    #[test]
    fn addresses_on_orders_cannot_be_deleted_away() {
        use crowdnest_database::SqlxSchema;
        let fk = "FOREIGN KEY (\"address_id\") REFERENCES \"user_addresses\"(\"id\") ON DELETE RESTRICT";
        assert!(Pledge::create_table_sql().contains(fk));
        assert!(Order::create_table_sql().contains(fk));
        assert!(Shipment::create_table_sql().contains(fk));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(OrderStatus::CrowdfundingFailed.to_string(), "crowdfunding_failed");
        assert_eq!(OrderStatus::RefundRejected.to_string(), "refund_rejected");
        assert_eq!(ShipmentStatus::NotShipped.to_string(), "not_shipped");
        assert_eq!("delivered".parse::<ShipmentStatus>().unwrap(), ShipmentStatus::Delivered);
        assert!("lost".parse::<ShipmentStatus>().is_err());
        assert_eq!(
            serde_json::to_value(RefundStatus::Approved).unwrap(),
            serde_json::json!("approved")
        );
    }

    #[test]
    fn refund_index_covers_only_pending_requests() {
        use crowdnest_database::SqlxSchema;
        assert!(RefundRequest::INDEXES_SQL.iter().any(|sql| sql.contains("WHERE status = 'pending'")));
    }
}
