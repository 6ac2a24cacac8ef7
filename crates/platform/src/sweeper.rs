use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crowdnest_common::get_current_timestamp;

use crate::error::PlatformResult;
use crate::ledger::{OrderStatus, PaymentLedger};
use crate::project::ProjectStatus;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Expired, not terminal, and the money still held by its orders is below
/// the lowest goal. A project without goals never fails this way.
/// Binds: `$1` terminal statuses, `$2` now, `$3` funded order statuses.
const EXPIRED_UNDERFUNDED_SQL: &str = "SELECT p.id FROM projects p
     WHERE p.status <> ALL($1) AND p.end_date <= $2
       AND COALESCE((SELECT SUM(o.amount) FROM orders o WHERE o.project_id = p.id AND o.status = ANY($3)), 0)
           < (SELECT MIN(g.amount) FROM project_goals g WHERE g.project_id = p.id)
     ORDER BY p.id";

fn terminal_status_strings() -> Vec<String> {
    ProjectStatus::TERMINAL.iter().map(|s| s.to_string()).collect()
}

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub failed_projects: Vec<i64>,
    pub refunded_orders: u64,
}

/// Periodically fails expired projects that missed their lowest goal and
/// refunds their open orders.
#[derive(Clone)]
pub struct ExpirySweeper {
    db: PgPool,
    ledger: PaymentLedger,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(db: PgPool, ledger: PaymentLedger) -> Self {
        Self { db, ledger, period: DEFAULT_SWEEP_INTERVAL }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Ticks until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("[ExpirySweeper] started, period {:?}", self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.failed_projects.is_empty() || report.refunded_orders > 0 => {
                            tracing::info!(
                                "[ExpirySweeper] failed projects {:?}, refunded {} orders",
                                report.failed_projects, report.refunded_orders
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!("[ExpirySweeper] sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("[ExpirySweeper] stopped");
    }

    /// One pass: fail expired projects, then run the refund cascade.
    pub async fn sweep_once(&self) -> PlatformResult<SweepReport> {
        let failed_projects = self.fail_expired_projects().await?;
        let refunded_orders = self.run_failure_cascade().await?;
        Ok(SweepReport { failed_projects, refunded_orders })
    }

    /// Marks every expired project that missed its lowest goal as failed and
    /// returns their ids.
    pub async fn fail_expired_projects(&self) -> PlatformResult<Vec<i64>> {
        let now = get_current_timestamp();
        let terminal = terminal_status_strings();

        let candidates: Vec<i64> = sqlx::query_scalar(EXPIRED_UNDERFUNDED_SQL)
            .bind(terminal.clone())
            .bind(now)
            .bind(OrderStatus::funded_status_strings())
            .fetch_all(&self.db)
            .await?;

        let mut failed = Vec::with_capacity(candidates.len());
        for project_id in candidates {
            // another writer may have finished the project since the select
            let done = sqlx::query("UPDATE projects SET status = $1 WHERE id = $2 AND status <> ALL($3)")
                .bind(ProjectStatus::Failed.to_string())
                .bind(project_id)
                .bind(terminal.clone())
                .execute(&self.db)
                .await?;
            if done.rows_affected() == 1 {
                tracing::info!("[ExpirySweeper] project {} failed", project_id);
                failed.push(project_id);
            }
        }
        Ok(failed)
    }

    /// Marks the open orders of every failed project `crowdfunding_failed`,
    /// then refunds them. Projects whose cascade failed on an earlier tick
    /// are picked up again here.
    pub async fn run_failure_cascade(&self) -> PlatformResult<u64> {
        let projects: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT o.project_id FROM orders o JOIN projects p ON p.id = o.project_id
             WHERE p.status = $1 AND o.status = ANY($2)
             ORDER BY o.project_id"
        )
            .bind(ProjectStatus::Failed.to_string())
            .bind(OrderStatus::refundable_status_strings())
            .fetch_all(&self.db)
            .await?;

        let mut refunded_orders = 0;
        for project_id in projects {
            if let Err(e) = self.ledger.sync_orders_with_project_status(project_id).await {
                tracing::error!("[ExpirySweeper] order sync for project {} failed: {}", project_id, e);
            }
            match self.ledger.auto_refund_for_failed_project(project_id).await {
                Ok(refunded) => refunded_orders += refunded,
                Err(e) => tracing::error!("[ExpirySweeper] auto refund for project {} failed, retrying next tick: {}", project_id, e),
            }
        }
        Ok(refunded_orders)
    }
}
