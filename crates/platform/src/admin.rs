use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crowdnest_database::{QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::ledger::OrderStatus;
use crate::project::{page_window, Project, ProjectListItem, ProjectStatus, PROJECT_LIST_SELECT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_projects: i64,
    pub total_orders: i64,
    /// Sum over paid, shipped and pending orders.
    pub total_amount: Decimal,
    pub active_projects: i64,
    pub pending_orders: i64,
}

/// Statuses whose amounts count towards the platform total.
fn counted_order_statuses() -> Vec<String> {
    [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Pending]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Status after a review decision. Only projects waiting for review can be reviewed.
pub(crate) fn review_transition(current: ProjectStatus, approved: bool) -> PlatformResult<ProjectStatus> {
    if current != ProjectStatus::PendingReview {
        return Err(PlatformError::conflict(format!("project is {} and cannot be reviewed", current)));
    }
    Ok(if approved { ProjectStatus::Active } else { ProjectStatus::Rejected })
}

fn push_admin_filters(qb: &mut QueryBuilder<'_, Postgres>, status: Option<ProjectStatus>, search: Option<&str>) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = status {
        qb.push(" AND p.status = ").push_bind(status.to_string());
    }
    if let Some(keyword) = search.map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = format!("%{}%", keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (p.title ILIKE ").push_bind(pattern.clone())
            .push(" OR p.description ILIKE ").push_bind(pattern)
            .push(")");
    }
}

/// Cross-cutting operations for operators. Callers are expected to have
/// checked the admin role already.
#[derive(Clone)]
pub struct AdminConsole {
    db: PgPool,
}

impl AdminConsole {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Every project regardless of status, newest first.
    pub async fn get_projects(&self, page: i64, page_size: i64, status: Option<ProjectStatus>, search: Option<&str>) -> PlatformResult<(Vec<ProjectListItem>, i64)> {
        let (limit, offset) = page_window(page, page_size);

        let mut qb = QueryBuilder::<Postgres>::new(PROJECT_LIST_SELECT);
        push_admin_filters(&mut qb, status, search);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ").push_bind(limit)
            .push(" OFFSET ").push_bind(offset);
        let projects = qb.build_query_as::<ProjectListItem>().fetch_all(&self.db).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects p");
        push_admin_filters(&mut count, status, search);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        Ok((projects, total))
    }

    async fn require_project(&self, project_id: i64) -> PlatformResult<Project> {
        Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &self.db).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))
    }

    /// Writes only the status column. With `expected`, the row must still be
    /// in that status or the change is a conflict.
    async fn set_status(&self, project_id: i64, status: ProjectStatus, expected: Option<ProjectStatus>) -> PlatformResult<Project> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE projects SET status = ");
        qb.push_bind(status.to_string())
            .push(" WHERE id = ").push_bind(project_id);
        if let Some(expected) = expected {
            qb.push(" AND status = ").push_bind(expected.to_string());
        }
        let done = qb.build().execute(&self.db).await?;
        if done.rows_affected() == 0 {
            self.require_project(project_id).await?;
            return Err(PlatformError::conflict("project status changed, reload and retry"));
        }
        self.require_project(project_id).await
    }

    pub async fn review_project(&self, project_id: i64, approved: bool, comment: Option<&str>) -> PlatformResult<Project> {
        let project = self.require_project(project_id).await?;
        let next = review_transition(project.status, approved)?;
        let project = self.set_status(project_id, next, Some(project.status)).await?;

        tracing::info!(
            "[AdminConsole::review_project] project {} -> {} comment={:?}",
            project_id, project.status, comment.unwrap_or_default()
        );
        Ok(project)
    }

    pub async fn update_project_status(&self, project_id: i64, status: &str) -> PlatformResult<Project> {
        let status: ProjectStatus = status.parse()
            .map_err(|_| PlatformError::validation("status must be one of pending_review, active, completed, failed, rejected"))?;
        self.set_status(project_id, status, None).await
    }

    /// Images, goals, tag links, updates and comments go first, then the
    /// project. A project with pledges or orders cannot be deleted.
    pub async fn delete_project(&self, project_id: i64) -> PlatformResult<()> {
        let project = self.require_project(project_id).await?;
        let mut tx = self.db.begin().await?;

        for table in ["project_images", "project_goals", "project_tag_relations", "project_updates", "project_comments"] {
            sqlx::query(&format!("DELETE FROM {} WHERE project_id = $1", table))
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
        }
        project.delete(&mut *tx).await
            .map_err(|e| PlatformError::on_foreign_key_violation(e, "project has pledges or orders and cannot be deleted"))?;

        tx.commit().await?;
        tracing::info!("[AdminConsole::delete_project] project {} deleted", project_id);
        Ok(())
    }

    pub async fn get_system_stats(&self) -> PlatformResult<SystemStats> {
        Ok(sqlx::query_as::<_, SystemStats>(
            "SELECT
                (SELECT COUNT(*) FROM users WHERE deleted_at IS NULL) AS total_users,
                (SELECT COUNT(*) FROM projects) AS total_projects,
                (SELECT COUNT(*) FROM orders) AS total_orders,
                (SELECT COALESCE(SUM(amount), 0) FROM orders WHERE status = ANY($1)) AS total_amount,
                (SELECT COUNT(*) FROM projects WHERE status = $2) AS active_projects,
                (SELECT COUNT(*) FROM orders WHERE status = $3) AS pending_orders"
        )
            .bind(counted_order_statuses())
            .bind(ProjectStatus::Active.to_string())
            .bind(OrderStatus::Pending.to_string())
            .fetch_one(&self.db)
            .await?)
    }
}
