use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crowdnest_common::{get_current_timestamp, retry, RetryPolicy};
use crowdnest_database::{is_foreign_key_violation, OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::user::{User, UserSummary};

use super::search::ProjectSearch;
use super::{
    funding_progress, goal_aggregates, ImageType, Project, ProjectCategory, ProjectComment, ProjectGoal,
    ProjectImage, ProjectStatus, ProjectTag, ProjectTagRelation, ProjectUpdate,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDraft {
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDraft {
    pub image_url: String,
    #[serde(default)]
    pub image_type: ImageType,
    #[serde(default)]
    pub is_primary: bool,
    /// Index into the goals of the same request.
    pub goal_index: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<i64>,
    pub end_date: i64,
    pub goals: Vec<GoalDraft>,
    #[serde(default)]
    pub images: Vec<ImageDraft>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl NewProject {
    pub fn validate(&self, now: i64) -> PlatformResult<()> {
        if self.title.trim().is_empty() {
            return Err(PlatformError::validation("title is required"));
        }
        validate_goals(&self.goals)?;
        if self.end_date <= now {
            return Err(PlatformError::validation("end date must be in the future"));
        }
        if let Some(image) = self.images.iter().find(|i| i.image_url.trim().is_empty()) {
            return Err(PlatformError::validation(format!("image url is required for {} image", image.image_type)));
        }
        if self.images.iter().filter_map(|i| i.goal_index).any(|i| i >= self.goals.len()) {
            return Err(PlatformError::validation("image refers to a goal that does not exist"));
        }
        Ok(())
    }
}

fn validate_goals(goals: &[GoalDraft]) -> PlatformResult<()> {
    if goals.is_empty() {
        return Err(PlatformError::validation("at least one funding goal is required"));
    }
    if goals.iter().any(|g| g.amount <= Decimal::ZERO) {
        return Err(PlatformError::validation("goal amounts must be greater than zero"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub end_date: Option<i64>,
    /// Replaces every goal when present.
    pub goals: Option<Vec<GoalDraft>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: ProjectGoal,
    pub is_reached: bool,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub creator: Option<UserSummary>,
    pub category: Option<String>,
    pub goals: Vec<GoalView>,
    pub images: Vec<ProjectImage>,
    pub primary_image: Option<String>,
    pub long_images: Vec<String>,
    pub tags: Vec<ProjectTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectListItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub creator_id: i64,
    pub creator_name: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_goal_amount: Decimal,
    pub progress: f64,
    pub min_reward_amount: Decimal,
    pub end_date: i64,
    pub category_id: Option<i64>,
    pub primary_image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectCommentView {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub created_at: i64,
}

pub(crate) const PROJECT_LIST_SELECT: &str = "SELECT p.id, p.title, p.description, p.creator_id, u.username AS creator_name, \
    p.status, p.total_amount, p.total_goal_amount, p.progress, p.min_reward_amount, p.end_date, p.category_id, \
    (SELECT i.image_url FROM project_images i WHERE i.project_id = p.id ORDER BY i.is_primary DESC, i.id ASC LIMIT 1) AS primary_image, \
    p.created_at, p.updated_at \
    FROM projects p JOIN users u ON u.id = p.creator_id";

/// Serialization failures and deadlocks; the whole transaction can be re-run.
fn is_retryable_conflict(err: &PlatformError) -> bool {
    match err {
        PlatformError::Database(sqlx::Error::Database(db)) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    }
}

fn unknown_reference(err: sqlx::Error) -> PlatformError {
    if is_foreign_key_violation(&err) {
        PlatformError::validation("unknown category or tag")
    } else {
        PlatformError::Database(err)
    }
}

/// Projects and everything hanging off them except money.
#[derive(Clone)]
pub struct ProjectCatalog {
    db: PgPool,
}

impl ProjectCatalog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_project(&self, creator_id: i64, draft: NewProject) -> PlatformResult<Project> {
        draft.validate(get_current_timestamp())?;

        let project = retry(RetryPolicy::default(), is_retryable_conflict, || self.insert_project(creator_id, &draft)).await?;
        tracing::info!("[ProjectCatalog::create_project] project {} created by user {}", project.id, creator_id);
        Ok(project)
    }

    async fn insert_project(&self, creator_id: i64, draft: &NewProject) -> PlatformResult<Project> {
        let mut tx = self.db.begin().await?;

        let amounts = draft.goals.iter().map(|g| g.amount).collect::<Vec<_>>();
        let (total_goal_amount, min_reward_amount) = goal_aggregates(&amounts);

        let project = Project {
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            creator_id,
            status: ProjectStatus::PendingReview,
            total_amount: Decimal::ZERO,
            total_goal_amount,
            progress: 0.0,
            min_reward_amount,
            end_date: draft.end_date,
            category_id: draft.category_id,
            ..Default::default()
        }
            .create(&mut *tx)
            .await
            .map_err(unknown_reference)?;

        let mut goal_ids = Vec::with_capacity(draft.goals.len());
        for goal in &draft.goals {
            let goal = ProjectGoal {
                project_id: project.id,
                amount: goal.amount,
                description: goal.description.clone(),
                ..Default::default()
            }.create(&mut *tx).await?;
            goal_ids.push(goal.id);
        }

        let has_primary = draft.images.iter().any(|i| i.is_primary);
        for (index, image) in draft.images.iter().enumerate() {
            ProjectImage {
                project_id: project.id,
                goal_id: image.goal_index.and_then(|i| goal_ids.get(i).copied()),
                image_url: image.image_url.clone(),
                is_primary: image.is_primary || (!has_primary && index == 0),
                image_type: image.image_type,
                ..Default::default()
            }.create(&mut *tx).await?;
        }

        let mut tag_ids = draft.tag_ids.clone();
        tag_ids.sort_unstable();
        tag_ids.dedup();
        for tag_id in tag_ids {
            ProjectTagRelation { project_id: project.id, tag_id, ..Default::default() }
                .create(&mut *tx)
                .await
                .map_err(unknown_reference)?;
        }

        tx.commit().await?;
        Ok(project)
    }

    pub async fn get_project(&self, project_id: i64) -> PlatformResult<Option<Project>> {
        Ok(Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &self.db).await?)
    }

    pub async fn get_project_detail(&self, project_id: i64) -> PlatformResult<Option<ProjectDetail>> {
        let Some(project) = self.get_project(project_id).await? else {
            return Ok(None);
        };

        let creator = project.fetch_creator(&self.db).await?.map(|u| u.summary());
        let category = project.fetch_category(&self.db).await?.map(|c| c.name);

        let goals = self.get_goals(project_id).await?
            .into_iter()
            .map(|goal| GoalView {
                is_reached: project.total_amount >= goal.amount,
                progress: funding_progress(project.total_amount, goal.amount),
                goal,
            })
            .collect();

        let images = self.get_images(project_id).await?;
        let primary_image = images.iter()
            .find(|i| i.is_primary)
            .or_else(|| images.iter().find(|i| i.image_type == ImageType::Main))
            .or_else(|| images.first())
            .map(|i| i.image_url.clone());
        let long_images = images.iter()
            .filter(|i| i.image_type == ImageType::Long)
            .map(|i| i.image_url.clone())
            .collect();
        let tags = self.get_project_tags(project_id).await?;

        Ok(Some(ProjectDetail { project, creator, category, goals, images, primary_image, long_images, tags }))
    }

    /// Ascending by amount; the first goal is the viability threshold.
    pub async fn get_goals(&self, project_id: i64) -> PlatformResult<Vec<ProjectGoal>> {
        Ok(ProjectGoal::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("project_id", "=", project_id)
                .order_by("amount", OrderDirection::Asc)
                .order_by("id", OrderDirection::Asc),
            &self.db,
        ).await?)
    }

    pub async fn get_images(&self, project_id: i64) -> PlatformResult<Vec<ProjectImage>> {
        Ok(ProjectImage::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("project_id", "=", project_id)
                .order_by("id", OrderDirection::Asc),
            &self.db,
        ).await?)
    }

    /// Only the edited columns are written, so a pledge committing meanwhile
    /// keeps its share of `total_amount`.
    pub async fn update_project(&self, user_id: i64, project_id: i64, edit: ProjectEdit) -> PlatformResult<Project> {
        let mut tx = self.db.begin().await?;

        let project = Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))?;
        if project.creator_id != user_id {
            return Err(PlatformError::forbidden("only the creator can edit this project"));
        }

        let title = match edit.title {
            Some(title) if title.trim().is_empty() => return Err(PlatformError::validation("title is required")),
            Some(title) => title.trim().to_string(),
            None => project.title,
        };
        let end_date = match edit.end_date {
            Some(end_date) if end_date <= get_current_timestamp() => {
                return Err(PlatformError::validation("end date must be in the future"));
            }
            Some(end_date) => end_date,
            None => project.end_date,
        };
        if let Some(goals) = &edit.goals {
            validate_goals(goals)?;
        }

        sqlx::query("UPDATE projects SET title = $1, description = $2, category_id = $3, end_date = $4 WHERE id = $5")
            .bind(title)
            .bind(edit.description.unwrap_or(project.description))
            .bind(edit.category_id.or(project.category_id))
            .bind(end_date)
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(unknown_reference)?;

        if let Some(goals) = edit.goals {
            sqlx::query("DELETE FROM project_goals WHERE project_id = $1")
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
            for goal in &goals {
                ProjectGoal {
                    project_id,
                    amount: goal.amount,
                    description: goal.description.clone(),
                    ..Default::default()
                }.create(&mut *tx).await?;
            }
            let amounts = goals.iter().map(|g| g.amount).collect::<Vec<_>>();
            let (total_goal_amount, min_reward_amount) = goal_aggregates(&amounts);
            sqlx::query(
                "UPDATE projects SET total_goal_amount = $1, min_reward_amount = $2,
                    progress = CASE WHEN $1 > 0
                        THEN (total_amount / $1 * 100)::DOUBLE PRECISION
                        ELSE 0 END
                 WHERE id = $3"
            )
                .bind(total_goal_amount)
                .bind(min_reward_amount)
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
        }

        let project = Project::find_one_by_criteria(QueryCriteria::by_id(project_id), &mut *tx).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))?;
        tx.commit().await?;
        Ok(project)
    }

    /// Public listing, newest first.
    pub async fn list_projects(&self, page: i64, page_size: i64) -> PlatformResult<(Vec<ProjectListItem>, i64)> {
        self.search_projects(&ProjectSearch::default(), page, page_size).await
    }

    pub async fn search_projects(&self, search: &ProjectSearch, page: i64, page_size: i64) -> PlatformResult<(Vec<ProjectListItem>, i64)> {
        let (limit, offset) = page_window(page, page_size);

        let mut qb = QueryBuilder::<Postgres>::new(PROJECT_LIST_SELECT);
        search.push_where(&mut qb);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ").push_bind(limit)
            .push(" OFFSET ").push_bind(offset);
        let projects = qb.build_query_as::<ProjectListItem>().fetch_all(&self.db).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects p");
        search.push_where(&mut count);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        Ok((projects, total))
    }

    pub async fn create_category(&self, name: &str) -> PlatformResult<ProjectCategory> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlatformError::validation("category name is required"));
        }
        ProjectCategory { name: name.to_string(), ..Default::default() }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "category already exists"))
    }

    pub async fn get_categories(&self) -> PlatformResult<Vec<ProjectCategory>> {
        Ok(ProjectCategory::find_by_criteria(
            QueryCriteria::new().order_by("name", OrderDirection::Asc),
            &self.db,
        ).await?)
    }

    pub async fn create_tag(&self, name: &str) -> PlatformResult<ProjectTag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlatformError::validation("tag name is required"));
        }
        ProjectTag { name: name.to_string(), ..Default::default() }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "tag already exists"))
    }

    pub async fn get_tags(&self) -> PlatformResult<Vec<ProjectTag>> {
        Ok(ProjectTag::find_by_criteria(
            QueryCriteria::new().order_by("name", OrderDirection::Asc),
            &self.db,
        ).await?)
    }

    pub async fn get_project_tags(&self, project_id: i64) -> PlatformResult<Vec<ProjectTag>> {
        Ok(sqlx::query_as::<_, <ProjectTag as crowdnest_database::SqlxSchema>::Row>(
            "SELECT t.id, t.name, t.created_at, t.updated_at FROM project_tags t
             JOIN project_tag_relations r ON r.tag_id = t.id
             WHERE r.project_id = $1 ORDER BY t.name ASC"
        )
            .bind(project_id)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(<ProjectTag as crowdnest_database::SqlxSchema>::from_row)
            .collect())
    }

    /// Creator or admin. A tag already on the project is `ResourceExists`.
    pub async fn add_tag_to_project(&self, actor: &User, project_id: i64, tag_id: i64) -> PlatformResult<ProjectTagRelation> {
        let project = self.require_project(project_id).await?;
        if project.creator_id != actor.id && !actor.is_admin() {
            return Err(PlatformError::forbidden("only the creator or an admin can tag this project"));
        }
        ProjectTag::find_one_by_criteria(QueryCriteria::by_id(tag_id), &self.db).await?
            .ok_or_else(|| PlatformError::not_found("tag not found"))?;

        ProjectTagRelation { project_id, tag_id, ..Default::default() }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "tag already added to project"))
    }

    pub async fn create_update(&self, user_id: i64, project_id: i64, title: &str, content: &str) -> PlatformResult<ProjectUpdate> {
        let project = self.require_project(project_id).await?;
        if project.creator_id != user_id {
            return Err(PlatformError::forbidden("only the creator can post updates"));
        }
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(PlatformError::validation("title and content are required"));
        }
        Ok(ProjectUpdate {
            project_id,
            title: title.trim().to_string(),
            content: content.to_string(),
            ..Default::default()
        }.create(&self.db).await?)
    }

    pub async fn get_updates(&self, project_id: i64) -> PlatformResult<Vec<ProjectUpdate>> {
        Ok(ProjectUpdate::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("project_id", "=", project_id)
                .order_by("created_at", OrderDirection::Desc)
                .order_by("id", OrderDirection::Desc),
            &self.db,
        ).await?)
    }

    pub async fn create_comment(&self, user_id: i64, project_id: i64, content: &str) -> PlatformResult<ProjectComment> {
        self.require_project(project_id).await?;
        if content.trim().is_empty() {
            return Err(PlatformError::validation("comment must not be empty"));
        }
        Ok(ProjectComment {
            project_id,
            user_id,
            content: content.to_string(),
            ..Default::default()
        }.create(&self.db).await?)
    }

    pub async fn get_comments(&self, project_id: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<ProjectCommentView>, i64)> {
        let (limit, offset) = page_window(page, page_size);
        let comments = sqlx::query_as::<_, ProjectCommentView>(
            "SELECT c.id, c.project_id, c.user_id, u.username, u.avatar_url, c.content, c.created_at
             FROM project_comments c JOIN users u ON u.id = c.user_id
             WHERE c.project_id = $1
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT $2 OFFSET $3"
        )
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let total = ProjectComment::count_by_criteria(
            QueryCriteria::new().add_valued_filter("project_id", "=", project_id),
            &self.db,
        ).await?;
        Ok((comments, total))
    }

    async fn require_project(&self, project_id: i64) -> PlatformResult<Project> {
        self.get_project(project_id).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::ProjectNotFound, "project not found"))
    }
}

/// `(limit, offset)` for a 1-based page. Page size is capped at 100.
pub(crate) fn page_window(page: i64, page_size: i64) -> (i64, i64) {
    let page_size = page_size.clamp(1, 100);
    let page = page.max(1);
    (page_size, (page - 1) * page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(now: i64) -> NewProject {
        NewProject {
            title: "Solar kettle".into(),
            description: "Boils water".into(),
            category_id: None,
            end_date: now + 86_400,
            goals: vec![
                GoalDraft { amount: Decimal::from(1000), description: "base".into() },
                GoalDraft { amount: Decimal::from(5000), description: "stretch".into() },
            ],
            images: vec![ImageDraft {
                image_url: "https://cdn/x.png".into(),
                image_type: ImageType::Goal,
                is_primary: false,
                goal_index: Some(1),
            }],
            tag_ids: vec![],
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(draft(1_000).validate(1_000).is_ok());
    }

    #[test]
    fn draft_rules() {
        let now = 1_000;

        let err = NewProject { goals: vec![], ..draft(now) }.validate(now).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);

        let err = NewProject { goals: vec![GoalDraft { amount: Decimal::ZERO, description: String::new() }], ..draft(now) }
            .validate(now).unwrap_err();
        assert_eq!(err.to_string(), "goal amounts must be greater than zero");

        let err = NewProject { end_date: now, ..draft(now) }.validate(now).unwrap_err();
        assert_eq!(err.to_string(), "end date must be in the future");

        let mut bad_image = draft(now);
        bad_image.images[0].goal_index = Some(2);
        assert!(bad_image.validate(now).is_err());

        let err = NewProject { title: "  ".into(), ..draft(now) }.validate(now).unwrap_err();
        assert_eq!(err.to_string(), "title is required");
    }

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(1, 10), (10, 0));
        assert_eq!(page_window(3, 10), (10, 20));
        assert_eq!(page_window(0, 0), (1, 0));
        assert_eq!(page_window(2, 1000), (100, 100));
    }

    #[test]
    fn only_serialization_failures_are_retried() {
        assert!(!is_retryable_conflict(&PlatformError::validation("x")));
        assert!(!is_retryable_conflict(&PlatformError::Database(sqlx::Error::RowNotFound)));
    }
}
