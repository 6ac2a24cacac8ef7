mod catalog;
mod search;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crowdnest_database::SqlxObject;

use crate::user::User;

pub use catalog::{
    GoalDraft, GoalView, ImageDraft, NewProject, ProjectCatalog, ProjectCommentView, ProjectDetail,
    ProjectEdit, ProjectListItem,
};
pub use search::ProjectSearch;
pub(crate) use catalog::{page_window, PROJECT_LIST_SELECT};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    PendingReview,
    Active,
    Completed,
    Failed,
    Rejected,
}

impl ProjectStatus {
    /// States the expiry sweep never leaves or re-enters.
    pub const TERMINAL: [ProjectStatus; 3] = [ProjectStatus::Failed, ProjectStatus::Completed, ProjectStatus::Rejected];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Visible in the public listing.
    pub fn is_public(&self) -> bool {
        !matches!(self, ProjectStatus::PendingReview | ProjectStatus::Rejected)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageType {
    #[default]
    Main,
    Long,
    Goal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_categories"]
pub struct ProjectCategory {
    pub id: i64,
    #[unique]
    pub name: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_tags"]
pub struct ProjectTag {
    pub id: i64,
    #[unique]
    pub name: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "projects"]
pub struct Project {
    pub id: i64,

    pub title: String,
    pub description: String,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub creator_id: i64,

    #[indexed]
    pub status: ProjectStatus,

    pub total_amount: Decimal,
    pub total_goal_amount: Decimal,
    pub progress: f64,
    pub min_reward_amount: Decimal,
    pub end_date: i64,

    #[foreign_key(referenced_table = "project_categories", related_rust_type = "ProjectCategory")]
    pub category_id: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub fn has_ended(&self, now: i64) -> bool {
        self.end_date <= now
    }

    /// Pledges of at least this amount carry a reward.
    pub fn is_reward_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_reward_amount
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_goals"]
pub struct ProjectGoal {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,

    pub amount: Decimal,
    pub description: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_images"]
pub struct ProjectImage {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,
    #[foreign_key(referenced_table = "project_goals", related_rust_type = "ProjectGoal")]
    pub goal_id: Option<i64>,

    pub image_url: String,
    pub is_primary: bool,
    pub image_type: ImageType,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_tag_relations"]
#[unique_together("project_id", "tag_id")]
pub struct ProjectTagRelation {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    pub project_id: i64,
    #[foreign_key(referenced_table = "project_tags", related_rust_type = "ProjectTag", on_delete = "CASCADE")]
    pub tag_id: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_updates"]
pub struct ProjectUpdate {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,

    pub title: String,
    pub content: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "project_comments"]
pub struct ProjectComment {
    pub id: i64,

    #[foreign_key(referenced_table = "projects", related_rust_type = "Project")]
    #[indexed]
    pub project_id: i64,
    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    pub user_id: i64,

    pub content: String,

    pub created_at: i64,
    pub updated_at: i64,
}

/// `total / goal * 100`, or 0 when there is no goal.
pub fn funding_progress(total: Decimal, goal: Decimal) -> f64 {
    if goal <= Decimal::ZERO {
        return 0.0;
    }
    (total / goal * Decimal::ONE_HUNDRED).to_f64().unwrap_or(0.0)
}

/// Sum of goal amounts and the lowest goal, which doubles as the minimum reward amount.
pub fn goal_aggregates(amounts: &[Decimal]) -> (Decimal, Decimal) {
    let total = amounts.iter().copied().sum();
    let min = amounts.iter().copied().min().unwrap_or(Decimal::ZERO);
    (total, min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn progress_guards_zero_goal() {
        assert_eq!(funding_progress(Decimal::from(500), Decimal::ZERO), 0.0);
        assert_eq!(funding_progress(Decimal::from(1200), Decimal::from(6000)), 20.0);
        assert_eq!(funding_progress(Decimal::from(1500), Decimal::from(1000)), 150.0);
    }

    #[test]
    fn aggregates_of_tiered_goals() {
        let (total, min) = goal_aggregates(&[Decimal::from(5000), Decimal::from(1000)]);
        assert_eq!(total, Decimal::from(6000));
        assert_eq!(min, Decimal::from(1000));
        assert_eq!(goal_aggregates(&[]), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn reward_boundary_is_inclusive() {
        let project = Project { min_reward_amount: Decimal::from(1000), ..Default::default() };
        assert!(project.is_reward_amount(Decimal::from(1000)));
        assert!(project.is_reward_amount(Decimal::from(1200)));
        assert!(!project.is_reward_amount(Decimal::new(99999, 2)));
    }

    #[test]
    fn status_strings() {
        assert_eq!(ProjectStatus::PendingReview.to_string(), "pending_review");
        assert_eq!("failed".parse::<ProjectStatus>().unwrap(), ProjectStatus::Failed);
        assert!("success".parse::<ProjectStatus>().is_err());
        assert!(ProjectStatus::Rejected.is_terminal());
        assert!(!ProjectStatus::Active.is_terminal());
        assert!(!ProjectStatus::PendingReview.is_public());
    }
}
