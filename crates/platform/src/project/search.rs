use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

use super::ProjectStatus;

/// Filters for the public project search. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSearch {
    pub keyword: Option<String>,
    pub category_id: Option<i64>,
    pub status: Option<ProjectStatus>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub created_from: Option<i64>,
    pub created_to: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl ProjectSearch {
    /// Appends ` WHERE ...` against `projects p`. Without a status filter,
    /// projects still in review or rejected are hidden.
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE 1 = 1");

        match self.status {
            Some(status) => {
                qb.push(" AND p.status = ").push_bind(status.to_string());
            }
            None => {
                qb.push(" AND p.status NOT IN ('pending_review', 'rejected')");
            }
        }

        if let Some(keyword) = self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let pattern = format!("%{}%", keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
            qb.push(" AND (p.title ILIKE ").push_bind(pattern.clone())
                .push(" OR p.description ILIKE ").push_bind(pattern)
                .push(")");
        }
        if let Some(category_id) = self.category_id {
            qb.push(" AND p.category_id = ").push_bind(category_id);
        }
        if let Some(min_amount) = self.min_amount {
            qb.push(" AND p.total_amount >= ").push_bind(min_amount);
        }
        if let Some(max_amount) = self.max_amount {
            qb.push(" AND p.total_amount <= ").push_bind(max_amount);
        }
        if let Some(created_from) = self.created_from {
            qb.push(" AND p.created_at >= ").push_bind(created_from);
        }
        if let Some(created_to) = self.created_to {
            qb.push(" AND p.created_at <= ").push_bind(created_to);
        }
        if !self.tag_ids.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM project_tag_relations r WHERE r.project_id = p.id AND r.tag_id = ANY(")
                .push_bind(self.tag_ids.clone())
                .push("))");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_search_hides_unpublished_projects() {
        let search = ProjectSearch::default();
        let mut qb = QueryBuilder::new("SELECT p.id FROM projects p");
        search.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT p.id FROM projects p WHERE 1 = 1 AND p.status NOT IN ('pending_review', 'rejected')"
        );
    }

    #[test]
    fn all_filters_bind_in_order() {
        let search = ProjectSearch {
            keyword: Some(" solar ".into()),
            category_id: Some(3),
            status: Some(ProjectStatus::Active),
            min_amount: Some(Decimal::from(100)),
            max_amount: Some(Decimal::from(900)),
            created_from: Some(10),
            created_to: Some(20),
            tag_ids: vec![1, 2],
        };
        let mut qb = QueryBuilder::new("SELECT p.id FROM projects p");
        search.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT p.id FROM projects p WHERE 1 = 1 AND p.status = $1 \
             AND (p.title ILIKE $2 OR p.description ILIKE $3) AND p.category_id = $4 \
             AND p.total_amount >= $5 AND p.total_amount <= $6 AND p.created_at >= $7 AND p.created_at <= $8 \
             AND EXISTS (SELECT 1 FROM project_tag_relations r WHERE r.project_id = p.id AND r.tag_id = ANY($9))"
        );
    }

    #[test]
    fn blank_keyword_is_ignored() {
        let search = ProjectSearch { keyword: Some("   ".into()), ..Default::default() };
        let mut qb = QueryBuilder::new("");
        search.push_where(&mut qb);
        assert!(!qb.sql().contains("ILIKE"));
    }
}
