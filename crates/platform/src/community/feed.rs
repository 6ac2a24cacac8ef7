use std::collections::HashMap;

use sqlx::{Postgres, QueryBuilder};

use crate::user::UserSummary;

use super::{CommentView, PostView};

/// Which posts a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PostFilter {
    All,
    Id(i64),
    ByUser(i64),
    /// Posts by users this user follows.
    FollowedBy(i64),
    /// Posts by users following this user.
    FollowersOf(i64),
}

impl PostFilter {
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match *self {
            PostFilter::All => {}
            PostFilter::Id(id) => {
                qb.push(" WHERE p.id = ").push_bind(id);
            }
            PostFilter::ByUser(user_id) => {
                qb.push(" WHERE p.user_id = ").push_bind(user_id);
            }
            PostFilter::FollowedBy(user_id) => {
                qb.push(" WHERE p.user_id IN (SELECT f.followed_id FROM follows f WHERE f.follower_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
            PostFilter::FollowersOf(user_id) => {
                qb.push(" WHERE p.user_id IN (SELECT f.follower_id FROM follows f WHERE f.followed_id = ")
                    .push_bind(user_id)
                    .push(")");
            }
        }
    }
}

/// Post columns plus author, counts and the viewer flags. The viewer is bound
/// twice; a `NULL` viewer makes both flags false.
pub(crate) fn post_select(qb: &mut QueryBuilder<'_, Postgres>, viewer: Option<i64>) {
    qb.push(
        "SELECT p.id, p.user_id, p.content, p.created_at, p.updated_at, u.username, u.avatar_url, \
         (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count, \
         (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count, \
         EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = "
    )
        .push_bind(viewer)
        .push(") AS is_liked, EXISTS (SELECT 1 FROM follows f WHERE f.followed_id = p.user_id AND f.follower_id = ")
        .push_bind(viewer)
        .push(") AS is_following FROM posts p JOIN users u ON u.id = p.user_id");
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub is_following: bool,
}

impl PostRow {
    pub(crate) fn into_view(self, images: Vec<String>) -> PostView {
        PostView {
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            images,
            user: UserSummary { id: self.user_id, username: self.username, avatar_url: self.avatar_url },
            like_count: self.like_count,
            comment_count: self.comment_count,
            is_liked: self.is_liked,
            is_following: self.is_following,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub(crate) const COMMENT_SELECT: &str = "SELECT c.id, c.user_id, c.post_id, c.parent_id, c.content, c.image_url, \
    c.created_at, c.updated_at, u.username, u.avatar_url \
    FROM comments c JOIN users u ON u.id = c.user_id";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        CommentView {
            id: row.id,
            user_id: row.user_id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            content: row.content,
            image_url: row.image_url,
            user: UserSummary { id: row.user_id, username: row.username, avatar_url: row.avatar_url },
            replies: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Hangs each reply under its parent. Replies whose parent is not in
/// `parents` are dropped, so only one level is surfaced.
pub(crate) fn attach_replies(parents: Vec<CommentRow>, replies: Vec<CommentRow>) -> Vec<CommentView> {
    let mut by_parent: HashMap<i64, Vec<CommentView>> = HashMap::new();
    for reply in replies {
        if let Some(parent_id) = reply.parent_id {
            by_parent.entry(parent_id).or_default().push(reply.into());
        }
    }
    parents.into_iter()
        .map(|row| {
            let mut view = CommentView::from(row);
            view.replies = by_parent.remove(&view.id).unwrap_or_default();
            view
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>) -> CommentRow {
        CommentRow {
            id,
            user_id: 1,
            post_id: 9,
            parent_id,
            content: format!("comment {}", id),
            image_url: None,
            created_at: id,
            updated_at: id,
            username: "ann".into(),
            avatar_url: None,
        }
    }

    #[test]
    fn replies_nest_one_level() {
        let parents = vec![row(1, None), row(2, None)];
        let replies = vec![row(3, Some(1)), row(4, Some(1)), row(5, Some(3))];
        let views = attach_replies(parents, replies);

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].replies.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4]);
        assert!(views[0].replies[0].replies.is_empty());
        assert!(views[1].replies.is_empty());
    }

    #[test]
    fn feed_filters_render() {
        let mut qb = QueryBuilder::new("SELECT p.id FROM posts p");
        PostFilter::FollowedBy(4).push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT p.id FROM posts p WHERE p.user_id IN (SELECT f.followed_id FROM follows f WHERE f.follower_id = $1)"
        );

        let mut qb = QueryBuilder::new("SELECT p.id FROM posts p");
        PostFilter::All.push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT p.id FROM posts p");
    }

    #[test]
    fn viewer_is_bound_before_the_filter() {
        let mut qb = QueryBuilder::new("");
        post_select(&mut qb, Some(7));
        PostFilter::ByUser(3).push_where(&mut qb);
        let sql = qb.sql();
        assert!(sql.contains("l.user_id = $1"));
        assert!(sql.contains("f.follower_id = $2"));
        assert!(sql.ends_with("WHERE p.user_id = $3"));
    }
}
