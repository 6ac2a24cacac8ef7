use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};

use crowdnest_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::project::page_window;
use crate::user::{User, UserSummary};

use super::feed::{attach_replies, post_select, CommentRow, PostFilter, PostRow, COMMENT_SELECT};
use super::{Comment, CommentView, Follow, FollowStatus, Like, Post, PostImage, PostView};

/// Posts, comments, likes and follows. Counts are aggregated on read.
#[derive(Clone)]
pub struct CommunityService {
    db: PgPool,
}

fn require_content(content: &str) -> PlatformResult<()> {
    if content.trim().is_empty() {
        return Err(PlatformError::validation("content must not be empty"));
    }
    Ok(())
}

impl CommunityService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn query_posts(&self, filter: PostFilter, viewer: Option<i64>, window: Option<(i64, i64)>) -> PlatformResult<Vec<PostView>> {
        let mut qb = QueryBuilder::<Postgres>::new("");
        post_select(&mut qb, viewer);
        filter.push_where(&mut qb);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");
        if let Some((limit, offset)) = window {
            qb.push(" LIMIT ").push_bind(limit).push(" OFFSET ").push_bind(offset);
        }
        let rows = qb.build_query_as::<PostRow>().fetch_all(&self.db).await?;

        let ids = rows.iter().map(|r| r.id).collect::<Vec<_>>();
        let mut images = self.images_for(&ids).await?;
        Ok(rows.into_iter()
            .map(|row| {
                let urls = images.remove(&row.id).unwrap_or_default();
                row.into_view(urls)
            })
            .collect())
    }

    async fn images_for(&self, post_ids: &[i64]) -> PlatformResult<HashMap<i64, Vec<String>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let images = PostImage::find_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("post_id", "= ANY({})", post_ids.to_vec())
                .order_by("created_at", OrderDirection::Asc)
                .order_by("id", OrderDirection::Asc),
            &self.db,
        ).await?;

        let mut by_post: HashMap<i64, Vec<String>> = HashMap::new();
        for image in images {
            by_post.entry(image.post_id).or_default().push(image.image_url);
        }
        Ok(by_post)
    }

    async fn count_posts(&self, filter: PostFilter) -> PlatformResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        filter.push_where(&mut qb);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.db).await?)
    }

    async fn list_posts(&self, filter: PostFilter, viewer: Option<i64>, page: i64, page_size: i64) -> PlatformResult<(Vec<PostView>, i64)> {
        let posts = self.query_posts(filter, viewer, Some(page_window(page, page_size))).await?;
        let total = self.count_posts(filter).await?;
        Ok((posts, total))
    }

    async fn require_post(&self, post_id: i64) -> PlatformResult<Post> {
        Post::find_one_by_criteria(QueryCriteria::by_id(post_id), &self.db).await?
            .ok_or_else(|| PlatformError::not_found("post not found"))
    }

    async fn require_owned_post(&self, user_id: i64, post_id: i64) -> PlatformResult<Post> {
        let post = self.require_post(post_id).await?;
        if post.user_id != user_id {
            return Err(PlatformError::forbidden("only the author can change this post"));
        }
        Ok(post)
    }

    pub async fn create_post(&self, user_id: i64, content: &str, images: Vec<String>) -> PlatformResult<PostView> {
        require_content(content)?;
        let mut tx = self.db.begin().await?;

        let post = Post { user_id, content: content.to_string(), ..Default::default() }
            .create(&mut *tx)
            .await?;
        for image_url in images.into_iter().filter(|url| !url.trim().is_empty()) {
            PostImage { post_id: post.id, image_url, ..Default::default() }
                .create(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.get_post(post.id, Some(user_id)).await?
            .ok_or_else(|| PlatformError::not_found("post not found"))
    }

    pub async fn get_post(&self, post_id: i64, viewer: Option<i64>) -> PlatformResult<Option<PostView>> {
        Ok(self.query_posts(PostFilter::Id(post_id), viewer, None).await?.pop())
    }

    /// Author only. When `images` is given, it replaces the post's images.
    pub async fn update_post(&self, user_id: i64, post_id: i64, content: &str, images: Option<Vec<String>>) -> PlatformResult<PostView> {
        require_content(content)?;
        let mut post = self.require_owned_post(user_id, post_id).await?;

        let mut tx = self.db.begin().await?;
        post.content = content.to_string();
        post.update(&mut *tx).await?;
        if let Some(images) = images {
            PostImage::delete_by_criteria(QueryCriteria::new().add_valued_filter("post_id", "=", post_id), &mut *tx).await?;
            for image_url in images.into_iter().filter(|url| !url.trim().is_empty()) {
                PostImage { post_id, image_url, ..Default::default() }
                    .create(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        self.get_post(post_id, Some(user_id)).await?
            .ok_or_else(|| PlatformError::not_found("post not found"))
    }

    /// Author only. Likes, comments and images go first, then the post.
    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> PlatformResult<()> {
        let post = self.require_owned_post(user_id, post_id).await?;

        let mut tx = self.db.begin().await?;
        Like::delete_by_criteria(QueryCriteria::new().add_valued_filter("post_id", "=", post_id), &mut *tx).await?;
        Comment::delete_by_criteria(QueryCriteria::new().add_valued_filter("post_id", "=", post_id), &mut *tx).await?;
        PostImage::delete_by_criteria(QueryCriteria::new().add_valued_filter("post_id", "=", post_id), &mut *tx).await?;
        post.delete(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!("[CommunityService::delete_post] post {} deleted by user {}", post_id, user_id);
        Ok(())
    }

    pub async fn list_all_posts(&self, viewer: Option<i64>, page: i64, page_size: i64) -> PlatformResult<(Vec<PostView>, i64)> {
        self.list_posts(PostFilter::All, viewer, page, page_size).await
    }

    pub async fn get_user_posts(&self, user_id: i64, viewer: Option<i64>, page: i64, page_size: i64) -> PlatformResult<(Vec<PostView>, i64)> {
        self.list_posts(PostFilter::ByUser(user_id), viewer, page, page_size).await
    }

    pub async fn get_following_posts(&self, viewer: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<PostView>, i64)> {
        self.list_posts(PostFilter::FollowedBy(viewer), Some(viewer), page, page_size).await
    }

    pub async fn get_followers_posts(&self, viewer: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<PostView>, i64)> {
        self.list_posts(PostFilter::FollowersOf(viewer), Some(viewer), page, page_size).await
    }

    async fn comment_view(&self, comment_id: i64) -> PlatformResult<CommentView> {
        let sql = format!("{} WHERE c.id = $1", COMMENT_SELECT);
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(comment_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PlatformError::not_found("comment not found"))?;
        Ok(row.into())
    }

    pub async fn create_comment(&self, user_id: i64, post_id: i64, content: &str, image_url: Option<String>) -> PlatformResult<CommentView> {
        require_content(content)?;
        self.require_post(post_id).await?;

        let comment = Comment {
            user_id,
            post_id,
            parent_id: None,
            content: content.to_string(),
            image_url: image_url.filter(|url| !url.trim().is_empty()),
            ..Default::default()
        }.create(&self.db).await?;
        self.comment_view(comment.id).await
    }

    /// The reply lands on the parent's post.
    pub async fn create_comment_reply(&self, user_id: i64, comment_id: i64, content: &str, image_url: Option<String>) -> PlatformResult<CommentView> {
        require_content(content)?;
        let parent = Comment::find_one_by_criteria(QueryCriteria::by_id(comment_id), &self.db).await?
            .ok_or_else(|| PlatformError::not_found("comment not found"))?;

        let reply = Comment {
            user_id,
            post_id: parent.post_id,
            parent_id: Some(parent.id),
            content: content.to_string(),
            image_url: image_url.filter(|url| !url.trim().is_empty()),
            ..Default::default()
        }.create(&self.db).await?;
        self.comment_view(reply.id).await
    }

    /// Top-level comments, newest first, each with its direct replies.
    pub async fn list_comments(&self, post_id: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<CommentView>, i64)> {
        let (limit, offset) = page_window(page, page_size);

        let sql = format!(
            "{} WHERE c.post_id = $1 AND c.parent_id IS NULL ORDER BY c.created_at DESC, c.id DESC LIMIT $2 OFFSET $3",
            COMMENT_SELECT
        );
        let parents = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        let parent_ids = parents.iter().map(|c| c.id).collect::<Vec<_>>();
        let replies = if parent_ids.is_empty() {
            Vec::new()
        } else {
            let sql = format!("{} WHERE c.parent_id = ANY($1) ORDER BY c.created_at ASC, c.id ASC", COMMENT_SELECT);
            sqlx::query_as::<_, CommentRow>(&sql)
                .bind(parent_ids)
                .fetch_all(&self.db)
                .await?
        };

        let total = Comment::count_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("post_id", "=", post_id)
                .add_condition("parent_id", "IS NULL"),
            &self.db,
        ).await?;
        Ok((attach_replies(parents, replies), total))
    }

    /// Direct children only, oldest first.
    pub async fn get_comment_replies(&self, comment_id: i64) -> PlatformResult<Vec<CommentView>> {
        let sql = format!("{} WHERE c.parent_id = $1 ORDER BY c.created_at ASC, c.id ASC", COMMENT_SELECT);
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(comment_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(CommentView::from).collect())
    }

    /// Author only. Every reply under the comment, at any depth, is removed
    /// with it, so no reply resurfaces as a top-level comment.
    pub async fn delete_comment(&self, user_id: i64, comment_id: i64) -> PlatformResult<()> {
        let comment = Comment::find_one_by_criteria(QueryCriteria::by_id(comment_id), &self.db).await?
            .ok_or_else(|| PlatformError::not_found("comment not found"))?;
        if comment.user_id != user_id {
            return Err(PlatformError::forbidden("only the author can delete this comment"));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "WITH RECURSIVE thread AS (
                SELECT id FROM comments WHERE parent_id = $1
                UNION ALL
                SELECT c.id FROM comments c JOIN thread t ON c.parent_id = t.id
             )
             DELETE FROM comments WHERE id IN (SELECT id FROM thread)"
        )
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        comment.delete(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn like_count(&self, post_id: i64) -> PlatformResult<i64> {
        Ok(Like::count_by_criteria(QueryCriteria::new().add_valued_filter("post_id", "=", post_id), &self.db).await?)
    }

    /// Returns the new like count. Liking twice is `ResourceExists`.
    pub async fn like_post(&self, user_id: i64, post_id: i64) -> PlatformResult<i64> {
        self.require_post(post_id).await?;
        Like { user_id, post_id, ..Default::default() }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "post already liked"))?;
        self.like_count(post_id).await
    }

    /// Returns the new like count. Unliking a post that is not liked is `ResourceNotFound`.
    pub async fn unlike_post(&self, user_id: i64, post_id: i64) -> PlatformResult<i64> {
        let removed = Like::delete_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("user_id", "=", user_id)
                .add_valued_filter("post_id", "=", post_id),
            &self.db,
        ).await?;
        if removed == 0 {
            return Err(PlatformError::not_found("post not liked"));
        }
        self.like_count(post_id).await
    }

    pub async fn follow(&self, follower_id: i64, followed_id: i64) -> PlatformResult<Follow> {
        if follower_id == followed_id {
            return Err(PlatformError::validation("cannot follow yourself"));
        }
        User::find_one_by_criteria(
            QueryCriteria::by_id(followed_id).add_condition("deleted_at", "IS NULL"),
            &self.db,
        ).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;

        Follow { follower_id, followed_id, ..Default::default() }
            .create(&self.db)
            .await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::ResourceExists, "already following this user"))
    }

    pub async fn unfollow(&self, follower_id: i64, followed_id: i64) -> PlatformResult<()> {
        let removed = Follow::delete_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("follower_id", "=", follower_id)
                .add_valued_filter("followed_id", "=", followed_id),
            &self.db,
        ).await?;
        if removed == 0 {
            return Err(PlatformError::not_found("not following this user"));
        }
        Ok(())
    }

    pub async fn get_followers(&self, user_id: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<UserSummary>, i64)> {
        let (limit, offset) = page_window(page, page_size);
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.avatar_url FROM follows f JOIN users u ON u.id = f.follower_id
             WHERE f.followed_id = $1 ORDER BY f.created_at DESC, f.id DESC LIMIT $2 OFFSET $3"
        )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let total = Follow::count_by_criteria(QueryCriteria::new().add_valued_filter("followed_id", "=", user_id), &self.db).await?;
        Ok((users, total))
    }

    pub async fn get_following(&self, user_id: i64, page: i64, page_size: i64) -> PlatformResult<(Vec<UserSummary>, i64)> {
        let (limit, offset) = page_window(page, page_size);
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.avatar_url FROM follows f JOIN users u ON u.id = f.followed_id
             WHERE f.follower_id = $1 ORDER BY f.created_at DESC, f.id DESC LIMIT $2 OFFSET $3"
        )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let total = Follow::count_by_criteria(QueryCriteria::new().add_valued_filter("follower_id", "=", user_id), &self.db).await?;
        Ok((users, total))
    }

    pub async fn get_follow_status(&self, viewer: i64, target: i64) -> PlatformResult<FollowStatus> {
        let is_following = Follow::count_by_criteria(
            QueryCriteria::new()
                .add_valued_filter("follower_id", "=", viewer)
                .add_valued_filter("followed_id", "=", target),
            &self.db,
        ).await? > 0;
        let follower_count = Follow::count_by_criteria(
            QueryCriteria::new().add_valued_filter("followed_id", "=", target),
            &self.db,
        ).await?;
        Ok(FollowStatus { is_following, follower_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_content_is_rejected() {
        assert_eq!(require_content("  \n").unwrap_err().code(), ErrorCode::Validation);
        assert!(require_content("hello").is_ok());
    }
}
