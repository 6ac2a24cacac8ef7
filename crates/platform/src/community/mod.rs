mod feed;
mod service;

use serde::{Deserialize, Serialize};

use crowdnest_database::SqlxObject;

use crate::user::{User, UserSummary};

pub use service::CommunityService;

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "posts"]
pub struct Post {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub user_id: i64,

    pub content: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "post_images"]
pub struct PostImage {
    pub id: i64,

    #[foreign_key(referenced_table = "posts", related_rust_type = "Post")]
    #[indexed]
    pub post_id: i64,

    pub image_url: String,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "comments"]
pub struct Comment {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    pub user_id: i64,
    #[foreign_key(referenced_table = "posts", related_rust_type = "Post")]
    #[indexed]
    pub post_id: i64,
    #[foreign_key(referenced_table = "comments", related_rust_type = "Comment")]
    #[indexed]
    pub parent_id: Option<i64>,

    pub content: String,
    pub image_url: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "likes"]
#[unique_together("user_id", "post_id")]
pub struct Like {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    pub user_id: i64,
    #[foreign_key(referenced_table = "posts", related_rust_type = "Post")]
    #[indexed]
    pub post_id: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "follows"]
#[unique_together("follower_id", "followed_id")]
pub struct Follow {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub follower_id: i64,
    #[foreign_key(referenced_table = "users", related_rust_type = "User")]
    #[indexed]
    pub followed_id: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

/// A post with its author, images and per-viewer flags. Counts are computed
/// on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub images: Vec<String>,
    pub user: UserSummary,
    pub like_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub is_following: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub content: String,
    pub image_url: Option<String>,
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub replies: Vec<CommentView>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStatus {
    pub is_following: bool,
    pub follower_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdnest_database::SqlxSchema;

    #[test]
    fn likes_and_follows_are_unique_pairs() {
        assert!(Like::INDEXES_SQL.iter().any(|sql| sql.contains("UNIQUE") && sql.contains("(\"user_id\", \"post_id\")")));
        assert!(Follow::INDEXES_SQL.iter().any(|sql| sql.contains("UNIQUE") && sql.contains("(\"follower_id\", \"followed_id\")")));
    }

    #[test]
    fn top_level_comment_omits_parent_and_empty_replies() {
        let view = CommentView {
            id: 1,
            user_id: 2,
            post_id: 3,
            parent_id: None,
            content: "hi".into(),
            image_url: None,
            user: UserSummary { id: 2, username: "ann".into(), avatar_url: None },
            replies: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("parent_id").is_none());
        assert!(json.get("replies").is_none());
        assert_eq!(json["user"]["username"], "ann");
    }
}
