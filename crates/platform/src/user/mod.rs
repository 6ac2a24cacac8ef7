mod address;
mod directory;
mod password;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crowdnest_database::SqlxObject;

pub use address::{AddressDraft, AddressBook};
pub use directory::{LoginOutcome, ProfileUpdate, Registration, UserDirectory};
pub use password::{hash_password, validate_password_strength, verify_password};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "users"]
pub struct User {
    pub id: i64,

    #[unique]
    pub username: String,
    #[unique]
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub avatar_url: Option<String>,
    pub bio: Option<String>,

    pub role: UserRole,
    pub is_verified: bool,
    pub deleted_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Public view of another user, embedded in posts, comments and listings.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, SqlxObject)]
#[table_name = "user_addresses"]
pub struct UserAddress {
    pub id: i64,

    #[foreign_key(referenced_table = "users", related_rust_type = "User", on_delete = "CASCADE")]
    #[indexed]
    pub user_id: i64,

    pub receiver_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
    pub is_default: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

impl UserAddress {
    pub fn full_address(&self) -> String {
        format!("{} {} {} {}", self.province, self.city, self.district, self.detail_address)
    }
}
