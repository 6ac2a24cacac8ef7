use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crowdnest_common::get_current_timestamp;
use crowdnest_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::auth::{EmailPurpose, TokenBlacklist, TokenService, SESSION_TTL_SECS};
use crate::error::{ErrorCode, PlatformError, PlatformResult};
use crate::mail::EmailQueue;

use super::password::{hash_password, validate_password_strength, verify_password};
use super::{User, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !email.chars().any(char::is_whitespace)
}

/// Accounts, credentials and the session lifecycle.
#[derive(Clone)]
pub struct UserDirectory {
    db: PgPool,
    tokens: TokenService,
    blacklist: Arc<dyn TokenBlacklist>,
    mail: EmailQueue,
}

impl UserDirectory {
    pub fn new(db: PgPool, tokens: TokenService, blacklist: Arc<dyn TokenBlacklist>, mail: EmailQueue) -> Self {
        Self { db, tokens, blacklist, mail }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(&self, registration: Registration) -> PlatformResult<User> {
        let username = registration.username.trim().to_string();
        let email = registration.email.trim().to_lowercase();

        if username.is_empty() || email.is_empty() || registration.password.is_empty() {
            return Err(PlatformError::validation("username, email and password are required"));
        }
        if !is_valid_email(&email) {
            return Err(PlatformError::validation("invalid email address"));
        }
        validate_password_strength(&registration.password)?;

        if self.find_by_username(&username).await?.is_some() {
            return Err(PlatformError::business(ErrorCode::UserExists, "username already taken"));
        }
        if self.find_by_email(&email).await?.is_some() {
            return Err(PlatformError::business(ErrorCode::UserExists, "email already registered"));
        }

        let user = User {
            username,
            email,
            password_hash: hash_password(&registration.password)?,
            role: UserRole::User,
            is_verified: false,
            ..Default::default()
        };
        let user = user.create(&self.db).await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::UserExists, "user already exists"))?;

        tracing::info!("[UserDirectory::register] user {} registered", user.id);
        self.mail.enqueue_verification(&user.email, &user.username);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> PlatformResult<LoginOutcome> {
        let invalid = || PlatformError::business(ErrorCode::InvalidCredentials, "invalid email or password");

        let user = self.find_by_email(&email.trim().to_lowercase()).await?.ok_or_else(invalid)?;
        if user.is_deleted() || !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }

        let token = self.tokens.issue(user.id)?;
        Ok(LoginOutcome { token, user })
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> PlatformResult<LoginOutcome> {
        let outcome = self.login(email, password).await?;
        if !outcome.user.is_admin() {
            return Err(PlatformError::forbidden("admin access required"));
        }
        Ok(outcome)
    }

    pub async fn verify_email(&self, token: &str) -> PlatformResult<User> {
        let email = self.tokens.validate_email_token(EmailPurpose::VerifyEmail, token)?;
        let mut user = self.find_by_email(&email).await?
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;

        if user.is_verified {
            return Err(PlatformError::exists("email already verified"));
        }
        user.is_verified = true;
        Ok(user.update(&self.db).await?)
    }

    pub async fn request_password_reset(&self, email: &str) -> PlatformResult<()> {
        let email = email.trim().to_lowercase();
        let user = self.find_by_email(&email).await?
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;

        self.mail.enqueue_password_reset(&user.email);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> PlatformResult<()> {
        let email = self.tokens.validate_email_token(EmailPurpose::ResetPassword, token)?;
        validate_password_strength(new_password)?;

        let mut user = self.find_by_email(&email).await?
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;

        user.password_hash = hash_password(new_password)?;
        let user = user.update(&self.db).await?;
        tracing::info!("[UserDirectory::reset_password] password reset for user {}", user.id);
        Ok(())
    }

    /// Revokes the presented bearer token for the rest of its lifetime.
    pub async fn logout(&self, token: &str) -> PlatformResult<()> {
        self.blacklist.revoke(token, SESSION_TTL_SECS).await
            .map_err(|e| PlatformError::business(ErrorCode::Cache, e.to_string()))
    }

    pub async fn is_token_revoked(&self, token: &str) -> PlatformResult<bool> {
        self.blacklist.is_revoked(token).await
            .map_err(|e| PlatformError::business(ErrorCode::Cache, e.to_string()))
    }

    pub fn refresh_token(&self, user_id: i64) -> PlatformResult<String> {
        self.tokens.issue(user_id)
    }

    pub async fn get_user(&self, user_id: i64) -> PlatformResult<Option<User>> {
        Ok(User::find_one_by_criteria(QueryCriteria::by_id(user_id), &self.db).await?)
    }

    /// Like `get_user`, but soft-deleted accounts are treated as absent.
    pub async fn get_active_user(&self, user_id: i64) -> PlatformResult<Option<User>> {
        Ok(self.get_user(user_id).await?.filter(|u| !u.is_deleted()))
    }

    async fn find_by_username(&self, username: &str) -> PlatformResult<Option<User>> {
        Ok(User::find_one_by_criteria(
            QueryCriteria::new().add_valued_filter("username", "=", username.to_string()),
            &self.db,
        ).await?)
    }

    async fn find_by_email(&self, email: &str) -> PlatformResult<Option<User>> {
        Ok(User::find_one_by_criteria(
            QueryCriteria::new().add_valued_filter("email", "=", email.to_string()),
            &self.db,
        ).await?)
    }

    pub async fn update_profile(&self, user_id: i64, update: ProfileUpdate) -> PlatformResult<User> {
        let mut user = self.get_active_user(user_id).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;

        if let Some(username) = update.username.map(|u| u.trim().to_string()) {
            if username.is_empty() {
                return Err(PlatformError::validation("username must not be empty"));
            }
            if username != user.username {
                if self.find_by_username(&username).await?.is_some() {
                    return Err(PlatformError::business(ErrorCode::UserExists, "username already taken"));
                }
                user.username = username;
            }
        }

        if let Some(email) = update.email.map(|e| e.trim().to_lowercase()) {
            if !is_valid_email(&email) {
                return Err(PlatformError::validation("invalid email address"));
            }
            if email != user.email {
                if self.find_by_email(&email).await?.is_some() {
                    return Err(PlatformError::business(ErrorCode::UserExists, "email already registered"));
                }
                user.email = email;
                user.is_verified = false;
            }
        }

        if let Some(bio) = update.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar_url) = update.avatar_url {
            user.avatar_url = Some(avatar_url);
        }

        user.update(&self.db).await
            .map_err(|e| PlatformError::on_unique_violation(e, ErrorCode::UserExists, "user already exists"))
    }

    pub async fn set_avatar(&self, user_id: i64, avatar_url: String) -> PlatformResult<User> {
        self.update_profile(user_id, ProfileUpdate { avatar_url: Some(avatar_url), ..Default::default() }).await
    }

    /// Soft delete. The row stays for orders and posts that reference it.
    pub async fn delete_account(&self, user_id: i64) -> PlatformResult<()> {
        let mut user = self.get_active_user(user_id).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;
        user.deleted_at = Some(get_current_timestamp());
        user.update(&self.db).await?;
        tracing::info!("[UserDirectory::delete_account] user {} deleted", user_id);
        Ok(())
    }

    pub async fn list_users(&self, page: i64, page_size: i64) -> PlatformResult<(Vec<User>, i64)> {
        let users = User::find_by_criteria(
            QueryCriteria::new()
                .add_condition("deleted_at", "IS NULL")
                .order_by("created_at", OrderDirection::Desc)
                .order_by("id", OrderDirection::Desc)
                .paginate(page, page_size),
            &self.db,
        ).await?;
        let total = User::count_by_criteria(
            QueryCriteria::new().add_condition("deleted_at", "IS NULL"),
            &self.db,
        ).await?;
        Ok((users, total))
    }

    pub async fn update_user_role(&self, user_id: i64, role: &str) -> PlatformResult<User> {
        let role: UserRole = role.parse()
            .map_err(|_| PlatformError::validation("role must be `user` or `admin`"))?;
        let mut user = self.get_active_user(user_id).await?
            .ok_or_else(|| PlatformError::business(ErrorCode::UserNotFound, "user not found"))?;
        user.role = role;
        Ok(user.update(&self.db).await?)
    }
}
