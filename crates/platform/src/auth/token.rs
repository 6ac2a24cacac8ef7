use jwt_simple::algorithms::{HS256Key, MACLike};
use jwt_simple::claims::{Claims, JWTClaims};
use jwt_simple::common::VerificationOptions;
use jwt_simple::prelude::{Clock, Duration};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ErrorCode, PlatformError, PlatformResult};

pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Upper bound for how stale a token may be and still decode. Expiry is
/// checked separately so an expired token reports `TokenExpired`.
const DECODE_TOLERANCE_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailClaims {
    purpose: String,
    email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailPurpose {
    VerifyEmail,
    ResetPassword,
}

impl EmailPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailPurpose::VerifyEmail => "verify_email",
            EmailPurpose::ResetPassword => "reset_password",
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        match self {
            EmailPurpose::VerifyEmail => 24 * 60 * 60,
            EmailPurpose::ResetPassword => 60 * 60,
        }
    }
}

/// HS256 bearer and email tokens.
#[derive(Clone)]
pub struct TokenService {
    key: HS256Key,
}

impl TokenService {
    pub fn new(secret: &str) -> PlatformResult<Self> {
        if secret.trim().is_empty() {
            return Err(anyhow::anyhow!("[TokenService::new] JWT secret must not be empty").into());
        }
        Ok(Self { key: HS256Key::from_bytes(secret.as_bytes()) })
    }

    pub fn issue(&self, user_id: i64) -> PlatformResult<String> {
        let claims = Claims::with_custom_claims(SessionClaims { user_id }, Duration::from_secs(SESSION_TTL_SECS as u64));
        self.key.authenticate(claims).map_err(|e| PlatformError::Internal(e.into()))
    }

    /// Returns the user id of a valid, unexpired token.
    pub fn validate(&self, token: &str) -> PlatformResult<i64> {
        let claims = self.decode::<SessionClaims>(token)?;
        ensure_not_expired(&claims)?;
        Ok(claims.custom.user_id)
    }

    /// Re-issues a token for the same user. The old token only has to be
    /// correctly signed; it may already be expired.
    pub fn refresh(&self, token: &str) -> PlatformResult<String> {
        let claims = self.decode::<SessionClaims>(token)?;
        self.issue(claims.custom.user_id)
    }

    pub fn issue_email_token(&self, purpose: EmailPurpose, email: &str) -> PlatformResult<String> {
        let claims = Claims::with_custom_claims(
            EmailClaims { purpose: purpose.as_str().to_string(), email: email.to_string() },
            Duration::from_secs(purpose.ttl_secs()),
        );
        self.key.authenticate(claims).map_err(|e| PlatformError::Internal(e.into()))
    }

    /// Returns the email the token was issued for.
    pub fn validate_email_token(&self, purpose: EmailPurpose, token: &str) -> PlatformResult<String> {
        let claims = self.decode::<EmailClaims>(token)?;
        ensure_not_expired(&claims)?;
        if claims.custom.purpose != purpose.as_str() {
            return Err(PlatformError::business(ErrorCode::InvalidToken, "token was issued for a different purpose"));
        }
        Ok(claims.custom.email)
    }

    fn decode<T: Serialize + DeserializeOwned>(&self, token: &str) -> PlatformResult<JWTClaims<T>> {
        let options = VerificationOptions {
            time_tolerance: Some(Duration::from_secs(DECODE_TOLERANCE_SECS)),
            ..VerificationOptions::default()
        };
        self.key
            .verify_token::<T>(token, Some(options))
            .map_err(|_| PlatformError::business(ErrorCode::InvalidToken, "invalid token"))
    }
}

fn ensure_not_expired<T>(claims: &JWTClaims<T>) -> PlatformResult<()> {
    match claims.expires_at {
        Some(expires_at) if expires_at > Clock::now_since_epoch() => Ok(()),
        _ => Err(PlatformError::business(ErrorCode::TokenExpired, "token expired")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret-with-enough-entropy").unwrap()
    }

    #[test]
    fn issued_token_validates_to_user() {
        let tokens = service();
        let token = tokens.issue(42).unwrap();
        assert_eq!(tokens.validate(&token).unwrap(), 42);
    }

    #[test]
    fn token_signed_with_other_key_is_invalid() {
        let other = TokenService::new("another-secret").unwrap();
        let token = other.issue(1).unwrap();
        let err = service().validate(&token).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);

        let err = service().validate("not-a-token").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn expired_token_reports_expiry_but_still_refreshes() {
        let tokens = service();
        let mut claims = Claims::with_custom_claims(SessionClaims { user_id: 9 }, Duration::from_secs(60));
        let past = Clock::now_since_epoch() - Duration::from_secs(3600);
        claims.issued_at = Some(past - Duration::from_secs(60));
        claims.invalid_before = Some(past - Duration::from_secs(60));
        claims.expires_at = Some(past);
        let token = tokens.key.authenticate(claims).unwrap();

        let err = tokens.validate(&token).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenExpired);

        let refreshed = tokens.refresh(&token).unwrap();
        assert_eq!(tokens.validate(&refreshed).unwrap(), 9);
    }

    #[test]
    fn email_tokens_are_bound_to_their_purpose() {
        let tokens = service();
        let token = tokens.issue_email_token(EmailPurpose::VerifyEmail, "a@b.io").unwrap();
        assert_eq!(tokens.validate_email_token(EmailPurpose::VerifyEmail, &token).unwrap(), "a@b.io");

        let err = tokens.validate_email_token(EmailPurpose::ResetPassword, &token).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenService::new("  ").is_err());
    }
}
