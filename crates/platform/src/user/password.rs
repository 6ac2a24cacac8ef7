use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{ErrorCode, PlatformError, PlatformResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// At least eight characters with an upper and lower case letter, a digit
/// and a symbol.
pub fn validate_password_strength(password: &str) -> PlatformResult<()> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace()));

    if long_enough && has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(PlatformError::business(
            ErrorCode::WeakPassword,
            "password must be at least 8 characters and contain upper and lower case letters, a digit and a symbol",
        ))
    }
}

/// Argon2id with a random salt, encoded as a PHC string.
pub fn hash_password(password: &str) -> PlatformResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("[hash_password] {}", e))?;
    Ok(hash.to_string())
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("[verify_password] unreadable password hash: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_rules() {
        assert!(validate_password_strength("Str0ng!Pass").is_ok());

        for weak in ["abc", "alllowercase1!", "ALLUPPER1!", "NoDigits!!", "NoSymbol12", "Sh0rt!"] {
            let err = validate_password_strength(weak).unwrap_err();
            assert_eq!(err.code(), ErrorCode::WeakPassword, "{weak} should be weak");
        }
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Str0ng!Pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Str0ng!Pass", &hash));
        assert!(!verify_password("Str0ng!Pasz", &hash));
        assert!(!verify_password("Str0ng!Pass", "not-a-phc-string"));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let a = hash_password("Str0ng!Pass").unwrap();
        let b = hash_password("Str0ng!Pass").unwrap();
        assert_ne!(a, b);
    }
}
