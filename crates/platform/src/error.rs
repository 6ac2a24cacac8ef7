use serde::Serialize;

/// Wire-level error codes. Grouped by range: 1xxx system, 2xxx auth,
/// 3xxx request, 4xxx domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorCode {
    Internal,
    Database,
    Cache,
    Timeout,

    Unauthorized,
    Forbidden,
    InvalidToken,
    TokenExpired,
    InvalidCredentials,

    BadRequest,
    Validation,
    ResourceNotFound,
    ResourceExists,
    ResourceConflict,

    UserNotFound,
    UserExists,
    WeakPassword,
    ProjectNotFound,
    InsufficientFunds,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 19] = [
        ErrorCode::Internal, ErrorCode::Database, ErrorCode::Cache, ErrorCode::Timeout,
        ErrorCode::Unauthorized, ErrorCode::Forbidden, ErrorCode::InvalidToken, ErrorCode::TokenExpired, ErrorCode::InvalidCredentials,
        ErrorCode::BadRequest, ErrorCode::Validation, ErrorCode::ResourceNotFound, ErrorCode::ResourceExists, ErrorCode::ResourceConflict,
        ErrorCode::UserNotFound, ErrorCode::UserExists, ErrorCode::WeakPassword, ErrorCode::ProjectNotFound, ErrorCode::InsufficientFunds,
    ];

    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::Internal => 1000,
            ErrorCode::Database => 1001,
            ErrorCode::Cache => 1002,
            ErrorCode::Timeout => 1003,

            ErrorCode::Unauthorized => 2000,
            ErrorCode::Forbidden => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::TokenExpired => 2003,
            ErrorCode::InvalidCredentials => 2004,

            ErrorCode::BadRequest => 3000,
            ErrorCode::Validation => 3001,
            ErrorCode::ResourceNotFound => 3002,
            ErrorCode::ResourceExists => 3003,
            ErrorCode::ResourceConflict => 3004,

            ErrorCode::UserNotFound => 4000,
            ErrorCode::UserExists => 4001,
            ErrorCode::WeakPassword => 4002,
            ErrorCode::ProjectNotFound => 4003,
            ErrorCode::InsufficientFunds => 4004,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Internal | ErrorCode::Database | ErrorCode::Cache => 500,
            ErrorCode::Timeout => 408,

            ErrorCode::Unauthorized
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidCredentials => 401,
            ErrorCode::Forbidden => 403,

            ErrorCode::BadRequest
            | ErrorCode::Validation
            | ErrorCode::WeakPassword
            | ErrorCode::InsufficientFunds => 400,

            ErrorCode::ResourceNotFound | ErrorCode::UserNotFound | ErrorCode::ProjectNotFound => 404,
            ErrorCode::ResourceExists | ErrorCode::ResourceConflict | ErrorCode::UserExists => 409,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "internal server error",
            ErrorCode::Database => "database error",
            ErrorCode::Cache => "cache error",
            ErrorCode::Timeout => "request timed out",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::InvalidToken => "invalid token",
            ErrorCode::TokenExpired => "token expired",
            ErrorCode::InvalidCredentials => "invalid credentials",
            ErrorCode::BadRequest => "bad request",
            ErrorCode::Validation => "validation failed",
            ErrorCode::ResourceNotFound => "resource not found",
            ErrorCode::ResourceExists => "resource already exists",
            ErrorCode::ResourceConflict => "resource conflict",
            ErrorCode::UserNotFound => "user not found",
            ErrorCode::UserExists => "user already exists",
            ErrorCode::WeakPassword => "password is too weak",
            ErrorCode::ProjectNotFound => "project not found",
            ErrorCode::InsufficientFunds => "insufficient funds",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{1}")]
    Business(ErrorCode, String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

impl PlatformError {
    pub fn business(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Business(code, message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::business(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::business(ErrorCode::ResourceNotFound, message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::business(ErrorCode::ResourceExists, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::business(ErrorCode::ResourceConflict, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::business(ErrorCode::Forbidden, message)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PlatformError::Business(code, _) => *code,
            PlatformError::Database(_) => ErrorCode::Database,
            PlatformError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Turns a unique violation into a business error; anything else stays a database error.
    pub fn on_unique_violation(err: sqlx::Error, code: ErrorCode, message: &str) -> Self {
        if crowdnest_database::is_unique_violation(&err) {
            Self::business(code, message)
        } else {
            Self::Database(err)
        }
    }

    pub fn on_foreign_key_violation(err: sqlx::Error, message: &str) -> Self {
        if crowdnest_database::is_foreign_key_violation(&err) {
            Self::conflict(message)
        } else {
            Self::Database(err)
        }
    }
}
