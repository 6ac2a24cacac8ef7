mod postgres_connect;
mod sqlx_postgres;

pub use crowdnest_db_macros::SqlxObject;
pub use postgres_connect::{create_table, create_trigger_function};
pub use sqlx_postgres::*;

/// Postgres `unique_violation`.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Postgres `foreign_key_violation`.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}
