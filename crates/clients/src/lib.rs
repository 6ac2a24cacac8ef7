mod local_storage;
mod mailer;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "r2")]
mod r2;
#[cfg(feature = "redis")]
mod redis_client;

pub use local_storage::LocalStorage;
pub use mailer::HttpMailer;
#[cfg(feature = "postgres")]
pub use postgres::{connect, PostgresClient};
#[cfg(feature = "r2")]
pub use r2::{R2Bucket, R2Client};
#[cfg(feature = "redis")]
pub use redis_client::{keys as redis_keys, RedisClient};
