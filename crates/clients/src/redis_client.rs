use anyhow::{anyhow, Result};
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crowdnest_common::{define_module_client, ModuleClient};
use crowdnest_platform::TokenBlacklist;

define_module_client! {
    (struct RedisClient, "redis")
    client_type: ConnectionManager,
    env: ["REDIS_URL"],
    setup: async {
        let redis_url = std::env::var("REDIS_URL")?;
        let client = Client::open(redis_url)
            .map_err(|e| anyhow!("failed to create redis client: {}", e))?;
        ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow!("failed to create redis connection manager: {}", e))
    }
}

pub mod keys {
    /// Tokens are hashed so keys stay short and the raw token never sits in redis.
    pub fn blacklisted_token(token: &str) -> String {
        format!("blacklist:{}", blake3::hash(token.as_bytes()).to_hex())
    }
}

impl RedisClient {
    fn connection(&self) -> ConnectionManager {
        self.get_client().clone()
    }
}

#[async_trait::async_trait]
impl TokenBlacklist for RedisClient {
    async fn revoke(&self, token: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.connection();
        let key = keys::blacklisted_token(token);

        conn.set_ex::<&str, u8, ()>(&key, 1, ttl_secs.max(1) as u64)
            .await
            .map_err(|e| {
                tracing::error!("[RedisClient::revoke] SET EX failed for {}: {}", key, e);
                anyhow!("redis SET failed: {}", e)
            })
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let mut conn = self.connection();
        conn.exists::<String, bool>(keys::blacklisted_token(token))
            .await
            .map_err(|e| anyhow!("redis EXISTS failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn blacklist_keys_hash_the_token() {
        let key = keys::blacklisted_token("header.payload.signature");
        assert!(key.starts_with("blacklist:"));
        assert_eq!(key.len(), "blacklist:".len() + 64);
        assert!(!key.contains("payload"));
        assert_eq!(key, keys::blacklisted_token("header.payload.signature"));
    }
}
