use std::collections::HashMap;

use crowdnest_common::get_current_timestamp;
use tokio::sync::RwLock;

/// Revoked bearer tokens, each kept until its TTL runs out.
#[async_trait::async_trait]
pub trait TokenBlacklist: Send + Sync {
    async fn revoke(&self, token: &str, ttl_secs: i64) -> anyhow::Result<()>;
    async fn is_revoked(&self, token: &str) -> anyhow::Result<bool>;
}

/// Process-local blacklist. Expired entries are dropped on every revoke and
/// on lookups of an expired token. Entries are lost on restart; use the
/// Redis store when revocations must survive one.
#[derive(Default)]
pub struct MemoryBlacklist {
    entries: RwLock<HashMap<String, i64>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl TokenBlacklist for MemoryBlacklist {
    async fn revoke(&self, token: &str, ttl_secs: i64) -> anyhow::Result<()> {
        let now = get_current_timestamp();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(token.to_string(), now + ttl_secs.max(0));
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> anyhow::Result<bool> {
        let now = get_current_timestamp();
        let expires_at = self.entries.read().await.get(token).copied();

        match expires_at {
            Some(expires_at) if expires_at > now => Ok(true),
            Some(_) => {
                let mut entries = self.entries.write().await;
                entries.retain(|_, expires_at| *expires_at > now);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_token_is_reported_until_expiry() {
        let blacklist = MemoryBlacklist::new();
        blacklist.revoke("t1", 60).await.unwrap();

        assert!(blacklist.is_revoked("t1").await.unwrap());
        assert!(!blacklist.is_revoked("t2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_lookup() {
        let blacklist = MemoryBlacklist::new();
        blacklist.revoke("fresh", 3600).await.unwrap();
        blacklist.revoke("old", 0).await.unwrap();
        assert_eq!(blacklist.len().await, 2);

        assert!(!blacklist.is_revoked("old").await.unwrap());
        assert_eq!(blacklist.len().await, 1);
        assert!(blacklist.is_revoked("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn revoking_drops_tokens_that_already_expired() {
        let blacklist = MemoryBlacklist::new();
        for i in 0..1000 {
            blacklist.revoke(&format!("logged-out-{}", i), 0).await.unwrap();
        }
        blacklist.revoke("live", 3600).await.unwrap();
        assert!(!blacklist.is_revoked("never-seen").await.unwrap());

        assert_eq!(blacklist.len().await, 1);
        assert!(blacklist.is_revoked("live").await.unwrap());
    }
}
