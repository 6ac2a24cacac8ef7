use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crowdnest_platform::{
    AddressBook, AdminConsole, CommunityService, EmailQueue, ErrorCode, FileStorage, PaymentLedger,
    ProjectCatalog, TokenBlacklist, TokenService, UserDirectory,
};

/// Error responses seen since start, by code.
#[derive(Clone, Default)]
pub struct ErrorStats {
    counts: Arc<RwLock<BTreeMap<ErrorCode, u64>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub code: u16,
    pub name: String,
    pub count: u64,
}

impl ErrorStats {
    pub async fn record(&self, code: ErrorCode) {
        *self.counts.write().await.entry(code).or_insert(0) += 1;
    }

    pub async fn snapshot(&self) -> Vec<ErrorCount> {
        self.counts.read().await
            .iter()
            .map(|(code, count)| ErrorCount { code: code.code(), name: format!("{:?}", code), count: *count })
            .collect()
    }
}

#[derive(Clone)]
pub struct GlobalState {
    pub db: PgPool,
    pub tokens: TokenService,
    pub users: UserDirectory,
    pub addresses: AddressBook,
    pub catalog: ProjectCatalog,
    pub ledger: PaymentLedger,
    pub community: CommunityService,
    pub admin: AdminConsole,
    pub storage: Arc<dyn FileStorage>,
    pub error_stats: ErrorStats,
}

impl GlobalState {
    pub fn new(
        db: PgPool,
        tokens: TokenService,
        blacklist: Arc<dyn TokenBlacklist>,
        mail: EmailQueue,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            users: UserDirectory::new(db.clone(), tokens.clone(), blacklist, mail),
            addresses: AddressBook::new(db.clone()),
            catalog: ProjectCatalog::new(db.clone()),
            ledger: PaymentLedger::new(db.clone()),
            community: CommunityService::new(db.clone()),
            admin: AdminConsole::new(db.clone()),
            tokens,
            storage,
            error_stats: ErrorStats::default(),
            db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_stats_count_by_code() {
        let stats = ErrorStats::default();
        stats.record(ErrorCode::Validation).await;
        stats.record(ErrorCode::Validation).await;
        stats.record(ErrorCode::Internal).await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot, vec![
            ErrorCount { code: 1000, name: "Internal".into(), count: 1 },
            ErrorCount { code: 3001, name: "Validation".into(), count: 2 },
        ]);
    }
}
