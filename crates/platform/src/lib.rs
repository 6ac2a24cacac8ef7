pub mod admin;
pub mod auth;
pub mod community;
pub mod error;
pub mod ledger;
pub mod mail;
pub mod project;
pub mod storage;
pub mod sweeper;
pub mod user;

pub use admin::{AdminConsole, SystemStats};
pub use auth::{EmailPurpose, MemoryBlacklist, TokenBlacklist, TokenService};
pub use community::CommunityService;
pub use error::{ErrorCode, PlatformError, PlatformResult};
pub use ledger::PaymentLedger;
pub use mail::{EmailMessage, EmailQueue, EmailWorker, LogMailer, Mailer};
pub use project::ProjectCatalog;
pub use storage::FileStorage;
pub use sweeper::ExpirySweeper;
pub use user::{AddressBook, UserDirectory};
