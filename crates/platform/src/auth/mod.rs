mod blacklist;
mod token;

pub use blacklist::{MemoryBlacklist, TokenBlacklist};
pub use token::{EmailPurpose, TokenService, SESSION_TTL_SECS};
