mod address;
mod admin;
mod auth;
mod community;
mod misc;
mod payment;
mod profile;
mod project;

use serde::Deserialize;

pub use address::address_routes;
pub use admin::admin_routes;
pub use auth::auth_routes;
pub use community::community_routes;
pub use misc::misc_routes;
pub use payment::payment_routes;
pub use profile::profile_routes;
pub use project::project_routes;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
