#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{Mutex, OnceCell};

use crowdnest_common::get_current_timestamp;
use crowdnest_database::{create_table, create_trigger_function, SqlxCrud};
use crowdnest_platform::community::{Comment, Follow, Like, Post, PostImage};
use crowdnest_platform::ledger::{Order, Pledge, RefundRequest, Shipment};
use crowdnest_platform::mail::{EmailMessage, Mailer};
use crowdnest_platform::project::{
    GoalDraft, NewProject, Project, ProjectCategory, ProjectComment, ProjectGoal, ProjectImage, ProjectTag,
    ProjectTagRelation, ProjectUpdate,
};
use crowdnest_platform::user::{AddressDraft, User, UserAddress, UserRole};
use crowdnest_platform::{AdminConsole, ProjectCatalog};

static SCHEMA: OnceCell<()> = OnceCell::const_new();
static SEQ: AtomicU64 = AtomicU64::new(0);

async fn create_schema(pool: &PgPool) -> anyhow::Result<()> {
    create_trigger_function(pool).await?;
    create_table::<User>(pool).await?;
    create_table::<UserAddress>(pool).await?;
    create_table::<ProjectCategory>(pool).await?;
    create_table::<ProjectTag>(pool).await?;
    create_table::<Project>(pool).await?;
    create_table::<ProjectGoal>(pool).await?;
    create_table::<ProjectImage>(pool).await?;
    create_table::<ProjectTagRelation>(pool).await?;
    create_table::<ProjectUpdate>(pool).await?;
    create_table::<ProjectComment>(pool).await?;
    create_table::<Pledge>(pool).await?;
    create_table::<Order>(pool).await?;
    create_table::<RefundRequest>(pool).await?;
    create_table::<Shipment>(pool).await?;
    create_table::<Post>(pool).await?;
    create_table::<PostImage>(pool).await?;
    create_table::<Comment>(pool).await?;
    create_table::<Like>(pool).await?;
    create_table::<Follow>(pool).await?;
    Ok(())
}

/// A pool on `DATABASE_URL` with the schema in place.
pub async fn pool() -> PgPool {
    dotenv::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to the test database");

    SCHEMA.get_or_init(|| async {
        create_schema(&pool).await.expect("failed to create schema");
    }).await;
    pool
}

/// Unique per call, so tests can share one database.
pub fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}_{}_{}_{}", prefix, std::process::id(), nanos, SEQ.fetch_add(1, Ordering::Relaxed))
}

pub async fn seed_user(pool: &PgPool, role: UserRole) -> User {
    let name = unique("user");
    User {
        username: name.clone(),
        email: format!("{}@example.com", name),
        password_hash: "not-a-real-hash".to_string(),
        role,
        ..Default::default()
    }
        .create(pool)
        .await
        .expect("failed to seed user")
}

pub fn dec(amount: i64) -> Decimal {
    Decimal::from(amount)
}

pub fn draft(goals: &[i64]) -> NewProject {
    NewProject {
        title: unique("project"),
        description: "a kettle that boils itself".to_string(),
        category_id: None,
        end_date: get_current_timestamp() + 30 * 24 * 60 * 60,
        goals: goals.iter().map(|amount| GoalDraft { amount: dec(*amount), description: String::new() }).collect(),
        images: vec![],
        tag_ids: vec![],
    }
}

/// A reviewed, active project with the given goals.
pub async fn active_project(pool: &PgPool, creator: &User, goals: &[i64]) -> Project {
    let catalog = ProjectCatalog::new(pool.clone());
    let project = catalog.create_project(creator.id, draft(goals)).await.expect("failed to create project");
    AdminConsole::new(pool.clone())
        .review_project(project.id, true, None)
        .await
        .expect("failed to approve project")
}

pub fn address(is_default: bool) -> AddressDraft {
    AddressDraft {
        receiver_name: "Ann Lee".to_string(),
        phone: "+1 555 0100".to_string(),
        province: "CA".to_string(),
        city: "San Francisco".to_string(),
        district: "Mission".to_string(),
        detail_address: "1 Valencia St".to_string(),
        is_default,
    }
}

pub async fn move_end_date(pool: &PgPool, project_id: i64, end_date: i64) {
    sqlx::query("UPDATE projects SET end_date = $1 WHERE id = $2")
        .bind(end_date)
        .bind(project_id)
        .execute(pool)
        .await
        .expect("failed to move end date");
}

/// Keeps every message instead of sending it.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
