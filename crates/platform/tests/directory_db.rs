//! Run with `DATABASE_URL=... cargo test -p crowdnest-platform -- --ignored`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;

use crowdnest_database::{QueryCriteria, SqlxFilterQuery};
use crowdnest_platform::user::{Registration, User, UserRole};
use crowdnest_platform::{
    AddressBook, EmailMessage, EmailQueue, ErrorCode, MemoryBlacklist, TokenService, UserDirectory,
};

fn directory(pool: &sqlx::PgPool, mailer: RecordingMailer) -> UserDirectory {
    let tokens = TokenService::new("directory-test-secret").unwrap();
    let (queue, worker) = EmailQueue::new(tokens.clone(), "https://crowdnest.test/", Arc::new(mailer));
    tokio::spawn(worker.run());
    UserDirectory::new(pool.clone(), tokens, Arc::new(MemoryBlacklist::new()), queue)
}

async fn wait_for_mail(mailer: &RecordingMailer, to: &str) -> EmailMessage {
    for _ in 0..50 {
        if let Some(message) = mailer.sent.lock().await.iter().find(|m| m.to == to) {
            return message.clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no mail was sent to {}", to);
}

fn token_from(message: &EmailMessage) -> String {
    let (_, rest) = message.body.split_once("token=").expect("mail carries a token");
    rest.split_whitespace().next().unwrap_or_default().to_string()
}

#[tokio::test]
#[ignore]
async fn weak_password_writes_nothing_and_strong_one_sends_verification() {
    let pool = pool().await;
    let mailer = RecordingMailer::default();
    let users = directory(&pool, mailer.clone());

    let name = unique("reg");
    let email = format!("{}@example.com", name);

    let err = users.register(Registration {
        username: name.clone(),
        email: email.clone(),
        password: "abc".to_string(),
    }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::WeakPassword);
    let rows = User::count_by_criteria(
        QueryCriteria::new().add_valued_filter("email", "=", email.clone()),
        &pool,
    ).await.unwrap();
    assert_eq!(rows, 0);

    let user = users.register(Registration {
        username: name.clone(),
        email: email.to_uppercase(),
        password: "Str0ng!Pass".to_string(),
    }).await.unwrap();
    assert_eq!(user.email, email);
    assert!(!user.is_verified);
    assert_eq!(user.role, UserRole::User);

    let message = wait_for_mail(&mailer, &email).await;
    assert!(message.body.contains("https://crowdnest.test/verify-email?token="));

    let verified = users.verify_email(&token_from(&message)).await.unwrap();
    assert!(verified.is_verified);
    let err = users.verify_email(&token_from(&message)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceExists);

    let err = users.register(Registration {
        username: name,
        email: format!("other_{}", email),
        password: "Str0ng!Pass".to_string(),
    }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UserExists);
}

#[tokio::test]
#[ignore]
async fn login_logout_and_password_reset() {
    let pool = pool().await;
    let mailer = RecordingMailer::default();
    let users = directory(&pool, mailer.clone());

    let name = unique("login");
    let email = format!("{}@example.com", name);
    let user = users.register(Registration {
        username: name,
        email: email.clone(),
        password: "Str0ng!Pass".to_string(),
    }).await.unwrap();

    let err = users.login(&email, "Wr0ng!Pass").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCredentials);
    let err = users.admin_login(&email, "Str0ng!Pass").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let session = users.login(&email, "Str0ng!Pass").await.unwrap();
    assert_eq!(users.tokens().validate(&session.token).unwrap(), user.id);
    assert!(!users.is_token_revoked(&session.token).await.unwrap());
    users.logout(&session.token).await.unwrap();
    assert!(users.is_token_revoked(&session.token).await.unwrap());

    users.request_password_reset(&email).await.unwrap();
    let reset = loop {
        let message = wait_for_mail(&mailer, &email).await;
        if message.subject.contains("Reset") {
            break message;
        }
        mailer.sent.lock().await.retain(|m| m != &message);
    };
    let err = users.reset_password(&token_from(&reset), "weak").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::WeakPassword);
    users.reset_password(&token_from(&reset), "N3w!Password").await.unwrap();

    assert!(users.login(&email, "Str0ng!Pass").await.is_err());
    users.login(&email, "N3w!Password").await.unwrap();

    users.delete_account(user.id).await.unwrap();
    assert!(users.get_active_user(user.id).await.unwrap().is_none());
    let err = users.login(&email, "N3w!Password").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCredentials);
}

#[tokio::test]
#[ignore]
async fn exactly_one_default_address() {
    let pool = pool().await;
    let user = seed_user(&pool, UserRole::User).await;
    let book = AddressBook::new(pool.clone());

    let a = book.create(user.id, address(false)).await.unwrap();
    let b = book.create(user.id, address(false)).await.unwrap();
    let c = book.create(user.id, address(true)).await.unwrap();
    book.set_default(user.id, b.id).await.unwrap();
    book.update(user.id, a.id, address(false)).await.unwrap();

    let addresses = book.list(user.id).await.unwrap();
    let defaults: Vec<i64> = addresses.iter().filter(|a| a.is_default).map(|a| a.id).collect();
    assert_eq!(defaults, vec![b.id]);
    assert_eq!(addresses[0].id, b.id);

    book.delete(user.id, b.id).await.unwrap();
    let addresses = book.list(user.id).await.unwrap();
    assert_eq!(addresses.iter().filter(|a| a.is_default).count(), 1);
    assert_eq!(addresses[0].id, c.id);
}

