//! Run with `DATABASE_URL=... cargo test -p crowdnest-platform -- --ignored`.

mod common;

use std::time::Duration;

use common::*;

use crowdnest_common::get_current_timestamp;
use crowdnest_database::{QueryCriteria, SqlxFilterQuery};
use crowdnest_platform::ledger::{Order, OrderStatus, Pledge, PledgeStatus, RefundStatus, ShipmentDraft};
use crowdnest_platform::project::{GoalDraft, ProjectEdit, ProjectStatus};
use crowdnest_platform::user::UserRole;
use crowdnest_platform::{AddressBook, AdminConsole, ErrorCode, ExpirySweeper, PaymentLedger, ProjectCatalog};

async fn project_total(pool: &sqlx::PgPool, project_id: i64) -> rust_decimal::Decimal {
    ProjectCatalog::new(pool.clone()).get_project(project_id).await.unwrap().unwrap().total_amount
}

#[tokio::test]
#[ignore]
async fn pledge_creates_order_and_raises_total() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000, 5000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let order = ledger.process_payment(backer.id, project.id, dec(1200), None).await.unwrap();
    assert!(order.is_reward);
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.order_number.starts_with("ORD-"));

    let project = ProjectCatalog::new(pool.clone()).get_project(project.id).await.unwrap().unwrap();
    assert_eq!(project.total_amount, dec(1200));
    assert_eq!(project.progress, 20.0);

    let pledge = Pledge::find_one_by_criteria(QueryCriteria::by_id(order.pledge_id), &pool).await.unwrap().unwrap();
    assert_eq!(pledge.status, PledgeStatus::Paid);
    assert_eq!(pledge.amount, dec(1200));
}

#[tokio::test]
#[ignore]
async fn reward_threshold_is_inclusive() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000, 5000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let below = ledger.process_payment(backer.id, project.id, dec(999), None).await.unwrap();
    let exact = ledger.process_payment(backer.id, project.id, dec(1000), None).await.unwrap();
    assert!(!below.is_reward);
    assert!(exact.is_reward);
    assert_eq!(project_total(&pool, project.id).await, dec(1999));
}

#[tokio::test]
#[ignore]
async fn refused_pledges_write_nothing() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let stranger = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let err = ledger.process_payment(backer.id, project.id, dec(0), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation);

    let foreign = AddressBook::new(pool.clone()).create(stranger.id, address(true)).await.unwrap();
    assert!(ledger.process_payment(backer.id, project.id, dec(100), Some(foreign.id)).await.is_err());

    move_end_date(&pool, project.id, get_current_timestamp() - 60).await;
    let err = ledger.process_payment(backer.id, project.id, dec(100), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);
    assert_eq!(err.to_string(), "project has ended");

    let pledges = Pledge::count_by_criteria(
        QueryCriteria::new().add_valued_filter("project_id", "=", project.id),
        &pool,
    ).await.unwrap();
    assert_eq!(pledges, 0);
    assert_eq!(project_total(&pool, project.id).await, dec(0));
}

#[tokio::test]
#[ignore]
async fn pledge_falls_back_to_default_address() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;

    let book = AddressBook::new(pool.clone());
    let first = book.create(backer.id, address(false)).await.unwrap();
    assert!(first.is_default);
    let second = book.create(backer.id, address(true)).await.unwrap();

    let order = PaymentLedger::new(pool.clone())
        .process_payment(backer.id, project.id, dec(50), None)
        .await
        .unwrap();
    assert_eq!(order.address_id, Some(second.id));
}

#[tokio::test]
#[ignore]
async fn second_refund_request_conflicts() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;
    let ledger = PaymentLedger::new(pool.clone());
    let order = ledger.process_payment(backer.id, project.id, dec(100), None).await.unwrap();

    let other = seed_user(&pool, UserRole::User).await;
    let err = ledger.request_refund_for_failed_project(order.id, other.id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let request = ledger.request_refund_for_failed_project(order.id, backer.id, None).await.unwrap();
    assert_eq!(request.status, RefundStatus::Pending);
    let err = ledger.request_refund_for_failed_project(order.id, backer.id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);

    let order = ledger.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
#[ignore]
async fn refund_decisions_pair_request_and_order() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let rejected_order = ledger.process_payment(backer.id, project.id, dec(100), None).await.unwrap();
    let request = ledger.request_refund_for_failed_project(rejected_order.id, backer.id, None).await.unwrap();
    let request = ledger.process_refund(request.id, false, Some("not eligible".to_string())).await.unwrap();
    assert_eq!(request.status, RefundStatus::Rejected);
    assert_eq!(request.admin_comment.as_deref(), Some("not eligible"));
    let order = ledger.get_order(rejected_order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::RefundRejected);

    let err = ledger.process_refund(request.id, true, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);

    let approved_order = ledger.process_payment(backer.id, project.id, dec(100), None).await.unwrap();
    let request = ledger.request_refund_for_failed_project(approved_order.id, backer.id, None).await.unwrap();
    let request = ledger.process_refund(request.id, true, None).await.unwrap();
    assert_eq!(request.status, RefundStatus::Approved);
    let order = ledger.get_order(approved_order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);

    let status = ledger.get_refund_status(backer.id, approved_order.id).await.unwrap().unwrap();
    assert_eq!(status.id, request.id);
    assert!(ledger.get_refund_status(creator.id, approved_order.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn expired_underfunded_project_fails_and_orders_follow() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000, 5000]).await;
    let ledger = PaymentLedger::new(pool.clone());
    let order = ledger.process_payment(backer.id, project.id, dec(800), None).await.unwrap();

    move_end_date(&pool, project.id, get_current_timestamp() - 60).await;
    let sweeper = ExpirySweeper::new(pool.clone(), ledger.clone());
    let failed = sweeper.fail_expired_projects().await.unwrap();
    assert!(failed.contains(&project.id));

    let project = ProjectCatalog::new(pool.clone()).get_project(project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);

    assert_eq!(ledger.sync_orders_with_project_status(project.id).await.unwrap(), 1);
    let order = ledger.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::CrowdfundingFailed);
    assert_eq!(ledger.sync_orders_with_project_status(project.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn sweep_leaves_funded_running_and_terminal_projects_alone() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let ledger = PaymentLedger::new(pool.clone());
    let admin = AdminConsole::new(pool.clone());
    let catalog = ProjectCatalog::new(pool.clone());

    let funded = active_project(&pool, &creator, &[1000, 5000]).await;
    ledger.process_payment(backer.id, funded.id, dec(1000), None).await.unwrap();
    move_end_date(&pool, funded.id, get_current_timestamp() - 60).await;

    let running = active_project(&pool, &creator, &[1000]).await;

    let completed = active_project(&pool, &creator, &[1000]).await;
    admin.update_project_status(completed.id, "completed").await.unwrap();
    move_end_date(&pool, completed.id, get_current_timestamp() - 60).await;

    let failed = ExpirySweeper::new(pool.clone(), ledger).fail_expired_projects().await.unwrap();
    for project in [&funded, &running, &completed] {
        assert!(!failed.contains(&project.id));
    }
    assert_eq!(catalog.get_project(funded.id).await.unwrap().unwrap().status, ProjectStatus::Active);
    assert_eq!(catalog.get_project(running.id).await.unwrap().unwrap().status, ProjectStatus::Active);
    assert_eq!(catalog.get_project(completed.id).await.unwrap().unwrap().status, ProjectStatus::Completed);
}

#[tokio::test]
#[ignore]
async fn auto_refund_covers_every_open_order() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let first = ledger.process_payment(backer.id, project.id, dec(100), None).await.unwrap();
    let second = ledger.process_payment(backer.id, project.id, dec(200), None).await.unwrap();
    ledger.request_refund_for_failed_project(first.id, backer.id, None).await.unwrap();

    let err = ledger.auto_refund_for_failed_project(project.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);

    AdminConsole::new(pool.clone())
        .update_project_status(project.id, "failed")
        .await
        .unwrap();
    assert_eq!(ledger.sync_orders_with_project_status(project.id).await.unwrap(), 2);
    assert_eq!(ledger.auto_refund_for_failed_project(project.id).await.unwrap(), 2);
    assert_eq!(ledger.auto_refund_for_failed_project(project.id).await.unwrap(), 0);

    let err = ledger.create_shipment(second.id, ShipmentDraft::default()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);

    for order_id in [first.id, second.id] {
        let order = Order::find_one_by_criteria(QueryCriteria::by_id(order_id), &pool).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        let request = ledger.get_refund_status(backer.id, order_id).await.unwrap().unwrap();
        assert_eq!(request.status, RefundStatus::Approved);
    }
}

#[tokio::test]
#[ignore]
async fn refunded_backing_does_not_keep_an_expired_project_alive() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000, 5000]).await;
    let ledger = PaymentLedger::new(pool.clone());

    let order = ledger.process_payment(backer.id, project.id, dec(1200), None).await.unwrap();
    let request = ledger.request_refund_for_failed_project(order.id, backer.id, None).await.unwrap();
    ledger.process_refund(request.id, true, None).await.unwrap();
    assert_eq!(project_total(&pool, project.id).await, dec(1200));

    move_end_date(&pool, project.id, get_current_timestamp() - 60).await;
    // another test's sweep may claim it first, so check the row not the list
    ExpirySweeper::new(pool.clone(), ledger).fail_expired_projects().await.unwrap();

    let project = ProjectCatalog::new(pool.clone()).get_project(project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Failed);
}

/// Holds the row the way a pledge transaction does, then commits it while
/// another writer is waiting on the same project.
async fn pledge_meanwhile<F, T>(pool: &sqlx::PgPool, project_id: i64, amount: i64, write: F) -> T
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("UPDATE projects SET total_amount = total_amount + $1 WHERE id = $2")
        .bind(dec(amount))
        .bind(project_id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let waiting = tokio::spawn(write);
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.commit().await.unwrap();
    waiting.await.unwrap()
}

#[tokio::test]
#[ignore]
async fn status_change_keeps_a_pledge_committed_meanwhile() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;

    let admin = AdminConsole::new(pool.clone());
    let project_id = project.id;
    let changed = pledge_meanwhile(&pool, project.id, 500, async move {
        admin.update_project_status(project_id, "completed").await
    }).await.unwrap();

    assert_eq!(changed.status, ProjectStatus::Completed);
    assert_eq!(changed.total_amount, dec(500));
    assert_eq!(project_total(&pool, project.id).await, dec(500));
}

#[tokio::test]
#[ignore]
async fn goal_edit_keeps_a_pledge_committed_meanwhile() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;

    let catalog = ProjectCatalog::new(pool.clone());
    let (creator_id, project_id) = (creator.id, project.id);
    let edit = ProjectEdit {
        title: Some("kettle, second batch".to_string()),
        goals: Some(vec![GoalDraft { amount: dec(2000), description: "second batch".to_string() }]),
        ..Default::default()
    };
    let edited = pledge_meanwhile(&pool, project.id, 500, async move {
        catalog.update_project(creator_id, project_id, edit).await
    }).await.unwrap();

    assert_eq!(edited.title, "kettle, second batch");
    assert_eq!(edited.total_amount, dec(500));
    assert_eq!(edited.total_goal_amount, dec(2000));
    assert_eq!(edited.progress, 25.0);
}

#[tokio::test]
#[ignore]
async fn address_on_an_order_cannot_be_deleted() {
    let pool = pool().await;
    let creator = seed_user(&pool, UserRole::User).await;
    let backer = seed_user(&pool, UserRole::User).await;
    let project = active_project(&pool, &creator, &[1000]).await;

    let book = AddressBook::new(pool.clone());
    let shipping = book.create(backer.id, address(true)).await.unwrap();
    let order = PaymentLedger::new(pool.clone())
        .process_payment(backer.id, project.id, dec(50), Some(shipping.id))
        .await
        .unwrap();

    let err = book.delete(backer.id, shipping.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceConflict);

    let order = PaymentLedger::new(pool.clone()).get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.address_id, Some(shipping.id));
    assert_eq!(book.list(backer.id).await.unwrap().len(), 1);
}
