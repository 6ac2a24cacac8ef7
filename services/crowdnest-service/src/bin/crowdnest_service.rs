use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{signal, sync::watch};

use crowdnest_clients::{HttpMailer, LocalStorage, PostgresClient, R2Client, RedisClient};
use crowdnest_common::{EnvVars, ModuleClient};
use crowdnest_platform::{
    EmailQueue, ExpirySweeper, FileStorage, LogMailer, Mailer, MemoryBlacklist, PaymentLedger,
    TokenBlacklist, TokenService,
};
use crowdnest_service_api::{app_router, setup_tracing, ApiServerEnv, GlobalState};

async fn token_blacklist() -> Result<Arc<dyn TokenBlacklist>> {
    if std::env::var("REDIS_URL").is_ok() {
        let redis = RedisClient::setup_connection().await?;
        return Ok(Arc::new(redis));
    }
    tracing::warn!("REDIS_URL is not set, revoked tokens are kept in memory and lost on restart");
    Ok(Arc::new(MemoryBlacklist::new()))
}

fn mailer() -> Arc<dyn Mailer> {
    match HttpMailer::from_env() {
        Some(mailer) => Arc::new(mailer),
        None => {
            tracing::warn!("MAIL_API_URL is not set, outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    }
}

async fn file_storage(env: &ApiServerEnv) -> Result<Arc<dyn FileStorage>> {
    match env.storage_backend.as_str() {
        "r2" => Ok(Arc::new(R2Client::setup_connection().await?)),
        "local" => {
            let storage = LocalStorage::new(&env.local_storage_path, &env.backend_url);
            tokio::fs::create_dir_all(storage.root())
                .await
                .with_context(|| format!("failed to create {}", env.local_storage_path))?;
            Ok(Arc::new(storage))
        }
        other => anyhow::bail!("unknown STORAGE_BACKEND `{}`, expected `local` or `r2`", other),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("fail to install the `Ctrl+C` handler: {err}");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("fail to install the terminate signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    tracing::warn!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let env = ApiServerEnv::load();
    let db = PostgresClient::setup_connection().await?.pool();

    let tokens = TokenService::new(&env.jwt_secret)?;
    let blacklist = token_blacklist().await?;
    let storage = file_storage(&env).await?;

    let (mail, email_worker) = EmailQueue::new(tokens.clone(), &env.frontend_url, mailer());
    tokio::spawn(email_worker.run());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(db.clone(), PaymentLedger::new(db.clone()))
        .with_period(env.sweep_interval());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    let global_state = GlobalState::new(db, tokens, blacklist, mail, storage);
    let app = app_router(global_state, &env.local_storage_path);

    let listener = tokio::net::TcpListener::bind(format!(":::{}", env.port))
        .await
        .with_context(|| format!("failed to bind port {}", env.port))?;

    tracing::info!("LISTENING ON {}", env.port);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = sweeper_handle.await {
        tracing::error!("[ExpirySweeper] task ended abnormally: {}", e);
    }
    tracing::info!("server stopped");
    Ok(())
}
