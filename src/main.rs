// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, sync::Arc};

use communications_server::{
    api::router,
    application::{CanViewSubscription, Mediator, SubscriptionHandlers},
    auth::{configure_auth_service, PrivilegeDescriptor},
    config::AppConfig,
    data_protection::{
        decode_master_key, load_or_create_master_key, DataProtectionPurpose, DataProtector,
        DEFAULT_KEY_LIFETIME,
    },
    identity::{seed_admin, JwtTokenManager, SignInManager, UserManager},
    logging::{init_tracing, LogFormat},
    notifications::EmailNotificationService,
    rate_limit::IpRateLimiter,
    state::AppState,
    storage::{Database, DATABASE_FILE},
    subscription::StoredSubscriptionService,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const MASTER_KEY_FILE: &str = "keys/data-protection.key";

#[tokio::main]
async fn main() {
    init_tracing(LogFormat::from_env());

    if let Err(e) = run().await {
        error!(error = %e, "Communications service failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    info!(
        environment = %config.environment,
        data_dir = %config.server.data_dir.display(),
        "Starting communications service"
    );

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db = Arc::new(Database::open(&config.server.data_dir.join(DATABASE_FILE))?);

    let master_key = match &config.data_protection_key {
        Some(encoded) => decode_master_key(encoded)?,
        None => load_or_create_master_key(&config.server.data_dir.join(MASTER_KEY_FILE))?,
    };
    let protector = DataProtector::new(
        &master_key,
        DataProtectionPurpose::RouteValues,
        DEFAULT_KEY_LIFETIME,
    )?;

    let auth = Arc::new(configure_auth_service(
        config.auth.clone(),
        config.jwt.as_ref().map(|jwt| jwt.local_issuer()),
        &[PrivilegeDescriptor::of::<CanViewSubscription>()],
        |_| {},
    )?);

    let email = Arc::new(EmailNotificationService::new(&config.email)?);
    let handlers = SubscriptionHandlers::new(
        Arc::new(StoredSubscriptionService::new(db.clone())),
        email,
        Arc::new(protector),
        &config.base_url,
    );

    let users = Arc::new(UserManager::new(db.clone(), config.identity.password.clone()));
    if let Some(admin) = &config.seed_admin {
        seed_admin(&users, &admin.email, &admin.password)?;
    }
    let sign_in = Arc::new(SignInManager::new(users.clone(), config.identity.lockout.clone()));
    let tokens = config.jwt.clone().map(|jwt| Arc::new(JwtTokenManager::new(jwt)));
    if tokens.is_none() {
        info!("No local token issuer configured; password login is disabled");
    }

    let shutdown = CancellationToken::new();
    let refresh = auth.spawn_refresh(shutdown.clone());

    let state = AppState {
        environment: config.environment,
        cors_origins: config.cors_origins.clone(),
        db,
        auth,
        mediator: Arc::new(Mediator::new(handlers)),
        users,
        sign_in,
        tokens,
        rate_limiter: Arc::new(IpRateLimiter::new(config.rate_limit.clone())),
    };
    let app = router(state);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "Communications service listening (docs at /docs)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    if let Some(task) = refresh {
        let _ = task.await;
    }
    info!("Communications service stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
