//! # Modest API Server
//!
//! Serves the account lifecycle (signup, confirmation, password, magic-link
//! and provider logins, recovery, email change), the account and task
//! pages, the task JSON API and the billing endpoints.
//!
//! ## Usage
//!
//! ```bash
//! MODEST__DATABASE__DRIVER=postgres \
//! MODEST__DATABASE__URL=postgres://localhost/modest \
//! cargo run -p modest-api
//! ```

use anyhow::Context;
use modest_api::{
    app::{build_router, AppState},
    config::{Config, Driver},
};
use modest_shared::{
    billing::{BillingGateway, StripeClient},
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    mail::LogMailer,
    oauth::{GoogleProvider, IdentityProviders},
    store::Stores,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "modest_api=debug,modest_shared=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Modest API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match config.database.driver {
        Driver::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            None
        }
        Driver::Postgres => {
            let pool = create_pool(DatabaseConfig {
                url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                ..Default::default()
            })
            .await
            .context("failed to connect to the database")?;

            run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;

            Some(pool)
        }
    };

    let stores = match &pool {
        Some(pool) => Stores::postgres(pool.clone()),
        None => Stores::memory(),
    };

    let mut providers = IdentityProviders::new();
    if config.oauth.google.is_enabled() {
        let google = GoogleProvider::new(
            config.oauth.google.client_id.clone(),
            config.oauth.google.client_secret.clone(),
        )?;
        providers = providers.register(Arc::new(google));
        tracing::info!("Google login enabled");
    }

    let billing: Option<Arc<dyn BillingGateway>> = if config.billing_enabled() {
        tracing::info!("Stripe billing enabled");
        Some(Arc::new(StripeClient::new(
            config.billing.stripe_secret_key.clone(),
        )?))
    } else {
        None
    };

    let mailer = Arc::new(LogMailer::new(config.mail.from.clone()));
    let address = config.bind_address();

    let state = AppState::new(config, stores, mailer, providers, billing);
    state.validate_routes()?;

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        close_pool(pool).await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
