use axum::http::{header, HeaderValue, Method};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use donation_portal::certificates::CertificateStore;
use donation_portal::config::AppConfig;
use donation_portal::scheduler::Scheduler;
use donation_portal::services::progress_report::ProgressReportJob;
use donation_portal::tasks::BackgroundTasks;
use donation_portal::{build_router, db, email, payments, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if it exists
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "donation_portal=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(env = %config.rust_env, "Starting donation portal...");

    tracing::info!("Initializing database connection pool...");
    let db_pool = db::init_pool(&config.database_url).await?;
    db::migrate(&db_pool).await?;
    tracing::info!("Database ready at {}", config.database_url);

    let certificates = CertificateStore::filesystem(&config.certificates_dir)?;
    let gateway = payments::gateway_from_config(&config)?;
    let mailer = email::mailer_from_config(&config)?;
    if config.smtp.is_none() {
        tracing::warn!("EMAIL_USER/EMAIL_PASS not set; outgoing email is disabled");
    }

    let job = Arc::new(ProgressReportJob::new(
        db_pool.clone(),
        mailer.clone(),
        config.foundation.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(job));
    scheduler.start();

    let tasks = BackgroundTasks::new();
    let state = AppState {
        db: db_pool,
        config: config.clone(),
        gateway,
        mailer,
        certificates,
        scheduler: scheduler.clone(),
        tasks: tasks.clone(),
    };

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );

    let app = build_router(state)
        .layer(cors_layer(&config))
        .layer(GovernorLayer { config: governor_config })
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    tracing::info!("Waiting for background work to finish...");
    tasks.drain().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// CORS from the configured origins (no permissive mode).
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid ALLOWED_ORIGINS entry: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if config.is_production() {
            panic!("ALLOWED_ORIGINS must contain at least one valid origin in production")
        }
        origins = vec![
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ];
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
