use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

pub mod auth;
pub mod certificates;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod tasks;
pub mod validation;

use certificates::CertificateStore;
use config::AppConfig;
use db::DbPool;
use email::Mailer;
use payments::PaymentGateway;
use scheduler::Scheduler;
use tasks::BackgroundTasks;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub certificates: CertificateStore,
    pub scheduler: Arc<Scheduler>,
    pub tasks: BackgroundTasks,
}

/// Every route of the service. Transport layers (CORS, rate limiting, security
/// headers) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    use routes::{admin, blog, certificates as certs, donations, programs, reports, transparency, users};

    let api = Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Users
        .route("/users/profile", get(users::profile).put(users::update_profile))
        .route("/users/dashboard", get(users::dashboard))
        // Donations
        .route("/donations/create-order", post(donations::create_order))
        .route("/donations/verify", post(donations::verify))
        .route("/donations/fail", post(donations::fail))
        .route("/donations/history", get(donations::history))
        .route("/donations/public", get(donations::public_feed))
        // Programs
        .route("/programs", get(programs::list).post(programs::create))
        .route(
            "/programs/{id}",
            get(programs::get_one)
                .put(programs::update)
                .delete(programs::archive),
        )
        .route("/programs/{id}/funds", put(programs::update_funds))
        // Transparency & reports
        .route("/transparency/programs", get(transparency::programs))
        .route("/transparency/reports", get(reports::list))
        .route("/reports", get(reports::list).post(reports::create))
        .route("/reports/program/{program_id}", get(reports::latest_for_program))
        // Certificates
        .route("/certificates/donation/{donation_id}", get(certs::for_donation))
        .route("/certificates/download/{filename}", get(certs::download))
        // Blog
        .route("/blog", get(blog::list).post(blog::create))
        .route(
            "/blog/{id}",
            get(blog::get_one).put(blog::update).delete(blog::remove),
        )
        // Admin
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/donations", get(admin::donations))
        .route("/admin/donors", get(admin::donors))
        .route("/admin/scheduler/status", get(admin::scheduler_status))
        .route("/admin/scheduler/options", get(admin::scheduler_options))
        .route("/admin/scheduler/config", put(admin::scheduler_config))
        .route("/admin/scheduler/trigger", post(admin::scheduler_trigger))
        .route("/admin/scheduler/enable", post(admin::scheduler_enable))
        .route("/admin/scheduler/disable", post(admin::scheduler_disable));

    Router::new()
        .route("/health", get(routes::health))
        .route("/certificates/{filename}", get(certs::download))
        .nest("/api", api)
        .fallback(routes::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::log_errors))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
