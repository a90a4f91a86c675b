use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

pub mod certificates;
pub mod donations;
pub mod models;
pub mod posts;
pub mod programs;
pub mod reports;
pub mod users;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'donor',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS programs (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL UNIQUE,
    description    TEXT NOT NULL,
    target_amount  INTEGER NOT NULL DEFAULT 0 CHECK (target_amount >= 0),
    funds_received INTEGER NOT NULL DEFAULT 0 CHECK (funds_received >= 0),
    funds_utilized INTEGER NOT NULL DEFAULT 0 CHECK (funds_utilized >= 0 AND funds_utilized <= funds_received),
    start_date     TEXT NOT NULL,
    end_date       TEXT,
    status         TEXT NOT NULL DEFAULT 'active',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_programs_status ON programs(status);

CREATE TABLE IF NOT EXISTS donations (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    program_id     TEXT NOT NULL,
    amount         INTEGER NOT NULL CHECK (amount >= 1),
    order_id       TEXT NOT NULL UNIQUE,
    payment_id     TEXT UNIQUE,
    status         TEXT NOT NULL DEFAULT 'pending',
    visibility     TEXT NOT NULL,
    public_name    TEXT,
    donor_alias    TEXT,
    failure_reason TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    CHECK ((visibility = 'public' AND public_name IS NOT NULL AND public_name <> '' AND donor_alias IS NULL)
        OR (visibility = 'anonymous' AND donor_alias IS NOT NULL AND donor_alias <> '' AND public_name IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_donations_user ON donations(user_id);
CREATE INDEX IF NOT EXISTS idx_donations_program ON donations(program_id);
CREATE INDEX IF NOT EXISTS idx_donations_created ON donations(created_at DESC);

CREATE TABLE IF NOT EXISTS certificates (
    id               TEXT PRIMARY KEY,
    donation_id      TEXT NOT NULL,
    certificate_type TEXT NOT NULL,
    certificate_url  TEXT NOT NULL,
    issued_date      TEXT NOT NULL,
    UNIQUE (donation_id, certificate_type)
);

CREATE TABLE IF NOT EXISTS impact_reports (
    id              TEXT PRIMARY KEY,
    program_id      TEXT NOT NULL,
    funds_received  INTEGER NOT NULL CHECK (funds_received >= 0),
    funds_utilized  INTEGER NOT NULL CHECK (funds_utilized >= 0 AND funds_utilized <= funds_received),
    report_file_url TEXT NOT NULL,
    last_updated    TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_impact_reports_program ON impact_reports(program_id);

CREATE TABLE IF NOT EXISTS posts (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    excerpt    TEXT NOT NULL,
    author     TEXT NOT NULL,
    category   TEXT NOT NULL DEFAULT 'blog',
    image_url  TEXT,
    published  INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category, created_at DESC);
"#;

pub async fn init_pool(database_url: &str) -> anyhow::Result<DbPool> {
    if let Some(parent) = Path::new(database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(database_url).with_init(|conn| {
        // Concurrent verifications queue on the write lock instead of failing.
        conn.busy_timeout(Duration::from_secs(5))
    });
    let pool = Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(30))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    Ok(pool)
}

/// Applies the schema; every statement is idempotent.
pub async fn migrate(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
