use std::env;

use donation_portal::auth::hash_password;
use donation_portal::db::{self, models::Role};
use donation_portal::validation::{is_valid_email, is_valid_phone};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if it exists
    dotenvy::dotenv().ok();

    println!("Starting database migration...");

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "data/donations.db".to_string());
    let pool = db::init_pool(&database_url).await?;
    db::migrate(&pool).await?;
    println!("Schema applied to {}", database_url);

    let admin_email = env::var("ADMIN_EMAIL").ok().map(|e| e.trim().to_lowercase());
    let admin_password = env::var("ADMIN_PASSWORD").ok();
    let (Some(email), Some(password)) = (admin_email, admin_password) else {
        println!("ADMIN_EMAIL/ADMIN_PASSWORD not set; skipping admin seed.");
        return Ok(());
    };

    if db::users::find_user_by_email(&pool, &email).await?.is_some() {
        println!("Admin {} already exists; skipping seed.", email);
        return Ok(());
    }

    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string());
    let phone = env::var("ADMIN_PHONE").unwrap_or_else(|_| "0000000000".to_string());
    if !is_valid_email(&email) {
        anyhow::bail!("ADMIN_EMAIL is not a valid email: {}", email);
    }
    if !is_valid_phone(&phone) {
        anyhow::bail!("ADMIN_PHONE must be 10 digits");
    }
    if password.chars().count() < 6 {
        anyhow::bail!("ADMIN_PASSWORD must be at least 6 characters");
    }

    let password_hash = hash_password(&password).map_err(|e| anyhow::anyhow!("{}", e))?;
    let admin = db::users::create_user(&pool, name.trim(), &email, &phone, &password_hash, Role::Admin).await?;
    println!("Seeded admin account {} ({})", admin.email, admin.id);

    Ok(())
}
