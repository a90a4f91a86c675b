use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// SMTP settings; only present when both a user and a password are configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Display metadata printed on certificates and emails.
#[derive(Debug, Clone)]
pub struct FoundationInfo {
    pub name: String,
    pub address: String,
    pub registration_number: String,
}

impl Default for FoundationInfo {
    fn default() -> Self {
        Self {
            name: "Nonprofit Foundation".to_string(),
            address: "Foundation Address".to_string(),
            registration_number: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rust_env: String,
    pub port: u16,
    pub database_url: String,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_api_base: String,
    pub mock_payments: bool,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub smtp: Option<SmtpConfig>,
    pub foundation: FoundationInfo,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    pub certificates_dir: PathBuf,
    /// Per-IP request budget for the governor layer.
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rust_env: "development".to_string(),
            port: 8080,
            database_url: "data/donations.db".to_string(),
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_api_base: "https://api.razorpay.com/v1".to_string(),
            mock_payments: false,
            jwt_secret: String::new(),
            jwt_expires_in: Duration::from_secs(7 * 24 * 60 * 60),
            smtp: None,
            foundation: FoundationInfo::default(),
            frontend_url: "http://localhost:5173".to_string(),
            allowed_origins: Vec::new(),
            certificates_dir: PathBuf::from("certificates"),
            rate_limit_per_second: 10,
            rate_limit_burst: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let rust_env = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let jwt_expires_in = match env::var("JWT_EXPIRES_IN") {
            Ok(raw) => parse_duration(&raw)
                .ok_or_else(|| anyhow::anyhow!("JWT_EXPIRES_IN is not a valid duration: {}", raw))?,
            Err(_) => defaults.jwt_expires_in,
        };

        // Mock payments are a development-only switch.
        let mock_payments = rust_env == "development" && env_flag("USE_MOCK_PAYMENTS");

        let smtp = match (non_empty("EMAIL_USER"), non_empty("EMAIL_PASS")) {
            (Some(username), Some(password)) => Some(SmtpConfig {
                host: env::var("EMAIL_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env::var("EMAIL_PORT")
                    .ok()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(587),
                username,
                password,
            }),
            _ => None,
        };

        let foundation = FoundationInfo {
            name: non_empty("FOUNDATION_NAME").unwrap_or(defaults.foundation.name),
            address: non_empty("FOUNDATION_ADDRESS").unwrap_or(defaults.foundation.address),
            registration_number: non_empty("FOUNDATION_REGISTRATION_NUMBER")
                .unwrap_or(defaults.foundation.registration_number),
        };

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .or_else(|_| env::var("FRONTEND_URL"))
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            razorpay_key_id: non_empty("RAZORPAY_KEY_ID"),
            razorpay_key_secret: non_empty("RAZORPAY_KEY_SECRET"),
            razorpay_api_base: env::var("RAZORPAY_API_BASE").unwrap_or(defaults.razorpay_api_base),
            mock_payments,
            jwt_secret,
            jwt_expires_in,
            smtp,
            foundation,
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            allowed_origins,
            certificates_dir: env::var("CERTIFICATES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.certificates_dir),
            rate_limit_per_second: env::var("RATE_LIMIT_PER_SECOND")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.rate_limit_per_second),
            rate_limit_burst: env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.rate_limit_burst),
            rust_env,
        })
    }

    pub fn is_production(&self) -> bool {
        self.rust_env == "production"
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parses `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };
    let value: u64 = digits.trim().parse().ok()?;
    let secs = match unit {
        None | Some('s') => value,
        Some('m') => value.checked_mul(60)?,
        Some('h') => value.checked_mul(60 * 60)?,
        Some('d') => value.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::{parse_duration, AppConfig};
    use std::time::Duration;

    #[test]
    fn defaults_are_development_with_modest_rate_limits() {
        let config = AppConfig::default();
        assert!(!config.is_production());
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.rate_limit_burst, 100);
    }

    #[test]
    fn parses_expiry_units() {
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("12h"), Some(Duration::from_secs(43_200)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1_800)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("3w"), None);
        assert_eq!(parse_duration(""), None);
    }
}
