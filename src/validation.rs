use axum::extract::FromRequest;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{AppError, FieldError};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.\-]?\w+)*@\w+([.\-]?\w+)*(\.\w{2,3})+$").expect("email pattern")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern"));

/// JSON body extractor whose rejection uses the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Path identifiers are UUIDs; anything else is rejected before touching storage.
pub fn ensure_id(id: &str) -> Result<(), AppError> {
    uuid::Uuid::parse_str(id).map(|_| ()).map_err(|_| AppError::InvalidId)
}

pub fn is_http_url(raw: &str) -> bool {
    let raw = raw.trim();
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace))
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Accumulates field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn char_len(&mut self, value: &str, field: &str, min: usize, max: usize) -> &mut Self {
        let len = value.trim().chars().count();
        if len < min || len > max {
            let message = if min <= 1 {
                format!("{} must be at most {} characters", field, max)
            } else {
                format!("{} must be between {} and {} characters", field, min, max)
            };
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::invalid_fields(std::mem::take(&mut self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_phone_formats() {
        assert!(is_valid_email("donor@example.org"));
        assert!(is_valid_email("first.last@mail.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(is_valid_phone("9876543210"));
        assert!(!is_valid_phone("98765"));
        assert!(!is_valid_phone("98765432101"));
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(ensure_id("6f1c2a1e-8d8e-4c55-9f63-3b3f1d6f6b1a").is_ok());
        assert!(matches!(ensure_id("123"), Err(AppError::InvalidId)));
    }

    #[test]
    fn report_urls_need_a_scheme() {
        assert!(is_http_url("https://example.org/report.pdf"));
        assert!(is_http_url("http://files.example.org/a"));
        assert!(!is_http_url("ftp://example.org/a"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("report.pdf"));
    }

    #[test]
    fn dates_accept_both_forms() {
        let day = parse_date("2024-03-01").expect("plain date");
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let stamp = parse_date("2024-03-01T10:30:00+05:30").expect("timestamp");
        assert_eq!(stamp.to_rfc3339(), "2024-03-01T05:00:00+00:00");
        assert!(parse_date("01/03/2024").is_none());
    }

    #[test]
    fn checks_collect_every_failure() {
        let err = Checks::new()
            .require(false, "amount", "Amount must be at least 1")
            .char_len("x", "name", 2, 100)
            .char_len("fine", "title", 1, 200)
            .finish()
            .expect_err("two failures");
        match err {
            AppError::Validation { fields, .. } => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["amount", "name"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
