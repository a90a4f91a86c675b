use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enums persisted as TEXT columns and exchanged as their lowercase names.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(Role, "role", { Donor => "donor", Admin => "admin" });
text_enum!(TransactionStatus, "transaction status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});
text_enum!(Visibility, "visibility choice", { Public => "public", Anonymous => "anonymous" });
text_enum!(ProgramStatus, "program status", {
    Active => "active",
    Completed => "completed",
    Archived => "archived",
});
text_enum!(CertificateType, "certificate type", { EightyG => "80G", TwelveA => "12A" });
text_enum!(PostCategory, "post category", { Blog => "blog", Press => "press" });

impl CertificateType {
    pub const ALL: [CertificateType; 2] = [CertificateType::EightyG, CertificateType::TwelveA];
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub description: String,
    pub target_amount: i64,
    pub funds_received: i64,
    pub funds_utilized: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProgramStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// Percentage of received funds already spent; 0 when nothing was received.
    pub fn utilization_rate(&self) -> f64 {
        utilization_rate(self.funds_received, self.funds_utilized)
    }
}

pub fn utilization_rate(funds_received: i64, funds_utilized: i64) -> f64 {
    if funds_received <= 0 {
        return 0.0;
    }
    funds_utilized as f64 / funds_received as f64 * 100.0
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub user_id: String,
    pub program_id: String,
    pub amount: i64,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub status: TransactionStatus,
    pub visibility: Visibility,
    pub public_name: Option<String>,
    pub donor_alias: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Name shown on the public donor wall.
    pub fn display_name(&self) -> &str {
        let name = match self.visibility {
            Visibility::Public => self.public_name.as_deref(),
            Visibility::Anonymous => self.donor_alias.as_deref(),
        };
        name.unwrap_or("Anonymous")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub donation_id: String,
    pub certificate_type: CertificateType,
    #[serde(rename = "certificateURL")]
    pub certificate_url: String,
    pub issued_date: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub id: String,
    pub program_id: String,
    pub funds_received: i64,
    pub funds_utilized: i64,
    #[serde(rename = "reportFileURL")]
    pub report_file_url: String,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author: String,
    pub category: PostCategory,
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn donation(visibility: Visibility, public_name: Option<&str>, alias: Option<&str>) -> Donation {
        let now = Utc::now();
        Donation {
            id: "d1".into(),
            user_id: "u1".into(),
            program_id: "p1".into(),
            amount: 100,
            order_id: "order_1".into(),
            payment_id: None,
            status: TransactionStatus::Completed,
            visibility,
            public_name: public_name.map(str::to_string),
            donor_alias: alias.map(str::to_string),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn display_name_follows_visibility() {
        let public = donation(Visibility::Public, Some("A. Donor"), None);
        assert_eq!(public.display_name(), "A. Donor");
        let anonymous = donation(Visibility::Anonymous, None, Some("DONOR-1A2B3C4D"));
        assert_eq!(anonymous.display_name(), "DONOR-1A2B3C4D");
    }

    #[test]
    fn certificate_types_use_statutory_names() {
        assert_eq!(CertificateType::EightyG.as_str(), "80G");
        assert_eq!("12A".parse::<CertificateType>(), Ok(CertificateType::TwelveA));
        assert!("10B".parse::<CertificateType>().is_err());
        assert_eq!(
            serde_json::to_string(&CertificateType::EightyG).expect("serialize"),
            "\"80G\""
        );
    }

    #[test]
    fn utilization_rate_is_zero_without_receipts() {
        assert_eq!(utilization_rate(0, 0), 0.0);
        assert_eq!(utilization_rate(200, 50), 25.0);
    }
}
