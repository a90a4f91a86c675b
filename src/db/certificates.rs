use chrono::Utc;
use rusqlite::{params, Row};

use super::models::{Certificate, CertificateType};
use super::{new_id, DbPool, Result};

fn map_certificate(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: row.get("id")?,
        donation_id: row.get("donation_id")?,
        certificate_type: row.get("certificate_type")?,
        certificate_url: row.get("certificate_url")?,
        issued_date: row.get("issued_date")?,
    })
}

/// Records an issued certificate. A second record of the same type for the
/// same donation violates `UNIQUE(donation_id, certificate_type)`.
pub async fn insert_certificate(
    pool: &DbPool,
    donation_id: &str,
    certificate_type: CertificateType,
    certificate_url: &str,
) -> Result<Certificate> {
    let conn = pool.get()?;
    let certificate = Certificate {
        id: new_id(),
        donation_id: donation_id.to_string(),
        certificate_type,
        certificate_url: certificate_url.to_string(),
        issued_date: Utc::now(),
    };
    conn.execute(
        "INSERT INTO certificates (id, donation_id, certificate_type, certificate_url, issued_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            certificate.id,
            certificate.donation_id,
            certificate.certificate_type,
            certificate.certificate_url,
            certificate.issued_date
        ],
    )?;
    Ok(certificate)
}

pub async fn list_for_donation(pool: &DbPool, donation_id: &str) -> Result<Vec<Certificate>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, donation_id, certificate_type, certificate_url, issued_date
         FROM certificates WHERE donation_id = ?1 ORDER BY certificate_type",
    )?;
    let rows = stmt
        .query_map(params![donation_id], map_certificate)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
