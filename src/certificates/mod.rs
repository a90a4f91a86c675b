use chrono::{DateTime, Utc};
use opendal::services::{Fs, Memory};
use opendal::{ErrorKind, Operator};
use std::path::Path;

use crate::config::FoundationInfo;
use crate::db::models::{Certificate, CertificateType, Donation};
use crate::db::{self, DbError, DbPool};

mod render;

pub use render::{render_certificate, CertificateContent};

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("certificate storage failed: {0}")]
    Storage(#[from] opendal::Error),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{0}")]
    MissingData(String),
}

/// Where rendered certificate PDFs live; filenames are flat keys.
#[derive(Clone)]
pub struct CertificateStore {
    op: Operator,
}

impl CertificateStore {
    pub fn filesystem(dir: &Path) -> Result<Self, CertificateError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CertificateError::MissingData(format!("cannot create {}: {}", dir.display(), e)))?;
        let op = Operator::new(Fs::default().root(&dir.to_string_lossy()))?.finish();
        Ok(Self { op })
    }

    pub fn memory() -> Result<Self, CertificateError> {
        let op = Operator::new(Memory::default())?.finish();
        Ok(Self { op })
    }

    pub async fn write(&self, filename: &str, bytes: Vec<u8>) -> Result<(), CertificateError> {
        self.op.write(filename, bytes).await?;
        Ok(())
    }

    /// `Ok(None)` when no such file exists.
    pub async fn read(&self, filename: &str) -> Result<Option<Vec<u8>>, CertificateError> {
        match self.op.read(filename).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Renders, stores and records every certificate type the donation is
    /// still missing. Already-issued types are left untouched.
    pub async fn issue_for_donation(
        &self,
        pool: &DbPool,
        donation: &Donation,
        foundation: &FoundationInfo,
    ) -> Result<Vec<Certificate>, CertificateError> {
        let donor = db::users::find_user(pool, &donation.user_id)
            .await?
            .ok_or_else(|| CertificateError::MissingData(format!("donor {} not found", donation.user_id)))?;
        let program = db::programs::find_program(pool, &donation.program_id)
            .await?
            .ok_or_else(|| {
                CertificateError::MissingData(format!("program {} not found", donation.program_id))
            })?;

        let existing = db::certificates::list_for_donation(pool, &donation.id).await?;
        let mut issued = Vec::new();

        for certificate_type in CertificateType::ALL {
            if existing.iter().any(|c| c.certificate_type == certificate_type) {
                continue;
            }

            let now = Utc::now();
            let content = CertificateContent {
                certificate_type,
                donor_name: &donor.name,
                amount: donation.amount,
                program_name: &program.name,
                donation_id: &donation.id,
                payment_id: donation.payment_id.as_deref(),
                donation_date: donation.created_at,
                issued_at: now,
            };
            let bytes = render_certificate(&content, foundation)?;
            let filename = certificate_filename(certificate_type, &donation.id, now);
            self.write(&filename, bytes).await?;

            let url = format!("/certificates/{}", filename);
            match db::certificates::insert_certificate(pool, &donation.id, certificate_type, &url).await {
                Ok(certificate) => {
                    tracing::info!(
                        donation_id = %donation.id,
                        certificate_type = %certificate_type,
                        "Certificate issued"
                    );
                    issued.push(certificate);
                }
                // Another worker recorded this type first; the stored file is simply unused.
                Err(e) if e.is_unique_violation() => {
                    tracing::warn!(
                        donation_id = %donation.id,
                        certificate_type = %certificate_type,
                        "Certificate already recorded"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(issued)
    }
}

pub fn certificate_filename(certificate_type: CertificateType, donation_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}.pdf", certificate_type, donation_id, at.timestamp_millis())
}

/// Download names are single path segments ending in `.pdf`.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && name.ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filenames_embed_type_donation_and_time() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).single().expect("timestamp");
        assert_eq!(
            certificate_filename(CertificateType::EightyG, "d1", at),
            "80G_d1_1700000000123.pdf"
        );
        assert_eq!(
            certificate_filename(CertificateType::TwelveA, "d1", at),
            "12A_d1_1700000000123.pdf"
        );
    }

    #[test]
    fn rejects_traversal() {
        assert!(is_safe_filename("80G_d1_1.pdf"));
        assert!(!is_safe_filename("../secret.pdf"));
        assert!(!is_safe_filename("a/b.pdf"));
        assert!(!is_safe_filename("notes.txt"));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = CertificateStore::memory().expect("memory store");
        assert_eq!(store.read("missing.pdf").await.expect("read"), None);
        store.write("a.pdf", b"%PDF-1.5".to_vec()).await.expect("write");
        assert_eq!(
            store.read("a.pdf").await.expect("read").as_deref(),
            Some(&b"%PDF-1.5"[..])
        );
    }
}
