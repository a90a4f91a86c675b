use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use super::models::{Donation, TransactionStatus, User, Visibility};
use super::{new_id, DbPool, Result};

const DONATION_COLUMNS: &str = "d.id AS id, d.user_id AS user_id, d.program_id AS program_id, \
     d.amount AS amount, d.order_id AS order_id, d.payment_id AS payment_id, d.status AS status, \
     d.visibility AS visibility, d.public_name AS public_name, d.donor_alias AS donor_alias, \
     d.failure_reason AS failure_reason, d.created_at AS created_at, d.updated_at AS updated_at";

fn map_donation(row: &Row<'_>) -> rusqlite::Result<Donation> {
    Ok(Donation {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        program_id: row.get("program_id")?,
        amount: row.get("amount")?,
        order_id: row.get("order_id")?,
        payment_id: row.get("payment_id")?,
        status: row.get("status")?,
        visibility: row.get("visibility")?,
        public_name: row.get("public_name")?,
        donor_alias: row.get("donor_alias")?,
        failure_reason: row.get("failure_reason")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct NewDonation<'a> {
    pub user_id: &'a str,
    pub program_id: &'a str,
    pub amount: i64,
    pub order_id: &'a str,
    pub visibility: Visibility,
    pub public_name: Option<&'a str>,
    pub donor_alias: Option<&'a str>,
}

/// Inserts a `pending` donation for a freshly created gateway order.
pub async fn create_pending(pool: &DbPool, new: NewDonation<'_>) -> Result<Donation> {
    let conn = pool.get()?;
    let now = Utc::now();
    let donation = Donation {
        id: new_id(),
        user_id: new.user_id.to_string(),
        program_id: new.program_id.to_string(),
        amount: new.amount,
        order_id: new.order_id.to_string(),
        payment_id: None,
        status: TransactionStatus::Pending,
        visibility: new.visibility,
        public_name: new.public_name.map(str::to_string),
        donor_alias: new.donor_alias.map(str::to_string),
        failure_reason: None,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO donations (id, user_id, program_id, amount, order_id, payment_id, status,
                                visibility, public_name, donor_alias, failure_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9, NULL, ?10, ?11)",
        params![
            donation.id,
            donation.user_id,
            donation.program_id,
            donation.amount,
            donation.order_id,
            donation.status,
            donation.visibility,
            donation.public_name,
            donation.donor_alias,
            donation.created_at,
            donation.updated_at
        ],
    )?;
    Ok(donation)
}

pub async fn find_donation(pool: &DbPool, id: &str) -> Result<Option<Donation>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM donations d WHERE d.id = ?1", DONATION_COLUMNS);
    let donation = conn.query_row(&sql, params![id], map_donation).optional()?;
    Ok(donation)
}

pub async fn find_by_order_id(pool: &DbPool, order_id: &str) -> Result<Option<Donation>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM donations d WHERE d.order_id = ?1", DONATION_COLUMNS);
    let donation = conn.query_row(&sql, params![order_id], map_donation).optional()?;
    Ok(donation)
}

/// Result of finalizing a donation after a verified gateway callback.
#[derive(Debug, Clone)]
pub enum Completion {
    Missing,
    AlreadyCompleted(Donation),
    Failed(Donation),
    Completed {
        donation: Donation,
        program_credited: bool,
    },
}

/// Moves a pending donation to `completed` and credits its program, in one
/// write transaction. Only the caller that wins the `status = 'pending'` guard
/// touches the ledger.
pub async fn complete_donation(pool: &DbPool, order_id: &str, payment_id: &str) -> Result<Completion> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let sql = format!("SELECT {} FROM donations d WHERE d.order_id = ?1", DONATION_COLUMNS);
    let donation = match tx.query_row(&sql, params![order_id], map_donation).optional()? {
        Some(d) => d,
        None => return Ok(Completion::Missing),
    };

    match donation.status {
        TransactionStatus::Completed => return Ok(Completion::AlreadyCompleted(donation)),
        TransactionStatus::Failed => return Ok(Completion::Failed(donation)),
        TransactionStatus::Pending => {}
    }

    let now = Utc::now();
    let changed = tx.execute(
        "UPDATE donations SET status = 'completed', payment_id = ?2, updated_at = ?3
         WHERE id = ?1 AND status = 'pending'",
        params![donation.id, payment_id, now],
    )?;
    if changed == 0 {
        tx.commit()?;
        return Ok(Completion::AlreadyCompleted(donation));
    }

    let credited = tx.execute(
        "UPDATE programs SET funds_received = funds_received + ?2, updated_at = ?3 WHERE id = ?1",
        params![donation.program_id, donation.amount, now],
    )?;
    tx.commit()?;

    let donation = Donation {
        status: TransactionStatus::Completed,
        payment_id: Some(payment_id.to_string()),
        updated_at: now,
        ..donation
    };
    Ok(Completion::Completed {
        donation,
        program_credited: credited == 1,
    })
}

#[derive(Debug, Clone)]
pub enum FailureOutcome {
    Missing,
    Failed(Donation),
    AlreadyCompleted(Donation),
}

/// Records a gateway-side payment failure. Completed donations are left alone.
pub async fn mark_failed(pool: &DbPool, order_id: &str, reason: Option<&str>) -> Result<FailureOutcome> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let sql = format!("SELECT {} FROM donations d WHERE d.order_id = ?1", DONATION_COLUMNS);
    let donation = match tx.query_row(&sql, params![order_id], map_donation).optional()? {
        Some(d) => d,
        None => return Ok(FailureOutcome::Missing),
    };

    let outcome = match donation.status {
        TransactionStatus::Completed => FailureOutcome::AlreadyCompleted(donation),
        TransactionStatus::Failed => FailureOutcome::Failed(donation),
        TransactionStatus::Pending => {
            let now = Utc::now();
            tx.execute(
                "UPDATE donations SET status = 'failed', failure_reason = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![donation.id, reason, now],
            )?;
            FailureOutcome::Failed(Donation {
                status: TransactionStatus::Failed,
                failure_reason: reason.map(str::to_string),
                updated_at: now,
                ..donation
            })
        }
    };
    tx.commit()?;
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationWithProgram {
    #[serde(flatten)]
    pub donation: Donation,
    pub program_name: Option<String>,
    pub program_description: Option<String>,
}

fn map_with_program(row: &Row<'_>) -> rusqlite::Result<DonationWithProgram> {
    Ok(DonationWithProgram {
        donation: map_donation(row)?,
        program_name: row.get("program_name")?,
        program_description: row.get("program_description")?,
    })
}

pub async fn list_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<DonationWithProgram>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {}, p.name AS program_name, p.description AS program_description
         FROM donations d LEFT JOIN programs p ON p.id = d.program_id
         WHERE d.user_id = ?1
         ORDER BY d.created_at DESC",
        DONATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id], map_with_program)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Most recent completed donations, newest first.
pub async fn recent_completed(pool: &DbPool, limit: u32) -> Result<Vec<DonationWithProgram>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {}, p.name AS program_name, p.description AS program_description
         FROM donations d LEFT JOIN programs p ON p.id = d.program_id
         WHERE d.status = 'completed'
         ORDER BY d.created_at DESC
         LIMIT ?1",
        DONATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![limit], map_with_program)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    pub program_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDonationRow {
    #[serde(flatten)]
    pub donation: Donation,
    pub program_name: Option<String>,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
}

pub async fn list_filtered(pool: &DbPool, filter: &DonationFilter) -> Result<Vec<AdminDonationRow>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {}, p.name AS program_name, u.name AS donor_name, u.email AS donor_email
         FROM donations d
         LEFT JOIN programs p ON p.id = d.program_id
         LEFT JOIN users u ON u.id = d.user_id
         WHERE (?1 IS NULL OR d.program_id = ?1)
           AND (?2 IS NULL OR d.status = ?2)
           AND (?3 IS NULL OR d.created_at >= ?3)
           AND (?4 IS NULL OR d.created_at <= ?4)
         ORDER BY d.created_at DESC",
        DONATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![filter.program_id, filter.status, filter.start_date, filter.end_date],
            |row| {
                Ok(AdminDonationRow {
                    donation: map_donation(row)?,
                    program_name: row.get("program_name")?,
                    donor_name: row.get("donor_name")?,
                    donor_email: row.get("donor_email")?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Completed donations whose program is one of `program_ids`.
pub async fn completed_for_programs(pool: &DbPool, program_ids: &[String]) -> Result<Vec<Donation>> {
    if program_ids.is_empty() {
        return Ok(Vec::new());
    }
    let conn = pool.get()?;
    let placeholders = vec!["?"; program_ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM donations d
         WHERE d.status = 'completed' AND d.program_id IN ({})
         ORDER BY d.created_at ASC",
        DONATION_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(program_ids.iter()), map_donation)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationTotals {
    pub count: i64,
    pub amount: i64,
}

/// Count and sum of completed donations, optionally for a single donor.
pub async fn completed_totals(pool: &DbPool, user_id: Option<&str>) -> Result<DonationTotals> {
    let conn = pool.get()?;
    let totals = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM donations
         WHERE status = 'completed' AND (?1 IS NULL OR user_id = ?1)",
        params![user_id],
        |row| {
            Ok(DonationTotals {
                count: row.get(0)?,
                amount: row.get(1)?,
            })
        },
    )?;
    Ok(totals)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorSummary {
    #[serde(flatten)]
    pub user: User,
    pub donation_count: i64,
    pub total_donated: i64,
}

pub async fn donor_summaries(pool: &DbPool) -> Result<Vec<DonorSummary>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT u.id AS id, u.name AS name, u.email AS email, u.phone AS phone,
                u.password_hash AS password_hash, u.role AS role,
                u.created_at AS created_at, u.updated_at AS updated_at,
                COUNT(d.id) AS donation_count, COALESCE(SUM(d.amount), 0) AS total_donated
         FROM users u
         LEFT JOIN donations d ON d.user_id = u.id AND d.status = 'completed'
         WHERE u.role = 'donor'
         GROUP BY u.id
         ORDER BY u.created_at DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DonorSummary {
                user: User {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    email: row.get("email")?,
                    phone: row.get("phone")?,
                    password_hash: row.get("password_hash")?,
                    role: row.get("role")?,
                    created_at: row.get("created_at")?,
                    updated_at: row.get("updated_at")?,
                },
                donation_count: row.get("donation_count")?,
                total_donated: row.get("total_donated")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
