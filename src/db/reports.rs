use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::models::{utilization_rate, ImpactReport};
use super::{new_id, DbPool, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWithProgram {
    #[serde(flatten)]
    pub report: ImpactReport,
    pub program_name: Option<String>,
    pub utilization_rate: f64,
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<ReportWithProgram> {
    let report = ImpactReport {
        id: row.get("id")?,
        program_id: row.get("program_id")?,
        funds_received: row.get("funds_received")?,
        funds_utilized: row.get("funds_utilized")?,
        report_file_url: row.get("report_file_url")?,
        last_updated: row.get("last_updated")?,
        created_at: row.get("created_at")?,
    };
    let rate = utilization_rate(report.funds_received, report.funds_utilized);
    Ok(ReportWithProgram {
        report,
        program_name: row.get("program_name")?,
        utilization_rate: (rate * 100.0).round() / 100.0,
    })
}

const REPORT_SELECT: &str = "SELECT r.id AS id, r.program_id AS program_id, r.funds_received AS funds_received,
            r.funds_utilized AS funds_utilized, r.report_file_url AS report_file_url,
            r.last_updated AS last_updated, r.created_at AS created_at, p.name AS program_name
     FROM impact_reports r LEFT JOIN programs p ON p.id = r.program_id";

pub async fn create_report(
    pool: &DbPool,
    program_id: &str,
    report_file_url: &str,
    funds_received: i64,
    funds_utilized: i64,
) -> Result<ImpactReport> {
    let conn = pool.get()?;
    let now = Utc::now();
    let report = ImpactReport {
        id: new_id(),
        program_id: program_id.to_string(),
        funds_received,
        funds_utilized,
        report_file_url: report_file_url.to_string(),
        last_updated: now,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO impact_reports (id, program_id, funds_received, funds_utilized, report_file_url,
                                     last_updated, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.id,
            report.program_id,
            report.funds_received,
            report.funds_utilized,
            report.report_file_url,
            report.last_updated,
            report.created_at
        ],
    )?;
    Ok(report)
}

/// All impact reports, newest first.
pub async fn list_reports(pool: &DbPool) -> Result<Vec<ReportWithProgram>> {
    let conn = pool.get()?;
    let sql = format!("{} ORDER BY r.created_at DESC", REPORT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map([], map_report)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reports)
}

pub async fn latest_for_program(pool: &DbPool, program_id: &str) -> Result<Option<ReportWithProgram>> {
    let conn = pool.get()?;
    let sql = format!(
        "{} WHERE r.program_id = ?1 ORDER BY r.created_at DESC LIMIT 1",
        REPORT_SELECT
    );
    let report = conn.query_row(&sql, params![program_id], map_report).optional()?;
    Ok(report)
}
