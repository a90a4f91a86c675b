use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::{Program, ProgramStatus};
use super::{new_id, DbPool, Result};

const PROGRAM_COLUMNS: &str = "id, name, description, target_amount, funds_received, funds_utilized, \
     start_date, end_date, status, created_at, updated_at";

fn map_program(row: &Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        target_amount: row.get("target_amount")?,
        funds_received: row.get("funds_received")?,
        funds_utilized: row.get("funds_utilized")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub struct NewProgram<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub target_amount: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProgramStatus,
}

pub async fn create_program(pool: &DbPool, new: NewProgram<'_>) -> Result<Program> {
    let conn = pool.get()?;
    let now = Utc::now();
    let program = Program {
        id: new_id(),
        name: new.name.to_string(),
        description: new.description.to_string(),
        target_amount: new.target_amount,
        funds_received: 0,
        funds_utilized: 0,
        start_date: new.start_date,
        end_date: new.end_date,
        status: new.status,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO programs (id, name, description, target_amount, funds_received, funds_utilized,
                               start_date, end_date, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?6, ?7, ?8, ?9)",
        params![
            program.id,
            program.name,
            program.description,
            program.target_amount,
            program.start_date,
            program.end_date,
            program.status,
            program.created_at,
            program.updated_at
        ],
    )?;
    Ok(program)
}

pub async fn find_program(pool: &DbPool, id: &str) -> Result<Option<Program>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM programs WHERE id = ?1", PROGRAM_COLUMNS);
    let program = conn.query_row(&sql, params![id], map_program).optional()?;
    Ok(program)
}

pub async fn list_programs(pool: &DbPool, status: Option<ProgramStatus>) -> Result<Vec<Program>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {} FROM programs WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC",
        PROGRAM_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let programs = stmt
        .query_map(params![status], map_program)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(programs)
}

/// Writes the descriptive fields of `program`. The ledger columns are never
/// touched here.
pub async fn update_program_details(pool: &DbPool, program: &Program) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE programs
         SET name = ?2, description = ?3, target_amount = ?4, start_date = ?5, end_date = ?6,
             status = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            program.id,
            program.name,
            program.description,
            program.target_amount,
            program.start_date,
            program.end_date,
            program.status,
            Utc::now()
        ],
    )?;
    Ok(changed == 1)
}

pub async fn set_status(pool: &DbPool, id: &str, status: ProgramStatus) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE programs SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, Utc::now()],
    )?;
    Ok(changed == 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundsUpdate {
    Updated { funds_utilized: i64, funds_received: i64 },
    ExceedsReceived { funds_received: i64 },
    NotFound,
}

/// Sets (not increments) the utilized total. The comparison against
/// `funds_received` happens in the same statement so a concurrent credit can
/// never be observed half-way.
pub async fn set_funds_utilized(pool: &DbPool, id: &str, amount: i64) -> Result<FundsUpdate> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE programs SET funds_utilized = ?2, updated_at = ?3
         WHERE id = ?1 AND ?2 <= funds_received",
        params![id, amount, Utc::now()],
    )?;

    let funds_received: Option<i64> = conn
        .query_row(
            "SELECT funds_received FROM programs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match (changed, funds_received) {
        (_, None) => FundsUpdate::NotFound,
        (1, Some(funds_received)) => FundsUpdate::Updated {
            funds_utilized: amount,
            funds_received,
        },
        (_, Some(funds_received)) => FundsUpdate::ExceedsReceived { funds_received },
    })
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStats {
    pub total_programs: i64,
    pub active_programs: i64,
    pub total_funds_received: i64,
    pub total_funds_utilized: i64,
}

pub async fn program_stats(pool: &DbPool) -> Result<ProgramStats> {
    let conn = pool.get()?;
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(funds_received), 0),
                COALESCE(SUM(funds_utilized), 0)
         FROM programs",
        [],
        |row| {
            Ok(ProgramStats {
                total_programs: row.get(0)?,
                active_programs: row.get(1)?,
                total_funds_received: row.get(2)?,
                total_funds_utilized: row.get(3)?,
            })
        },
    )?;
    Ok(stats)
}
