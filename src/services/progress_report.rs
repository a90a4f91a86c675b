use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::FoundationInfo;
use crate::db::models::{Donation, Program, ProgramStatus};
use crate::db::{self, DbPool};
use crate::email::{templates, Mailer};
use crate::scheduler::ReportJob;

/// One program's figures as shown to a single donor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramProgress {
    pub program_id: String,
    pub program_name: String,
    pub description: String,
    pub target_amount: i64,
    pub funds_received: i64,
    pub funds_utilized: i64,
    pub remaining: i64,
    pub progress_percentage: f64,
    pub utilization_rate: f64,
    pub donor_contribution: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProgramStatus,
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl ProgramProgress {
    pub fn new(program: &Program, donor_contribution: i64) -> Self {
        let target = program.target_amount;
        let received = program.funds_received;
        let progress = if target > 0 {
            (received as f64 / target as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            program_id: program.id.clone(),
            program_name: program.name.clone(),
            description: program.description.clone(),
            target_amount: target,
            funds_received: received,
            funds_utilized: program.funds_utilized,
            remaining: (target - received).max(0),
            progress_percentage: one_decimal(progress),
            utilization_rate: one_decimal(program.utilization_rate()),
            donor_contribution,
            start_date: program.start_date,
            end_date: program.end_date,
            status: program.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorResult {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub success: bool,
    pub message: String,
    pub sent_count: u64,
    pub failed_count: u64,
    pub total_donors: usize,
    pub active_programs: usize,
    pub results: Vec<DonorResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub outcome: RunOutcome,
}

impl JobReport {
    pub fn skipped() -> Self {
        Self {
            success: true,
            message: "No active programs".to_string(),
            sent_count: 0,
            failed_count: 0,
            total_donors: 0,
            active_programs: 0,
            results: Vec::new(),
            error: None,
            outcome: RunOutcome::Skipped,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: "Progress report job failed".to_string(),
            error: Some(error.into()),
            outcome: RunOutcome::Error,
            ..Self::skipped()
        }
    }

    pub fn completed(results: Vec<DonorResult>, active_programs: usize) -> Self {
        let sent_count = results.iter().filter(|r| r.status == SendStatus::Sent).count() as u64;
        let failed_count = results.len() as u64 - sent_count;
        Self {
            success: true,
            message: "Progress reports sent".to_string(),
            sent_count,
            failed_count,
            total_donors: results.len(),
            active_programs,
            results,
            error: None,
            outcome: RunOutcome::Completed,
        }
    }
}

/// donor id -> program id -> summed amount. Ordered so batches are reproducible.
pub fn aggregate_contributions(donations: &[Donation]) -> BTreeMap<String, BTreeMap<String, i64>> {
    let mut totals: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for donation in donations {
        *totals
            .entry(donation.user_id.clone())
            .or_default()
            .entry(donation.program_id.clone())
            .or_insert(0) += donation.amount;
    }
    totals
}

pub struct ProgressReportJob {
    db: DbPool,
    mailer: Arc<dyn Mailer>,
    foundation: FoundationInfo,
}

impl ProgressReportJob {
    pub fn new(db: DbPool, mailer: Arc<dyn Mailer>, foundation: FoundationInfo) -> Self {
        Self {
            db,
            mailer,
            foundation,
        }
    }

    async fn report_donor(
        &self,
        user_id: &str,
        contributions: &BTreeMap<String, i64>,
        programs: &HashMap<&str, &Program>,
    ) -> DonorResult {
        let failed = |email: Option<String>, error: String| DonorResult {
            user_id: user_id.to_string(),
            email,
            status: SendStatus::Failed,
            error: Some(error),
        };

        let user = match db::users::find_user(&self.db, user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return failed(None, "Donor not found".to_string()),
            Err(e) => return failed(None, e.to_string()),
        };

        let breakdown: Vec<ProgramProgress> = contributions
            .iter()
            .filter_map(|(program_id, amount)| {
                programs
                    .get(program_id.as_str())
                    .map(|program| ProgramProgress::new(program, *amount))
            })
            .collect();

        let message = templates::progress_report(
            &user.email,
            &user.name,
            &breakdown,
            Utc::now(),
            &self.foundation,
        );
        match self.mailer.send(message).await {
            Ok(()) => {
                tracing::info!(user_id, email = %user.email, "Sent progress report");
                DonorResult {
                    user_id: user_id.to_string(),
                    email: Some(user.email),
                    status: SendStatus::Sent,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(user_id, email = %user.email, "Progress report send failed: {}", e);
                failed(Some(user.email), e.to_string())
            }
        }
    }
}

#[async_trait]
impl ReportJob for ProgressReportJob {
    async fn run(&self) -> JobReport {
        tracing::info!("Running progress report job");

        let programs = match db::programs::list_programs(&self.db, Some(ProgramStatus::Active)).await {
            Ok(programs) => programs,
            Err(e) => {
                tracing::error!("Progress report job could not load programs: {}", e);
                return JobReport::failed(e.to_string());
            }
        };
        if programs.is_empty() {
            tracing::info!("No active programs - skipping reports");
            return JobReport::skipped();
        }

        let program_ids: Vec<String> = programs.iter().map(|p| p.id.clone()).collect();
        let donations = match db::donations::completed_for_programs(&self.db, &program_ids).await {
            Ok(donations) => donations,
            Err(e) => {
                tracing::error!("Progress report job could not load donations: {}", e);
                return JobReport::failed(e.to_string());
            }
        };

        let by_id: HashMap<&str, &Program> = programs.iter().map(|p| (p.id.as_str(), p)).collect();
        let mut results = Vec::new();
        for (user_id, contributions) in aggregate_contributions(&donations) {
            results.push(self.report_donor(&user_id, &contributions, &by_id).await);
        }

        let report = JobReport::completed(results, programs.len());
        tracing::info!(
            sent = report.sent_count,
            failed = report.failed_count,
            "Progress report job completed"
        );
        report
    }
}
