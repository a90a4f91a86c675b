use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::services::progress_report::{JobReport, RunOutcome};

pub mod schedule;

pub use schedule::{schedule_options, ScheduleConfig, ScheduleOptions, ScheduleType, ScheduleUpdate};

/// The batch the scheduler fires.
#[async_trait]
pub trait ReportJob: Send + Sync {
    async fn run(&self) -> JobReport;
}

#[derive(Debug, Clone)]
struct SchedulerState {
    config: ScheduleConfig,
    enabled: bool,
    last_run_time: Option<DateTime<Utc>>,
    last_run_status: Option<RunOutcome>,
    total_emails_sent: u64,
    /// Local wall-clock time of the last timer-driven run in interval mode.
    last_interval_run: Option<NaiveDateTime>,
}

impl SchedulerState {
    fn new(config: ScheduleConfig) -> Self {
        Self {
            config,
            enabled: true,
            last_run_time: None,
            last_run_status: None,
            total_emails_sent: 0,
            last_interval_run: None,
        }
    }
}

/// Decides whether a timer wake-up at `now` runs the job. Only a tick that
/// runs in interval mode moves the interval anchor.
fn on_tick(state: &mut SchedulerState, now: NaiveDateTime) -> bool {
    if !state.enabled {
        tracing::info!("Scheduler is disabled - skipping run");
        return false;
    }
    if !state.config.is_due(state.last_interval_run, now) {
        tracing::debug!("Interval not yet elapsed - skipping run");
        return false;
    }
    if state.config.schedule_type == ScheduleType::Interval {
        state.last_interval_run = Some(now);
    }
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub schedule: String,
    pub schedule_config: ScheduleConfig,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunOutcome>,
    pub total_emails_sent: u64,
    pub next_run_estimate: Option<DateTime<Utc>>,
    pub timer_active: bool,
}

/// Owns the schedule configuration, the run bookkeeping and the single timer
/// task. Construct once per process and share behind an `Arc`.
pub struct Scheduler {
    job: Arc<dyn ReportJob>,
    state: Arc<Mutex<SchedulerState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn to_utc(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Scheduler {
    pub fn new(job: Arc<dyn ReportJob>) -> Self {
        Self::with_config(job, ScheduleConfig::default())
    }

    pub fn with_config(job: Arc<dyn ReportJob>, config: ScheduleConfig) -> Self {
        Self {
            job,
            state: Arc::new(Mutex::new(SchedulerState::new(config))),
            timer: Mutex::new(None),
        }
    }

    /// Starts the timer. Calling it again replaces the running timer.
    pub fn start(&self) {
        self.rebuild();
        let description = lock(&self.state).config.describe();
        tracing::info!("Progress report scheduler started: {}", description);
    }

    pub fn stop(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            tracing::info!("Progress report scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Replaces the timer task while holding the handle lock, so two timers
    /// never coexist.
    fn rebuild(&self) {
        let mut timer = lock(&self.timer);
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(timer_loop(self.state.clone(), self.job.clone())));
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = lock(&self.state).clone();
        let next = state.config.next_run(state.last_interval_run, local_now());
        SchedulerStatus {
            enabled: state.enabled,
            schedule: state.config.describe(),
            schedule_config: state.config,
            last_run_time: state.last_run_time,
            last_run_status: state.last_run_status,
            total_emails_sent: state.total_emails_sent,
            next_run_estimate: to_utc(next),
            timer_active: self.is_running(),
        }
    }

    pub fn config(&self) -> ScheduleConfig {
        lock(&self.state).config.clone()
    }

    /// Applies a configuration change atomically: any invalid field rejects
    /// the whole update. A running timer is rebuilt; a stopped one stays stopped.
    pub fn update_config(&self, update: &ScheduleUpdate) -> Result<SchedulerStatus, AppError> {
        {
            let mut state = lock(&self.state);
            let next = state.config.merged_with(update).map_err(AppError::invalid_fields)?;
            state.config = next;
        }
        if self.is_running() {
            self.rebuild();
        }
        let status = self.status();
        tracing::info!("Schedule updated: {}", status.schedule);
        Ok(status)
    }

    pub fn enable(&self) -> SchedulerStatus {
        lock(&self.state).enabled = true;
        tracing::info!("Scheduler enabled");
        self.status()
    }

    pub fn disable(&self) -> SchedulerStatus {
        lock(&self.state).enabled = false;
        tracing::info!("Scheduler disabled");
        self.status()
    }

    /// Runs the job now regardless of the enabled flag or interval gating.
    pub async fn trigger(&self) -> JobReport {
        tracing::info!("Admin triggered manual progress report");
        run_and_record(&self.state, self.job.as_ref()).await
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

async fn run_and_record(state: &Mutex<SchedulerState>, job: &dyn ReportJob) -> JobReport {
    let started = Utc::now();
    let report = job.run().await;

    let mut state = lock(state);
    state.last_run_time = Some(started);
    state.last_run_status = Some(report.outcome);
    state.total_emails_sent += report.sent_count;
    report
}

async fn timer_loop(state: Arc<Mutex<SchedulerState>>, job: Arc<dyn ReportJob>) {
    loop {
        let fire_at = {
            let s = lock(&state);
            s.config.next_run(s.last_interval_run, local_now())
        };
        let wait = (fire_at - local_now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let now = local_now();
        if now < fire_at {
            continue;
        }

        let should_run = on_tick(&mut lock(&state), now);

        if should_run {
            let report = run_and_record(&state, job.as_ref()).await;
            tracing::info!(
                sent = report.sent_count,
                failed = report.failed_count,
                "Scheduled progress report finished"
            );
        }
    }
}
