use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Interval runs may start this much earlier than the nominal N days so that
/// sub-day timer drift never pushes a run a whole day late.
pub const INTERVAL_DRIFT_TOLERANCE_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Weekly,
    Interval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    /// 0 = Sunday.
    pub day_of_week: u32,
    pub hour: u32,
    pub interval_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            schedule_type: ScheduleType::Weekly,
            day_of_week: 0,
            hour: 9,
            interval_days: 7,
        }
    }
}

/// Body of a configuration change; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    #[serde(rename = "type")]
    pub schedule_type: Option<String>,
    pub day_of_week: Option<i64>,
    pub hour: Option<i64>,
    /// Accepted but ignored: runs always start on the hour.
    pub minute: Option<i64>,
    pub interval_days: Option<i64>,
}

impl ScheduleConfig {
    /// Validates every supplied field and returns the merged configuration,
    /// or every problem found. `self` is never modified.
    pub fn merged_with(&self, update: &ScheduleUpdate) -> Result<ScheduleConfig, Vec<FieldError>> {
        let mut next = self.clone();
        let mut errors = Vec::new();

        if let Some(raw) = update.schedule_type.as_deref() {
            match raw {
                "weekly" => next.schedule_type = ScheduleType::Weekly,
                "interval" => next.schedule_type = ScheduleType::Interval,
                _ => errors.push(FieldError::new(
                    "type",
                    "Invalid schedule type. Must be \"weekly\" or \"interval\"",
                )),
            }
        }
        if let Some(day) = update.day_of_week {
            match u32::try_from(day) {
                Ok(day) if day <= 6 => next.day_of_week = day,
                _ => errors.push(FieldError::new("dayOfWeek", "dayOfWeek must be 0-6 (0=Sunday)")),
            }
        }
        if let Some(hour) = update.hour {
            match u32::try_from(hour) {
                Ok(hour) if hour <= 23 => next.hour = hour,
                _ => errors.push(FieldError::new("hour", "hour must be 0-23")),
            }
        }
        if let Some(days) = update.interval_days {
            match u32::try_from(days) {
                Ok(days) if (1..=365).contains(&days) => next.interval_days = days,
                _ => errors.push(FieldError::new("intervalDays", "intervalDays must be 1-365")),
            }
        }

        if errors.is_empty() {
            Ok(next)
        } else {
            Err(errors)
        }
    }

    pub fn describe(&self) -> String {
        let time = format!("{:02}:00", self.hour);
        match self.schedule_type {
            ScheduleType::Weekly => {
                let day = DAY_NAMES
                    .get(self.day_of_week as usize)
                    .copied()
                    .unwrap_or("Sunday");
                format!("Every {} at {}", day, time)
            }
            ScheduleType::Interval => format!("Every {} day(s) at {}", self.interval_days, time),
        }
    }

    fn slot_on(&self, date: NaiveDate) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        date.and_time(time)
    }

    /// Earliest daily slot strictly after `now`.
    fn next_daily_slot(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = self.slot_on(now.date());
        if today > now {
            today
        } else {
            self.slot_on(now.date() + Duration::days(1))
        }
    }

    /// When the job should next fire, in the scheduler's local wall-clock time.
    ///
    /// Weekly: the configured weekday and hour, this week if still ahead,
    /// otherwise next week. Interval: `interval_days` after the last interval
    /// run at the configured hour, or tomorrow at that hour before any run. An
    /// interval slot already in the past collapses to the next daily slot.
    pub fn next_run(&self, last_interval_run: Option<NaiveDateTime>, now: NaiveDateTime) -> NaiveDateTime {
        match self.schedule_type {
            ScheduleType::Weekly => {
                let today = now.weekday().num_days_from_sunday();
                let ahead = (self.day_of_week + 7 - today) % 7;
                let candidate = self.slot_on(now.date() + Duration::days(ahead as i64));
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            ScheduleType::Interval => {
                let candidate = match last_interval_run {
                    Some(last) => self.slot_on(last.date() + Duration::days(self.interval_days as i64)),
                    None => self.slot_on(now.date() + Duration::days(1)),
                };
                if candidate > now {
                    candidate
                } else {
                    self.next_daily_slot(now)
                }
            }
        }
    }

    /// Whether a timer wake-up at `now` should run the job.
    pub fn is_due(&self, last_interval_run: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
        match self.schedule_type {
            ScheduleType::Weekly => now.weekday().num_days_from_sunday() == self.day_of_week,
            ScheduleType::Interval => match last_interval_run {
                None => true,
                Some(last) => {
                    now - last >= Duration::days(self.interval_days as i64) - Duration::hours(INTERVAL_DRIFT_TOLERANCE_HOURS)
                }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionEntry<T: Serialize> {
    pub value: T,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOptions {
    pub types: Vec<OptionEntry<&'static str>>,
    pub days: Vec<OptionEntry<u32>>,
    pub hours: Vec<OptionEntry<u32>>,
}

pub fn schedule_options() -> ScheduleOptions {
    ScheduleOptions {
        types: vec![
            OptionEntry {
                value: "weekly",
                label: "Weekly (specific day)".to_string(),
            },
            OptionEntry {
                value: "interval",
                label: "Interval (every N days)".to_string(),
            },
        ],
        days: DAY_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| OptionEntry {
                value: i as u32,
                label: name.to_string(),
            })
            .collect(),
        hours: (0..24)
            .map(|h| OptionEntry {
                value: h,
                label: format!("{:02}:00", h),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    fn update(f: impl FnOnce(&mut ScheduleUpdate)) -> ScheduleUpdate {
        let mut u = ScheduleUpdate::default();
        f(&mut u);
        u
    }

    #[test]
    fn defaults_to_sunday_morning() {
        let config = ScheduleConfig::default();
        assert_eq!(config.describe(), "Every Sunday at 09:00");
        assert_eq!(config.interval_days, 7);
    }

    #[test]
    fn boundary_values_are_accepted() {
        let base = ScheduleConfig::default();
        for hour in [0, 23] {
            assert_eq!(base.merged_with(&update(|u| u.hour = Some(hour))).expect("hour").hour, hour as u32);
        }
        for day in [0, 6] {
            let merged = base.merged_with(&update(|u| u.day_of_week = Some(day))).expect("day");
            assert_eq!(merged.day_of_week, day as u32);
        }
        for days in [1, 365] {
            let merged = base.merged_with(&update(|u| u.interval_days = Some(days))).expect("interval");
            assert_eq!(merged.interval_days, days as u32);
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = ScheduleConfig::default();
        let cases = [
            update(|u| u.hour = Some(24)),
            update(|u| u.hour = Some(-1)),
            update(|u| u.day_of_week = Some(7)),
            update(|u| u.interval_days = Some(0)),
            update(|u| u.interval_days = Some(366)),
            update(|u| u.schedule_type = Some("monthly".into())),
        ];
        for case in cases {
            assert!(base.merged_with(&case).is_err(), "{:?} should be rejected", case);
        }
    }

    #[test]
    fn one_bad_field_rejects_the_whole_update() {
        let base = ScheduleConfig::default();
        let errors = base
            .merged_with(&update(|u| {
                u.schedule_type = Some("interval".into());
                u.hour = Some(24);
                u.interval_days = Some(0);
            }))
            .expect_err("invalid");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["hour", "intervalDays"]);
        assert_eq!(base, ScheduleConfig::default());
    }

    #[test]
    fn minute_is_ignored() {
        let base = ScheduleConfig::default();
        let merged = base.merged_with(&update(|u| u.minute = Some(45))).expect("minute");
        assert_eq!(merged, base);
    }

    #[test]
    fn interval_description() {
        let config = ScheduleConfig {
            schedule_type: ScheduleType::Interval,
            interval_days: 3,
            hour: 7,
            ..ScheduleConfig::default()
        };
        assert_eq!(config.describe(), "Every 3 day(s) at 07:00");
    }

    #[test]
    fn weekly_next_run_rolls_forward() {
        // 2024-06-05 is a Wednesday.
        let config = ScheduleConfig {
            day_of_week: 3,
            hour: 9,
            ..ScheduleConfig::default()
        };
        assert_eq!(config.next_run(None, at(2024, 6, 5, 8, 0)), at(2024, 6, 5, 9, 0));
        assert_eq!(config.next_run(None, at(2024, 6, 5, 9, 0)), at(2024, 6, 12, 9, 0));
        assert_eq!(config.next_run(None, at(2024, 6, 6, 12, 0)), at(2024, 6, 12, 9, 0));

        let sunday = ScheduleConfig::default();
        assert_eq!(sunday.next_run(None, at(2024, 6, 5, 8, 0)), at(2024, 6, 9, 9, 0));
    }

    #[test]
    fn interval_next_run() {
        let config = ScheduleConfig {
            schedule_type: ScheduleType::Interval,
            interval_days: 3,
            hour: 9,
            ..ScheduleConfig::default()
        };
        assert_eq!(config.next_run(None, at(2024, 6, 5, 8, 0)), at(2024, 6, 6, 9, 0));
        assert_eq!(
            config.next_run(Some(at(2024, 6, 5, 9, 0)), at(2024, 6, 5, 9, 1)),
            at(2024, 6, 8, 9, 0)
        );
        // Overdue slots collapse to the next daily slot.
        assert_eq!(
            config.next_run(Some(at(2024, 6, 1, 9, 0)), at(2024, 6, 10, 10, 0)),
            at(2024, 6, 11, 9, 0)
        );
    }

    #[test]
    fn interval_gate_tolerates_drift() {
        let config = ScheduleConfig {
            schedule_type: ScheduleType::Interval,
            interval_days: 2,
            ..ScheduleConfig::default()
        };
        let last = at(2024, 6, 5, 9, 0);
        assert!(config.is_due(None, at(2024, 6, 5, 9, 0)));
        assert!(!config.is_due(Some(last), at(2024, 6, 6, 9, 0)));
        assert!(config.is_due(Some(last), at(2024, 6, 7, 8, 59)));
        assert!(config.is_due(Some(last), at(2024, 6, 7, 9, 0)));
    }

    #[test]
    fn weekly_gate_checks_the_weekday() {
        let config = ScheduleConfig::default();
        assert!(config.is_due(None, at(2024, 6, 9, 9, 0)));
        assert!(!config.is_due(None, at(2024, 6, 10, 9, 0)));
    }

    #[test]
    fn options_cover_every_hour_and_day() {
        let options = schedule_options();
        assert_eq!(options.days.len(), 7);
        assert_eq!(options.hours.len(), 24);
        assert_eq!(options.hours[0].label, "00:00");
        assert_eq!(options.types[1].value, "interval");
    }
}
