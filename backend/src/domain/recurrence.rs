//! Recurrence expansion.
//!
//! Turns one occurrence definition plus an optional [`RepeatConfig`] into the
//! ascending, duplicate-free list of concrete visit dates.
//!
//! ## Rules
//!
//! - No repeat configuration: the initial date only.
//! - Weekly: walk Sunday-based weeks starting with the week that contains the
//!   initial date, `interval` weeks at a time. The first week only yields
//!   weekdays on or after the initial date.
//! - Monthly: the initial date's day of month, `interval` months at a time.
//!   Months that are too short use their last day. Every step is computed
//!   from the initial date so a short month never shifts later occurrences.
//! - Expansion stops at the end date (inclusive) or after the requested
//!   number of occurrences.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::recurrence::{EndCondition, Frequency, OccurrenceDefinition, RepeatConfig};
use crate::domain::models::schedule_event::VisitCandidate;

/// Upper bound on the visits a single request may expand to
pub const MAX_OCCURRENCES: usize = 500;

pub struct RecurrenceExpander;

impl RecurrenceExpander {
    /// Expand a definition into one candidate per date, all sharing the
    /// definition's time and metadata.
    pub fn expand(
        definition: &OccurrenceDefinition,
        repeat: Option<&RepeatConfig>,
    ) -> ScheduleResult<Vec<VisitCandidate>> {
        let dates = Self::expand_dates(definition.event_date, repeat)?;

        Ok(dates
            .into_iter()
            .map(|event_date| VisitCandidate {
                patient_id: definition.patient_id.clone(),
                event_date,
                start_time: definition.start_time,
                end_time: definition.end_time,
                staff_id: definition.staff_id.clone(),
                authorization_id: definition.authorization_id.clone(),
                event_code: definition.event_code.clone(),
                planned_units: definition.planned_units,
                comment: definition.comment.clone(),
            })
            .collect())
    }

    pub fn expand_dates(
        initial: NaiveDate,
        repeat: Option<&RepeatConfig>,
    ) -> ScheduleResult<Vec<NaiveDate>> {
        let repeat = match repeat {
            Some(repeat) => repeat,
            None => return Ok(vec![initial]),
        };

        if let EndCondition::ByDate(end_date) = repeat.end {
            if end_date < initial {
                return Err(ScheduleError::validation(
                    "repeat.end_date",
                    format!("{} is before the first visit on {}", end_date, initial),
                ));
            }
        }

        let mut dates = match &repeat.frequency {
            Frequency::Weekly { days_of_week } => {
                Self::expand_weekly(initial, repeat.interval, days_of_week, repeat.end)?
            }
            Frequency::Monthly => Self::expand_monthly(initial, repeat.interval, repeat.end)?,
        };

        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    fn expand_weekly<'a>(
        initial: NaiveDate,
        interval: u32,
        days_of_week: impl IntoIterator<Item = &'a u8> + Clone,
        end: EndCondition,
    ) -> ScheduleResult<Vec<NaiveDate>> {
        let mut week_start = initial - Duration::days(initial.weekday().num_days_from_sunday() as i64);
        let step = Duration::weeks(interval as i64);
        let mut dates = Vec::new();

        loop {
            for day in days_of_week.clone() {
                let date = week_start + Duration::days(*day as i64);
                if date < initial {
                    continue;
                }
                if Self::past_end(date, &dates, end) {
                    return Ok(dates);
                }
                Self::push_capped(&mut dates, date)?;
            }

            week_start = week_start
                .checked_add_signed(step)
                .ok_or_else(|| ScheduleError::validation("repeat", "date range is out of bounds"))?;
        }
    }

    fn expand_monthly(
        initial: NaiveDate,
        interval: u32,
        end: EndCondition,
    ) -> ScheduleResult<Vec<NaiveDate>> {
        let mut dates = Vec::new();

        for step in 0u32.. {
            let months = step
                .checked_mul(interval)
                .ok_or_else(|| ScheduleError::validation("repeat", "date range is out of bounds"))?;
            let date = initial
                .checked_add_months(Months::new(months))
                .ok_or_else(|| ScheduleError::validation("repeat", "date range is out of bounds"))?;

            if Self::past_end(date, &dates, end) {
                break;
            }
            Self::push_capped(&mut dates, date)?;
        }

        Ok(dates)
    }

    fn past_end(date: NaiveDate, emitted: &[NaiveDate], end: EndCondition) -> bool {
        match end {
            EndCondition::ByDate(end_date) => date > end_date,
            EndCondition::ByCount(count) => emitted.len() >= count as usize,
        }
    }

    fn push_capped(dates: &mut Vec<NaiveDate>, date: NaiveDate) -> ScheduleResult<()> {
        if dates.len() >= MAX_OCCURRENCES {
            return Err(ScheduleError::validation(
                "repeat",
                format!("expands to more than {} visits", MAX_OCCURRENCES),
            ));
        }
        dates.push(date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2025-03-03 is a Monday
    fn monday() -> NaiveDate {
        date(2025, 3, 3)
    }

    #[test]
    fn test_without_repeat_returns_initial_date() {
        let dates = RecurrenceExpander::expand_dates(monday(), None).unwrap();
        assert_eq!(dates, vec![monday()]);
    }

    #[test]
    fn test_weekly_mon_wed_fri_for_two_weeks() {
        let repeat =
            RepeatConfig::weekly(1, [1, 3, 5], EndCondition::ByDate(monday() + Duration::days(13))).unwrap();

        let dates = RecurrenceExpander::expand_dates(monday(), Some(&repeat)).unwrap();

        assert_eq!(
            dates,
            vec![
                date(2025, 3, 3),
                date(2025, 3, 5),
                date(2025, 3, 7),
                date(2025, 3, 10),
                date(2025, 3, 12),
                date(2025, 3, 14),
            ]
        );
    }

    #[test]
    fn test_count_limits_occurrences() {
        let repeat = RepeatConfig::weekly(1, [2], EndCondition::ByCount(4)).unwrap();

        let dates = RecurrenceExpander::expand_dates(monday(), Some(&repeat)).unwrap();

        assert_eq!(dates.len(), 4);
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Tue));
        assert_eq!(dates[0], date(2025, 3, 4));
        assert_eq!(dates[3], date(2025, 3, 25));
    }

    #[test]
    fn test_first_week_skips_days_before_initial_date() {
        // Thursday start; Monday and Wednesday of that week are skipped
        let thursday = date(2025, 3, 6);
        let repeat = RepeatConfig::weekly(1, [1, 3, 5], EndCondition::ByCount(3)).unwrap();

        let dates = RecurrenceExpander::expand_dates(thursday, Some(&repeat)).unwrap();

        assert_eq!(dates, vec![date(2025, 3, 7), date(2025, 3, 10), date(2025, 3, 12)]);
    }

    #[test]
    fn test_every_other_week() {
        let repeat = RepeatConfig::weekly(2, [1], EndCondition::ByDate(date(2025, 4, 1))).unwrap();

        let dates = RecurrenceExpander::expand_dates(monday(), Some(&repeat)).unwrap();

        assert_eq!(dates, vec![date(2025, 3, 3), date(2025, 3, 17), date(2025, 3, 31)]);
    }

    #[test]
    fn test_sunday_belongs_to_the_following_days_week() {
        // Sunday 2025-03-09 starts a new week; with interval 2 the next visit is two weeks on
        let sunday = date(2025, 3, 9);
        let repeat = RepeatConfig::weekly(2, [0, 6], EndCondition::ByCount(4)).unwrap();

        let dates = RecurrenceExpander::expand_dates(sunday, Some(&repeat)).unwrap();

        assert_eq!(
            dates,
            vec![date(2025, 3, 9), date(2025, 3, 15), date(2025, 3, 23), date(2025, 3, 29)]
        );
    }

    #[test]
    fn test_monthly_keeps_day_of_month_and_clamps() {
        let repeat = RepeatConfig::monthly(1, EndCondition::ByCount(4)).unwrap();

        let dates = RecurrenceExpander::expand_dates(date(2025, 1, 31), Some(&repeat)).unwrap();

        assert_eq!(
            dates,
            vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31), date(2025, 4, 30)]
        );
    }

    #[test]
    fn test_monthly_interval_and_end_date() {
        let repeat = RepeatConfig::monthly(3, EndCondition::ByDate(date(2025, 12, 31))).unwrap();

        let dates = RecurrenceExpander::expand_dates(date(2025, 1, 15), Some(&repeat)).unwrap();

        assert_eq!(
            dates,
            vec![date(2025, 1, 15), date(2025, 4, 15), date(2025, 7, 15), date(2025, 10, 15)]
        );
    }

    #[test]
    fn test_end_date_before_initial_rejected() {
        let repeat = RepeatConfig::weekly(1, [1], EndCondition::ByDate(date(2025, 3, 1))).unwrap();

        let result = RecurrenceExpander::expand_dates(monday(), Some(&repeat));

        assert!(matches!(
            result,
            Err(ScheduleError::Validation { ref field, .. }) if field == "repeat.end_date"
        ));
    }

    #[test]
    fn test_expansion_cap() {
        let repeat = RepeatConfig::weekly(1, 0..=6, EndCondition::ByDate(date(2030, 1, 1))).unwrap();

        let result = RecurrenceExpander::expand_dates(monday(), Some(&repeat));

        assert!(result.unwrap_err().to_string().contains("more than 500"));
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let repeat = RepeatConfig::weekly(1, [5, 1, 3], EndCondition::ByCount(10)).unwrap();

        let first = RecurrenceExpander::expand_dates(monday(), Some(&repeat)).unwrap();
        let second = RecurrenceExpander::expand_dates(monday(), Some(&repeat)).unwrap();

        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_expand_copies_definition_metadata() {
        let definition = OccurrenceDefinition {
            patient_id: "patient-1".to_string(),
            event_date: monday(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            staff_id: Some("staff-1".to_string()),
            authorization_id: Some("auth-1".to_string()),
            event_code: Some("PCA".to_string()),
            planned_units: 4,
            comment: None,
        };
        let repeat = RepeatConfig::weekly(1, [1], EndCondition::ByCount(2)).unwrap();

        let candidates = RecurrenceExpander::expand(&definition, Some(&repeat)).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].event_date, date(2025, 3, 10));
        assert!(candidates.iter().all(|c| c.staff_id.as_deref() == Some("staff-1")));
        assert!(candidates.iter().all(|c| c.planned_units == 4));
    }
}
