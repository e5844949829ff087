//! Template projection: turns a patient's weekly pattern into dated visits.
//!
//! ## Week cycling
//!
//! Weeks are Sunday-based. The week containing the template's anchor date
//! uses the first template week, the next calendar week the second, and so
//! on, wrapping around after the last. Week indices may have gaps; only
//! their order matters.
//!
//! ## Watermark
//!
//! `generated_through` records the last projected date. A run covers the
//! days after it (or from the anchor on the first run) up to the requested
//! end date, then moves the watermark in the same transaction as the
//! inserts. Runs for one patient are serialized in-process; the version
//! check on the watermark catches writers from other processes.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::commands::template::GenerateFromTemplateResult;
use crate::domain::conflict_detector::ConflictDetector;
use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::schedule_event::{ScheduleEvent, VisitCandidate};
use crate::domain::models::template::{Template, TemplateDetail, TemplateEvent};
use crate::storage::{DbConnection, ScheduleEventRepository, TemplateRepository};

pub const DEFAULT_MAX_PROJECTION_DAYS: i64 = 366;

#[derive(Clone)]
pub struct TemplateProjector {
    db: DbConnection,
    patient_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    max_projection_days: i64,
}

impl TemplateProjector {
    pub fn new(db: DbConnection) -> Self {
        Self {
            db,
            patient_locks: Arc::new(Mutex::new(HashMap::new())),
            max_projection_days: DEFAULT_MAX_PROJECTION_DAYS,
        }
    }

    pub fn with_max_projection_days(mut self, days: i64) -> Self {
        self.max_projection_days = days.max(1);
        self
    }

    /// Project the patient's active template through `end_date`.
    ///
    /// Returns zero without writing when the watermark already covers
    /// `end_date`.
    pub async fn generate_from_template(
        &self,
        patient_id: &str,
        end_date: NaiveDate,
    ) -> ScheduleResult<GenerateFromTemplateResult> {
        info!("Generating visits for patient {} through {}", patient_id, end_date);

        let lock = self.patient_lock(patient_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.generate_locked(patient_id, end_date).await
        };
        self.release_patient_lock(patient_id, lock).await;
        result
    }

    async fn generate_locked(
        &self,
        patient_id: &str,
        end_date: NaiveDate,
    ) -> ScheduleResult<GenerateFromTemplateResult> {
        let detail = {
            let mut conn = self.db.acquire().await?;
            let template = TemplateRepository::find_active_for_patient(&mut conn, patient_id)
                .await?
                .ok_or_else(|| {
                    ScheduleError::not_found("Template", format!("active template of {}", patient_id))
                })?;
            TemplateRepository::load_detail(&mut conn, template).await?
        };

        if detail.weeks.is_empty() {
            return Err(ScheduleError::validation(
                "weeks",
                format!("template {} has no weeks", detail.template.id),
            ));
        }

        let start = detail.template.next_generation_date();
        if end_date < start {
            info!(
                "Template {} already generated through {:?}; nothing to do",
                detail.template.id, detail.template.generated_through
            );
            return Ok(GenerateFromTemplateResult {
                created_count: 0,
                generated_through: detail.template.generated_through,
            });
        }

        let window_days = (end_date - start).num_days() + 1;
        if window_days > self.max_projection_days {
            return Err(ScheduleError::validation(
                "end_date",
                format!(
                    "projecting {} days exceeds the limit of {} days",
                    window_days, self.max_projection_days
                ),
            ));
        }

        let candidates = Self::plan(&detail, start, end_date);
        let created_count = self
            .persist_projection(&detail.template, start, end_date, &candidates)
            .await?;

        info!(
            "Generated {} visits from template {} ({} to {})",
            created_count, detail.template.id, start, end_date
        );
        Ok(GenerateFromTemplateResult {
            created_count,
            generated_through: Some(end_date),
        })
    }

    /// Visits the template yields for every date in `from..=to`, in date
    /// order, then by weekday slot order within a date.
    pub fn plan(detail: &TemplateDetail, from: NaiveDate, to: NaiveDate) -> Vec<VisitCandidate> {
        let mut planned = Vec::new();
        if detail.weeks.is_empty() {
            return planned;
        }

        for date in from.iter_days().take_while(|date| *date <= to) {
            let position = Self::week_position(detail.template.anchor_date, date, detail.weeks.len());
            let weekday = date.weekday().num_days_from_sunday() as u8;
            for event in detail.weeks[position].events_on(weekday) {
                planned.push(Self::candidate(&detail.template, event, date));
            }
        }

        planned
    }

    /// Position in the week cycle: calendar weeks elapsed since the anchor's
    /// week, modulo the number of template weeks
    pub fn week_position(anchor: NaiveDate, date: NaiveDate, week_count: usize) -> usize {
        let elapsed_weeks = (Self::week_start(date) - Self::week_start(anchor)).num_days() / 7;
        elapsed_weeks.rem_euclid(week_count as i64) as usize
    }

    fn week_start(date: NaiveDate) -> NaiveDate {
        date - Duration::days(date.weekday().num_days_from_sunday() as i64)
    }

    fn candidate(template: &Template, event: &TemplateEvent, date: NaiveDate) -> VisitCandidate {
        VisitCandidate {
            patient_id: template.patient_id.clone(),
            event_date: date,
            start_time: event.start_time,
            end_time: event.end_time,
            staff_id: event.staff_id.clone(),
            authorization_id: event.authorization_id.clone(),
            event_code: event.event_code.clone(),
            planned_units: event.planned_units,
            comment: event.comment.clone(),
        }
    }

    /// Insert the planned visits and move the watermark in one transaction.
    /// Fails with a retryable error when the template was advanced since
    /// `template` was read.
    async fn persist_projection(
        &self,
        template: &Template,
        start: NaiveDate,
        end_date: NaiveDate,
        candidates: &[VisitCandidate],
    ) -> ScheduleResult<usize> {
        let mut staff_ids: Vec<String> = candidates.iter().filter_map(|c| c.staff_id.clone()).collect();
        staff_ids.sort();
        staff_ids.dedup();

        let mut tx = self.db.begin_write().await?;
        let committed = ScheduleEventRepository::list_overlap_candidates(
            tx.conn(),
            start,
            end_date,
            &template.patient_id,
            &staff_ids,
        )
        .await?;

        let overlapping = candidates
            .iter()
            .filter(|candidate| !ConflictDetector::detect(*candidate, &committed).is_empty())
            .count();
        if overlapping > 0 {
            // Projected visits are kept; the office resolves overlaps afterwards
            warn!(
                "{} projected visits for patient {} overlap existing visits",
                overlapping, template.patient_id
            );
        }

        for candidate in candidates {
            let event = ScheduleEvent::planned(candidate, Some(template.id.clone()));
            ScheduleEventRepository::insert(tx.conn(), &event).await?;
        }

        let advanced = TemplateRepository::advance_watermark(
            tx.conn(),
            &template.id,
            template.version,
            end_date,
            Utc::now(),
        )
        .await?;
        if !advanced {
            warn!("Template {} watermark moved during generation", template.id);
            return Err(ScheduleError::Concurrency(format!(
                "template {} was generated by another writer",
                template.id
            )));
        }

        tx.commit().await?;
        Ok(candidates.len())
    }

    async fn patient_lock(&self, patient_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.patient_locks.lock().await;
        locks
            .entry(patient_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the patient's lock entry once no other call holds or awaits it
    async fn release_patient_lock(&self, patient_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.patient_locks.lock().await;
        if matches!(locks.get(patient_id), Some(entry) if Arc::strong_count(entry) == 1) {
            locks.remove(patient_id);
        }
    }
}
