//! Preview/commit workflow for ad-hoc visits and the visit lifecycle.
//!
//! A preview expands the office's definition and reports every double
//! booking without writing anything. A commit re-validates the confirmed
//! visits and re-runs detection inside one write transaction, so a batch
//! is stored entirely or not at all.

use chrono::{NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::commands::schedule::{
    CommitCandidate, PreviewedVisit, ScheduleEventListQuery, ScheduleEventPage, SchedulePreview,
    SchedulePreviewCommand, UpdateScheduleEventCommand,
};
use crate::domain::conflict_detector::ConflictDetector;
use crate::domain::directory::{AuthorizationLookup, PartyDirectory};
use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::conflict::{ConflictType, ResolvedConflict, ScheduleConflict};
use crate::domain::models::schedule_event::{
    units_between, units_for_minutes, ScheduleEvent, ScheduleEventCursor, ScheduleEventStatus,
    VisitCandidate,
};
use crate::domain::recurrence::RecurrenceExpander;
use crate::storage::{DbConnection, ScheduleEventRepository};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct ScheduleService {
    db: DbConnection,
    directory: Arc<dyn PartyDirectory>,
    authorizations: Arc<dyn AuthorizationLookup>,
    default_page_size: u32,
    max_page_size: u32,
}

impl ScheduleService {
    pub fn new(
        db: DbConnection,
        directory: Arc<dyn PartyDirectory>,
        authorizations: Arc<dyn AuthorizationLookup>,
    ) -> Self {
        Self {
            db,
            directory,
            authorizations,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_sizes(mut self, default_page_size: u32, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    /// Expand and check a definition without writing anything
    pub async fn create_schedule_preview(
        &self,
        command: SchedulePreviewCommand,
    ) -> ScheduleResult<SchedulePreview> {
        info!("Previewing schedule: {:?}", command);

        let candidates = RecurrenceExpander::expand(&command.definition, command.repeat.as_ref())?;
        self.validate_batch(&candidates).await?;

        let committed = match (candidates.first(), candidates.last()) {
            (Some(first), Some(last)) => {
                let staff_ids: Vec<String> = command.definition.staff_id.iter().cloned().collect();
                let mut conn = self.db.acquire().await?;
                ScheduleEventRepository::list_overlap_candidates(
                    &mut conn,
                    first.event_date,
                    last.event_date,
                    &command.definition.patient_id,
                    &staff_ids,
                )
                .await?
            }
            _ => Vec::new(),
        };

        let mut previewed = Vec::with_capacity(candidates.len());
        let mut all_conflicts = Vec::new();
        let mut seen = committed;
        for (index, candidate) in candidates.into_iter().enumerate() {
            let mut conflicts = ConflictDetector::detect(&candidate, &seen);
            self.name_parties(&mut conflicts, &seen).await?;
            all_conflicts.extend(conflicts.iter().cloned());
            seen.push(batch_slot(index, &candidate));
            previewed.push(PreviewedVisit { candidate, conflicts });
        }

        let can_save = all_conflicts.iter().all(|conflict| conflict.resolved);
        info!(
            "Preview produced {} visits with {} conflicts",
            previewed.len(),
            all_conflicts.len()
        );

        Ok(SchedulePreview {
            candidates: previewed,
            conflicts: all_conflicts,
            can_save,
        })
    }

    /// Store a confirmed batch. Every overlap found against the current state
    /// (earlier visits of the same batch included) must have been resolved by
    /// the caller, otherwise nothing is stored. Overlaps with earlier visits
    /// of the batch are keyed by batch position, as reported by the preview.
    pub async fn create_schedule_events(
        &self,
        batch: Vec<CommitCandidate>,
    ) -> ScheduleResult<Vec<ScheduleEvent>> {
        info!("Committing {} visits", batch.len());

        if batch.is_empty() {
            return Err(ScheduleError::validation("candidates", "at least one visit is required"));
        }
        let candidates: Vec<VisitCandidate> = batch.iter().map(|c| c.candidate.clone()).collect();
        self.validate_batch(&candidates).await?;

        let mut unresolved = Vec::new();
        let mut seen = Vec::new();
        let mut slots = Vec::with_capacity(batch.len());
        let mut inserted_ids = HashSet::new();
        let mut created = Vec::with_capacity(batch.len());

        let mut tx = self.db.begin_write().await?;
        for (index, entry) in batch.iter().enumerate() {
            let candidate = &entry.candidate;
            let mut existing: Vec<ScheduleEvent> = ScheduleEventRepository::list_overlap_candidates(
                tx.conn(),
                candidate.event_date,
                candidate.event_date,
                &candidate.patient_id,
                &candidate.staff_id.iter().cloned().collect::<Vec<_>>(),
            )
            .await?
            .into_iter()
            .filter(|event| !inserted_ids.contains(&event.id))
            .collect();
            existing.extend(slots.iter().cloned());

            let resolved = resolved_keys(&entry.conflicts);
            for conflict in ConflictDetector::detect(candidate, &existing) {
                if !resolved.contains(&conflict.key()) {
                    unresolved.push(conflict);
                }
            }

            let event = ScheduleEvent::planned(candidate, None);
            ScheduleEventRepository::insert(tx.conn(), &event).await?;
            inserted_ids.insert(event.id.clone());
            slots.push(batch_slot(index, candidate));
            seen.extend(existing);
            created.push(event);
        }

        if !unresolved.is_empty() {
            drop(tx);
            self.name_parties(&mut unresolved, &seen).await?;
            warn!("Rejected batch with {} unresolved conflicts", unresolved.len());
            return Err(ScheduleError::overlapping(
                format!("{} unresolved scheduling conflicts", unresolved.len()),
                unresolved,
            ));
        }

        tx.commit().await?;
        info!("Committed {} visits", created.len());
        Ok(created)
    }

    pub async fn get_schedule_events(&self, query: ScheduleEventListQuery) -> ScheduleResult<ScheduleEventPage> {
        info!("Listing visits with query: {:?}", query);

        let filter = &query.filter;
        if filter.patient_id.is_none() && filter.staff_id.is_none() {
            return Err(ScheduleError::validation(
                "patient_id",
                "patient_id or staff_id is required",
            ));
        }
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if to < from {
                return Err(ScheduleError::validation("date_to", "must not be before date_from"));
            }
        }

        let limit = query
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let mut conn = self.db.acquire().await?;
        let cursor = match &query.after {
            Some(after) => {
                let event = ScheduleEventRepository::get(&mut conn, after)
                    .await?
                    .ok_or_else(|| ScheduleError::validation("after", format!("unknown cursor {}", after)))?;
                Some(ScheduleEventCursor {
                    start_at: event.start_at,
                    id: event.id,
                })
            }
            None => None,
        };

        // Query one extra record to determine if there are more results
        let mut events =
            ScheduleEventRepository::list(&mut conn, filter, cursor.as_ref(), limit + 1).await?;
        let has_more = events.len() > limit as usize;
        if has_more {
            events.pop();
        }
        let next_cursor = if has_more {
            events.last().map(|event| event.id.clone())
        } else {
            None
        };

        info!("Returning {} visits, has_more: {}", events.len(), has_more);
        Ok(ScheduleEventPage {
            events,
            has_more,
            next_cursor,
        })
    }

    pub async fn get_schedule_event(&self, event_id: &str) -> ScheduleResult<ScheduleEvent> {
        let mut conn = self.db.acquire().await?;
        ScheduleEventRepository::get(&mut conn, event_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("ScheduleEvent", event_id))
    }

    /// Apply a partial update. Moving or reassigning a visit re-checks it for
    /// overlaps; only conflicts listed as resolved are accepted.
    pub async fn update_schedule_event(
        &self,
        command: UpdateScheduleEventCommand,
    ) -> ScheduleResult<ScheduleEvent> {
        info!("Updating visit: {:?}", command);

        if let Some(status) = command.status {
            if !matches!(status, ScheduleEventStatus::Confirmed | ScheduleEventStatus::Cancelled) {
                return Err(ScheduleError::validation(
                    "status",
                    format!("{} is set by check-in/check-out, not by update", status),
                ));
            }
        }

        let current = self.get_schedule_event(&command.event_id).await?;
        if current.status.is_final() {
            return Err(ScheduleError::validation(
                "status",
                format!("visit is {} and can no longer be changed", current.status),
            ));
        }

        let mut updated = current.clone();
        if let Some(status) = command.status {
            if status != current.status && !current.status.can_transition_to(status) {
                return Err(ScheduleError::validation(
                    "status",
                    format!("cannot change {} to {}", current.status, status),
                ));
            }
            updated.status = status;
        }

        let event_date = command.event_date.unwrap_or(current.event_date);
        let start_time = command.start_time.unwrap_or_else(|| current.start_at.time());
        let end_time = command.end_time.unwrap_or_else(|| current.end_at.time());
        let times_changed = command.start_time.is_some() || command.end_time.is_some();
        updated.event_date = event_date;
        updated.start_at = event_date.and_time(start_time);
        updated.end_at = event_date.and_time(end_time);
        if let Some(staff_id) = command.staff_id.clone() {
            updated.staff_id = staff_id;
        }
        if let Some(authorization_id) = command.authorization_id.clone() {
            updated.authorization_id = Some(authorization_id);
        }
        updated.planned_units = match command.planned_units {
            Some(units) => units,
            None if times_changed => units_between(start_time, end_time),
            None => current.planned_units,
        };
        if let Some(comment) = command.comment.clone() {
            updated.comment = Some(comment);
        }
        updated.updated_at = Utc::now();

        let rescheduled = updated.event_date != current.event_date
            || updated.start_at != current.start_at
            || updated.end_at != current.end_at
            || updated.staff_id != current.staff_id;
        if rescheduled || command.authorization_id.is_some() || command.planned_units.is_some() {
            self.validate_batch(&[VisitCandidate::from(&updated)]).await?;
        }

        let mut tx = self.db.begin_write().await?;
        let latest = ScheduleEventRepository::get(tx.conn(), &command.event_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("ScheduleEvent", &command.event_id))?;
        if latest.updated_at != current.updated_at {
            return Err(ScheduleError::Concurrency(format!(
                "visit {} was modified concurrently",
                command.event_id
            )));
        }

        if rescheduled && updated.status != ScheduleEventStatus::Cancelled {
            let staff_ids: Vec<String> = updated.staff_id.iter().cloned().collect();
            let committed: Vec<ScheduleEvent> = ScheduleEventRepository::list_overlap_candidates(
                tx.conn(),
                updated.event_date,
                updated.event_date,
                &updated.patient_id,
                &staff_ids,
            )
            .await?
            .into_iter()
            .filter(|event| event.id != updated.id)
            .collect();

            let resolved = resolved_keys(&command.resolved_conflicts);
            let mut unresolved: Vec<ScheduleConflict> = ConflictDetector::detect(&updated, &committed)
                .into_iter()
                .filter(|conflict| !resolved.contains(&conflict.key()))
                .collect();

            if !unresolved.is_empty() {
                drop(tx);
                self.name_parties(&mut unresolved, &committed).await?;
                return Err(ScheduleError::overlapping(
                    format!("{} unresolved scheduling conflicts", unresolved.len()),
                    unresolved,
                ));
            }
        }

        ScheduleEventRepository::update(tx.conn(), &updated).await?;
        tx.commit().await?;

        info!("Updated visit {} ({})", updated.id, updated.status);
        Ok(updated)
    }

    /// Mark the start of a visit as reported by the visit verification system
    pub async fn record_check_in(&self, event_id: &str, at: NaiveDateTime) -> ScheduleResult<ScheduleEvent> {
        info!("Check-in for visit {} at {}", event_id, at);

        let mut tx = self.db.begin_write().await?;
        let mut event = ScheduleEventRepository::get(tx.conn(), event_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("ScheduleEvent", event_id))?;

        if !event.status.can_transition_to(ScheduleEventStatus::InProgress) {
            return Err(ScheduleError::validation(
                "status",
                format!("cannot check in a {} visit", event.status),
            ));
        }

        event.status = ScheduleEventStatus::InProgress;
        event.check_in_at = Some(at);
        event.updated_at = Utc::now();
        ScheduleEventRepository::update(tx.conn(), &event).await?;
        tx.commit().await?;

        Ok(event)
    }

    /// Complete a visit and derive its actual units from the clocked time
    pub async fn record_check_out(&self, event_id: &str, at: NaiveDateTime) -> ScheduleResult<ScheduleEvent> {
        info!("Check-out for visit {} at {}", event_id, at);

        let mut tx = self.db.begin_write().await?;
        let mut event = ScheduleEventRepository::get(tx.conn(), event_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("ScheduleEvent", event_id))?;

        let check_in_at = match (event.status, event.check_in_at) {
            (ScheduleEventStatus::InProgress, Some(check_in_at)) => check_in_at,
            _ => {
                return Err(ScheduleError::validation(
                    "status",
                    format!("cannot check out a {} visit", event.status),
                ))
            }
        };
        if at < check_in_at {
            return Err(ScheduleError::validation("at", "check-out is before check-in"));
        }

        event.status = ScheduleEventStatus::Completed;
        event.check_out_at = Some(at);
        event.actual_units = Some(units_for_minutes((at - check_in_at).num_minutes()));
        event.updated_at = Utc::now();
        ScheduleEventRepository::update(tx.conn(), &event).await?;
        tx.commit().await?;

        Ok(event)
    }

    /// Field, directory and authorization checks shared by preview and commit
    async fn validate_batch(&self, candidates: &[VisitCandidate]) -> ScheduleResult<()> {
        let mut known_patients = HashSet::new();
        let mut known_staff = HashSet::new();
        let mut units_by_authorization: HashMap<&str, u32> = HashMap::new();

        for candidate in candidates {
            if candidate.end_time <= candidate.start_time {
                return Err(ScheduleError::validation("end_time", "must be after start_time"));
            }

            if !known_patients.contains(candidate.patient_id.as_str()) {
                if self.directory.patient_name(&candidate.patient_id).await?.is_none() {
                    return Err(ScheduleError::not_found("Patient", &candidate.patient_id));
                }
                known_patients.insert(candidate.patient_id.as_str());
            }

            if let Some(staff_id) = candidate.staff_id.as_deref() {
                if !known_staff.contains(staff_id) {
                    if self.directory.staff_name(staff_id).await?.is_none() {
                        return Err(ScheduleError::not_found("Staff", staff_id));
                    }
                    known_staff.insert(staff_id);
                }
            }

            if let Some(authorization_id) = candidate.authorization_id.as_deref() {
                let authorization = self
                    .authorizations
                    .get_authorization(authorization_id)
                    .await?
                    .ok_or_else(|| ScheduleError::not_found("Authorization", authorization_id))?;

                if !authorization.patient_id.is_empty() && authorization.patient_id != candidate.patient_id {
                    return Err(ScheduleError::validation(
                        "authorization_id",
                        format!("{} does not belong to patient {}", authorization_id, candidate.patient_id),
                    ));
                }
                if !authorization.covers(candidate.event_date) {
                    return Err(ScheduleError::validation(
                        "authorization_id",
                        format!("{} is not valid on {}", authorization_id, candidate.event_date),
                    ));
                }

                let needed = units_by_authorization.entry(authorization_id).or_insert(0);
                *needed = needed.checked_add(candidate.planned_units).ok_or_else(|| {
                    ScheduleError::validation("planned_units", "total planned units are too large")
                })?;
                if let Some(remaining) = authorization.remaining_units {
                    if *needed > remaining {
                        return Err(ScheduleError::validation(
                            "authorization_id",
                            format!(
                                "{} has {} units remaining but {} are planned",
                                authorization_id, remaining, needed
                            ),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Replace ids in conflict messages with directory display names
    async fn name_parties(
        &self,
        conflicts: &mut [ScheduleConflict],
        events: &[ScheduleEvent],
    ) -> ScheduleResult<()> {
        for conflict in conflicts.iter_mut() {
            let Some(other) = events.iter().find(|e| e.id == conflict.conflicting_event_id) else {
                continue;
            };
            let name = match conflict.conflict_type {
                ConflictType::PatientConflict => self.directory.patient_name(&other.patient_id).await?,
                ConflictType::StaffConflict => match other.staff_id.as_deref() {
                    Some(staff_id) => self.directory.staff_name(staff_id).await?,
                    None => None,
                },
            };
            if let Some(name) = name {
                conflict.message = ConflictDetector::describe(conflict.conflict_type, &name, other);
            }
        }
        Ok(())
    }
}

/// Stand-in for an earlier visit of the same batch. Its id is the batch
/// position, so a conflict against it keeps the same key on every attempt.
fn batch_slot(index: usize, candidate: &VisitCandidate) -> ScheduleEvent {
    let mut slot = ScheduleEvent::planned(candidate, None);
    slot.id = format!("batch::{}", index);
    slot
}

fn resolved_keys(conflicts: &[ScheduleConflict]) -> HashSet<ResolvedConflict> {
    conflicts
        .iter()
        .filter(|conflict| conflict.resolved)
        .map(ScheduleConflict::key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{AuthorizationInfo, InMemoryDirectory};
    use crate::domain::models::recurrence::{EndCondition, OccurrenceDefinition, RepeatConfig};
    use crate::domain::models::schedule_event::ScheduleEventFilter;
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        date(2025, 3, 3)
    }

    async fn setup_test() -> ScheduleService {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let directory = Arc::new(
            InMemoryDirectory::default()
                .with_patient("patient-1", "Ada Lovelace")
                .with_patient("patient-2", "Alan Turing")
                .with_staff("staff-x", "Grace Hopper")
                .with_staff("staff-y", "Katherine Johnson")
                .with_authorization(AuthorizationInfo {
                    id: "auth-1".to_string(),
                    patient_id: "patient-1".to_string(),
                    valid_from: date(2025, 1, 1),
                    valid_to: date(2025, 12, 31),
                    remaining_units: Some(20),
                })
                .with_authorization(AuthorizationInfo {
                    id: "auth-open".to_string(),
                    patient_id: "patient-1".to_string(),
                    valid_from: date(2025, 1, 1),
                    valid_to: date(2025, 12, 31),
                    remaining_units: None,
                }),
        );
        ScheduleService::new(db, directory.clone(), directory)
    }

    fn definition(patient: &str, staff: Option<&str>, start: NaiveTime, end: NaiveTime) -> OccurrenceDefinition {
        OccurrenceDefinition {
            patient_id: patient.to_string(),
            event_date: monday(),
            start_time: start,
            end_time: end,
            staff_id: staff.map(str::to_string),
            authorization_id: None,
            event_code: Some("PCA".to_string()),
            planned_units: units_between(start, end),
            comment: None,
        }
    }

    fn commit_all(preview: &SchedulePreview) -> Vec<CommitCandidate> {
        preview
            .candidates
            .iter()
            .map(|visit| CommitCandidate {
                candidate: visit.candidate.clone(),
                conflicts: visit.conflicts.clone(),
            })
            .collect()
    }

    async fn commit_single(
        service: &ScheduleService,
        patient: &str,
        staff: Option<&str>,
        start: NaiveTime,
        end: NaiveTime,
    ) -> ScheduleEvent {
        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition(patient, staff, start, end),
                repeat: None,
            })
            .await
            .unwrap();
        service
            .create_schedule_events(commit_all(&preview))
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_preview_weekly_batch_writes_nothing() {
        let service = setup_test().await;
        let repeat = RepeatConfig::weekly(1, [1, 3, 5], EndCondition::ByDate(monday() + Duration::days(13))).unwrap();

        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(9, 0), time(10, 0)),
                repeat: Some(repeat),
            })
            .await
            .unwrap();

        assert_eq!(preview.candidates.len(), 6);
        assert!(preview.conflicts.is_empty());
        assert!(preview.can_save);

        let page = service
            .get_schedule_events(ScheduleEventListQuery {
                filter: ScheduleEventFilter {
                    patient_id: Some("patient-1".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn test_preview_reports_staff_conflict_with_name() {
        let service = setup_test().await;
        let existing = commit_single(&service, "patient-2", Some("staff-x"), time(9, 30), time(10, 30)).await;

        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(9, 0), time(10, 0)),
                repeat: None,
            })
            .await
            .unwrap();

        assert!(!preview.can_save);
        assert_eq!(preview.conflicts.len(), 1);
        let conflict = &preview.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::StaffConflict);
        assert_eq!(conflict.conflicting_event_id, existing.id);
        assert_eq!(
            conflict.message,
            "Staff Grace Hopper already has a visit on 2025-03-03 from 09:30 to 10:30"
        );
        assert_eq!(preview.candidates[0].conflicts, preview.conflicts);

        let touching = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(10, 30), time(11, 30)),
                repeat: None,
            })
            .await
            .unwrap();
        assert!(touching.can_save);
    }

    #[tokio::test]
    async fn test_commit_rejects_unresolved_conflict_and_rolls_back() {
        let service = setup_test().await;
        commit_single(&service, "patient-2", Some("staff-x"), time(9, 30), time(10, 30)).await;

        let repeat = RepeatConfig::weekly(1, [1, 2], EndCondition::ByCount(2)).unwrap();
        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(9, 0), time(10, 0)),
                repeat: Some(repeat),
            })
            .await
            .unwrap();
        assert_eq!(preview.candidates.len(), 2);

        let result = service.create_schedule_events(commit_all(&preview)).await;

        match result {
            Err(ScheduleError::Conflict { conflicts, .. }) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].conflict_type, ConflictType::StaffConflict);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // The conflict-free Tuesday visit was not stored either
        let page = service
            .get_schedule_events(ScheduleEventListQuery {
                filter: ScheduleEventFilter {
                    patient_id: Some("patient-1".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn test_commit_accepts_resolved_conflict() {
        let service = setup_test().await;
        commit_single(&service, "patient-2", Some("staff-x"), time(9, 30), time(10, 30)).await;

        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(9, 0), time(10, 0)),
                repeat: None,
            })
            .await
            .unwrap();
        let mut batch = commit_all(&preview);
        for conflict in &mut batch[0].conflicts {
            conflict.resolved = true;
        }

        let created = service.create_schedule_events(batch).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, ScheduleEventStatus::Planned);
    }

    #[tokio::test]
    async fn test_commit_detects_conflict_that_appeared_after_preview() {
        let service = setup_test().await;
        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-x"), time(9, 0), time(10, 0)),
                repeat: None,
            })
            .await
            .unwrap();
        assert!(preview.can_save);

        // Another operator books the same staff member in the meantime
        commit_single(&service, "patient-2", Some("staff-x"), time(9, 30), time(10, 30)).await;

        let result = service.create_schedule_events(commit_all(&preview)).await;
        assert!(matches!(result, Err(ScheduleError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_commit_detects_overlap_within_batch() {
        let service = setup_test().await;
        let first = VisitCandidate {
            patient_id: "patient-1".to_string(),
            event_date: monday(),
            start_time: time(9, 0),
            end_time: time(10, 0),
            staff_id: Some("staff-x".to_string()),
            authorization_id: None,
            event_code: None,
            planned_units: 4,
            comment: None,
        };
        let second = VisitCandidate {
            patient_id: "patient-2".to_string(),
            start_time: time(9, 45),
            end_time: time(10, 45),
            ..first.clone()
        };

        let result = service
            .create_schedule_events(vec![
                CommitCandidate { candidate: first.clone(), conflicts: vec![] },
                CommitCandidate { candidate: second.clone(), conflicts: vec![] },
            ])
            .await;

        let mut reported = match result {
            Err(ScheduleError::Conflict { conflicts, .. }) => conflicts,
            other => panic!("expected conflict, got {:?}", other),
        };
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].conflict_type, ConflictType::StaffConflict);
        assert_eq!(reported[0].conflicting_event_id, "batch::0");
        assert_eq!(
            reported[0].message,
            "Staff Grace Hopper already has a visit on 2025-03-03 from 09:00 to 10:00"
        );

        // Resending the batch with the reported conflict accepted stores both visits
        reported[0].resolved = true;
        let created = service
            .create_schedule_events(vec![
                CommitCandidate { candidate: first, conflicts: vec![] },
                CommitCandidate { candidate: second, conflicts: reported },
            ])
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        let page = service
            .get_schedule_events(ScheduleEventListQuery {
                filter: ScheduleEventFilter {
                    staff_id: Some("staff-x".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.events.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_unit_total_is_rejected() {
        let service = setup_test().await;
        let mut huge = definition("patient-1", None, time(9, 0), time(10, 0));
        huge.authorization_id = Some("auth-open".to_string());
        huge.planned_units = u32::MAX;
        let repeat = RepeatConfig::weekly(1, [1], EndCondition::ByCount(2)).unwrap();

        let result = service
            .create_schedule_preview(SchedulePreviewCommand { definition: huge, repeat: Some(repeat) })
            .await;

        assert!(matches!(
            result,
            Err(ScheduleError::Validation { ref field, .. }) if field == "planned_units"
        ));
    }

    #[tokio::test]
    async fn test_commit_validates_directory_and_authorization() {
        let service = setup_test().await;

        let mut unknown_staff = definition("patient-1", Some("staff-404"), time(9, 0), time(10, 0));
        unknown_staff.staff_id = Some("staff-404".to_string());
        let result = service
            .create_schedule_preview(SchedulePreviewCommand { definition: unknown_staff, repeat: None })
            .await;
        assert!(matches!(result, Err(ScheduleError::NotFound { entity: "Staff", .. })));

        let mut wrong_patient = definition("patient-2", None, time(9, 0), time(10, 0));
        wrong_patient.authorization_id = Some("auth-1".to_string());
        let result = service
            .create_schedule_events(vec![CommitCandidate {
                candidate: RecurrenceExpander::expand(&wrong_patient, None).unwrap().remove(0),
                conflicts: vec![],
            }])
            .await;
        assert!(matches!(
            result,
            Err(ScheduleError::Validation { ref field, .. }) if field == "authorization_id"
        ));

        // 6 weekly visits of 4 units exceed the 20 remaining units
        let mut too_many = definition("patient-1", None, time(9, 0), time(10, 0));
        too_many.authorization_id = Some("auth-1".to_string());
        let repeat = RepeatConfig::weekly(1, [1], EndCondition::ByCount(6)).unwrap();
        let result = service
            .create_schedule_preview(SchedulePreviewCommand { definition: too_many, repeat: Some(repeat) })
            .await;
        assert!(result.unwrap_err().to_string().contains("20 units remaining"));

        let result = service.create_schedule_events(vec![]).await;
        assert!(matches!(result, Err(ScheduleError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_visit_frees_the_slot() {
        let service = setup_test().await;
        let existing = commit_single(&service, "patient-2", Some("staff-x"), time(9, 0), time(10, 0)).await;

        service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: existing.id.clone(),
                status: Some(ScheduleEventStatus::Cancelled),
                ..Default::default()
            })
            .await
            .unwrap();

        commit_single(&service, "patient-1", Some("staff-x"), time(9, 0), time(10, 0)).await;
    }

    #[tokio::test]
    async fn test_update_reschedule_checks_conflicts() {
        let service = setup_test().await;
        let blocker = commit_single(&service, "patient-2", Some("staff-x"), time(13, 0), time(14, 0)).await;
        let visit = commit_single(&service, "patient-1", Some("staff-x"), time(9, 0), time(10, 0)).await;

        let move_into_blocker = UpdateScheduleEventCommand {
            event_id: visit.id.clone(),
            start_time: Some(time(13, 30)),
            end_time: Some(time(14, 30)),
            ..Default::default()
        };
        let result = service.update_schedule_event(move_into_blocker.clone()).await;
        let conflicts = match result {
            Err(ScheduleError::Conflict { conflicts, .. }) => conflicts,
            other => panic!("expected conflict, got {:?}", other),
        };
        assert_eq!(conflicts[0].conflicting_event_id, blocker.id);

        let resolved: Vec<ScheduleConflict> = conflicts
            .into_iter()
            .map(|mut c| {
                c.resolved = true;
                c
            })
            .collect();
        let moved = service
            .update_schedule_event(UpdateScheduleEventCommand {
                resolved_conflicts: resolved,
                ..move_into_blocker
            })
            .await
            .unwrap();
        assert_eq!(moved.start_at.time(), time(13, 30));
        assert_eq!(moved.planned_units, 4);

        // Changing only the time of the same visit never conflicts with itself
        let shortened = service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: visit.id.clone(),
                start_time: Some(time(14, 0)),
                end_time: Some(time(14, 45)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(shortened.planned_units, 3);
    }

    #[tokio::test]
    async fn test_update_status_rules() {
        let service = setup_test().await;
        let visit = commit_single(&service, "patient-1", None, time(9, 0), time(10, 0)).await;

        let in_progress = service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: visit.id.clone(),
                status: Some(ScheduleEventStatus::InProgress),
                ..Default::default()
            })
            .await;
        assert!(matches!(in_progress, Err(ScheduleError::Validation { .. })));

        let confirmed = service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: visit.id.clone(),
                status: Some(ScheduleEventStatus::Confirmed),
                comment: Some("Confirmed by phone".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(confirmed.status, ScheduleEventStatus::Confirmed);
        assert_eq!(confirmed.comment.as_deref(), Some("Confirmed by phone"));

        service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: visit.id.clone(),
                status: Some(ScheduleEventStatus::Cancelled),
                ..Default::default()
            })
            .await
            .unwrap();

        let after_cancel = service
            .update_schedule_event(UpdateScheduleEventCommand {
                event_id: visit.id.clone(),
                comment: Some("too late".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(after_cancel, Err(ScheduleError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_check_in_and_out_complete_the_visit() {
        let service = setup_test().await;
        let visit = commit_single(&service, "patient-1", Some("staff-y"), time(9, 0), time(10, 0)).await;

        let early_check_out = service.record_check_out(&visit.id, monday().and_time(time(10, 0))).await;
        assert!(matches!(early_check_out, Err(ScheduleError::Validation { .. })));

        let started = service
            .record_check_in(&visit.id, monday().and_time(time(9, 5)))
            .await
            .unwrap();
        assert_eq!(started.status, ScheduleEventStatus::InProgress);

        let backwards = service.record_check_out(&visit.id, monday().and_time(time(9, 0))).await;
        assert!(matches!(backwards, Err(ScheduleError::Validation { ref field, .. }) if field == "at"));

        let done = service
            .record_check_out(&visit.id, monday().and_time(time(10, 12)))
            .await
            .unwrap();
        assert_eq!(done.status, ScheduleEventStatus::Completed);
        assert_eq!(done.actual_units, Some(5));

        let stored = service.get_schedule_event(&visit.id).await.unwrap();
        assert_eq!(stored.check_out_at, Some(monday().and_time(time(10, 12))));

        let again = service.record_check_in(&visit.id, monday().and_time(time(11, 0))).await;
        assert!(matches!(again, Err(ScheduleError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_listing_pages_and_requires_party() {
        let service = setup_test().await;
        let repeat = RepeatConfig::weekly(1, [1, 3, 5], EndCondition::ByCount(5)).unwrap();
        let preview = service
            .create_schedule_preview(SchedulePreviewCommand {
                definition: definition("patient-1", Some("staff-y"), time(9, 0), time(10, 0)),
                repeat: Some(repeat),
            })
            .await
            .unwrap();
        service.create_schedule_events(commit_all(&preview)).await.unwrap();

        let missing_party = service.get_schedule_events(ScheduleEventListQuery::default()).await;
        assert!(matches!(missing_party, Err(ScheduleError::Validation { .. })));

        let filter = ScheduleEventFilter {
            staff_id: Some("staff-y".to_string()),
            ..Default::default()
        };
        let first = service
            .get_schedule_events(ScheduleEventListQuery {
                filter: filter.clone(),
                limit: Some(3),
                after: None,
            })
            .await
            .unwrap();
        assert_eq!(first.events.len(), 3);
        assert!(first.has_more);
        assert_eq!(first.next_cursor.as_deref(), Some(first.events[2].id.as_str()));

        let second = service
            .get_schedule_events(ScheduleEventListQuery {
                filter,
                limit: Some(3),
                after: first.next_cursor.clone(),
            })
            .await
            .unwrap();
        assert_eq!(second.events.len(), 2);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
        assert!(first.events[2].start_at < second.events[0].start_at);
    }
}
