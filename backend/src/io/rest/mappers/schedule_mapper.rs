use shared::{
    ConflictType as ConflictTypeDto, CreateScheduleEventsRequest, PaginationInfo,
    RepeatConfig as RepeatConfigDto, RepeatFrequency, ScheduleCandidate,
    ScheduleConflict as ScheduleConflictDto, ScheduleEvent as ScheduleEventDto,
    ScheduleEventListRequest, ScheduleEventListResponse, ScheduleEventStatus as ScheduleEventStatusDto,
    SchedulePreviewRequest, SchedulePreviewResponse, UpdateScheduleEventRequest,
};

use super::{
    format_date, format_datetime, format_time, format_timestamp, non_blank, parse_date, parse_datetime,
    parse_optional_date, parse_time,
};
use crate::domain::commands::schedule::{
    CommitCandidate, PreviewedVisit, ScheduleEventListQuery, ScheduleEventPage, SchedulePreview,
    SchedulePreviewCommand, UpdateScheduleEventCommand,
};
use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::conflict::{ConflictType, ScheduleConflict};
use crate::domain::models::recurrence::{EndCondition, OccurrenceDefinition, RepeatConfig};
use crate::domain::models::schedule_event::{
    units_between, ScheduleEvent, ScheduleEventFilter, ScheduleEventStatus, VisitCandidate,
};

pub struct ScheduleMapper;

impl ScheduleMapper {
    pub fn status_to_domain(dto_status: ScheduleEventStatusDto) -> ScheduleEventStatus {
        match dto_status {
            ScheduleEventStatusDto::Planned => ScheduleEventStatus::Planned,
            ScheduleEventStatusDto::Confirmed => ScheduleEventStatus::Confirmed,
            ScheduleEventStatusDto::InProgress => ScheduleEventStatus::InProgress,
            ScheduleEventStatusDto::Completed => ScheduleEventStatus::Completed,
            ScheduleEventStatusDto::Cancelled => ScheduleEventStatus::Cancelled,
        }
    }

    pub fn status_to_dto(status: ScheduleEventStatus) -> ScheduleEventStatusDto {
        match status {
            ScheduleEventStatus::Planned => ScheduleEventStatusDto::Planned,
            ScheduleEventStatus::Confirmed => ScheduleEventStatusDto::Confirmed,
            ScheduleEventStatus::InProgress => ScheduleEventStatusDto::InProgress,
            ScheduleEventStatus::Completed => ScheduleEventStatusDto::Completed,
            ScheduleEventStatus::Cancelled => ScheduleEventStatusDto::Cancelled,
        }
    }

    fn conflict_type_to_domain(dto_type: ConflictTypeDto) -> ConflictType {
        match dto_type {
            ConflictTypeDto::PatientConflict => ConflictType::PatientConflict,
            ConflictTypeDto::StaffConflict => ConflictType::StaffConflict,
        }
    }

    fn conflict_type_to_dto(conflict_type: ConflictType) -> ConflictTypeDto {
        match conflict_type {
            ConflictType::PatientConflict => ConflictTypeDto::PatientConflict,
            ConflictType::StaffConflict => ConflictTypeDto::StaffConflict,
        }
    }

    pub fn conflict_to_dto(conflict: ScheduleConflict) -> ScheduleConflictDto {
        ScheduleConflictDto {
            conflict_type: Self::conflict_type_to_dto(conflict.conflict_type),
            conflicting_event_id: conflict.conflicting_event_id,
            event_date: format_date(conflict.event_date),
            start_at: format_datetime(conflict.start_at),
            end_at: format_datetime(conflict.end_at),
            message: conflict.message,
            resolved: conflict.resolved,
        }
    }

    pub fn to_conflict_dto_list(conflicts: Vec<ScheduleConflict>) -> Vec<ScheduleConflictDto> {
        conflicts.into_iter().map(Self::conflict_to_dto).collect()
    }

    fn conflict_to_domain(field: &str, dto: ScheduleConflictDto) -> ScheduleResult<ScheduleConflict> {
        Ok(ScheduleConflict {
            conflict_type: Self::conflict_type_to_domain(dto.conflict_type),
            conflicting_event_id: dto.conflicting_event_id,
            event_date: parse_date(&format!("{}.event_date", field), &dto.event_date)?,
            start_at: parse_datetime(&format!("{}.start_at", field), &dto.start_at)?,
            end_at: parse_datetime(&format!("{}.end_at", field), &dto.end_at)?,
            message: dto.message,
            resolved: dto.resolved,
        })
    }

    fn conflicts_to_domain(field: &str, dtos: Vec<ScheduleConflictDto>) -> ScheduleResult<Vec<ScheduleConflict>> {
        dtos.into_iter()
            .enumerate()
            .map(|(i, dto)| Self::conflict_to_domain(&format!("{}[{}]", field, i), dto))
            .collect()
    }

    pub fn event_to_dto(event: ScheduleEvent) -> ScheduleEventDto {
        ScheduleEventDto {
            id: event.id,
            patient_id: event.patient_id,
            template_id: event.template_id,
            event_date: format_date(event.event_date),
            start_at: format_datetime(event.start_at),
            end_at: format_datetime(event.end_at),
            status: Self::status_to_dto(event.status),
            staff_id: event.staff_id,
            authorization_id: event.authorization_id,
            event_code: event.event_code,
            planned_units: event.planned_units,
            actual_units: event.actual_units,
            comment: event.comment,
            check_in_at: event.check_in_at.map(format_datetime),
            check_out_at: event.check_out_at.map(format_datetime),
            created_at: format_timestamp(event.created_at),
            updated_at: format_timestamp(event.updated_at),
        }
    }

    pub fn to_event_dto_list(events: Vec<ScheduleEvent>) -> Vec<ScheduleEventDto> {
        events.into_iter().map(Self::event_to_dto).collect()
    }

    pub fn to_preview_command(request: SchedulePreviewRequest) -> ScheduleResult<SchedulePreviewCommand> {
        let occurrence = request.occurrence;
        let start_time = parse_time("occurrence.start_time", &occurrence.start_time)?;
        let end_time = parse_time("occurrence.end_time", &occurrence.end_time)?;

        let definition = OccurrenceDefinition {
            patient_id: occurrence.patient_id.trim().to_string(),
            event_date: parse_date("occurrence.event_date", &occurrence.event_date)?,
            start_time,
            end_time,
            staff_id: non_blank(occurrence.staff_id),
            authorization_id: non_blank(occurrence.authorization_id),
            event_code: non_blank(occurrence.event_code),
            planned_units: occurrence
                .planned_units
                .unwrap_or_else(|| units_between(start_time, end_time)),
            comment: non_blank(occurrence.comment),
        };

        let repeat = request.repeat.map(Self::repeat_to_domain).transpose()?;

        Ok(SchedulePreviewCommand { definition, repeat })
    }

    /// Exactly one end condition must be present on the wire
    fn repeat_to_domain(dto: RepeatConfigDto) -> ScheduleResult<RepeatConfig> {
        let end = match (dto.end_date.as_deref(), dto.occurrences) {
            (Some(end_date), None) => EndCondition::ByDate(parse_date("repeat.end_date", end_date)?),
            (None, Some(count)) => EndCondition::ByCount(count),
            (Some(_), Some(_)) => {
                return Err(ScheduleError::validation(
                    "repeat",
                    "set either end_date or occurrences, not both",
                ))
            }
            (None, None) => {
                return Err(ScheduleError::validation(
                    "repeat",
                    "either end_date or occurrences is required",
                ))
            }
        };

        match dto.frequency {
            RepeatFrequency::Week => RepeatConfig::weekly(dto.interval, dto.days_of_week, end),
            RepeatFrequency::Month => RepeatConfig::monthly(dto.interval, end),
        }
    }

    fn candidate_to_dto(candidate: VisitCandidate, conflicts: Vec<ScheduleConflict>) -> ScheduleCandidate {
        ScheduleCandidate {
            patient_id: candidate.patient_id,
            event_date: format_date(candidate.event_date),
            start_time: format_time(candidate.start_time),
            end_time: format_time(candidate.end_time),
            staff_id: candidate.staff_id,
            authorization_id: candidate.authorization_id,
            event_code: candidate.event_code,
            planned_units: candidate.planned_units,
            comment: candidate.comment,
            conflicts: Self::to_conflict_dto_list(conflicts),
        }
    }

    pub fn to_preview_response(preview: SchedulePreview) -> SchedulePreviewResponse {
        SchedulePreviewResponse {
            candidates: preview
                .candidates
                .into_iter()
                .map(|PreviewedVisit { candidate, conflicts }| Self::candidate_to_dto(candidate, conflicts))
                .collect(),
            conflicts: Self::to_conflict_dto_list(preview.conflicts),
            can_save: preview.can_save,
        }
    }

    pub fn to_commit_batch(request: CreateScheduleEventsRequest) -> ScheduleResult<Vec<CommitCandidate>> {
        request
            .candidates
            .into_iter()
            .enumerate()
            .map(|(i, dto)| -> ScheduleResult<CommitCandidate> {
                let field = |name: &str| format!("candidates[{}].{}", i, name);
                Ok(CommitCandidate {
                    candidate: VisitCandidate {
                        patient_id: dto.patient_id.trim().to_string(),
                        event_date: parse_date(&field("event_date"), &dto.event_date)?,
                        start_time: parse_time(&field("start_time"), &dto.start_time)?,
                        end_time: parse_time(&field("end_time"), &dto.end_time)?,
                        staff_id: non_blank(dto.staff_id),
                        authorization_id: non_blank(dto.authorization_id),
                        event_code: non_blank(dto.event_code),
                        planned_units: dto.planned_units,
                        comment: non_blank(dto.comment),
                    },
                    conflicts: Self::conflicts_to_domain(&field("conflicts"), dto.conflicts)?,
                })
            })
            .collect()
    }

    pub fn to_list_query(request: ScheduleEventListRequest) -> ScheduleResult<ScheduleEventListQuery> {
        let statuses = match request.status.as_deref() {
            Some(statuses) => statuses
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<ScheduleEventStatus>()
                        .map_err(|e| ScheduleError::validation("status", e))
                })
                .collect::<ScheduleResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(ScheduleEventListQuery {
            filter: ScheduleEventFilter {
                patient_id: non_blank(request.patient_id),
                staff_id: non_blank(request.staff_id),
                date_from: parse_optional_date("date_from", request.date_from.as_deref())?,
                date_to: parse_optional_date("date_to", request.date_to.as_deref())?,
                statuses,
                search: non_blank(request.search),
            },
            limit: request.limit,
            after: non_blank(request.after),
        })
    }

    pub fn to_list_response(page: ScheduleEventPage) -> ScheduleEventListResponse {
        ScheduleEventListResponse {
            events: Self::to_event_dto_list(page.events),
            pagination: PaginationInfo {
                has_more: page.has_more,
                next_cursor: page.next_cursor,
            },
        }
    }

    pub fn to_update_command(
        event_id: String,
        request: UpdateScheduleEventRequest,
    ) -> ScheduleResult<UpdateScheduleEventCommand> {
        let staff_id = if request.clear_staff {
            Some(None)
        } else {
            non_blank(request.staff_id).map(Some)
        };

        Ok(UpdateScheduleEventCommand {
            event_id,
            status: request.status.map(Self::status_to_domain),
            event_date: parse_optional_date("event_date", request.event_date.as_deref())?,
            start_time: request
                .start_time
                .as_deref()
                .map(|value| parse_time("start_time", value))
                .transpose()?,
            end_time: request
                .end_time
                .as_deref()
                .map(|value| parse_time("end_time", value))
                .transpose()?,
            staff_id,
            authorization_id: non_blank(request.authorization_id),
            planned_units: request.planned_units,
            comment: request.comment,
            resolved_conflicts: Self::conflicts_to_domain("resolved_conflicts", request.resolved_conflicts)?,
        })
    }
}
