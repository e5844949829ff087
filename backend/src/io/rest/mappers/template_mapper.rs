use shared::{
    CreateTemplateRequest, GenerateFromTemplateResponse, InsertTemplateEventRequest,
    TemplateDetail as TemplateDetailDto, TemplateEvent as TemplateEventDto,
    TemplateStatus as TemplateStatusDto, TemplateWeek as TemplateWeekDto, Template as TemplateDto,
};

use super::{format_date, format_time, format_timestamp, non_blank, parse_optional_date, parse_time};
use crate::domain::commands::template::{
    CreateTemplateCommand, GenerateFromTemplateResult, InsertTemplateEventCommand,
};
use crate::domain::error::ScheduleResult;
use crate::domain::models::template::{
    Template, TemplateDetail, TemplateEvent, TemplateStatus, TemplateWeek,
};

pub struct TemplateMapper;

impl TemplateMapper {
    pub fn status_to_domain(dto_status: TemplateStatusDto) -> TemplateStatus {
        match dto_status {
            TemplateStatusDto::Draft => TemplateStatus::Draft,
            TemplateStatusDto::Active => TemplateStatus::Active,
            TemplateStatusDto::Archived => TemplateStatus::Archived,
        }
    }

    pub fn status_to_dto(status: TemplateStatus) -> TemplateStatusDto {
        match status {
            TemplateStatus::Draft => TemplateStatusDto::Draft,
            TemplateStatus::Active => TemplateStatusDto::Active,
            TemplateStatus::Archived => TemplateStatusDto::Archived,
        }
    }

    pub fn to_dto(template: Template) -> TemplateDto {
        TemplateDto {
            id: template.id,
            patient_id: template.patient_id,
            office_id: template.office_id,
            name: template.name,
            status: Self::status_to_dto(template.status),
            anchor_date: format_date(template.anchor_date),
            generated_through: template.generated_through.map(format_date),
            version: template.version,
            created_at: format_timestamp(template.created_at),
            updated_at: format_timestamp(template.updated_at),
        }
    }

    pub fn event_to_dto(event: TemplateEvent) -> TemplateEventDto {
        TemplateEventDto {
            id: event.id,
            template_id: event.template_id,
            week_index: event.week_index,
            day_of_week: event.day_of_week,
            start_time: format_time(event.start_time),
            end_time: format_time(event.end_time),
            authorization_id: event.authorization_id,
            staff_id: event.staff_id,
            event_code: event.event_code,
            planned_units: event.planned_units,
            comment: event.comment,
        }
    }

    pub fn to_event_dto_list(events: Vec<TemplateEvent>) -> Vec<TemplateEventDto> {
        events.into_iter().map(Self::event_to_dto).collect()
    }

    fn week_to_dto(week: TemplateWeek) -> TemplateWeekDto {
        TemplateWeekDto {
            week_index: week.week_index,
            events: Self::to_event_dto_list(week.events),
        }
    }

    pub fn detail_to_dto(detail: TemplateDetail) -> TemplateDetailDto {
        TemplateDetailDto {
            template: Self::to_dto(detail.template),
            weeks: detail.weeks.into_iter().map(Self::week_to_dto).collect(),
        }
    }

    pub fn to_create_command(request: CreateTemplateRequest) -> ScheduleResult<CreateTemplateCommand> {
        Ok(CreateTemplateCommand {
            patient_id: request.patient_id.trim().to_string(),
            name: request.name,
            office_id: non_blank(request.office_id),
            anchor_date: parse_optional_date("anchor_date", request.anchor_date.as_deref())?,
        })
    }

    pub fn to_insert_event_command(
        template_id: String,
        week_index: u32,
        request: InsertTemplateEventRequest,
    ) -> ScheduleResult<InsertTemplateEventCommand> {
        Ok(InsertTemplateEventCommand {
            template_id,
            week_index,
            weekdays: request.weekdays,
            start_time: parse_time("start_time", &request.start_time)?,
            end_time: parse_time("end_time", &request.end_time)?,
            authorization_id: non_blank(request.authorization_id),
            staff_id: non_blank(request.staff_id),
            event_code: non_blank(request.event_code),
            planned_units: request.planned_units,
            comment: non_blank(request.comment),
        })
    }

    pub fn to_generate_response(result: GenerateFromTemplateResult) -> GenerateFromTemplateResponse {
        GenerateFromTemplateResponse {
            created_count: result.created_count,
            generated_through: result.generated_through.map(format_date),
        }
    }
}
