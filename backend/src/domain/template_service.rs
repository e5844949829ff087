//! Template store: a patient's recurring weekly visit pattern.
//!
//! ## Business Rules
//!
//! - At most one ACTIVE template per patient; new templates start ACTIVE
//! - Weeks are identified by a 0-based index, unique within the template
//! - Every template event belongs to an existing week
//! - Deleting a template or a week removes everything below it

use chrono::{Local, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::domain::commands::template::{CreateTemplateCommand, InsertTemplateEventCommand};
use crate::domain::directory::PartyDirectory;
use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::schedule_event::units_between;
use crate::domain::models::template::{Template, TemplateDetail, TemplateEvent, TemplateStatus};
use crate::storage::{DbConnection, TemplateRepository};

#[derive(Clone)]
pub struct TemplateService {
    db: DbConnection,
    directory: Arc<dyn PartyDirectory>,
}

impl TemplateService {
    pub fn new(db: DbConnection, directory: Arc<dyn PartyDirectory>) -> Self {
        Self { db, directory }
    }

    pub async fn create_template(&self, command: CreateTemplateCommand) -> ScheduleResult<Template> {
        info!("Creating template: {:?}", command);

        let name = command.name.trim();
        if name.is_empty() {
            return Err(ScheduleError::validation("name", "must not be empty"));
        }
        if self.directory.patient_name(&command.patient_id).await?.is_none() {
            return Err(ScheduleError::not_found("Patient", &command.patient_id));
        }

        let now = Utc::now();
        let template = Template {
            id: Template::generate_id(),
            patient_id: command.patient_id,
            office_id: command.office_id,
            name: name.to_string(),
            status: TemplateStatus::Active,
            anchor_date: command.anchor_date.unwrap_or_else(|| Local::now().date_naive()),
            generated_through: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin_write().await?;
        if TemplateRepository::find_active_for_patient(tx.conn(), &template.patient_id)
            .await?
            .is_some()
        {
            return Err(ScheduleError::conflict(format!(
                "Patient {} already has an active template",
                template.patient_id
            )));
        }
        TemplateRepository::insert_template(tx.conn(), &template).await?;
        tx.commit().await?;

        info!("Created template {} for patient {}", template.id, template.patient_id);
        Ok(template)
    }

    /// The patient's active template with its weeks and events
    pub async fn get_template_with_weeks(&self, patient_id: &str) -> ScheduleResult<TemplateDetail> {
        info!("Loading active template for patient {}", patient_id);

        let mut conn = self.db.acquire().await?;
        let template = TemplateRepository::find_active_for_patient(&mut conn, patient_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("Template", format!("active template of {}", patient_id)))?;
        Ok(TemplateRepository::load_detail(&mut conn, template).await?)
    }

    pub async fn update_template_status(
        &self,
        template_id: &str,
        status: TemplateStatus,
    ) -> ScheduleResult<Template> {
        info!("Setting template {} status to {}", template_id, status);

        let mut tx = self.db.begin_write().await?;
        let mut template = Self::require_template(tx.conn(), template_id).await?;

        if status == TemplateStatus::Active && template.status != TemplateStatus::Active {
            if let Some(active) =
                TemplateRepository::find_active_for_patient(tx.conn(), &template.patient_id).await?
            {
                return Err(ScheduleError::conflict(format!(
                    "Patient {} already has an active template: {}",
                    template.patient_id, active.id
                )));
            }
        }

        template.status = status;
        template.updated_at = Utc::now();
        TemplateRepository::update_status(tx.conn(), template_id, status, template.updated_at).await?;
        tx.commit().await?;

        Ok(template)
    }

    pub async fn delete_template(&self, template_id: &str) -> ScheduleResult<()> {
        info!("Deleting template {}", template_id);

        let mut tx = self.db.begin_write().await?;
        if !TemplateRepository::delete_template(tx.conn(), template_id).await? {
            return Err(ScheduleError::not_found("Template", template_id));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_week(&self, template_id: &str, week_index: u32) -> ScheduleResult<TemplateDetail> {
        info!("Adding week {} to template {}", week_index, template_id);

        let mut tx = self.db.begin_write().await?;
        let template = Self::require_template(tx.conn(), template_id).await?;

        if TemplateRepository::week_exists(tx.conn(), template_id, week_index).await? {
            return Err(ScheduleError::validation(
                "week_index",
                format!("week {} already exists", week_index),
            ));
        }
        TemplateRepository::insert_week(tx.conn(), template_id, week_index).await?;
        let detail = TemplateRepository::load_detail(tx.conn(), template).await?;
        tx.commit().await?;

        Ok(detail)
    }

    pub async fn delete_week(&self, template_id: &str, week_index: u32) -> ScheduleResult<()> {
        info!("Deleting week {} of template {}", week_index, template_id);

        let mut tx = self.db.begin_write().await?;
        Self::require_template(tx.conn(), template_id).await?;

        if !TemplateRepository::delete_week(tx.conn(), template_id, week_index).await? {
            return Err(ScheduleError::not_found(
                "Week",
                format!("{}/{}", template_id, week_index),
            ));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Add one event per requested weekday, all sharing the same time and
    /// metadata. Returns the created events in weekday order.
    pub async fn insert_template_event(
        &self,
        command: InsertTemplateEventCommand,
    ) -> ScheduleResult<Vec<TemplateEvent>> {
        info!("Inserting template event: {:?}", command);

        if command.weekdays.is_empty() {
            return Err(ScheduleError::validation("weekdays", "at least one weekday is required"));
        }
        if let Some(day) = command
            .weekdays
            .iter()
            .find(|day| !TemplateEvent::is_valid_day_of_week(**day))
        {
            return Err(ScheduleError::validation(
                "weekdays",
                format!("{} is not a weekday (0-6, Sunday-Saturday)", day),
            ));
        }
        if command.end_time <= command.start_time {
            return Err(ScheduleError::validation("end_time", "must be after start_time"));
        }
        if let Some(staff_id) = &command.staff_id {
            if self.directory.staff_name(staff_id).await?.is_none() {
                return Err(ScheduleError::not_found("Staff", staff_id));
            }
        }

        let planned_units = command
            .planned_units
            .unwrap_or_else(|| units_between(command.start_time, command.end_time));
        let weekdays: BTreeSet<u8> = command.weekdays.iter().copied().collect();

        let mut tx = self.db.begin_write().await?;
        Self::require_template(tx.conn(), &command.template_id).await?;
        if !TemplateRepository::week_exists(tx.conn(), &command.template_id, command.week_index).await? {
            return Err(ScheduleError::validation(
                "week_index",
                format!("week {} does not exist", command.week_index),
            ));
        }

        let mut created = Vec::with_capacity(weekdays.len());
        for day_of_week in weekdays {
            let event = TemplateEvent {
                id: TemplateEvent::generate_id(),
                template_id: command.template_id.clone(),
                week_index: command.week_index,
                day_of_week,
                start_time: command.start_time,
                end_time: command.end_time,
                authorization_id: command.authorization_id.clone(),
                staff_id: command.staff_id.clone(),
                event_code: command.event_code.clone(),
                planned_units,
                comment: command.comment.clone(),
            };
            TemplateRepository::insert_event(tx.conn(), &event).await?;
            created.push(event);
        }
        tx.commit().await?;

        info!(
            "Created {} events in week {} of template {}",
            created.len(),
            command.week_index,
            command.template_id
        );
        Ok(created)
    }

    /// Remove one event and return what is left of its week
    pub async fn delete_template_event(
        &self,
        template_id: &str,
        event_id: &str,
    ) -> ScheduleResult<Vec<TemplateEvent>> {
        info!("Deleting event {} of template {}", event_id, template_id);

        let mut tx = self.db.begin_write().await?;
        let event = TemplateRepository::get_event(tx.conn(), template_id, event_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("TemplateEvent", event_id))?;

        TemplateRepository::delete_event(tx.conn(), event_id).await?;
        let remaining = TemplateRepository::list_week_events(tx.conn(), template_id, event.week_index).await?;
        tx.commit().await?;

        Ok(remaining)
    }

    async fn require_template(
        conn: &mut sqlx::SqliteConnection,
        template_id: &str,
    ) -> ScheduleResult<Template> {
        TemplateRepository::get_template(conn, template_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found("Template", template_id))
    }
}
