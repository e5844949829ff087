//! Domain model for recurring visit templates.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateStatus {
    Draft,
    Active,
    Archived,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Draft => "DRAFT",
            TemplateStatus::Active => "ACTIVE",
            TemplateStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(TemplateStatus::Draft),
            "ACTIVE" => Ok(TemplateStatus::Active),
            "ARCHIVED" => Ok(TemplateStatus::Archived),
            other => Err(format!("Unknown template status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub patient_id: String,
    pub office_id: Option<String>,
    pub name: String,
    pub status: TemplateStatus,
    pub anchor_date: NaiveDate,
    pub generated_through: Option<NaiveDate>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn generate_id() -> String {
        format!("template::{}", Uuid::new_v4().simple())
    }

    /// First date the next projection run has to cover
    pub fn next_generation_date(&self) -> NaiveDate {
        match self.generated_through {
            Some(watermark) => watermark.succ_opt().unwrap_or(watermark),
            None => self.anchor_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEvent {
    pub id: String,
    pub template_id: String,
    pub week_index: u32,
    pub day_of_week: u8, // 0 = Sunday, 1 = Monday, ..., 6 = Saturday
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub authorization_id: Option<String>,
    pub staff_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub comment: Option<String>,
}

impl TemplateEvent {
    pub fn generate_id() -> String {
        format!("template_event::{}", Uuid::new_v4().simple())
    }

    /// Validate day of week value
    pub fn is_valid_day_of_week(day: u8) -> bool {
        day <= 6
    }
}

/// One slot of the weekly cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateWeek {
    pub week_index: u32,
    pub events: Vec<TemplateEvent>,
}

impl TemplateWeek {
    pub fn events_on(&self, day_of_week: u8) -> impl Iterator<Item = &TemplateEvent> {
        self.events
            .iter()
            .filter(move |event| event.day_of_week == day_of_week)
    }
}

/// A template together with its weeks ordered by week index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetail {
    pub template: Template,
    pub weeks: Vec<TemplateWeek>,
}
