use chrono::{NaiveDate, NaiveTime};

/// Command to create a template for a patient
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTemplateCommand {
    pub patient_id: String,
    pub name: String,
    pub office_id: Option<String>,
    /// Defaults to today when not given
    pub anchor_date: Option<NaiveDate>,
}

/// Command to add the same visit to several weekdays of one template week
#[derive(Debug, Clone, PartialEq)]
pub struct InsertTemplateEventCommand {
    pub template_id: String,
    pub week_index: u32,
    pub weekdays: Vec<u8>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub authorization_id: Option<String>,
    pub staff_id: Option<String>,
    pub event_code: Option<String>,
    /// Derived from the duration when not given
    pub planned_units: Option<u32>,
    pub comment: Option<String>,
}

/// Result of a projection run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateFromTemplateResult {
    pub created_count: usize,
    pub generated_through: Option<NaiveDate>,
}
