//! External collaborators consulted by the scheduling services.
//!
//! Patient, staff and authorization records are owned by other components of
//! the agency system. The scheduler only reads them through these traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Authorization entitling a patient to a bounded number of service units
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizationInfo {
    pub id: String,
    pub patient_id: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    /// None means the authorization is not capped
    pub remaining_units: Option<u32>,
}

impl AuthorizationInfo {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && date <= self.valid_to
    }
}

#[async_trait]
pub trait AuthorizationLookup: Send + Sync {
    async fn get_authorization(&self, authorization_id: &str) -> Result<Option<AuthorizationInfo>>;
}

/// Existence and display-name lookup for patients and staff
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn patient_name(&self, patient_id: &str) -> Result<Option<String>>;

    async fn staff_name(&self, staff_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub patients: HashMap<String, String>,
    #[serde(default)]
    pub staff: HashMap<String, String>,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationInfo>,
}

/// Directory held in memory, loaded from a YAML seed file.
///
/// In permissive mode unknown patients and staff are accepted under their id
/// and unknown authorizations are treated as open-ended.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    seed: DirectorySeed,
    permissive: bool,
}

impl InMemoryDirectory {
    pub fn new(seed: DirectorySeed) -> Self {
        Self {
            seed,
            permissive: false,
        }
    }

    pub fn permissive() -> Self {
        Self {
            seed: DirectorySeed::default(),
            permissive: true,
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(path)?;
        let seed: DirectorySeed = serde_yaml::from_str(&yaml_content)?;
        tracing::info!(
            "Loaded directory seed from {:?}: {} patients, {} staff, {} authorizations",
            path,
            seed.patients.len(),
            seed.staff.len(),
            seed.authorizations.len()
        );
        Ok(Self::new(seed))
    }

    pub fn with_patient(mut self, id: &str, name: &str) -> Self {
        self.seed.patients.insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_staff(mut self, id: &str, name: &str) -> Self {
        self.seed.staff.insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_authorization(mut self, authorization: AuthorizationInfo) -> Self {
        self.seed.authorizations.push(authorization);
        self
    }
}

#[async_trait]
impl AuthorizationLookup for InMemoryDirectory {
    async fn get_authorization(&self, authorization_id: &str) -> Result<Option<AuthorizationInfo>> {
        let found = self
            .seed
            .authorizations
            .iter()
            .find(|auth| auth.id == authorization_id)
            .cloned();

        Ok(match found {
            Some(auth) => Some(auth),
            None if self.permissive => Some(AuthorizationInfo {
                id: authorization_id.to_string(),
                patient_id: String::new(),
                valid_from: NaiveDate::MIN,
                valid_to: NaiveDate::MAX,
                remaining_units: None,
            }),
            None => None,
        })
    }
}

#[async_trait]
impl PartyDirectory for InMemoryDirectory {
    async fn patient_name(&self, patient_id: &str) -> Result<Option<String>> {
        Ok(match self.seed.patients.get(patient_id) {
            Some(name) => Some(name.clone()),
            None if self.permissive => Some(patient_id.to_string()),
            None => None,
        })
    }

    async fn staff_name(&self, staff_id: &str) -> Result<Option<String>> {
        Ok(match self.seed.staff.get(staff_id) {
            Some(name) => Some(name.clone()),
            None if self.permissive => Some(staff_id.to_string()),
            None => None,
        })
    }
}
