//! Request schemas and their validation rules.
//!
//! Every body the API accepts is deserialized into one of these types and
//! then checked with `validate`, which turns loose client input into the
//! typed values the store expects.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Gender, PatientUpdate, parse_doctor_id};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

const MIN_PASSWORD: usize = 6;
const MIN_NAME: usize = 2;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

fn check_email(email: &str) -> Result<()> {
    if EMAIL.is_match(email.trim()) {
        Ok(())
    } else {
        Err(Error::validation("Invalid input: email must be a valid email address"))
    }
}

fn check_min(field: &str, value: &str, min: usize) -> Result<()> {
    if value.trim().chars().count() >= min {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Invalid input: {field} must be at least {min} characters"
        )))
    }
}

fn check_age(age: i64) -> Result<u32> {
    u32::try_from(age)
        .ok()
        .filter(|a| *a > 0)
        .ok_or_else(|| Error::validation("Invalid input: age must be a positive integer"))
}

/// An id sent either as a JSON number or a string (`"7"`, `"DOC-007"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IdInput {
    Number(u64),
    Text(String),
}

impl IdInput {
    pub fn as_doctor_id(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_doctor_id(s),
        }
    }

    pub fn as_plain_id(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<()> {
        check_email(&self.email)?;
        if self.password.is_empty() {
            return Err(Error::validation("Invalid input: password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSignup {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub organization_id: Option<IdInput>,
}

fn check_doctor_account(email: &str, password: &str, first: &str, last: &str) -> Result<()> {
    check_email(email)?;
    check_min("password", password, MIN_PASSWORD)?;
    check_min("firstName", first, MIN_NAME)?;
    check_min("lastName", last, MIN_NAME)
}

impl DoctorSignup {
    pub fn validate(&self) -> Result<()> {
        check_doctor_account(&self.email, &self.password, &self.first_name, &self.last_name)?;
        if let Some(org) = &self.organization_id {
            if org.as_plain_id().is_none() {
                return Err(Error::validation("Invalid organization ID"));
            }
        }
        Ok(())
    }

    pub fn organization(&self) -> Option<u64> {
        self.organization_id.as_ref().and_then(IdInput::as_plain_id)
    }
}

/// Body of `POST /api/organization/doctors`. The new doctor always joins
/// the caller's organization, so no organization field is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDoctorRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl AddDoctorRequest {
    pub fn validate(&self) -> Result<()> {
        check_doctor_account(&self.email, &self.password, &self.first_name, &self.last_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationSignup {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OrganizationSignup {
    pub fn validate(&self) -> Result<()> {
        check_email(&self.email)?;
        check_min("password", &self.password, MIN_PASSWORD)?;
        check_min("name", &self.name, MIN_NAME)?;
        check_min("type", &self.kind, MIN_NAME)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientInput {
    pub name: String,
    pub age: i64,
    pub gender: Gender,
}

impl PatientInput {
    /// Validated `(name, age, gender)`.
    pub fn validate(self) -> Result<(String, u32, Gender)> {
        check_min("name", &self.name, MIN_NAME)?;
        let age = check_age(self.age)?;
        Ok((self.name.trim().to_string(), age, self.gender))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl PatientPatch {
    pub fn validate(self) -> Result<PatientUpdate> {
        if let Some(name) = &self.name {
            check_min("name", name, MIN_NAME)?;
        }
        let age = self.age.map(check_age).transpose()?;
        Ok(PatientUpdate {
            name: self.name.map(|n| n.trim().to_string()),
            age,
            gender: self.gender,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPatientRequest {
    pub doctor_id: IdInput,
    pub patient_id: IdInput,
}

impl AssignPatientRequest {
    /// Validated `(doctor_id, patient_id)`.
    pub fn validate(&self) -> Result<(u64, u64)> {
        let doctor = self
            .doctor_id
            .as_doctor_id()
            .ok_or_else(|| Error::validation("Invalid doctor ID format"))?;
        let patient = self
            .patient_id
            .as_plain_id()
            .ok_or_else(|| Error::validation("Invalid patient ID"))?;
        Ok((doctor, patient))
    }
}

/// Text fields of the multipart grade form.
#[derive(Debug, Clone, Default)]
pub struct GradeForm {
    pub patient_name: Option<String>,
    pub patient_age: Option<String>,
    pub patient_gender: Option<String>,
}

impl GradeForm {
    /// Validated `(name, age, gender)`.
    pub fn validate(&self) -> Result<(String, u32, Gender)> {
        let (Some(name), Some(age), Some(gender)) = (
            self.patient_name.as_deref().filter(|s| !s.trim().is_empty()),
            self.patient_age.as_deref().filter(|s| !s.trim().is_empty()),
            self.patient_gender.as_deref().filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(Error::validation("Missing patient information"));
        };
        check_min("patientName", name, MIN_NAME)?;
        let age = age
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::validation("Age must be a number"))
            .and_then(check_age)?;
        let gender = gender.parse::<Gender>()?;
        Ok((name.trim().to_string(), age, gender))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> Result<PageRequest> {
        PageRequest::new(self.page, self.limit)
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSearchQuery {
    pub q: Option<String>,
    pub gender: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

impl PatientSearchQuery {
    pub fn gender(&self) -> Result<Option<Gender>> {
        self.gender
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .map(str::parse)
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return Err(Error::validation("minAge must not exceed maxAge"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Result<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(Error::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, limit })
    }

    /// Slices out the requested page.
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, PageInfo) {
        let total = items.len();
        let info = PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(self.limit),
        };
        let page = items
            .into_iter()
            .skip((self.page - 1).saturating_mul(self.limit))
            .take(self.limit)
            .collect();
        (page, info)
    }
}
