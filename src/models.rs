//! Domain entities held by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub type UserId = u64;
pub type DoctorId = u64;
pub type OrganizationId = u64;
pub type PatientId = u64;
pub type RecordKey = u64;

/// Account role. Every user is exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Organization,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Organization => "organization",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(Error::validation("Gender must be one of male, female, other")),
        }
    }
}

/// Metavir fibrosis grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    F0,
    F1,
    F2,
    F3,
    F4,
}

impl Grade {
    pub const ALL: [Grade; 5] = [Grade::F0, Grade::F1, Grade::F2, Grade::F3, Grade::F4];

    /// Numeric stage, 0 through 4.
    pub fn stage(self) -> u8 {
        match self {
            Self::F0 => 0,
            Self::F1 => 1,
            Self::F2 => 2,
            Self::F3 => 3,
            Self::F4 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::F0 => "F0",
            Self::F1 => "F1",
            Self::F2 => "F2",
            Self::F3 => "F3",
            Self::F4 => "F4",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::validation(format!("Unknown fibrosis grade '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialization: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last", trimmed; empty when neither name is set.
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialization: Option<String>,
    pub role: Role,
}

impl NewUser {
    pub fn into_user(self, id: UserId, created_at: DateTime<Utc>) -> User {
        User {
            id,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            specialization: self.specialization,
            role: self.role,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub kind: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: DoctorId,
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
}

/// A doctor joined with its user account.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorProfile {
    pub doctor: Doctor,
    pub user: User,
}

impl DoctorProfile {
    /// Client-facing id such as `DOC-007`.
    pub fn display_id(&self) -> String {
        doctor_display_id(self.doctor.id)
    }

    /// "Dr. First Last".
    pub fn display_name(&self) -> String {
        format!("Dr. {}", self.user.full_name())
    }

    pub fn specialization(&self) -> &str {
        match self.user.specialization.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => "General",
        }
    }
}

pub fn doctor_display_id(id: DoctorId) -> String {
    format!("DOC-{id:03}")
}

/// Parses `DOC-007`, `doc-7` or a bare `7`.
pub fn parse_doctor_id(input: &str) -> Option<DoctorId> {
    let input = input.trim();
    let digits = match input.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("DOC-") => &input[4..],
        _ => input,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub doctor_id: Option<DoctorId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub doctor_id: Option<DoctorId>,
}

impl NewPatient {
    pub fn into_patient(self, id: PatientId, created_at: DateTime<Utc>) -> Patient {
        Patient {
            id,
            name: self.name,
            age: self.age,
            gender: self.gender,
            doctor_id: self.doctor_id,
            created_at,
        }
    }
}

/// Partial patient update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
}

impl PatientUpdate {
    pub fn apply(self, patient: &mut Patient) {
        if let Some(name) = self.name {
            patient.name = name;
        }
        if let Some(age) = self.age {
            patient.age = age;
        }
        if let Some(gender) = self.gender {
            patient.gender = gender;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordKey,
    pub record_id: String,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub grade: Grade,
    pub confidence: u8,
    pub image_path: String,
    pub analysis: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub grade: Grade,
    pub confidence: u8,
    pub image_path: String,
    pub analysis: Vec<String>,
}

impl NewRecord {
    pub fn into_record(self, id: RecordKey, record_id: String, created_at: DateTime<Utc>) -> Record {
        Record {
            id,
            record_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            grade: self.grade,
            confidence: self.confidence,
            image_path: self.image_path,
            analysis: self.analysis,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordWithPatient {
    pub record: Record,
    pub patient: Patient,
}

#[derive(Debug, Clone)]
pub struct OrganizationRecord {
    pub record: Record,
    pub patient: Patient,
    pub doctor: DoctorProfile,
}
