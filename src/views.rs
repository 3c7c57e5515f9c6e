//! Response payloads.
//!
//! Handlers never serialize store types with joins directly; they go
//! through the shapes below, which carry the client-facing identifiers and
//! date formatting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    DoctorProfile, Gender, Grade, Organization, OrganizationRecord, Patient, Record, RecordKey,
    RecordWithPatient, Role, User,
};
use crate::store::GradeCounts;

/// Mock accuracy figure shown on the doctor dashboard.
pub const DOCTOR_ACCURACY: f64 = 94.2;
const RECENT_RECORDS: usize = 10;

/// "May 5, 2024".
pub fn us_long_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// Rounds half up, like `Math.round`.
pub fn js_round(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

pub fn grade_color(grade: Grade) -> &'static str {
    match grade {
        Grade::F0 => "#3b82f6",
        Grade::F1 => "#22c55e",
        Grade::F2 => "#eab308",
        Grade::F3 => "#f97316",
        Grade::F4 => "#ef4444",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeSlice {
    pub name: Grade,
    pub value: usize,
    pub color: &'static str,
}

pub fn grade_distribution(counts: &GradeCounts) -> Vec<GradeSlice> {
    counts
        .iter()
        .map(|(grade, value)| GradeSlice {
            name: grade,
            value,
            color: grade_color(grade),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: u64,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.full_name(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationSummary {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&Organization> for OrganizationSummary {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id,
            name: org.name.clone(),
            kind: org.kind.clone(),
        }
    }
}

/// A doctor as shown on rosters and listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub specialization: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
}

impl DoctorView {
    pub fn new(profile: &DoctorProfile) -> Self {
        Self {
            id: profile.display_id(),
            name: profile.display_name(),
            email: profile.user.email.clone(),
            specialization: profile.specialization().to_string(),
            organization_id: profile.doctor.organization_id,
            record_count: None,
        }
    }

    pub fn with_record_count(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    /// The public `LIV-` id.
    pub id: String,
    pub patient_name: String,
    pub date: String,
    pub grade: Grade,
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
}

impl RecordSummary {
    pub fn new(record: &Record, patient: &Patient) -> Self {
        Self {
            id: record.record_id.clone(),
            patient_name: patient.name.clone(),
            date: us_long_date(record.created_at),
            grade: record.grade,
            confidence: record.confidence,
            doctor_name: None,
        }
    }
}

impl From<&RecordWithPatient> for RecordSummary {
    fn from(row: &RecordWithPatient) -> Self {
        Self::new(&row.record, &row.patient)
    }
}

impl From<&OrganizationRecord> for RecordSummary {
    fn from(row: &OrganizationRecord) -> Self {
        Self {
            doctor_name: Some(row.doctor.display_name()),
            ..Self::new(&row.record, &row.patient)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientInfo {
    /// The record id the patient info belongs to.
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub date: String,
}

impl PatientInfo {
    pub fn new(record: &Record, patient: &Patient) -> Self {
        Self {
            id: record.record_id.clone(),
            name: patient.name.clone(),
            age: patient.age,
            gender: patient.gender,
            date: us_long_date(record.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Fibrosis {
    pub grade: Grade,
    pub confidence: u8,
}

impl From<&Record> for Fibrosis {
    fn from(record: &Record) -> Self {
        Self {
            grade: record.grade,
            confidence: record.confidence,
        }
    }
}

/// Answer to a grade submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub patient_info: PatientInfo,
    pub fibrosis: Fibrosis,
    pub analysis: Vec<String>,
    pub record_id: String,
}

impl GradeResult {
    pub fn new(record: &Record, patient: &Patient) -> Self {
        Self {
            patient_info: PatientInfo::new(record, patient),
            fibrosis: Fibrosis::from(record),
            analysis: record.analysis.clone(),
            record_id: record.record_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetail {
    pub id: RecordKey,
    pub record_id: String,
    pub patient_info: PatientInfo,
    pub fibrosis: Fibrosis,
    pub analysis: Vec<String>,
    pub doctor: Option<DoctorView>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl RecordDetail {
    pub fn new(record: &Record, patient: &Patient, doctor: Option<&DoctorProfile>) -> Self {
        Self {
            id: record.id,
            record_id: record.record_id.clone(),
            patient_info: PatientInfo::new(record, patient),
            fibrosis: Fibrosis::from(record),
            analysis: record.analysis.clone(),
            doctor: doctor.map(DoctorView::new),
            image_url: format!("/api/records/{}/image", record.record_id),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorStats {
    pub total_records: usize,
    pub total_change: String,
    pub monthly_records: usize,
    pub monthly_change: String,
    pub accuracy: f64,
    pub accuracy_change: String,
}

impl DoctorStats {
    pub fn new(total_records: usize, monthly_records: usize) -> Self {
        Self {
            total_records,
            total_change: format!("+{} from last month", js_round(total_records as f64 * 0.1)),
            monthly_records,
            monthly_change: format!(
                "+{} from previous month",
                js_round(monthly_records as f64 * 0.2)
            ),
            accuracy: DOCTOR_ACCURACY,
            accuracy_change: "+1.3% from last month".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorDashboard {
    pub stats: DoctorStats,
    pub recent_records: Vec<RecordSummary>,
    pub grade_distribution: Vec<GradeSlice>,
}

impl DoctorDashboard {
    /// `records` must already be newest first.
    pub fn new(
        total_records: usize,
        monthly_records: usize,
        records: &[RecordWithPatient],
        counts: &GradeCounts,
    ) -> Self {
        Self {
            stats: DoctorStats::new(total_records, monthly_records),
            recent_records: records.iter().take(RECENT_RECORDS).map(RecordSummary::from).collect(),
            grade_distribution: grade_distribution(counts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationStats {
    pub total_doctors: usize,
    pub doctors_change: String,
    pub total_records_today: usize,
    pub records_today_change: String,
    pub total_records_month: usize,
    pub records_month_change: String,
}

impl OrganizationStats {
    pub fn new(total_doctors: usize, today: usize, month: usize) -> Self {
        Self {
            total_doctors,
            doctors_change: "+2 from last month".to_string(),
            total_records_today: today,
            records_today_change: format!("+{} from yesterday", js_round(today as f64 * 0.2)),
            total_records_month: month,
            records_month_change: format!("+{} from last month", js_round(month as f64 * 0.1)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDashboard {
    pub stats: OrganizationStats,
    pub doctors: Vec<DoctorView>,
    pub grade_distribution: Vec<GradeSlice>,
}

/// Roster entries paired with per-doctor record counts; doctors missing
/// from `counts` get zero.
pub fn roster(doctors: &[DoctorProfile], counts: &[(u64, usize)]) -> Vec<DoctorView> {
    doctors
        .iter()
        .map(|profile| {
            let count = counts
                .iter()
                .find(|(id, _)| *id == profile.doctor.id)
                .map_or(0, |(_, n)| *n);
            DoctorView::new(profile).with_record_count(count)
        })
        .collect()
}
