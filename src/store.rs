//! In-memory relational store.
//!
//! All tables live behind one async `RwLock`, so operations spanning several
//! tables (signup creates a user and a doctor, grading may create a patient
//! and a record) check their foreign keys and apply atomically.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    Doctor, DoctorId, DoctorProfile, Gender, Grade, NewDoctor, NewOrganization, NewPatient,
    NewRecord, NewUser, Organization, OrganizationId, OrganizationRecord, Patient, PatientId,
    PatientUpdate, Record, RecordKey, RecordWithPatient, Role, User, UserId,
};

/// Per-grade record counts, indexed by [`Grade::stage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeCounts([usize; 5]);

impl GradeCounts {
    pub fn add(&mut self, grade: Grade) {
        self.0[usize::from(grade.stage())] += 1;
    }

    pub fn get(&self, grade: Grade) -> usize {
        self.0[usize::from(grade.stage())]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Grade, usize)> + '_ {
        Grade::ALL.into_iter().map(|g| (g, self.get(g)))
    }
}

impl FromIterator<Grade> for GradeCounts {
    fn from_iter<I: IntoIterator<Item = Grade>>(iter: I) -> Self {
        let mut counts = Self::default();
        for grade in iter {
            counts.add(grade);
        }
        counts
    }
}

/// Patient search filters; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PatientQuery {
    /// Case-insensitive substring of the patient name.
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

impl PatientQuery {
    pub fn matches(&self, patient: &Patient) -> bool {
        let name_ok = self.name.as_deref().is_none_or(|needle| {
            patient
                .name
                .to_lowercase()
                .contains(&needle.trim().to_lowercase())
        });
        name_ok
            && self.gender.is_none_or(|g| patient.gender == g)
            && self.min_age.is_none_or(|min| patient.age >= min)
            && self.max_age.is_none_or(|max| patient.age <= max)
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Picks a free `LIV-YYYY###` id, probing forward from `start`. Falls back
/// to four digits once the three-digit space for the year is exhausted.
pub fn allocate_record_id(year: i32, start: u32, taken: impl Fn(&str) -> bool) -> Option<String> {
    for (width, space) in [(3usize, 1_000u32), (4, 10_000)] {
        for offset in 0..space {
            let n = (start + offset) % space;
            let candidate = format!("LIV-{year}{n:0width$}");
            if !taken(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[derive(Debug, Default)]
struct Sequence(u64);

impl Sequence {
    fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    users_by_email: HashMap<String, UserId>,
    doctors: BTreeMap<DoctorId, Doctor>,
    organizations: BTreeMap<OrganizationId, Organization>,
    patients: BTreeMap<PatientId, Patient>,
    records: BTreeMap<RecordKey, Record>,
    records_by_public_id: HashMap<String, RecordKey>,
    user_ids: Sequence,
    doctor_ids: Sequence,
    organization_ids: Sequence,
    patient_ids: Sequence,
    record_ids: Sequence,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Tables {
    fn insert_user(&mut self, new_user: NewUser, now: DateTime<Utc>) -> Result<User> {
        let key = email_key(&new_user.email);
        if self.users_by_email.contains_key(&key) {
            return Err(Error::conflict("Email already in use"));
        }
        let id = self.user_ids.next();
        let user = new_user.into_user(id, now);
        self.users_by_email.insert(key, id);
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn insert_doctor(&mut self, new_doctor: NewDoctor, now: DateTime<Utc>) -> Result<Doctor> {
        match self.users.get(&new_doctor.user_id) {
            Some(user) if user.role == Role::Doctor => {}
            Some(_) => return Err(Error::validation("User is not a doctor account")),
            None => return Err(Error::not_found("User")),
        }
        if let Some(org_id) = new_doctor.organization_id {
            if !self.organizations.contains_key(&org_id) {
                return Err(Error::validation("Invalid organization ID"));
            }
        }
        let doctor = Doctor {
            id: self.doctor_ids.next(),
            user_id: new_doctor.user_id,
            organization_id: new_doctor.organization_id,
            created_at: now,
        };
        self.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    fn insert_organization(
        &mut self,
        new_org: NewOrganization,
        now: DateTime<Utc>,
    ) -> Result<Organization> {
        match self.users.get(&new_org.user_id) {
            Some(user) if user.role == Role::Organization => {}
            Some(_) => return Err(Error::validation("User is not an organization account")),
            None => return Err(Error::not_found("User")),
        }
        let organization = Organization {
            id: self.organization_ids.next(),
            name: new_org.name,
            kind: new_org.kind,
            user_id: new_org.user_id,
            created_at: now,
        };
        self.organizations
            .insert(organization.id, organization.clone());
        Ok(organization)
    }

    fn insert_patient(&mut self, new_patient: NewPatient, now: DateTime<Utc>) -> Result<Patient> {
        if let Some(doctor_id) = new_patient.doctor_id {
            if !self.doctors.contains_key(&doctor_id) {
                return Err(Error::not_found("Doctor"));
            }
        }
        let patient = new_patient.into_patient(self.patient_ids.next(), now);
        self.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    fn profile(&self, doctor: &Doctor) -> Option<DoctorProfile> {
        self.users.get(&doctor.user_id).map(|user| DoctorProfile {
            doctor: doctor.clone(),
            user: user.clone(),
        })
    }

    fn patient_by_name(&self, name: &str) -> Option<&Patient> {
        let wanted = name.trim().to_lowercase();
        self.patients
            .values()
            .find(|p| p.name.to_lowercase() == wanted)
    }

    fn organization_doctor_ids(&self, org_id: OrganizationId) -> Vec<DoctorId> {
        self.doctors
            .values()
            .filter(|d| d.organization_id == Some(org_id))
            .map(|d| d.id)
            .collect()
    }

    fn newest_first(records: &mut [Record]) {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    }

    fn roster(&self, org_id: OrganizationId) -> Vec<DoctorProfile> {
        self.doctors
            .values()
            .filter(|d| d.organization_id == Some(org_id))
            .filter_map(|d| self.profile(d))
            .collect()
    }

    fn doctor_records(&self, doctor_id: DoctorId) -> Result<Vec<RecordWithPatient>> {
        let mut records: Vec<Record> = self
            .records
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .cloned()
            .collect();
        Self::newest_first(&mut records);
        records
            .into_iter()
            .map(|record| {
                let patient = self.patients.get(&record.patient_id).cloned().ok_or_else(|| {
                    Error::internal(format!("patient not found for record {}", record.id))
                })?;
                Ok(RecordWithPatient { record, patient })
            })
            .collect()
    }

    fn count_doctor_records_since(&self, doctor_id: DoctorId, since: DateTime<Utc>) -> usize {
        self.records
            .values()
            .filter(|r| r.doctor_id == doctor_id && r.created_at >= since)
            .count()
    }

    fn doctor_grades(&self, doctor_id: DoctorId) -> GradeCounts {
        self.records
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .map(|r| r.grade)
            .collect()
    }

    fn organization_grades(&self, org_id: OrganizationId) -> GradeCounts {
        let doctor_ids = self.organization_doctor_ids(org_id);
        self.records
            .values()
            .filter(|r| doctor_ids.contains(&r.doctor_id))
            .map(|r| r.grade)
            .collect()
    }

    fn organization_record_counts(&self, org_id: OrganizationId) -> Vec<(DoctorId, usize)> {
        self.organization_doctor_ids(org_id)
            .into_iter()
            .map(|doctor_id| {
                let count = self
                    .records
                    .values()
                    .filter(|r| r.doctor_id == doctor_id)
                    .count();
                (doctor_id, count)
            })
            .collect()
    }

    fn count_organization_records_since(
        &self,
        org_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> usize {
        let doctor_ids = self.organization_doctor_ids(org_id);
        self.records
            .values()
            .filter(|r| doctor_ids.contains(&r.doctor_id) && r.created_at >= since)
            .count()
    }
}

/// Figures behind a doctor's dashboard, read under one lock.
#[derive(Debug, Clone)]
pub struct DoctorActivity {
    pub total: usize,
    pub this_month: usize,
    /// Newest first.
    pub records: Vec<RecordWithPatient>,
    pub grades: GradeCounts,
}

/// Figures behind an organization's dashboard, read under one lock.
#[derive(Debug, Clone)]
pub struct OrganizationActivity {
    pub doctors: Vec<DoctorProfile>,
    pub today: usize,
    pub this_month: usize,
    pub record_counts: Vec<(DoctorId, usize)>,
    pub grades: GradeCounts,
}

#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // === Users ===

    pub async fn get_user(&self, id: UserId) -> Option<User> {
        self.inner.read().await.users.get(&id).cloned()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        let tables = self.inner.read().await;
        tables
            .users_by_email
            .get(&email_key(email))
            .and_then(|id| tables.users.get(id))
            .cloned()
    }

    pub async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User> {
        self.inner.write().await.insert_user(new_user, now)
    }

    /// Creates a doctor account (user + doctor row) in one step.
    pub async fn register_doctor(
        &self,
        new_user: NewUser,
        organization_id: Option<OrganizationId>,
        now: DateTime<Utc>,
    ) -> Result<DoctorProfile> {
        let mut tables = self.inner.write().await;
        if let Some(org_id) = organization_id {
            if !tables.organizations.contains_key(&org_id) {
                return Err(Error::validation("Invalid organization ID"));
            }
        }
        let user = tables.insert_user(new_user, now)?;
        let doctor = tables.insert_doctor(
            NewDoctor {
                user_id: user.id,
                organization_id,
            },
            now,
        )?;
        debug!(doctor_id = doctor.id, user_id = user.id, "doctor registered");
        Ok(DoctorProfile { doctor, user })
    }

    /// Creates an organization account (user + organization row) in one step.
    pub async fn register_organization(
        &self,
        new_user: NewUser,
        name: String,
        kind: String,
        now: DateTime<Utc>,
    ) -> Result<(User, Organization)> {
        let mut tables = self.inner.write().await;
        let user = tables.insert_user(new_user, now)?;
        let organization = tables.insert_organization(
            NewOrganization {
                name,
                kind,
                user_id: user.id,
            },
            now,
        )?;
        debug!(organization_id = organization.id, "organization registered");
        Ok((user, organization))
    }

    // === Doctors ===

    pub async fn create_doctor(&self, new_doctor: NewDoctor, now: DateTime<Utc>) -> Result<Doctor> {
        self.inner.write().await.insert_doctor(new_doctor, now)
    }

    pub async fn get_doctor(&self, id: DoctorId) -> Option<Doctor> {
        self.inner.read().await.doctors.get(&id).cloned()
    }

    pub async fn get_doctor_by_user(&self, user_id: UserId) -> Option<Doctor> {
        self.inner
            .read()
            .await
            .doctors
            .values()
            .find(|d| d.user_id == user_id)
            .cloned()
    }

    pub async fn get_doctor_by_email(&self, email: &str) -> Option<DoctorProfile> {
        let tables = self.inner.read().await;
        let user_id = tables.users_by_email.get(&email_key(email))?;
        tables
            .doctors
            .values()
            .find(|d| d.user_id == *user_id)
            .and_then(|d| tables.profile(d))
    }

    pub async fn doctor_profile(&self, id: DoctorId) -> Option<DoctorProfile> {
        let tables = self.inner.read().await;
        tables.doctors.get(&id).and_then(|d| tables.profile(d))
    }

    /// Doctors on an organization's roster, ordered by id.
    pub async fn doctors_by_organization(&self, org_id: OrganizationId) -> Vec<DoctorProfile> {
        self.inner.read().await.roster(org_id)
    }

    /// Takes a doctor off an organization's roster. The doctor and its
    /// records are kept.
    pub async fn detach_doctor(
        &self,
        org_id: OrganizationId,
        doctor_id: DoctorId,
    ) -> Result<DoctorProfile> {
        let mut tables = self.inner.write().await;
        let doctor = tables
            .doctors
            .get_mut(&doctor_id)
            .filter(|d| d.organization_id == Some(org_id))
            .ok_or_else(|| Error::not_found("Doctor"))?;
        doctor.organization_id = None;
        let doctor = doctor.clone();
        tables
            .profile(&doctor)
            .ok_or_else(|| Error::internal(format!("doctor {doctor_id} has no user")))
    }

    // === Organizations ===

    pub async fn create_organization(
        &self,
        new_org: NewOrganization,
        now: DateTime<Utc>,
    ) -> Result<Organization> {
        self.inner.write().await.insert_organization(new_org, now)
    }

    pub async fn get_organization(&self, id: OrganizationId) -> Option<Organization> {
        self.inner.read().await.organizations.get(&id).cloned()
    }

    pub async fn get_organization_by_user(&self, user_id: UserId) -> Option<Organization> {
        self.inner
            .read()
            .await
            .organizations
            .values()
            .find(|o| o.user_id == user_id)
            .cloned()
    }

    pub async fn list_organizations(&self) -> Vec<Organization> {
        self.inner
            .read()
            .await
            .organizations
            .values()
            .cloned()
            .collect()
    }

    // === Patients ===

    pub async fn create_patient(
        &self,
        new_patient: NewPatient,
        now: DateTime<Utc>,
    ) -> Result<Patient> {
        self.inner.write().await.insert_patient(new_patient, now)
    }

    pub async fn get_patient(&self, id: PatientId) -> Option<Patient> {
        self.inner.read().await.patients.get(&id).cloned()
    }

    /// Case-insensitive exact name match.
    pub async fn get_patient_by_name(&self, name: &str) -> Option<Patient> {
        self.inner.read().await.patient_by_name(name).cloned()
    }

    /// Returns the patient with this name, creating it when absent.
    pub async fn find_or_create_patient(
        &self,
        new_patient: NewPatient,
        now: DateTime<Utc>,
    ) -> Result<Patient> {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.patient_by_name(&new_patient.name) {
            return Ok(existing.clone());
        }
        tables.insert_patient(new_patient, now)
    }

    pub async fn update_patient(&self, id: PatientId, update: PatientUpdate) -> Result<Patient> {
        let mut tables = self.inner.write().await;
        let patient = tables
            .patients
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Patient"))?;
        update.apply(patient);
        Ok(patient.clone())
    }

    /// Deletes a patient that no record references.
    pub async fn delete_patient(&self, id: PatientId) -> Result<Patient> {
        let mut tables = self.inner.write().await;
        if !tables.patients.contains_key(&id) {
            return Err(Error::not_found("Patient"));
        }
        if tables.records.values().any(|r| r.patient_id == id) {
            return Err(Error::conflict(
                "Patient has graded records and cannot be deleted",
            ));
        }
        tables
            .patients
            .remove(&id)
            .ok_or_else(|| Error::not_found("Patient"))
    }

    pub async fn assign_patient(&self, patient_id: PatientId, doctor_id: DoctorId) -> Result<Patient> {
        let mut tables = self.inner.write().await;
        if !tables.doctors.contains_key(&doctor_id) {
            return Err(Error::not_found("Doctor"));
        }
        let patient = tables
            .patients
            .get_mut(&patient_id)
            .ok_or_else(|| Error::not_found("Patient"))?;
        patient.doctor_id = Some(doctor_id);
        Ok(patient.clone())
    }

    /// Patients matching `query`, ordered by id.
    pub async fn search_patients(&self, query: &PatientQuery) -> Vec<Patient> {
        self.inner
            .read()
            .await
            .patients
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect()
    }

    // === Records ===

    /// Inserts a record after checking its doctor and patient exist, and
    /// assigns it a fresh `LIV-YYYY###` id.
    pub async fn create_record(&self, new_record: NewRecord, now: DateTime<Utc>) -> Result<Record> {
        let mut tables = self.inner.write().await;
        if !tables.doctors.contains_key(&new_record.doctor_id) {
            return Err(Error::not_found("Doctor"));
        }
        if !tables.patients.contains_key(&new_record.patient_id) {
            return Err(Error::not_found("Patient"));
        }
        let start = rand::thread_rng().gen_range(0..1_000);
        let record_id = allocate_record_id(now.year(), start, |candidate| {
            tables.records_by_public_id.contains_key(candidate)
        })
        .ok_or_else(|| Error::internal(format!("record ids for {} exhausted", now.year())))?;

        let key = tables.record_ids.next();
        let record = new_record.into_record(key, record_id, now);
        tables
            .records_by_public_id
            .insert(record.record_id.clone(), key);
        tables.records.insert(key, record.clone());
        Ok(record)
    }

    pub async fn get_record(&self, key: RecordKey) -> Option<Record> {
        self.inner.read().await.records.get(&key).cloned()
    }

    pub async fn get_record_by_record_id(&self, record_id: &str) -> Option<Record> {
        let tables = self.inner.read().await;
        tables
            .records_by_public_id
            .get(record_id.trim())
            .and_then(|key| tables.records.get(key))
            .cloned()
    }

    /// A doctor's records joined with their patients, newest first.
    pub async fn records_by_doctor(&self, doctor_id: DoctorId) -> Result<Vec<RecordWithPatient>> {
        self.inner.read().await.doctor_records(doctor_id)
    }

    /// Records of every doctor on an organization's roster, newest first.
    pub async fn records_by_organization(
        &self,
        org_id: OrganizationId,
    ) -> Result<Vec<OrganizationRecord>> {
        let tables = self.inner.read().await;
        let doctor_ids = tables.organization_doctor_ids(org_id);
        let mut records: Vec<Record> = tables
            .records
            .values()
            .filter(|r| doctor_ids.contains(&r.doctor_id))
            .cloned()
            .collect();
        Tables::newest_first(&mut records);
        records
            .into_iter()
            .map(|record| {
                let patient = tables.patients.get(&record.patient_id).cloned().ok_or_else(|| {
                    Error::internal(format!("patient not found for record {}", record.id))
                })?;
                let doctor = tables
                    .doctors
                    .get(&record.doctor_id)
                    .and_then(|d| tables.profile(d))
                    .ok_or_else(|| {
                        Error::internal(format!("doctor not found for record {}", record.id))
                    })?;
                Ok(OrganizationRecord {
                    record,
                    patient,
                    doctor,
                })
            })
            .collect()
    }

    /// A patient's records, newest first.
    pub async fn records_by_patient(&self, patient_id: PatientId) -> Vec<Record> {
        let tables = self.inner.read().await;
        let mut records: Vec<Record> = tables
            .records
            .values()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        Tables::newest_first(&mut records);
        records
    }

    // === Aggregates ===

    pub async fn count_records_by_doctor(&self, doctor_id: DoctorId) -> usize {
        self.inner
            .read()
            .await
            .records
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .count()
    }

    pub async fn count_records_by_doctor_since(
        &self,
        doctor_id: DoctorId,
        since: DateTime<Utc>,
    ) -> usize {
        self.inner
            .read()
            .await
            .count_doctor_records_since(doctor_id, since)
    }

    pub async fn count_records_by_grade(&self, doctor_id: DoctorId, grade: Grade) -> usize {
        self.inner.read().await.doctor_grades(doctor_id).get(grade)
    }

    pub async fn grade_distribution_for_doctor(&self, doctor_id: DoctorId) -> GradeCounts {
        self.inner.read().await.doctor_grades(doctor_id)
    }

    pub async fn grade_distribution_for_organization(&self, org_id: OrganizationId) -> GradeCounts {
        self.inner.read().await.organization_grades(org_id)
    }

    /// Record count per rostered doctor, in roster order.
    pub async fn record_counts_by_doctor_in_organization(
        &self,
        org_id: OrganizationId,
    ) -> Vec<(DoctorId, usize)> {
        self.inner.read().await.organization_record_counts(org_id)
    }

    pub async fn count_organization_records_since(
        &self,
        org_id: OrganizationId,
        since: DateTime<Utc>,
    ) -> usize {
        self.inner
            .read()
            .await
            .count_organization_records_since(org_id, since)
    }

    pub async fn doctor_activity(
        &self,
        doctor_id: DoctorId,
        now: DateTime<Utc>,
    ) -> Result<DoctorActivity> {
        let tables = self.inner.read().await;
        let records = tables.doctor_records(doctor_id)?;
        Ok(DoctorActivity {
            total: records.len(),
            this_month: tables.count_doctor_records_since(doctor_id, start_of_month(now)),
            records,
            grades: tables.doctor_grades(doctor_id),
        })
    }

    pub async fn organization_activity(
        &self,
        org_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> OrganizationActivity {
        let tables = self.inner.read().await;
        OrganizationActivity {
            doctors: tables.roster(org_id),
            today: tables.count_organization_records_since(org_id, start_of_day(now)),
            this_month: tables.count_organization_records_since(org_id, start_of_month(now)),
            record_counts: tables.organization_record_counts(org_id),
            grades: tables.organization_grades(org_id),
        }
    }
}
