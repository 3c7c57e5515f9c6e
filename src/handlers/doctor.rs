use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::info;

use super::Caller;
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::models::RecordWithPatient;
use crate::schema::{AssignPatientRequest, ListQuery};
use crate::store::Store;
use crate::views::{DoctorDashboard, DoctorView, RecordDetail, RecordSummary, roster};

pub async fn dashboard(session: Session, store: web::Data<Store>) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;
    let activity = store.doctor_activity(profile.doctor.id, Utc::now()).await?;

    Ok(super::ok(DoctorDashboard::new(
        activity.total,
        activity.this_month,
        &activity.records,
        &activity.grades,
    )))
}

fn matches_search(row: &RecordWithPatient, term: &str) -> bool {
    let term = term.to_lowercase();
    row.patient.name.to_lowercase().contains(&term)
        || row.record.record_id.to_lowercase().contains(&term)
}

pub async fn records(
    session: Session,
    store: web::Data<Store>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;
    let page = query.page()?;
    let search = query.search_term();

    let summaries: Vec<RecordSummary> = store
        .records_by_doctor(profile.doctor.id)
        .await?
        .iter()
        .filter(|row| search.as_deref().is_none_or(|term| matches_search(row, term)))
        .map(RecordSummary::from)
        .collect();

    let (items, info) = page.apply(summaries);
    Ok(super::paged(items, info))
}

pub async fn record(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;
    let record = store
        .get_record_by_record_id(&path)
        .await
        .ok_or_else(|| Error::not_found("Record"))?;
    if record.doctor_id != profile.doctor.id {
        return Err(Error::forbidden("Access denied"));
    }
    let patient = store
        .get_patient(record.patient_id)
        .await
        .ok_or_else(|| Error::not_found("Patient"))?;

    Ok(super::ok(RecordDetail::new(&record, &patient, Some(&profile))))
}

/// Organizations get their roster; doctors get their colleagues, or just
/// themselves when unaffiliated.
pub async fn all(session: Session, store: web::Data<Store>) -> Result<HttpResponse> {
    let organization_id = match Caller::resolve(&session, &store).await? {
        Caller::Organization(org) => org.id,
        Caller::Doctor(profile) => match profile.doctor.organization_id {
            Some(org_id) => org_id,
            None => {
                let count = store.count_records_by_doctor(profile.doctor.id).await;
                return Ok(super::ok(vec![
                    DoctorView::new(&profile).with_record_count(count),
                ]));
            }
        },
    };

    let doctors = store.doctors_by_organization(organization_id).await;
    let counts = store
        .record_counts_by_doctor_in_organization(organization_id)
        .await;
    Ok(super::ok(roster(&doctors, &counts)))
}

pub async fn assign_patient(
    session: Session,
    store: web::Data<Store>,
    body: web::Json<AssignPatientRequest>,
) -> Result<HttpResponse> {
    let (doctor_id, patient_id) = body.validate()?;
    let target = store
        .get_doctor(doctor_id)
        .await
        .ok_or_else(|| Error::not_found("Doctor"))?;

    let allowed = match Caller::resolve(&session, &store).await? {
        Caller::Doctor(profile) => {
            target.id == profile.doctor.id
                || (profile.doctor.organization_id.is_some()
                    && target.organization_id == profile.doctor.organization_id)
        }
        Caller::Organization(org) => target.organization_id == Some(org.id),
    };
    if !allowed {
        return Err(Error::forbidden("Doctor is outside your organization"));
    }

    let patient = store.assign_patient(patient_id, target.id).await?;
    info!(patient_id, doctor_id = target.id, "patient assigned");
    Ok(super::ok(patient))
}
