use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::info;

use super::Caller;
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::models::{NewPatient, PatientId};
use crate::schema::{ListQuery, PatientInput, PatientPatch, PatientSearchQuery};
use crate::store::{PatientQuery, Store};
use crate::views::RecordSummary;

pub async fn list(
    _session: Session,
    store: web::Data<Store>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page()?;
    let patients = store
        .search_patients(&PatientQuery {
            name: query.search_term(),
            ..PatientQuery::default()
        })
        .await;
    let (items, info) = page.apply(patients);
    Ok(super::paged(items, info))
}

pub async fn search(
    _session: Session,
    store: web::Data<Store>,
    query: web::Query<PatientSearchQuery>,
) -> Result<HttpResponse> {
    query.validate()?;
    let filter = PatientQuery {
        name: query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        gender: query.gender()?,
        min_age: query.min_age,
        max_age: query.max_age,
    };
    Ok(super::ok(store.search_patients(&filter).await))
}

pub async fn get(
    _session: Session,
    store: web::Data<Store>,
    path: web::Path<PatientId>,
) -> Result<HttpResponse> {
    let patient = store
        .get_patient(path.into_inner())
        .await
        .ok_or_else(|| Error::not_found("Patient"))?;
    Ok(super::ok(patient))
}

pub async fn create(
    session: Session,
    store: web::Data<Store>,
    body: web::Json<PatientInput>,
) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;
    let (name, age, gender) = body.into_inner().validate()?;

    let patient = store
        .create_patient(
            NewPatient {
                name,
                age,
                gender,
                doctor_id: Some(profile.doctor.id),
            },
            Utc::now(),
        )
        .await?;
    info!(patient_id = patient.id, doctor_id = profile.doctor.id, "patient created");
    Ok(super::created(patient))
}

pub async fn update(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<PatientId>,
    body: web::Json<PatientPatch>,
) -> Result<HttpResponse> {
    session.require_doctor(&store).await?;
    let update = body.into_inner().validate()?;
    let patient = store.update_patient(path.into_inner(), update).await?;
    Ok(super::ok(patient))
}

pub async fn delete(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<PatientId>,
) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;
    let patient = store.delete_patient(path.into_inner()).await?;
    info!(patient_id = patient.id, doctor_id = profile.doctor.id, "patient deleted");
    Ok(super::message("Patient deleted successfully"))
}

/// The patient's records the caller is allowed to see.
pub async fn records(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<PatientId>,
) -> Result<HttpResponse> {
    let caller = Caller::resolve(&session, &store).await?;
    let patient = store
        .get_patient(path.into_inner())
        .await
        .ok_or_else(|| Error::not_found("Patient"))?;

    let mut visible = Vec::new();
    for record in store.records_by_patient(patient.id).await {
        if caller.can_see(&store, &record).await {
            visible.push(RecordSummary::new(&record, &patient));
        }
    }
    Ok(super::ok(visible))
}
