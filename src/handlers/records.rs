use actix_web::{HttpResponse, web};

use super::Caller;
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::models::Record;
use crate::schema::ListQuery;
use crate::store::Store;
use crate::uploads::{ImageVault, content_type_for};
use crate::views::{RecordDetail, RecordSummary};

async fn visible_record(session: &Session, store: &Store, record_id: &str) -> Result<Record> {
    let caller = Caller::resolve(session, store).await?;
    let record = store
        .get_record_by_record_id(record_id)
        .await
        .ok_or_else(|| Error::not_found("Record"))?;
    caller.ensure_can_see(store, &record).await?;
    Ok(record)
}

/// Doctors list their own records; organizations list those of their
/// roster.
pub async fn list(
    session: Session,
    store: web::Data<Store>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page()?;
    let summaries: Vec<RecordSummary> = match Caller::resolve(&session, &store).await? {
        Caller::Doctor(profile) => store
            .records_by_doctor(profile.doctor.id)
            .await?
            .iter()
            .map(RecordSummary::from)
            .collect(),
        Caller::Organization(org) => store
            .records_by_organization(org.id)
            .await?
            .iter()
            .map(RecordSummary::from)
            .collect(),
    };

    let summaries = match query.search_term() {
        Some(term) => {
            let term = term.to_lowercase();
            summaries
                .into_iter()
                .filter(|s| {
                    s.patient_name.to_lowercase().contains(&term)
                        || s.id.to_lowercase().contains(&term)
                })
                .collect()
        }
        None => summaries,
    };

    let (items, info) = page.apply(summaries);
    Ok(super::paged(items, info))
}

pub async fn detail(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let record = visible_record(&session, &store, &path).await?;
    let patient = store
        .get_patient(record.patient_id)
        .await
        .ok_or_else(|| Error::not_found("Patient"))?;
    let doctor = store.doctor_profile(record.doctor_id).await;

    Ok(super::ok(RecordDetail::new(&record, &patient, doctor.as_ref())))
}

/// The decrypted ultrasound image of a record.
pub async fn image(
    session: Session,
    store: web::Data<Store>,
    vault: web::Data<ImageVault>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let record = visible_record(&session, &store, &path).await?;
    let bytes = vault.load(&record.image_path).await?;
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&record.image_path))
        .body(bytes))
}
