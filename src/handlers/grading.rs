use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::info;

use crate::auth::Session;
use crate::config::Settings;
use crate::error::Result;
use crate::grading::{Grader, analysis_for};
use crate::models::{NewPatient, NewRecord};
use crate::store::Store;
use crate::uploads::{ImageVault, read_grade_form};
use crate::views::GradeResult;

/// Grades an uploaded ultrasound image.
///
/// The patient is looked up by name (case-insensitive) and created when
/// unknown. The image is sealed to disk before the record is written and
/// discarded again if the record cannot be saved.
pub async fn grade(
    session: Session,
    store: web::Data<Store>,
    vault: web::Data<ImageVault>,
    grader: web::Data<dyn Grader>,
    settings: web::Data<Settings>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let profile = session.require_doctor(&store).await?;

    let mut submission = read_grade_form(payload, settings.uploads.max_bytes).await?;
    let image = submission.require_image()?;
    let (name, age, gender) = submission.form.validate()?;

    let assessment = grader.assess(&image.bytes);
    let stored = vault.store(image.bytes, image.file_name.as_deref()).await?;

    let now = Utc::now();
    let patient = store
        .find_or_create_patient(
            NewPatient {
                name,
                age,
                gender,
                doctor_id: Some(profile.doctor.id),
            },
            now,
        )
        .await?;
    let record = store
        .create_record(
            NewRecord {
                patient_id: patient.id,
                doctor_id: profile.doctor.id,
                grade: assessment.grade,
                confidence: assessment.confidence,
                image_path: stored.file_name().to_string(),
                analysis: analysis_for(assessment.grade),
            },
            now,
        )
        .await?;
    stored.keep();

    info!(
        record_id = %record.record_id,
        doctor_id = profile.doctor.id,
        patient_id = patient.id,
        grade = %record.grade,
        "image graded"
    );
    Ok(super::ok(GradeResult::new(&record, &patient)))
}
