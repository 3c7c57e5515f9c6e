use actix_web::{HttpResponse, web};
use chrono::Utc;
use tracing::info;

use crate::auth::{AuthService, Session};
use crate::error::{Error, Result};
use crate::models::{NewUser, Role, parse_doctor_id};
use crate::schema::AddDoctorRequest;
use crate::store::Store;
use crate::views::{
    DoctorView, OrganizationDashboard, OrganizationStats, OrganizationSummary, grade_distribution,
    roster,
};

pub async fn dashboard(session: Session, store: web::Data<Store>) -> Result<HttpResponse> {
    let org = session.require_organization(&store).await?;
    let activity = store.organization_activity(org.id, Utc::now()).await;

    Ok(super::ok(OrganizationDashboard {
        stats: OrganizationStats::new(activity.doctors.len(), activity.today, activity.this_month),
        doctors: roster(&activity.doctors, &activity.record_counts),
        grade_distribution: grade_distribution(&activity.grades),
    }))
}

pub async fn doctors(session: Session, store: web::Data<Store>) -> Result<HttpResponse> {
    let org = session.require_organization(&store).await?;
    let doctors = store.doctors_by_organization(org.id).await;
    let counts = store.record_counts_by_doctor_in_organization(org.id).await;
    Ok(super::ok(roster(&doctors, &counts)))
}

/// Creates a doctor account already on the caller's roster.
pub async fn add_doctor(
    session: Session,
    store: web::Data<Store>,
    auth: web::Data<AuthService>,
    body: web::Json<AddDoctorRequest>,
) -> Result<HttpResponse> {
    let org = session.require_organization(&store).await?;
    let body = body.into_inner();
    body.validate()?;

    let new_user = NewUser {
        email: body.email.trim().to_string(),
        password_hash: auth.hash_password(&body.password)?,
        first_name: Some(body.first_name.trim().to_string()),
        last_name: Some(body.last_name.trim().to_string()),
        specialization: body.specialization,
        role: Role::Doctor,
    };
    let profile = store
        .register_doctor(new_user, Some(org.id), Utc::now())
        .await?;
    info!(organization_id = org.id, doctor_id = profile.doctor.id, "doctor added to roster");

    Ok(super::created(DoctorView::new(&profile).with_record_count(0)))
}

/// Takes a doctor (`DOC-###` or numeric id) off the caller's roster.
pub async fn remove_doctor(
    session: Session,
    store: web::Data<Store>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let org = session.require_organization(&store).await?;
    let doctor_id =
        parse_doctor_id(&path).ok_or_else(|| Error::validation("Invalid doctor ID format"))?;

    let profile = store.detach_doctor(org.id, doctor_id).await?;
    info!(organization_id = org.id, doctor = %profile.display_id(), "doctor removed from roster");
    Ok(super::message("Doctor removed successfully"))
}

pub async fn all(store: web::Data<Store>) -> HttpResponse {
    let organizations: Vec<OrganizationSummary> = store
        .list_organizations()
        .await
        .iter()
        .map(OrganizationSummary::from)
        .collect();
    super::ok(organizations)
}
