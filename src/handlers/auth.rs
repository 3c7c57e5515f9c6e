use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::auth::{AuthService, Session};
use crate::error::{Error, Result};
use crate::models::{NewUser, Role};
use crate::schema::{DoctorSignup, LoginRequest, OrganizationSignup};
use crate::store::Store;
use crate::views::{DoctorView, OrganizationSummary, UserView};

pub async fn login(
    store: web::Data<Store>,
    auth: web::Data<AuthService>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    body.validate()?;

    let (user, token) = auth.login(&store, &body.email, &body.password).await?;
    Ok(HttpResponse::Ok()
        .cookie(auth.session_cookie(&token))
        .json(json!({
            "success": true,
            "data": UserView::from(&user),
            "token": token,
        })))
}

pub async fn logout(session: Session, auth: web::Data<AuthService>) -> HttpResponse {
    auth.revoke(&session.claims, Utc::now()).await;
    info!(user_id = session.user_id(), "user logged out");
    HttpResponse::Ok()
        .cookie(auth.removal_cookie())
        .json(json!({ "success": true, "message": "Logged out successfully" }))
}

pub async fn me(session: Session, store: web::Data<Store>) -> Result<HttpResponse> {
    let user = store
        .get_user(session.user_id())
        .await
        .ok_or_else(|| Error::not_found("User"))?;
    Ok(super::ok(UserView::from(&user)))
}

pub async fn signup_doctor(
    store: web::Data<Store>,
    auth: web::Data<AuthService>,
    body: web::Json<DoctorSignup>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    body.validate()?;

    let now = Utc::now();
    let organization_id = body.organization();
    let new_user = NewUser {
        email: body.email.trim().to_string(),
        password_hash: auth.hash_password(&body.password)?,
        first_name: Some(body.first_name.trim().to_string()),
        last_name: Some(body.last_name.trim().to_string()),
        specialization: body.specialization,
        role: Role::Doctor,
    };
    let profile = store.register_doctor(new_user, organization_id, now).await?;
    let (token, _) = auth.issue_token(&profile.user, now)?;
    info!(doctor_id = profile.doctor.id, ?organization_id, "doctor signed up");

    Ok(HttpResponse::Created()
        .cookie(auth.session_cookie(&token))
        .json(json!({
            "success": true,
            "message": "Doctor account created successfully",
            "data": DoctorView::new(&profile),
            "token": token,
        })))
}

pub async fn signup_organization(
    store: web::Data<Store>,
    auth: web::Data<AuthService>,
    body: web::Json<OrganizationSignup>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    body.validate()?;

    let now = Utc::now();
    let new_user = NewUser {
        email: body.email.trim().to_string(),
        password_hash: auth.hash_password(&body.password)?,
        first_name: None,
        last_name: None,
        specialization: None,
        role: Role::Organization,
    };
    let (user, organization) = store
        .register_organization(
            new_user,
            body.name.trim().to_string(),
            body.kind.trim().to_string(),
            now,
        )
        .await?;
    let (token, _) = auth.issue_token(&user, now)?;
    info!(organization_id = organization.id, "organization signed up");

    Ok(HttpResponse::Created()
        .cookie(auth.session_cookie(&token))
        .json(json!({
            "success": true,
            "message": "Organization account created successfully",
            "data": OrganizationSummary::from(&organization),
            "token": token,
        })))
}
