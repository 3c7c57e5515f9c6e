//! HTTP handlers.
//!
//! Every handler returns `Result<HttpResponse>`; failures render through
//! [`Error`]'s `ResponseError` impl. Successful bodies share the envelope
//! `{"success": true, ...}`.

pub mod auth;
pub mod doctor;
pub mod grading;
pub mod organization;
pub mod patients;
pub mod records;

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::auth::Session;
use crate::error::{Error, Result};
use crate::models::{DoctorProfile, Organization, Record, Role};
use crate::schema::PageInfo;
use crate::store::Store;

pub(crate) fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

pub(crate) fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data }))
}

pub(crate) fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}

pub(crate) fn paged<T: Serialize>(items: Vec<T>, pagination: PageInfo) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "data": items,
        "pagination": pagination,
    }))
}

/// Who is calling, resolved to the doctor or organization row.
pub(crate) enum Caller {
    Doctor(DoctorProfile),
    Organization(Organization),
}

impl Caller {
    pub(crate) async fn resolve(session: &Session, store: &Store) -> Result<Self> {
        match session.role() {
            Role::Doctor => session.require_doctor(store).await.map(Self::Doctor),
            Role::Organization => session
                .require_organization(store)
                .await
                .map(Self::Organization),
        }
    }

    /// Doctors see their own records; organizations see records of the
    /// doctors currently on their roster.
    pub(crate) async fn can_see(&self, store: &Store, record: &Record) -> bool {
        match self {
            Self::Doctor(profile) => record.doctor_id == profile.doctor.id,
            Self::Organization(org) => store
                .get_doctor(record.doctor_id)
                .await
                .is_some_and(|d| d.organization_id == Some(org.id)),
        }
    }

    pub(crate) async fn ensure_can_see(&self, store: &Store, record: &Record) -> Result<()> {
        if self.can_see(store, record).await {
            Ok(())
        } else {
            Err(Error::forbidden("Access denied"))
        }
    }
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "LivSafe API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "auth": "/api/auth",
            "doctor": "/api/doctor",
            "organization": "/api/organization",
            "patients": "/api/patients",
            "records": "/api/records",
            "grade": "/api/grade",
        },
    }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "LivSafe API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Fallback for unknown paths and unsupported methods.
pub async fn not_found() -> Result<HttpResponse> {
    Err(Error::not_found("Route"))
}

pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::validation(format!("Invalid input: {err}")).into()
}

pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::validation(format!("Invalid query: {err}")).into()
}

pub fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    Error::validation(format!("Invalid path: {err}")).into()
}
