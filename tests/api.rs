//! End-to-end tests against the full route table.

use std::path::Path;
use std::sync::Arc;

use actix_web::http::{StatusCode, header};
use actix_web::test::{self, TestRequest};
use actix_web::App;
use regex::Regex;
use serde_json::{Value, json};

use livsafe::crypto::CryptoUtils;
use livsafe::grading::{Assessment, Grader};
use livsafe::models::Grade;
use livsafe::{Services, Settings};

const BOUNDARY: &str = "livsafe-test-boundary";
const SCAN: &[u8] = b"\x89PNG\r\n\x1a\nnot really an ultrasound";

/// Always answers with the same grade.
struct FixedGrader(Grade, u8);

impl Grader for FixedGrader {
    fn assess(&self, _image: &[u8]) -> Assessment {
        Assessment {
            grade: self.0,
            confidence: self.1,
        }
    }
}

fn settings(dir: &Path, max_bytes: usize) -> Settings {
    let mut settings = Settings::default();
    settings.uploads.dir = dir.to_path_buf();
    settings.uploads.max_bytes = max_bytes;
    settings.uploads.image_key = Some(CryptoUtils::encode_base64(&[3u8; 32]));
    settings.auth.token_secret = "integration-test-secret-value".into();
    settings.auth.password_iterations = 1;
    settings
}

macro_rules! app {
    ($settings:expr) => {{
        let services =
            Services::with_grader($settings, Arc::new(FixedGrader(Grade::F2, 92))).unwrap();
        test::init_service(App::new().configure(move |cfg| services.configure(cfg))).await
    }};
}

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

macro_rules! signup_doctor {
    ($app:expr, $email:expr) => {
        signup_doctor!($app, $email, Value::Null)
    };
    ($app:expr, $email:expr, $org:expr) => {{
        let (status, body) = call!(
            $app,
            TestRequest::post().uri("/api/auth/signup/doctor").set_json(json!({
                "email": $email,
                "password": "secret1",
                "firstName": "Gregory",
                "lastName": "House",
                "specialization": "Hepatology",
                "organizationId": $org,
            }))
        );
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! signup_organization {
    ($app:expr, $email:expr) => {{
        let (status, body) = call!(
            $app,
            TestRequest::post()
                .uri("/api/auth/signup/organization")
                .set_json(json!({
                    "email": $email,
                    "password": "secret1",
                    "name": "Princeton Plainsboro",
                    "type": "hospital",
                }))
        );
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["data"]["id"].as_u64().unwrap(),
        )
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

fn get(uri: &str, token: &str) -> TestRequest {
    TestRequest::get().uri(uri).insert_header(bearer(token))
}

fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn grade_request(token: &str, body: Vec<u8>) -> TestRequest {
    TestRequest::post()
        .uri("/api/grade")
        .insert_header(bearer(token))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

fn patient_fields(name: &str) -> Vec<(&str, &str)> {
    vec![
        ("patientName", name),
        ("patientAge", "52"),
        ("patientGender", "male"),
    ]
}

#[actix_web::test]
async fn health_and_index_respond() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    let (status, body) = call!(app, TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].is_string());

    let (status, body) = call!(app, TestRequest::get().uri("/"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["grade"], "/api/grade");
}

#[actix_web::test]
async fn unknown_routes_answer_with_json_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    for uri in ["/api/nope", "/nowhere", "/api/doctor/records/LIV-1/extra"] {
        let resp = test::call_service(&app, TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json",
            "{uri}"
        );
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route not found");
    }
}

#[actix_web::test]
async fn doctor_signup_login_and_me() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    let token = signup_doctor!(app, "house@ppth.org");
    let (status, body) = call!(app, get("/api/auth/me", &token));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Gregory House");
    assert_eq!(body["data"]["type"], "doctor");

    let (status, body) = call!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({
            "email": "HOUSE@ppth.org",
            "password": "secret1",
        }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "house@ppth.org");
    assert!(body["token"].is_string());

    let (status, body) = call!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({
            "email": "house@ppth.org",
            "password": "wrong-password",
        }))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid email or password");
}

#[actix_web::test]
async fn duplicate_email_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    signup_doctor!(app, "wilson@ppth.org");
    let (status, body) = call!(
        app,
        TestRequest::post()
            .uri("/api/auth/signup/organization")
            .set_json(json!({
                "email": "Wilson@PPTH.org",
                "password": "secret1",
                "name": "Oncology Dept",
                "type": "clinic",
            }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already in use");
}

#[actix_web::test]
async fn signup_validation_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    let (status, body) = call!(
        app,
        TestRequest::post().uri("/api/auth/signup/doctor").set_json(json!({
            "email": "not-an-email",
            "password": "secret1",
            "firstName": "Al",
            "lastName": "Bo",
        }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call!(
        app,
        TestRequest::post().uri("/api/auth/signup/doctor").set_json(json!({
            "email": "al@bo.org",
            "password": "secret1",
            "firstName": "Al",
            "lastName": "Bo",
            "organizationId": 99,
        }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid organization ID");

    let (status, body) = call!(
        app,
        TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn cookie_session_and_logout_revocation() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));
    signup_doctor!(app, "cuddy@ppth.org");

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "cuddy@ppth.org", "password": "secret1" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "livsafe_token")
        .expect("session cookie")
        .into_owned();
    let body: Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = call!(
        app,
        TestRequest::get().uri("/api/auth/me").cookie(cookie.clone())
    );
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call!(
        app,
        TestRequest::post().uri("/api/auth/logout").insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, _) = call!(app, get("/api/auth/me", &token));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call!(app, TestRequest::get().uri("/api/auth/me").cookie(cookie));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn missing_or_wrong_role_is_unauthorized() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 1024));

    let (status, body) = call!(app, TestRequest::get().uri("/api/doctor/dashboard"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated");

    let (org_token, _) = signup_organization!(app, "admin@ppth.org");
    let (status, body) = call!(app, get("/api/doctor/dashboard", &org_token));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated as a doctor");

    let doctor_token = signup_doctor!(app, "chase@ppth.org");
    let (status, body) = call!(app, get("/api/organization/dashboard", &doctor_token));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated as an organization");
}

#[actix_web::test]
async fn grade_submission_creates_record() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let token = signup_doctor!(app, "foreman@ppth.org");

    let body = multipart_body(&patient_fields("John Smith"), Some(("scan.png", SCAN)));
    let (status, body) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::OK, "{body}");

    let data = &body["data"];
    let record_id = data["recordId"].as_str().unwrap().to_string();
    assert!(Regex::new(r"^LIV-\d{4}\d{3,4}$").unwrap().is_match(&record_id));
    assert_eq!(data["patientInfo"]["name"], "John Smith");
    assert_eq!(data["patientInfo"]["age"], 52);
    assert_eq!(data["fibrosis"]["grade"], "F2");
    assert_eq!(data["fibrosis"]["confidence"], 92);
    assert_eq!(data["analysis"].as_array().unwrap().len(), 7);
    assert_eq!(
        data["analysis"][1],
        "Moderate heterogeneity of liver parenchyma"
    );

    let (status, body) = call!(app, get(&format!("/api/records/{record_id}"), &token));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recordId"], record_id.as_str());
    assert_eq!(body["data"]["doctor"]["name"], "Dr. Gregory House");

    let resp = test::call_service(
        &app,
        get(&format!("/api/records/{record_id}/image"), &token).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.as_ref(), SCAN);

    let stored: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert_eq!(stored.len(), 1);

    let (status, body) = call!(app, get("/api/doctor/dashboard", &token));
    assert_eq!(status, StatusCode::OK);
    let dash = &body["data"];
    assert_eq!(dash["stats"]["totalRecords"], 1);
    assert_eq!(dash["stats"]["monthlyRecords"], 1);
    assert_eq!(dash["stats"]["accuracy"], 94.2);
    assert_eq!(dash["recentRecords"][0]["id"], record_id.as_str());
    assert_eq!(dash["gradeDistribution"][2]["value"], 1);
    assert_eq!(dash["gradeDistribution"][2]["color"], "#eab308");
}

#[actix_web::test]
async fn repeat_submission_reuses_patient_by_name() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let token = signup_doctor!(app, "taub@ppth.org");

    for name in ["Jane Roe", "jane roe"] {
        let body = multipart_body(&patient_fields(name), Some(("scan.jpg", SCAN)));
        let (status, _) = call!(app, grade_request(&token, body));
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = call!(app, get("/api/patients", &token));
    assert_eq!(body["pagination"]["total"], 1);
    let patient_id = body["data"][0]["id"].as_u64().unwrap();

    let (status, body) = call!(
        app,
        get(&format!("/api/patients/{patient_id}/records"), &token)
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = call!(app, get("/api/doctor/records?page=1&limit=1", &token));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["pages"], 2);
}

#[actix_web::test]
async fn grade_submission_rejects_bad_forms() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 64));
    let token = signup_doctor!(app, "kutner@ppth.org");

    let body = multipart_body(&patient_fields("John Smith"), None);
    let (status, body) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No image file uploaded");

    let body = multipart_body(&[("patientName", "John Smith")], Some(("a.png", b"img".as_slice())));
    let (status, body) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing patient information");

    let fields = [
        ("patientName", "John Smith"),
        ("patientAge", "fifty"),
        ("patientGender", "male"),
    ];
    let body = multipart_body(&fields, Some(("a.png", b"img".as_slice())));
    let (status, body) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Age must be a number");

    let big = vec![7u8; 1000];
    let body = multipart_body(&patient_fields("John Smith"), Some(("a.png", big.as_slice())));
    let (status, body) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);

    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn doctors_cannot_read_each_others_records() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let owner = signup_doctor!(app, "thirteen@ppth.org");
    let other = signup_doctor!(app, "cameron@ppth.org");

    let body = multipart_body(&patient_fields("Ann Lee"), Some(("scan.png", SCAN)));
    let (_, body) = call!(app, grade_request(&owner, body));
    let record_id = body["data"]["recordId"].as_str().unwrap().to_string();

    for uri in [
        format!("/api/records/{record_id}"),
        format!("/api/records/{record_id}/image"),
        format!("/api/doctor/records/{record_id}"),
    ] {
        let resp = test::call_service(&app, get(&uri, &other).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, _) = call!(app, get("/api/records/LIV-1999000", &other));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call!(app, get("/api/records", &other));
    assert_eq!(body["pagination"]["total"], 0);
}

#[actix_web::test]
async fn organization_roster_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let (org_token, org_id) = signup_organization!(app, "admin@ppth.org");

    let (status, body) = call!(
        app,
        TestRequest::post()
            .uri("/api/organization/doctors")
            .insert_header(bearer(&org_token))
            .set_json(json!({
                "email": "park@ppth.org",
                "password": "secret1",
                "firstName": "Chi",
                "lastName": "Park",
                "specialization": "",
                "organizationId": "abc",
            }))
    );
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let doctor_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["name"], "Dr. Chi Park");
    assert_eq!(body["data"]["specialization"], "General");
    assert_eq!(body["data"]["recordCount"], 0);

    let member = signup_doctor!(app, "adams@ppth.org", org_id);
    let body = multipart_body(&patient_fields("Bob Ray"), Some(("scan.png", SCAN)));
    let (_, body) = call!(app, grade_request(&member, body));
    let record_id = body["data"]["recordId"].as_str().unwrap().to_string();

    let (status, body) = call!(app, get("/api/organization/dashboard", &org_token));
    assert_eq!(status, StatusCode::OK);
    let dash = &body["data"];
    assert_eq!(dash["stats"]["totalDoctors"], 2);
    assert_eq!(dash["stats"]["totalRecordsToday"], 1);
    assert_eq!(dash["stats"]["totalRecordsMonth"], 1);
    assert_eq!(dash["stats"]["doctorsChange"], "+2 from last month");
    assert_eq!(dash["doctors"][1]["recordCount"], 1);
    let total: u64 = dash["gradeDistribution"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["value"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 1);

    let (status, body) = call!(app, get(&format!("/api/records/{record_id}"), &org_token));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["patientInfo"]["name"], "Bob Ray");

    let (_, body) = call!(app, get("/api/records", &org_token));
    assert_eq!(body["data"][0]["doctorName"], "Dr. Gregory House");

    let (_, body) = call!(app, get("/api/doctor/all", &member));
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let delete = |uri: String| {
        TestRequest::delete()
            .uri(&uri)
            .insert_header(bearer(&org_token))
    };

    let (status, body) = call!(app, delete("/api/organization/doctors/nonsense".into()));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid doctor ID format");

    let (status, body) = call!(app, delete(format!("/api/organization/doctors/{doctor_id}")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Doctor removed successfully");

    let (_, body) = call!(app, get("/api/organization/doctors", &org_token));
    let roster = body["data"].as_array().unwrap();
    assert_eq!(roster.len(), 1);
    assert!(roster.iter().all(|d| d["id"] != doctor_id.as_str()));

    let (status, _) = call!(app, delete(format!("/api/organization/doctors/{doctor_id}")));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call!(app, TestRequest::get().uri("/api/organization/all"));
    assert_eq!(body["data"][0]["name"], "Princeton Plainsboro");
    assert_eq!(body["data"][0]["type"], "hospital");
}

#[actix_web::test]
async fn patient_crud_and_search() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let token = signup_doctor!(app, "lawrence@ppth.org");

    let create = |name: &str, age: i64, gender: &str| {
        TestRequest::post()
            .uri("/api/patients")
            .insert_header(bearer(&token))
            .set_json(json!({ "name": name, "age": age, "gender": gender }))
    };

    let (status, body) = call!(app, create("Mary Major", 61, "female"));
    assert_eq!(status, StatusCode::CREATED);
    let mary = body["data"]["id"].as_u64().unwrap();
    let (_, body) = call!(app, create("Max Minor", 17, "male"));
    let max = body["data"]["id"].as_u64().unwrap();

    let (status, _) = call!(app, create("X", 20, "male"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call!(app, create("Zero Age", 0, "male"));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call!(app, get("/api/patients/search?gender=female", &token));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "Mary Major");

    let (_, body) = call!(app, get("/api/patients/search?q=m&minAge=18", &token));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = call!(app, get("/api/patients/search?minAge=40&maxAge=30", &token));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call!(app, get("/api/patients?search=minor", &token));
    assert_eq!(body["pagination"]["total"], 1);

    let (status, _) = call!(app, get("/api/patients?limit=0", &token));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call!(
        app,
        TestRequest::put()
            .uri(&format!("/api/patients/{max}"))
            .insert_header(bearer(&token))
            .set_json(json!({ "age": 18 }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["age"], 18);
    assert_eq!(body["data"]["name"], "Max Minor");

    let (status, _) = call!(app, get("/api/patients/abc", &token));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call!(app, get("/api/patients/999", &token));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = multipart_body(&patient_fields("Mary Major"), Some(("scan.png", SCAN)));
    let (status, _) = call!(app, grade_request(&token, body));
    assert_eq!(status, StatusCode::OK);

    let delete = |id: u64| {
        TestRequest::delete()
            .uri(&format!("/api/patients/{id}"))
            .insert_header(bearer(&token))
    };
    let (status, _) = call!(app, delete(mary));
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call!(app, delete(max));
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call!(app, get(&format!("/api/patients/{max}"), &token));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn assign_patient_respects_organization_scope() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let (_, org_id) = signup_organization!(app, "admin@ppth.org");
    let first = signup_doctor!(app, "one@ppth.org", org_id);
    signup_doctor!(app, "two@ppth.org", org_id);
    let loner = signup_doctor!(app, "loner@elsewhere.org");

    let (_, body) = call!(
        app,
        TestRequest::post()
            .uri("/api/patients")
            .insert_header(bearer(&first))
            .set_json(json!({ "name": "Pat Doe", "age": 40, "gender": "other" }))
    );
    let patient_id = body["data"]["id"].as_u64().unwrap();

    let assign = |token: &str, doctor: &str| {
        TestRequest::put()
            .uri("/api/doctor/assign-patient")
            .insert_header(bearer(token))
            .set_json(json!({ "doctorId": doctor, "patientId": patient_id }))
    };

    let (status, body) = call!(app, assign(&first, "DOC-002"));
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["doctorId"], 2);

    let (status, _) = call!(app, assign(&loner, "DOC-002"));
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call!(app, assign(&first, "DOC-999"));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call!(app, assign(&first, "bogus"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn organizations_cannot_read_foreign_records() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app!(settings(tmp.path(), 4096));
    let (owner_token, owner_id) = signup_organization!(app, "admin@ppth.org");
    let (rival_token, _) = signup_organization!(app, "admin@mercy.org");
    let doctor = signup_doctor!(app, "wilson@ppth.org", owner_id);

    let body = multipart_body(&patient_fields("Amber Volakis"), Some(("scan.png", SCAN)));
    let (status, body) = call!(
        app,
        TestRequest::post()
            .uri("/api/medical-images/upload")
            .insert_header(bearer(&doctor))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    );
    assert_eq!(status, StatusCode::OK, "{body}");
    let record_uri = format!("/api/records/{}", body["data"]["recordId"].as_str().unwrap());

    let (status, _) = call!(app, get(&record_uri, &owner_token));
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call!(app, get(&record_uri, &rival_token));
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let detach = |token: &str| {
        TestRequest::delete()
            .uri("/api/doctor/DOC-001")
            .insert_header(bearer(token))
    };
    let (status, _) = call!(app, detach(&rival_token));
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call!(app, detach(&owner_token));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Doctor removed successfully");

    let (status, _) = call!(app, get(&record_uri, &owner_token));
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = call!(app, get("/api/records", &owner_token));
    assert_eq!(body["pagination"]["total"], 0);

    let (status, _) = call!(app, get(&record_uri, &doctor));
    assert_eq!(status, StatusCode::OK);
}
