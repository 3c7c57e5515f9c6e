//! Route table and shared application state.

use std::sync::Arc;

use actix_web::web;
use tracing::warn;

use crate::auth::AuthService;
use crate::config::Settings;
use crate::crypto::CryptoUtils;
use crate::error::Result;
use crate::grading::{Grader, MockGrader};
use crate::handlers::{self, auth, doctor, grading, organization, patients, records};
use crate::store::Store;
use crate::uploads::ImageVault;

/// Everything handlers pull out of `app_data`. Cloning is cheap; each
/// worker gets a clone pointing at the same state.
#[derive(Clone)]
pub struct Services {
    pub store: web::Data<Store>,
    pub auth: web::Data<AuthService>,
    pub vault: web::Data<ImageVault>,
    pub grader: web::Data<dyn Grader>,
    pub settings: web::Data<Settings>,
}

impl Services {
    /// Builds state with the mock grader. Without a configured image key
    /// an ephemeral one is generated, so stored images do not survive a
    /// restart.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_grader(settings, Arc::new(MockGrader))
    }

    pub fn with_grader(settings: Settings, grader: Arc<dyn Grader>) -> Result<Self> {
        let key = match settings.image_key()? {
            Some(key) => key,
            None => {
                warn!("uploads.image_key is not set; using an ephemeral key");
                CryptoUtils::generate_aes_key()
            }
        };
        let vault = ImageVault::new(settings.uploads.dir.clone(), key)?;

        Ok(Self {
            store: web::Data::new(Store::new()),
            auth: web::Data::new(AuthService::new(&settings.auth)),
            vault: web::Data::new(vault),
            grader: web::Data::from(grader),
            settings: web::Data::new(settings),
        })
    }

    /// Registers state, extractor error handlers and routes.
    pub fn configure(self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.store)
            .app_data(self.auth)
            .app_data(self.vault)
            .app_data(self.grader)
            .app_data(self.settings)
            .app_data(web::JsonConfig::default().error_handler(handlers::json_error))
            .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
            .app_data(web::PathConfig::default().error_handler(handlers::path_error))
            .configure(configure_routes)
            .default_service(web::to(handlers::not_found));
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/health", web::get().to(handlers::health))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/login", web::post().to(auth::login))
                        .route("/logout", web::post().to(auth::logout))
                        .route("/me", web::get().to(auth::me))
                        .route("/signup/doctor", web::post().to(auth::signup_doctor))
                        .route(
                            "/signup/organization",
                            web::post().to(auth::signup_organization),
                        ),
                )
                .service(
                    web::scope("/doctor")
                        .route("/dashboard", web::get().to(doctor::dashboard))
                        .route("/records", web::get().to(doctor::records))
                        .route("/records/{record_id}", web::get().to(doctor::record))
                        .route("/all", web::get().to(doctor::all))
                        .route("/assign-patient", web::put().to(doctor::assign_patient))
                        .route("/{id}", web::delete().to(organization::remove_doctor)),
                )
                .service(
                    web::scope("/organization")
                        .route("/dashboard", web::get().to(organization::dashboard))
                        .route("/doctors", web::get().to(organization::doctors))
                        .route("/doctors", web::post().to(organization::add_doctor))
                        .route("/doctors/{id}", web::delete().to(organization::remove_doctor))
                        .route("/all", web::get().to(organization::all)),
                )
                .service(
                    web::scope("/patients")
                        .route("", web::get().to(patients::list))
                        .route("", web::post().to(patients::create))
                        .route("/search", web::get().to(patients::search))
                        .route("/{id}", web::get().to(patients::get))
                        .route("/{id}", web::put().to(patients::update))
                        .route("/{id}", web::delete().to(patients::delete))
                        .route("/{id}/records", web::get().to(patients::records)),
                )
                .service(
                    web::scope("/records")
                        .route("", web::get().to(records::list))
                        .route("/{record_id}", web::get().to(records::detail))
                        .route("/{record_id}/image", web::get().to(records::image)),
                )
                .route("/grade", web::post().to(grading::grade))
                .route("/medical-images/upload", web::post().to(grading::grade)),
        );
}
