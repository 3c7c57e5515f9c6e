use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, http::header};
use anyhow::Context;
use tracing::{info, warn};

use livsafe::logging::{Verbosity, init_logging};
use livsafe::{Services, Settings};

fn cors(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_logging(Verbosity::from_env());

    if settings.uses_dev_secret() {
        warn!("auth.token_secret is the development default; set LIVSAFE_AUTH__TOKEN_SECRET");
    }
    std::fs::create_dir_all(&settings.uploads.dir).with_context(|| {
        format!("failed to create upload dir {}", settings.uploads.dir.display())
    })?;

    let services = Services::new(settings.clone()).context("failed to initialise services")?;
    let origins = settings.server.allowed_origins.clone();
    let (host, port) = settings.bind_address();

    let mut server = HttpServer::new(move || {
        let services = services.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(cors(&origins))
            .configure(move |cfg| services.configure(cfg))
    });
    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }

    info!(%host, port, uploads = %settings.uploads.dir.display(), "starting livsafe");
    server
        .bind((host.as_str(), port))
        .with_context(|| format!("failed to bind {host}:{port}"))?
        .run()
        .await?;
    Ok(())
}
