//! LivSafe: ultrasound fibrosis grading records for doctors and
//! organizations, served as a JSON API.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod grading;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;
pub mod uploads;
pub mod views;

pub use config::Settings;
pub use error::{Error, Result};
pub use routes::Services;
