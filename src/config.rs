//! Configuration management for livsafe.
//!
//! Settings are layered with figment, highest precedence first:
//! 1. Environment variables prefixed with `LIVSAFE_` (nested keys use `__`,
//!    e.g. `LIVSAFE_SERVER__PORT=8080`)
//! 2. `livsafe.toml` in the working directory (optional)
//! 3. Built-in defaults
//!
//! A `.env` file, if present, is loaded into the environment first.

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::crypto::{AES_KEY_SIZE, CryptoUtils};
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "livsafe.toml";
const ENV_PREFIX: &str = "LIVSAFE_";

/// Development signing secret. Startup logs a warning while it is in use.
pub const DEV_TOKEN_SECRET: &str = "dev_key_for_livsafe_do_not_deploy";

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub uploads: UploadSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Worker thread count; actix picks one per core when unset.
    pub workers: Option<usize>,
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
    /// Base64 AES-256 key for sealing stored images.
    pub image_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_secret: String,
    pub token_ttl_days: i64,
    pub cookie_name: String,
    pub password_iterations: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_bytes: 10 * 1024 * 1024,
            image_key: None,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_ttl_days: 30,
            cookie_name: "livsafe_token".to_string(),
            password_iterations: 100_000,
        }
    }
}

impl Settings {
    /// The standard provider stack: defaults, `livsafe.toml`, then env vars.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE_NAME))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load `.env`, then extract and validate settings.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server.port must be non-zero".into()));
        }
        if self.uploads.max_bytes == 0 {
            return Err(Error::Config("uploads.max_bytes must be non-zero".into()));
        }
        if self.auth.token_secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "auth.token_secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.auth.token_ttl_days <= 0 {
            return Err(Error::Config("auth.token_ttl_days must be positive".into()));
        }
        if self.auth.password_iterations == 0 {
            return Err(Error::Config("auth.password_iterations must be positive".into()));
        }
        if self.auth.cookie_name.trim().is_empty() {
            return Err(Error::Config("auth.cookie_name must not be empty".into()));
        }
        self.image_key()?;
        Ok(())
    }

    /// Decoded image key, or `None` when an ephemeral key should be used.
    pub fn image_key(&self) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = self.uploads.image_key.as_deref() else {
            return Ok(None);
        };
        let key = CryptoUtils::decode_base64(encoded.trim())
            .map_err(|_| Error::Config("uploads.image_key is not valid base64".into()))?;
        if key.len() != AES_KEY_SIZE {
            return Err(Error::Config(format!(
                "uploads.image_key must decode to {AES_KEY_SIZE} bytes"
            )));
        }
        Ok(Some(key))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.auth.token_secret == DEV_TOKEN_SECRET
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
