//! Session tokens and the request extractor that checks them.
//!
//! Tokens are `header.claims.signature`, each segment unpadded base64url and
//! the signature an HMAC-SHA256 over the first two segments. A token reaches
//! the server either as `Authorization: Bearer <token>` or in the session
//! cookie.

use std::collections::HashMap;

use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest, web};
use chrono::{DateTime, Duration, Utc};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::crypto::CryptoUtils;
use crate::error::{Error, Result};
use crate::models::{DoctorProfile, Organization, Role, User, UserId};
use crate::store::Store;

const TOKEN_HEADER: TokenHeader<'static> = TokenHeader {
    alg: "HS256",
    typ: "JWT",
};

#[derive(Serialize)]
struct TokenHeader<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub role: Role,
    /// Token id, used for revocation.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    secret: Vec<u8>,
    ttl: Duration,
    cookie_name: String,
    password_iterations: u32,
    // token id -> expiry
    revoked: RwLock<HashMap<Uuid, i64>>,
}

impl AuthService {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            secret: settings.token_secret.as_bytes().to_vec(),
            ttl: Duration::days(settings.token_ttl_days),
            cookie_name: settings.cookie_name.clone(),
            password_iterations: settings.password_iterations,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        CryptoUtils::hash_password(password, self.password_iterations)
    }

    pub fn verify_password(&self, password: &str, stored: &str) -> bool {
        CryptoUtils::verify_password(password, stored)
    }

    /// Checks credentials and issues a token for the matching user.
    pub async fn login(&self, store: &Store, email: &str, password: &str) -> Result<(User, String)> {
        let user = store.get_user_by_email(email).await;
        let Some(user) = user.filter(|u| self.verify_password(password, &u.password_hash)) else {
            warn!(email, "failed login attempt");
            return Err(Error::unauthorized("Invalid email or password"));
        };
        let (token, _) = self.issue_token(&user, Utc::now())?;
        info!(user_id = user.id, role = %user.role, "user logged in");
        Ok((user, token))
    }

    pub fn issue_token(&self, user: &User, now: DateTime<Utc>) -> Result<(String, Claims)> {
        let claims = Claims {
            sub: user.id,
            role: user.role,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let header_b64 = CryptoUtils::encode_base64_url(&serde_json::to_vec(&TOKEN_HEADER)?);
        let claims_b64 = CryptoUtils::encode_base64_url(&serde_json::to_vec(&claims)?);
        let message = format!("{header_b64}.{claims_b64}");
        let signature = CryptoUtils::sign(&self.secret, message.as_bytes())?;

        let token = format!("{message}.{}", CryptoUtils::encode_base64_url(&signature));
        Ok((token, claims))
    }

    pub async fn validate_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::unauthorized("Invalid token format"));
        };

        let signature = CryptoUtils::decode_base64_url(signature_b64)
            .map_err(|_| Error::unauthorized("Invalid token signature"))?;
        let message = format!("{header_b64}.{claims_b64}");
        if !CryptoUtils::verify_signature(&self.secret, message.as_bytes(), &signature) {
            return Err(Error::unauthorized("Invalid token signature"));
        }

        let claims: Claims = CryptoUtils::decode_base64_url(claims_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| Error::unauthorized("Invalid token claims"))?;

        if claims.exp <= now.timestamp() {
            return Err(Error::unauthorized("Token has expired"));
        }
        if self.revoked.read().await.contains_key(&claims.jti) {
            return Err(Error::unauthorized("Token has been revoked"));
        }
        Ok(claims)
    }

    /// Rejects the token from now until its natural expiry.
    pub async fn revoke(&self, claims: &Claims, now: DateTime<Utc>) {
        let mut revoked = self.revoked.write().await;
        let cutoff = now.timestamp();
        revoked.retain(|_, exp| *exp > cutoff);
        revoked.insert(claims.jti, claims.exp);
        debug!(user_id = claims.sub, revoked = revoked.len(), "token revoked");
    }

    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build(self.cookie_name.clone(), token.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::seconds(self.ttl.num_seconds()))
            .finish()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(self.cookie_name.clone(), "")
            .path("/")
            .http_only(true)
            .finish();
        cookie.make_removal();
        cookie
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// An authenticated caller. Extracting it fails with 401 when no valid
/// token is presented.
#[derive(Debug, Clone)]
pub struct Session {
    pub claims: Claims,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    /// The caller's doctor profile; 401 for organization sessions.
    pub async fn require_doctor(&self, store: &Store) -> Result<DoctorProfile> {
        if self.role() != Role::Doctor {
            return Err(Error::unauthorized("Not authenticated as a doctor"));
        }
        let doctor = store
            .get_doctor_by_user(self.user_id())
            .await
            .ok_or_else(|| Error::not_found("Doctor"))?;
        store
            .doctor_profile(doctor.id)
            .await
            .ok_or_else(|| Error::not_found("Doctor"))
    }

    /// The caller's organization; 401 for doctor sessions.
    pub async fn require_organization(&self, store: &Store) -> Result<Organization> {
        if self.role() != Role::Organization {
            return Err(Error::unauthorized("Not authenticated as an organization"));
        }
        store
            .get_organization_by_user(self.user_id())
            .await
            .ok_or_else(|| Error::not_found("Organization"))
    }
}

impl FromRequest for Session {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let auth = req.app_data::<web::Data<AuthService>>().cloned();
        let token = auth.as_ref().and_then(|auth| {
            bearer_token(req).or_else(|| req.cookie(auth.cookie_name()).map(|c| c.value().to_string()))
        });

        Box::pin(async move {
            let auth = auth.ok_or_else(|| Error::internal("AuthService is not registered"))?;
            let token = token.ok_or_else(|| Error::unauthorized("Not authenticated"))?;
            let claims = auth.validate_token(&token, Utc::now()).await?;
            Ok(Session { claims })
        })
    }
}
