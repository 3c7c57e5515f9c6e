use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

// AES Key size for AES256-GCM
pub const AES_KEY_SIZE: usize = 32; // 256 bits
const NONCE_SIZE: usize = 12; // 96 bits for GCM
const SALT_SIZE: usize = 16;
const HASH_SIZE: usize = 32;
const HASH_SCHEME: &str = "v1";

pub struct CryptoUtils;

impl CryptoUtils {
    // Generates a new AES key
    pub fn generate_aes_key() -> Vec<u8> {
        let mut key = vec![0u8; AES_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    // Encrypts data using AES-GCM, returning (ciphertext, nonce)
    pub fn encrypt_data(data: &[u8], key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        if key.len() != AES_KEY_SIZE {
            return Err(Error::crypto("Invalid AES key size"));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::crypto(format!("Failed to create AES cipher: {e}")))?;

        let mut nonce_bytes = vec![0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| Error::crypto(format!("Failed to encrypt data: {e}")))?;

        Ok((ciphertext, nonce_bytes))
    }

    // Decrypts data using AES-GCM
    pub fn decrypt_data(ciphertext: &[u8], key: &[u8], nonce_bytes: &[u8]) -> Result<Vec<u8>> {
        if key.len() != AES_KEY_SIZE {
            return Err(Error::crypto("Invalid AES key size"));
        }
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(Error::crypto("Invalid Nonce size"));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::crypto(format!("Failed to create AES cipher: {e}")))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::crypto(format!("Failed to decrypt data: {e}")))
    }

    // Encrypts into a single blob laid out as nonce || ciphertext
    pub fn seal(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let (ciphertext, nonce) = Self::encrypt_data(data, key)?;
        let mut sealed = nonce;
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    // Reverses `seal`
    pub fn open(sealed: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::crypto("Sealed data is truncated"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        Self::decrypt_data(ciphertext, key, nonce)
    }

    // Hashes a password as `v1$<iterations>$<salt>$<hash>` (PBKDF2-HMAC-SHA256)
    pub fn hash_password(password: &str, iterations: u32) -> Result<String> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let hash = Self::pbkdf2(password.as_bytes(), &salt, iterations)?;
        Ok(format!(
            "{HASH_SCHEME}${iterations}${}${}",
            Self::encode_base64(&salt),
            Self::encode_base64(&hash)
        ))
    }

    // Checks a password against a stored hash; malformed hashes never verify
    pub fn verify_password(password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        let [scheme, iterations, salt, expected] = parts.as_slice() else {
            return false;
        };
        if *scheme != HASH_SCHEME {
            return false;
        }
        let (Ok(iterations), Ok(salt), Ok(expected)) = (
            iterations.parse::<u32>(),
            Self::decode_base64(salt),
            Self::decode_base64(expected),
        ) else {
            return false;
        };
        match Self::pbkdf2(password.as_bytes(), &salt, iterations) {
            Ok(actual) => bool::from(actual.ct_eq(&expected)),
            Err(_) => false,
        }
    }

    // PBKDF2-HMAC-SHA256 with a digest-sized output
    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>> {
        if iterations == 0 {
            return Err(Error::crypto("Iteration count must be positive"));
        }
        let mut output = vec![0u8; HASH_SIZE];
        pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
        Ok(output)
    }

    // HMAC-SHA256 signature of `message`
    pub fn sign(secret: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .map_err(|e| Error::crypto(format!("Failed to create HMAC: {e}")))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    // Verifies an HMAC-SHA256 signature in constant time
    pub fn verify_signature(secret: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
            return false;
        };
        mac.update(message);
        mac.verify_slice(signature).is_ok()
    }

    // Encode bytes to base64
    pub fn encode_base64(data: &[u8]) -> String {
        general_purpose::STANDARD.encode(data)
    }

    // Decode base64 to bytes
    pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::crypto(format!("Failed to decode base64: {e}")))
    }

    // Encode bytes to unpadded base64url (token segments)
    pub fn encode_base64_url(data: &[u8]) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(data)
    }

    // Decode unpadded base64url
    pub fn decode_base64_url(data: &str) -> Result<Vec<u8>> {
        general_purpose::URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|e| Error::crypto(format!("Failed to decode base64url: {e}")))
    }
}
