//! Grade form uploads and the encrypted image store.

use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use actix_web::web;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::CryptoUtils;
use crate::error::{Error, Result};
use crate::schema::GradeForm;

const IMAGE_FIELD: &str = "image";
const MAX_TEXT_FIELD: usize = 4 * 1024;
const FALLBACK_EXTENSION: &str = "bin";

/// The uploaded image file, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct GradeSubmission {
    pub form: GradeForm,
    pub image: Option<UploadedImage>,
}

impl GradeSubmission {
    /// The image, which must be present and non-empty.
    pub fn require_image(&mut self) -> Result<UploadedImage> {
        match self.image.take() {
            Some(image) if !image.bytes.is_empty() => Ok(image),
            _ => Err(Error::validation("No image file uploaded")),
        }
    }
}

async fn read_field(field: &mut Field, limit: usize, on_overflow: impl Fn() -> Error) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| Error::validation(format!("Invalid multipart body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(on_overflow());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Reads the grade form. The image may not exceed `max_bytes`; the check
/// runs while streaming, so oversized uploads are never fully buffered.
pub async fn read_grade_form(mut payload: Multipart, max_bytes: usize) -> Result<GradeSubmission> {
    let mut submission = GradeSubmission::default();

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| Error::validation(format!("Invalid multipart body: {e}")))?;
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            let bytes = read_field(&mut field, max_bytes, || Error::PayloadTooLarge {
                limit: max_bytes,
            })
            .await?;
            debug!(size = bytes.len(), ?file_name, "image field received");
            submission.image = Some(UploadedImage { file_name, bytes });
            continue;
        }

        let raw = read_field(&mut field, MAX_TEXT_FIELD, || {
            Error::validation(format!("Field '{name}' is too long"))
        })
        .await?;
        let value = String::from_utf8(raw)
            .map_err(|_| Error::validation(format!("Field '{name}' is not valid UTF-8")))?;
        match name.as_str() {
            "patientName" => submission.form.patient_name = Some(value),
            "patientAge" => submission.form.patient_age = Some(value),
            "patientGender" => submission.form.patient_gender = Some(value),
            _ => debug!(field = %name, "ignoring unknown form field"),
        }
    }

    Ok(submission)
}

/// Lower-cased alphanumeric extension of `file_name`, or `bin`.
pub fn sanitize_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// MIME type served back for a stored image.
pub fn content_type_for(image_path: &str) -> &'static str {
    match Path::new(image_path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif" | "tiff") => "image/tiff",
        Some("dcm") => "application/dicom",
        _ => "application/octet-stream",
    }
}

/// A freshly written image file. Dropping it deletes the file unless
/// [`StoredImage::keep`] was called, so a failed request leaves nothing
/// behind in the upload dir.
#[derive(Debug)]
pub struct StoredImage {
    path: PathBuf,
    file_name: String,
    kept: bool,
}

impl StoredImage {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Commits the file and returns its stored name.
    pub fn keep(mut self) -> String {
        self.kept = true;
        std::mem::take(&mut self.file_name)
    }
}

impl Drop for StoredImage {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(file_name = %self.file_name, "discarded stored image"),
            Err(e) => {
                warn!(file_name = %self.file_name, error = %e, "failed to discard stored image")
            }
        }
    }
}

/// Images sealed with AES-256-GCM under one directory. Stored paths are
/// bare file names relative to that directory.
pub struct ImageVault {
    dir: PathBuf,
    key: Vec<u8>,
}

impl ImageVault {
    pub fn new(dir: impl Into<PathBuf>, key: Vec<u8>) -> Result<Self> {
        if key.len() != crate::crypto::AES_KEY_SIZE {
            return Err(Error::crypto("Invalid AES key size"));
        }
        Ok(Self {
            dir: dir.into(),
            key,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Only plain file names produced by `store` resolve
    fn resolve(&self, image_path: &str) -> Result<PathBuf> {
        let plain = !image_path.is_empty()
            && Path::new(image_path).file_name().and_then(|n| n.to_str()) == Some(image_path)
            && !image_path.starts_with('.');
        if !plain {
            return Err(Error::not_found("Image"));
        }
        Ok(self.dir.join(image_path))
    }

    /// Seals and writes `bytes`. The file is removed again when the
    /// returned handle is dropped without [`StoredImage::keep`].
    pub async fn store(&self, bytes: Vec<u8>, original_name: Option<&str>) -> Result<StoredImage> {
        let file_name = format!("{}.{}", Uuid::new_v4(), sanitize_extension(original_name));
        let path = self.dir.join(&file_name);
        let dir = self.dir.clone();
        let key = self.key.clone();

        let path = web::block(move || -> Result<PathBuf> {
            let sealed = CryptoUtils::seal(&bytes, &key)?;
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, sealed)?;
            Ok(path)
        })
        .await??;

        debug!(%file_name, "image stored");
        Ok(StoredImage {
            path,
            file_name,
            kept: false,
        })
    }

    /// Reads and decrypts a stored image.
    pub async fn load(&self, image_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(image_path)?;
        let key = self.key.clone();

        web::block(move || -> Result<Vec<u8>> {
            let sealed = match std::fs::read(&path) {
                Ok(sealed) => sealed,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::not_found("Image"));
                }
                Err(e) => return Err(e.into()),
            };
            CryptoUtils::open(&sealed, &key)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault(dir: &Path) -> ImageVault {
        ImageVault::new(dir, CryptoUtils::generate_aes_key()).unwrap()
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension(Some("scan.PNG")), "png");
        assert_eq!(sanitize_extension(Some("liver.jpeg")), "jpeg");
        assert_eq!(sanitize_extension(Some("noext")), "bin");
        assert_eq!(sanitize_extension(Some("evil.p/ng")), "bin");
        assert_eq!(sanitize_extension(Some("a.toolongext")), "bin");
        assert_eq!(sanitize_extension(None), "bin");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("x.png"), "image/png");
        assert_eq!(content_type_for("x.jpg"), "image/jpeg");
        assert_eq!(content_type_for("x.bin"), "application/octet-stream");
    }

    #[test]
    fn test_vault_rejects_bad_key() {
        assert!(ImageVault::new("uploads", vec![0u8; 16]).is_err());
    }

    #[actix_web::test]
    async fn test_store_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault(tmp.path());

        let name = vault
            .store(b"\x89PNG fake image".to_vec(), Some("scan.png"))
            .await
            .unwrap()
            .keep();
        assert!(name.ends_with(".png"));

        let on_disk = std::fs::read(tmp.path().join(&name)).unwrap();
        assert_ne!(on_disk, b"\x89PNG fake image");

        assert_eq!(vault.load(&name).await.unwrap(), b"\x89PNG fake image");
    }

    #[actix_web::test]
    async fn test_store_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault(&tmp.path().join("nested").join("uploads"));
        let name = vault.store(vec![1, 2, 3], None).await.unwrap().keep();
        assert!(name.ends_with(".bin"));
        assert!(vault.dir().join(&name).exists());
    }

    #[actix_web::test]
    async fn test_load_rejects_traversal_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault(tmp.path());
        for bad in ["../secret", "/etc/passwd", "", ".hidden", "a/b.png"] {
            let err = vault.load(bad).await.unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }), "{bad}");
        }
        assert!(matches!(
            vault.load("missing.png").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[actix_web::test]
    async fn test_unkept_image_is_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = vault(tmp.path());

        let discarded = vault.store(vec![4; 16], Some("scan.png")).await.unwrap();
        let path = tmp.path().join(discarded.file_name());
        assert!(path.exists());
        drop(discarded);
        assert!(!path.exists());

        let kept = vault.store(vec![5; 16], None).await.unwrap().keep();
        assert!(tmp.path().join(&kept).exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[actix_web::test]
    async fn test_other_key_cannot_open() {
        let tmp = tempfile::tempdir().unwrap();
        let name = vault(tmp.path())
            .store(vec![9; 32], None)
            .await
            .unwrap()
            .keep();
        let err = vault(tmp.path()).load(&name).await.unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_require_image() {
        let mut empty = GradeSubmission::default();
        assert!(empty.require_image().is_err());

        let mut zero = GradeSubmission {
            image: Some(UploadedImage {
                file_name: None,
                bytes: Vec::new(),
            }),
            ..GradeSubmission::default()
        };
        assert!(zero.require_image().is_err());
    }
}
