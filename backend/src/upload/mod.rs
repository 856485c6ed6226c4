use sha2::{Digest, Sha256};

const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Please upload an image")]
    Missing,
    #[error("Only JPG, PNG, and WebP images are allowed")]
    UnsupportedType(String),
    #[error("Image exceeds the {limit} byte upload limit")]
    TooLarge { size: usize, limit: usize },
}

/// Image bytes that passed the gate. The storage extension comes from the
/// declared MIME type, never from the client filename.
#[derive(Debug, Clone)]
pub struct AcceptedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: &'static str,
}

impl AcceptedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadGate {
    max_bytes: usize,
}

impl UploadGate {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_allowed_type(mime_type: &str) -> bool {
        ALLOWED_MIME_TYPES.contains(&normalize(mime_type).as_str())
    }

    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn accept(
        &self,
        bytes: Vec<u8>,
        declared_mime_type: &str,
        size: usize,
    ) -> Result<AcceptedImage, UploadError> {
        let mime_type = normalize(declared_mime_type);
        if !Self::is_allowed_type(&mime_type) {
            return Err(UploadError::UnsupportedType(mime_type));
        }
        self.check_size(size.max(bytes.len()))?;
        if bytes.is_empty() {
            return Err(UploadError::Missing);
        }

        Ok(AcceptedImage {
            extension: extension_for(&mime_type),
            bytes,
            mime_type,
        })
    }
}

/// Storage key extension for a MIME type; allowed but unmapped types get `.jpg`.
pub fn extension_for(mime_type: &str) -> &'static str {
    match normalize(mime_type).as_str() {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        _ => ".jpg",
    }
}

fn normalize(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
