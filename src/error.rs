//! # Error Types Module
//!
//! Questo modulo definisce il valore di errore strutturato restituito da ogni
//! operazione di compressione.
//!
//! ## Responsabilità:
//! - Definisce `ErrorKind` per categorizzare tutti i fallimenti possibili
//! - Definisce `CompressionError` (kind, message, details) integrato con `thiserror`
//! - Mappa ogni categoria sul codice esposto al chiamante (`INVALID_ARGUMENT`,
//!   `COMPRESSION_ERROR`)
//! - Converte automaticamente errori di I/O e del crate `image`
//!
//! ## Categorie di errori:
//! - `Validation`: argomenti mancanti o fuori range, rifiutati prima di iniziare
//! - `NotFound`: il file sorgente non esiste
//! - `Decode`: sorgente illeggibile o corrotta
//! - `Encode`: l'encoder ha rifiutato l'input o non ha prodotto output
//! - `Cancelled`: interruzione richiesta dal chiamante
//! - `ResourceExhausted`: il buffer dei pixel supera il budget di memoria
//!
//! ## Esempio:
//! ```rust,ignore
//! if !source.exists() {
//!     return Err(CompressionError::not_found(source));
//! }
//! ```

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, CompressionError>;

/// Category of a compression failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Decode,
    Encode,
    Cancelled,
    ResourceExhausted,
}

impl ErrorKind {
    /// Error code surfaced to the host boundary
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "INVALID_ARGUMENT",
            _ => "COMPRESSION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Decode => "decode error",
            ErrorKind::Encode => "encode error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ResourceExhausted => "resource exhausted",
        };
        f.write_str(name)
    }
}

/// Structured error delivered exactly once per failed job
#[derive(thiserror::Error, Debug, Clone, Serialize)]
#[error("{kind}: {message}")]
pub struct CompressionError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl CompressionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(path: &Path) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("File not found at path: {}", path.display()),
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encode, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Compression cancelled")
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    /// Attach free-form diagnostic details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl From<std::io::Error> for CompressionError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::OutOfMemory => ErrorKind::ResourceExhausted,
            _ => ErrorKind::Encode,
        };
        Self::new(kind, format!("IO error: {}", err))
    }
}

impl From<image::ImageError> for CompressionError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;

        match err {
            ImageError::Limits(e) => Self::resource_exhausted(format!("Image exceeds limits: {}", e)),
            ImageError::Decoding(e) => Self::decode(format!("Failed to decode image: {}", e)),
            ImageError::Unsupported(e) => Self::decode(format!("Unsupported image: {}", e)),
            ImageError::Encoding(e) => Self::encode(format!("Failed to encode image: {}", e)),
            ImageError::Parameter(e) => Self::encode(format!("Invalid image parameter: {}", e)),
            ImageError::IoError(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_codes() {
        assert_eq!(CompressionError::validation("bad").code(), "INVALID_ARGUMENT");
        assert_eq!(CompressionError::decode("x").code(), "COMPRESSION_ERROR");
        assert_eq!(CompressionError::cancelled().code(), "COMPRESSION_ERROR");
        assert_eq!(ErrorKind::ResourceExhausted.code(), "COMPRESSION_ERROR");
    }

    #[test]
    fn test_io_error_mapping() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CompressionError::from(missing).kind, ErrorKind::NotFound);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(CompressionError::from(denied).kind, ErrorKind::Encode);
    }

    #[test]
    fn test_display_and_details() {
        let err = CompressionError::encode("encoder produced no output").with_details("jpeg");
        assert_eq!(err.to_string(), "encode error: encoder produced no output");
        assert_eq!(err.details.as_deref(), Some("jpeg"));
        assert!(CompressionError::cancelled().is_cancelled());
    }
}
