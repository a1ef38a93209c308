//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file sorgente e di output.
//!
//! ## Responsabilità:
//! - Verifica dell'esistenza del file sorgente
//! - Lettura dimensione reale dei file scritti su disco
//! - Rimozione dei file parziali lasciati da job falliti o cancellati
//! - Utilità per calcoli dimensioni e percentuali
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati video in input:
//! - MP4, MOV, M4V, 3GP, WebM (`SUPPORTED_VIDEO_FORMATS`)
//!
//! ## Utilità:
//! - `format_size()`: Converte bytes in formato leggibile (KB, MB, GB)
//! - `calculate_reduction()`: Calcola percentuale di riduzione
//! - `compression_ratio()`: Rapporto compresso / originale
//!
//! ## Esempio:
//! ```rust,ignore
//! let original = FileManager::file_size(&source).await?;
//! let compressed = FileManager::file_size(&output).await?;
//! println!("{}", FileManager::format_size(original - compressed));
//! ```

use crate::error::{CompressionError, Result};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Video containers accepted as transcode input
pub const SUPPORTED_VIDEO_FORMATS: &[&str] = &["mp4", "mov", "m4v", "3gp", "webm"];

/// Manages file operations on sources and outputs
pub struct FileManager;

impl FileManager {
    /// Size in bytes of an existing file, `NotFound` if it is missing
    pub async fn file_size(path: &Path) -> Result<u64> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CompressionError::not_found(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking variant used inside `spawn_blocking` image jobs
    pub fn file_size_blocking(path: &Path) -> Result<u64> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CompressionError::not_found(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail with `NotFound` unless `path` is an existing regular file
    pub fn ensure_source(path: &Path) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(CompressionError::not_found(path))
        }
    }

    /// Delete a partial output, ignoring a file that was never created
    pub async fn remove_partial(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }

    /// Blocking variant of [`FileManager::remove_partial`]
    pub fn remove_partial_blocking(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }

    /// `compressed / original`, 0.0 for an empty original
    pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            compressed_size as f64 / original_size as f64
        }
    }
}
