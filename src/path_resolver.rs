//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path di output.
//! Ogni invocazione riceve un nome univoco `compressed_{uuid}.{ext}` nella
//! directory di output process-scoped, così due job concorrenti non possono
//! collidere.

use crate::error::{CompressionError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Utility per calcolare i path di output in modo centralizzato
#[derive(Debug, Clone)]
pub struct PathResolver {
    output_dir: PathBuf,
}

impl PathResolver {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path univoco per un nuovo file di output con l'estensione data
    pub fn unique_output_path(&self, extension: &str) -> PathBuf {
        let filename = format!("compressed_{}.{}", Uuid::new_v4(), extension);
        let path = self.output_dir.join(filename);
        debug!("Resolved output path: {}", path.display());
        path
    }

    /// Crea la directory di output se necessario
    pub fn ensure_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            CompressionError::from(e).with_details(format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            ))
        })
    }
}
