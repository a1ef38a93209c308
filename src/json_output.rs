//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso
//! programmatico della CLI (un messaggio per riga su stdout).
//!
//! ## Responsabilità:
//! - Emette messaggi JSON strutturati per inizio, progresso, fine ed errori
//! - Riusa `CompressionResult`, `ProgressEvent` e `CompressionError`
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio di un job (tipo di media e sorgente)
//! - `progress`: Frazione corrente e percentuale
//! - `complete`: Risultato finale
//! - `error`: Codice, categoria e messaggio dell'errore

use crate::compression_result::CompressionResult;
use crate::error::{CompressionError, ErrorKind};
use crate::progress::ProgressEvent;
use serde::Serialize;
use std::path::PathBuf;

/// Media handled by a CLI job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JsonMessage {
    #[serde(rename_all = "camelCase")]
    Start {
        media: MediaKind,
        source: PathBuf,
        output_dir: PathBuf,
    },

    Progress { progress: f64, percentage: u8 },

    Complete { result: CompressionResult },

    Error {
        code: &'static str,
        kind: ErrorKind,
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(media: MediaKind, source: PathBuf, output_dir: PathBuf) -> Self {
        Self::Start {
            media,
            source,
            output_dir,
        }
    }

    pub fn progress(event: &ProgressEvent) -> Self {
        Self::Progress {
            progress: event.progress,
            percentage: event.percentage,
        }
    }

    pub fn complete(result: CompressionResult) -> Self {
        Self::Complete { result }
    }

    pub fn error(error: &CompressionError) -> Self {
        Self::Error {
            code: error.code(),
            kind: error.kind,
            message: error.message.clone(),
            details: error.details.clone(),
        }
    }
}
