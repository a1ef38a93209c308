//! # Video Encoder Backends
//!
//! Il motore di transcodifica non conosce l'encoder concreto: parla con un
//! backend che implementa [`VideoEncoder`].
//!
//! ## Responsabilità:
//! - `probe()`: durata e risoluzione visualizzata della sorgente
//! - `encode()`: transcodifica completa verso il file di output, con un unico
//!   esito terminale (`Completed`, `Failed`, `Cancelled`)
//! - `reports_progress(job)`: capability check per il progresso nativo sul job;
//!   se assente il motore usa la stima tempo trascorso / durata. Senza durata
//!   nota nessuna delle due strade produce frazioni: il job arriva a 1.0 solo
//!   al completamento
//!
//! ## Backend disponibili:
//! - `FfmpegEncoder`: H.264 + AAC in MP4 tramite `ffmpeg` / `ffprobe`

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::video_params::ResolvedVideoParameters;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Geometry and duration of a source clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    /// Display width, rotation already applied
    pub width: u32,
    /// Display height, rotation already applied
    pub height: u32,
    pub duration: Option<Duration>,
}

impl SourceMetadata {
    pub const FALLBACK_WIDTH: u32 = 1920;
    pub const FALLBACK_HEIGHT: u32 = 1080;

    /// Assumed geometry when probing fails
    pub fn fallback() -> Self {
        Self {
            width: Self::FALLBACK_WIDTH,
            height: Self::FALLBACK_HEIGHT,
            duration: None,
        }
    }
}

/// Everything a backend needs to run one transcode
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub source: PathBuf,
    pub output: PathBuf,
    pub params: ResolvedVideoParameters,
    pub keyframe_interval_secs: u32,
    pub audio_bitrate: String,
    pub source_duration: Option<Duration>,
}

/// Terminal result of a backend encode
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `encode` sends native progress fractions for this job
    fn reports_progress(&self, job: &EncodeJob) -> bool;

    async fn probe(&self, source: &Path) -> Result<SourceMetadata>;

    /// Run the transcode. Progress fractions in `[0, 1]` go to `progress`
    /// when the backend supports them; `cancel` must abort the work and yield
    /// `EncodeOutcome::Cancelled`.
    async fn encode(
        &self,
        job: &EncodeJob,
        progress: mpsc::UnboundedSender<f64>,
        cancel: CancelToken,
    ) -> EncodeOutcome;
}
