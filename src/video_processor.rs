//! # Video Processing Module
//!
//! Questo modulo guida una transcodifica dall'analisi della sorgente fino al
//! file di output verificato.
//!
//! ## Responsabilità:
//! - Analisi sorgente tramite il backend (`probe`), con fallback 1920x1080
//!   se i metadati non sono leggibili
//! - Risoluzione dei parametri con `VideoParameterSelector`
//! - Esecuzione dell'encode con timeout e cancellazione cooperativa
//! - Progresso nativo quando il backend lo supporta, altrimenti stima
//!   tempo trascorso / durata sorgente
//! - Pulizia dell'output parziale su errore, cancellazione e timeout
//!
//! ## Pipeline:
//! 1. Checkpoint cancellazione, verifica esistenza sorgente (`NotFound`)
//! 2. `probe()` → `SourceMetadata` (oppure fallback)
//! 3. Checkpoint cancellazione, risoluzione parametri
//! 4. Encode verso `compressed_{uuid}.mp4`
//! 5. Esito unico: `Completed` → verifica output non vuoto, `Failed` →
//!   `Encode` con il messaggio del backend, `Cancelled` → `Cancelled`
//!
//! ## Esempio:
//! ```rust,ignore
//! let processor = VideoProcessor::new(&config, encoder, paths);
//! let result = processor
//!     .compress(&source, &VideoRequest::Tier(QualityTier::Low), Some(&mut progress), &cancel)
//!     .await?;
//! ```

use crate::cancel::CancelToken;
use crate::compression_result::CompressionResult;
use crate::config::Config;
use crate::encoder::{EncodeJob, EncodeOutcome, SourceMetadata, VideoEncoder};
use crate::error::{CompressionError, Result};
use crate::file_manager::FileManager;
use crate::path_resolver::PathResolver;
use crate::progress::{estimate_progress, JobProgress};
use crate::video_params::{ResolvedVideoParameters, VideoParameterSelector, VideoRequest};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handles video transcoding through a [`VideoEncoder`] backend
#[derive(Clone)]
pub struct VideoProcessor {
    encoder: Arc<dyn VideoEncoder>,
    selector: VideoParameterSelector,
    paths: PathResolver,
    keyframe_interval_secs: u32,
    audio_bitrate: String,
    progress_interval: Duration,
    encoder_timeout: Duration,
}

impl VideoProcessor {
    pub fn new(config: &Config, encoder: Arc<dyn VideoEncoder>, paths: PathResolver) -> Self {
        Self {
            encoder,
            selector: VideoParameterSelector::new(config.video_frame_rate),
            paths,
            keyframe_interval_secs: config.keyframe_interval_secs,
            audio_bitrate: config.audio_bitrate.clone(),
            progress_interval: config.progress_interval(),
            encoder_timeout: config.encoder_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.encoder_timeout = timeout;
        self
    }

    /// Probe the source and resolve the encode parameters
    pub async fn prepare(
        &self,
        source: &Path,
        request: &VideoRequest,
        cancel: &CancelToken,
    ) -> Result<(SourceMetadata, ResolvedVideoParameters)> {
        cancel.check()?;
        FileManager::ensure_source(source)?;

        let metadata = match self.encoder.probe(source).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    "Could not read metadata of {}: {}, assuming {}x{}",
                    source.display(),
                    e,
                    SourceMetadata::FALLBACK_WIDTH,
                    SourceMetadata::FALLBACK_HEIGHT
                );
                SourceMetadata::fallback()
            }
        };
        cancel.check()?;

        let params = self.selector.resolve(request, metadata.width, metadata.height)?;
        Ok((metadata, params))
    }

    /// Probe, resolve and transcode in one go
    pub async fn compress(
        &self,
        source: &Path,
        request: &VideoRequest,
        progress: Option<&mut JobProgress>,
        cancel: &CancelToken,
    ) -> Result<CompressionResult> {
        let (metadata, params) = self.prepare(source, request, cancel).await?;
        self.transcode(source, params, metadata, progress, cancel).await
    }

    /// Transcode `source` with already resolved parameters.
    ///
    /// Exactly one outcome is produced; progress is completed (forced to 1.0)
    /// only on success, and any partial output is removed on every failure.
    pub async fn transcode(
        &self,
        source: &Path,
        params: ResolvedVideoParameters,
        metadata: SourceMetadata,
        mut progress: Option<&mut JobProgress>,
        cancel: &CancelToken,
    ) -> Result<CompressionResult> {
        let start = Instant::now();

        FileManager::ensure_source(source)?;
        cancel.check()?;
        let original_size = FileManager::file_size(source).await?;

        self.paths.ensure_output_dir()?;
        let output = self.paths.unique_output_path("mp4");
        let job = EncodeJob {
            source: source.to_path_buf(),
            output: output.clone(),
            params,
            keyframe_interval_secs: self.keyframe_interval_secs,
            audio_bitrate: self.audio_bitrate.clone(),
            source_duration: metadata.duration,
        };

        let native = self.encoder.reports_progress(&job);
        info!(
            "Transcoding {} with {} ({}x{} @ {} bps, {} fps, native progress: {})",
            source.display(),
            self.encoder.name(),
            params.aligned_width,
            params.aligned_height,
            params.target_bitrate,
            params.frame_rate,
            native
        );

        let outcome = {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let encode = self.encoder.encode(&job, tx, cancel.clone());
            tokio::pin!(encode);

            let deadline = tokio::time::sleep(self.encoder_timeout);
            tokio::pin!(deadline);

            let mut ticker = tokio::time::interval(self.progress_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    outcome = &mut encode => break Some(outcome),
                    _ = &mut deadline => break None,
                    Some(fraction) = rx.recv(), if native => {
                        if let Some(progress) = progress.as_mut() {
                            progress.report(fraction).await;
                        }
                    }
                    _ = ticker.tick(), if !native => {
                        let estimate = estimate_progress(start.elapsed(), metadata.duration);
                        if let (Some(fraction), Some(progress)) = (estimate, progress.as_mut()) {
                            progress.report(fraction).await;
                        }
                    }
                }
            }
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                FileManager::remove_partial(&output).await;
                return Err(CompressionError::encode(format!(
                    "Encoder timed out after {:?}",
                    self.encoder_timeout
                )));
            }
        };

        match outcome {
            EncodeOutcome::Completed => {}
            EncodeOutcome::Cancelled => {
                debug!("Transcode of {} cancelled", source.display());
                FileManager::remove_partial(&output).await;
                return Err(CompressionError::cancelled());
            }
            EncodeOutcome::Failed(message) => {
                warn!("Transcode of {} failed: {}", source.display(), message);
                FileManager::remove_partial(&output).await;
                return Err(CompressionError::encode(message).with_details(self.encoder.name()));
            }
        }

        let compressed_size = match FileManager::file_size(&output).await {
            Ok(size) if size > 0 => size,
            _ => {
                FileManager::remove_partial(&output).await;
                return Err(CompressionError::encode("Encoder produced no output")
                    .with_details(self.encoder.name()));
            }
        };

        if let Some(progress) = progress.as_mut() {
            progress.complete().await;
        }

        let result = CompressionResult::new(
            output,
            original_size,
            compressed_size,
            (params.aligned_width, params.aligned_height),
            start.elapsed(),
        )
        .with_video_timing(metadata.duration.map(|d| d.as_secs_f64()));

        info!(
            "Compressed video {} -> {} ({} -> {}, {:.1}% reduction) in {:?}",
            source.display(),
            result.output_path.display(),
            FileManager::format_size(original_size),
            FileManager::format_size(compressed_size),
            result.reduction_percent,
            start.elapsed()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::{MockEncoder, Script};
    use crate::error::ErrorKind;
    use crate::progress::{ProgressEvent, ProgressReporter};
    use crate::video_params::{QualityTier, ResolutionTier, VideoOptions};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio_test::assert_err;

    struct Fixture {
        _temp_dir: TempDir,
        source: PathBuf,
        out_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, vec![1u8; 1000]).unwrap();
        let out_dir = temp_dir.path().join("out");
        Fixture {
            source,
            out_dir,
            _temp_dir: temp_dir,
        }
    }

    fn processor(fixture: &Fixture, encoder: MockEncoder, interval_ms: u64) -> VideoProcessor {
        let config = Config {
            progress_interval_ms: interval_ms,
            ..Default::default()
        };
        VideoProcessor::new(&config, Arc::new(encoder), PathResolver::new(&fixture.out_dir))
    }

    fn output_files(fixture: &Fixture) -> usize {
        std::fs::read_dir(&fixture.out_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    async fn collect(mut subscription: crate::progress::ProgressSubscription) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = subscription.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_successful_transcode_with_native_progress() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::succeeding(), 1);
        let reporter = ProgressReporter::new();
        let subscription = reporter.subscribe().await;
        let mut progress = reporter.begin(1, Duration::ZERO).await;

        let result = processor
            .compress(
                &fixture.source,
                &VideoRequest::Tier(QualityTier::Low),
                Some(&mut progress),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.original_size, 1000);
        assert_eq!(result.compressed_size, 100);
        assert_eq!(result.compression_ratio, 0.1);
        assert_eq!((result.width, result.height), (848, 480));
        assert_eq!(result.source_duration_secs, Some(0.2));
        assert_eq!(result.duration, result.elapsed_ms);
        assert!(result.output_path.exists());
        assert!(result.output_path.starts_with(&fixture.out_dir));

        let events = collect(subscription).await;
        let values: Vec<f64> = events.iter().map(|e| e.progress).collect();
        assert_eq!(values.last(), Some(&1.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values[..values.len() - 1].iter().all(|v| *v <= 0.95));
    }

    #[tokio::test]
    async fn test_heuristic_progress_without_native_support() {
        let fixture = fixture();
        let encoder = MockEncoder::new(Script::Succeed {
            steps: 10,
            step_delay: Duration::from_millis(30),
            output_bytes: 10,
        })
        .without_native_progress();
        let processor = processor(&fixture, encoder, 20);
        let reporter = ProgressReporter::new();
        let subscription = reporter.subscribe().await;
        let mut progress = reporter.begin(1, Duration::from_millis(20)).await;

        processor
            .compress(
                &fixture.source,
                &VideoRequest::Tier(QualityTier::Medium),
                Some(&mut progress),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let values: Vec<f64> = collect(subscription).await.iter().map(|e| e.progress).collect();
        assert!(values.len() >= 3, "{:?}", values);
        assert_eq!(values.last(), Some(&1.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values[..values.len() - 1].iter().all(|v| *v <= 0.95));
    }

    #[tokio::test]
    async fn test_failure_removes_partial_output() {
        let fixture = fixture();
        let processor = processor(
            &fixture,
            MockEncoder::new(Script::Fail("codec rejected input".to_string())),
            500,
        );

        let err = assert_err!(
            processor
                .compress(&fixture.source, &VideoRequest::Tier(QualityTier::High), None, &CancelToken::new())
                .await
        );

        assert_eq!(err.kind, ErrorKind::Encode);
        assert_eq!(err.message, "codec rejected input");
        assert_eq!(output_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_partial_output() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::new(Script::Hang), 500);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = assert_err!(
            processor
                .compress(&fixture.source, &VideoRequest::Tier(QualityTier::Low), None, &cancel)
                .await
        );

        assert!(err.is_cancelled());
        assert_eq!(output_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_encode_never_starts_backend() {
        let fixture = fixture();
        let encoder = Arc::new(MockEncoder::succeeding());
        let config = Config::default();
        let processor = VideoProcessor::new(&config, encoder.clone(), PathResolver::new(&fixture.out_dir));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = assert_err!(
            processor
                .compress(&fixture.source, &VideoRequest::Tier(QualityTier::Low), None, &cancel)
                .await
        );
        assert!(err.is_cancelled());
        assert_eq!(encoder.encode_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_partial_output() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::new(Script::Hang), 500)
            .with_timeout(Duration::from_millis(50));

        let err = assert_err!(
            processor
                .compress(&fixture.source, &VideoRequest::Tier(QualityTier::Low), None, &CancelToken::new())
                .await
        );

        assert_eq!(err.kind, ErrorKind::Encode);
        assert!(err.message.contains("timed out"));
        assert_eq!(output_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_encode_error() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::new(Script::EmptyOutput), 500);

        let err = assert_err!(
            processor
                .compress(&fixture.source, &VideoRequest::Tier(QualityTier::Low), None, &CancelToken::new())
                .await
        );

        assert_eq!(err.kind, ErrorKind::Encode);
        assert_eq!(output_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_uses_fallback_geometry() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::succeeding().with_metadata(None), 500);
        let options = VideoOptions {
            resolution: Some(ResolutionTier::Low),
            ..Default::default()
        };

        let (metadata, params) = processor
            .prepare(&fixture.source, &VideoRequest::Options(options), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(metadata, SourceMetadata::fallback());
        assert_eq!(params.target_bitrate, 500_000);
        assert_eq!((params.aligned_width, params.aligned_height), (848, 480));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let fixture = fixture();
        let processor = processor(&fixture, MockEncoder::succeeding(), 500);

        let err = assert_err!(
            processor
                .compress(
                    &fixture.source.with_file_name("missing.mp4"),
                    &VideoRequest::Tier(QualityTier::Low),
                    None,
                    &CancelToken::new()
                )
                .await
        );
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_low_tier_output_not_taller_than_source() {
        let fixture = fixture();
        let encoder = MockEncoder::succeeding().with_metadata(Some(SourceMetadata {
            width: 1280,
            height: 720,
            duration: None,
        }));
        let processor = processor(&fixture, encoder, 500);

        let (_, params) = processor
            .prepare(&fixture.source, &VideoRequest::Tier(QualityTier::parse("low")), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(params.target_bitrate, 500_000);
        assert_eq!(params.target_height, 480);
        assert_eq!((params.aligned_width, params.aligned_height), (848, 480));
        assert!(params.aligned_height <= 720);
    }
}
