//! # Compression Controller
//!
//! Punto d'ingresso unico per le richieste di compressione.
//!
//! ## Responsabilità:
//! - Validazione completa degli argomenti prima di avviare qualsiasi lavoro
//!   (`INVALID_ARGUMENT`)
//! - Avvio dei job immagine (thread bloccante) e video (task asincrono)
//! - Tracking di un solo job video alla volta; un nuovo job sostituisce il
//!   tracking senza cancellare il precedente
//! - Cancellazione del job video tracciato (`cancel_compression`, no-op se
//!   nessun job è attivo)
//! - Slot unico per il listener di progresso
//! - Ciclo di vita esplicito: `create` / `dispose`
//!
//! ## Esempio:
//! ```rust,ignore
//! let controller = CompressionController::create(config)?;
//! let mut progress = controller.listen().await?;
//! let handle = controller.start_video("clip.mp4", VideoRequest::Tier(QualityTier::Low)).await?;
//! while let Some(event) = progress.recv().await {
//!     println!("{}%", event.percentage);
//! }
//! let result = handle.wait().await?;
//! ```

use super::job::{ActiveJob, JobId, VideoJobHandle};
use crate::cancel::CancelToken;
use crate::compression_result::CompressionResult;
use crate::config::Config;
use crate::encoder::{FfmpegEncoder, VideoEncoder};
use crate::error::{CompressionError, Result};
use crate::file_manager::SUPPORTED_VIDEO_FORMATS;
use crate::image_processor::{ImageProcessor, ImageRequest, OutputFormat};
use crate::path_resolver::PathResolver;
use crate::progress::{ProgressReporter, ProgressSubscription};
use crate::tool_resolver::ToolPathResolver;
use crate::video_params::{QualityTier, VideoOptions, VideoRequest};
use crate::video_processor::VideoProcessor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

/// Image options as received from the caller, validated before use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOptions {
    /// 0-100, the configured default when absent
    pub quality: Option<i32>,
    pub max_width: Option<i64>,
    pub max_height: Option<i64>,
    pub format: Option<String>,
}

struct Inner {
    config: Config,
    images: ImageProcessor,
    videos: Option<VideoProcessor>,
    reporter: ProgressReporter,
    active_video: Mutex<Option<ActiveJob>>,
    lifecycle: CancelToken,
    next_job_id: AtomicU64,
    disposed: AtomicBool,
}

impl Inner {
    /// Stop tracking `id` unless a newer job took its place
    async fn release(&self, id: JobId) {
        let mut active = self.active_video.lock().await;
        if active.as_ref().map(|job| job.id) == Some(id) {
            *active = None;
        }
    }
}

/// Owns the engines, the progress slot and the tracked video job
#[derive(Clone)]
pub struct CompressionController {
    inner: Arc<Inner>,
}

impl CompressionController {
    /// Build a controller with the ffmpeg backend, if one can be found
    pub fn create(config: Config) -> Result<Self> {
        let resolver = ToolPathResolver::new();
        let encoder = FfmpegEncoder::locate(&config, &resolver)
            .map(|encoder| Arc::new(encoder) as Arc<dyn VideoEncoder>);
        if encoder.is_none() {
            warn!("ffmpeg not found, video compression is unavailable");
        }
        Self::build(config, encoder)
    }

    /// Build a controller around an explicit video backend
    pub fn with_encoder(config: Config, encoder: Arc<dyn VideoEncoder>) -> Result<Self> {
        Self::build(config, Some(encoder))
    }

    fn build(config: Config, encoder: Option<Arc<dyn VideoEncoder>>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CompressionError::validation(e.to_string()))?;

        let paths = PathResolver::new(config.resolve_output_dir());
        paths.ensure_output_dir()?;
        debug!("Output directory: {}", paths.output_dir().display());

        let images = ImageProcessor::new(&config, paths.clone());
        let videos = encoder.map(|encoder| VideoProcessor::new(&config, encoder, paths));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                images,
                videos,
                reporter: ProgressReporter::new(),
                active_video: Mutex::new(None),
                lifecycle: CancelToken::new(),
                next_job_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_active(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(CompressionError::validation("Controller has been disposed"))
        } else {
            Ok(())
        }
    }

    fn next_job_id(&self) -> JobId {
        self.inner.next_job_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register the progress listener, replacing any previous one
    pub async fn listen(&self) -> Result<ProgressSubscription> {
        self.ensure_active()?;
        Ok(self.inner.reporter.subscribe().await)
    }

    pub async fn unlisten(&self) {
        self.inner.reporter.unsubscribe().await;
    }

    /// Compress an image at `quality`, returning the output path
    pub async fn compress_image(&self, path: impl AsRef<Path>, quality: i32) -> Result<PathBuf> {
        let options = ImageOptions {
            quality: Some(quality),
            ..Default::default()
        };
        self.compress_image_with_options(path, options)
            .await
            .map(|result| result.output_path)
    }

    pub async fn compress_image_with_options(
        &self,
        path: impl AsRef<Path>,
        options: ImageOptions,
    ) -> Result<CompressionResult> {
        self.ensure_active()?;
        let source = validate_path(path.as_ref())?;
        let quality = match options.quality {
            Some(quality) => validate_quality(quality)?,
            None => self.inner.config.default_image_quality,
        };
        let max_width = validate_dimension("maxWidth", options.max_width)?;
        let max_height = validate_dimension("maxHeight", options.max_height)?;
        let format = options
            .format
            .as_deref()
            .map(OutputFormat::parse)
            .unwrap_or_default();

        let request = ImageRequest::new(source, quality)
            .with_bounds(max_width, max_height)
            .with_format(format);

        let id = self.next_job_id();
        let span = info_span!("image_job", id);
        async {
            info!("Starting image job for {}", request.source.display());
            let result = self
                .inner
                .images
                .compress_in_background(request, self.inner.lifecycle.clone())
                .await;
            if let Err(ref e) = result {
                warn!("Image job failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Start a video job in the background and track it
    pub async fn start_video(&self, path: impl AsRef<Path>, request: VideoRequest) -> Result<VideoJobHandle> {
        self.ensure_active()?;
        let source = validate_path(path.as_ref())?;
        if let VideoRequest::Options(ref options) = request {
            validate_video_options(options)?;
        }

        let processor = self
            .inner
            .videos
            .clone()
            .ok_or_else(|| CompressionError::encode("No video encoder available"))?;

        let id = self.next_job_id();
        let cancel = CancelToken::new();
        {
            let mut active = self.inner.active_video.lock().await;
            let previous = active.replace(ActiveJob {
                id,
                cancel: cancel.clone(),
            });
            if let Some(previous) = previous {
                warn!(
                    "Video job {} now tracked, job {} keeps running untracked",
                    id, previous.id
                );
            }
        }

        let mut progress = self
            .inner
            .reporter
            .begin(id, self.inner.config.progress_interval())
            .await;

        // Dispose cancels jobs that are no longer tracked as well
        let watcher = {
            let lifecycle = self.inner.lifecycle.clone();
            let job_cancel = cancel.clone();
            tokio::spawn(async move {
                lifecycle.cancelled().await;
                job_cancel.cancel();
            })
        };

        let inner = self.inner.clone();
        let job_cancel = cancel.clone();
        let span = info_span!("video_job", id);
        let task = tokio::spawn(
            async move {
                info!("Starting video job for {} ({:?})", source.display(), request);
                let result = processor
                    .compress(&source, &request, Some(&mut progress), &job_cancel)
                    .await;

                progress.finish().await;
                watcher.abort();
                inner.release(id).await;

                match &result {
                    Ok(r) => info!("Video job finished: {}", r.output_path.display()),
                    Err(e) if e.is_cancelled() => info!("Video job cancelled"),
                    Err(e) => warn!("Video job failed: {}", e),
                }
                result
            }
            .instrument(span),
        );

        Ok(VideoJobHandle::new(id, cancel, task))
    }

    /// Compress a video with a named quality tier, returning the output path
    pub async fn compress_video(&self, path: impl AsRef<Path>, tier: &str) -> Result<PathBuf> {
        self.ensure_active()?;
        if tier.trim().is_empty() {
            return Err(CompressionError::validation("Quality tier is required"));
        }
        let handle = self
            .start_video(path, VideoRequest::Tier(QualityTier::parse(tier)))
            .await?;
        handle.wait().await.map(|result| result.output_path)
    }

    pub async fn compress_video_with_options(
        &self,
        path: impl AsRef<Path>,
        options: VideoOptions,
    ) -> Result<CompressionResult> {
        let handle = self.start_video(path, VideoRequest::Options(options)).await?;
        handle.wait().await
    }

    /// Cancel the tracked video job; returns whether there was one
    pub async fn cancel_compression(&self) -> bool {
        let active = self.inner.active_video.lock().await.take();
        match active {
            Some(job) => {
                info!("Cancelling video job {}", job.id);
                job.cancel.cancel();
                true
            }
            None => {
                debug!("No video job to cancel");
                false
            }
        }
    }

    /// Id of the tracked video job
    pub async fn active_job(&self) -> Option<JobId> {
        self.inner.active_video.lock().await.as_ref().map(|job| job.id)
    }

    pub fn supported_image_formats(&self) -> Vec<&'static str> {
        OutputFormat::SUPPORTED.to_vec()
    }

    pub fn supported_video_formats(&self) -> Vec<&'static str> {
        SUPPORTED_VIDEO_FORMATS.to_vec()
    }

    pub fn video_available(&self) -> bool {
        self.inner.videos.is_some()
    }

    pub fn progress_interval(&self) -> Duration {
        self.inner.config.progress_interval()
    }

    /// Cancel all work and close the listener; later calls fail
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disposing compression controller");
        self.inner.lifecycle.cancel();
        if let Some(job) = self.inner.active_video.lock().await.take() {
            job.cancel.cancel();
        }
        self.inner.reporter.close().await;
    }
}

fn validate_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CompressionError::validation("Path is required"));
    }
    Ok(path.to_path_buf())
}

fn validate_quality(quality: i32) -> Result<u8> {
    u8::try_from(quality)
        .ok()
        .filter(|q| *q <= 100)
        .ok_or_else(|| {
            CompressionError::validation(format!("Quality must be between 0 and 100, got {}", quality))
        })
}

fn validate_dimension(name: &str, value: Option<i64>) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) if v >= 1 => u32::try_from(v)
            .map(Some)
            .map_err(|_| CompressionError::validation(format!("{} is too large: {}", name, v))),
        Some(v) => Err(CompressionError::validation(format!(
            "{} must be positive, got {}",
            name, v
        ))),
    }
}

fn validate_video_options(options: &VideoOptions) -> Result<()> {
    if options.bitrate == Some(0) {
        return Err(CompressionError::validation("Bitrate must be positive"));
    }
    if options.target_height == Some(0) {
        return Err(CompressionError::validation("Target height must be positive"));
    }
    if let Some(frame_rate) = options.frame_rate {
        if frame_rate == 0 || frame_rate > 120 {
            return Err(CompressionError::validation(format!(
                "Frame rate must be between 1 and 120, got {}",
                frame_rate
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::{MockEncoder, Script};
    use crate::error::ErrorKind;
    use crate::video_params::ResolutionTier;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn test_config(dir: &Path) -> Config {
        Config {
            output_dir: Some(dir.join("out")),
            progress_interval_ms: 1,
            ..Default::default()
        }
    }

    fn controller(dir: &Path, encoder: MockEncoder) -> CompressionController {
        CompressionController::with_encoder(test_config(dir), Arc::new(encoder)).unwrap()
    }

    fn write_photo(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("photo.jpg");
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        DynamicImage::ImageRgb8(img)
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        path
    }

    fn write_clip(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, vec![1u8; 1000]).unwrap();
        path
    }

    fn output_files(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("out"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_rejected_up_front() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let photo = write_photo(temp_dir.path(), 32, 32);

        for quality in [-1, 101, 1000] {
            let err = controller.compress_image(&photo, quality).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_ARGUMENT");
        }

        let err = controller.compress_image("", 80).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let options = ImageOptions {
            max_width: Some(0),
            ..Default::default()
        };
        let err = controller.compress_image_with_options(&photo, options).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = controller.compress_video("clip.mp4", "  ").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let options = VideoOptions {
            bitrate: Some(0),
            ..Default::default()
        };
        let err = controller.compress_video_with_options("clip.mp4", options).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        assert_eq!(output_files(temp_dir.path()), 0);
        assert_eq!(controller.active_job().await, None);
    }

    #[tokio::test]
    async fn test_compress_image_returns_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let photo = write_photo(temp_dir.path(), 120, 80);

        let output = assert_ok!(controller.compress_image(&photo, 70).await);
        assert!(output.exists());
        assert!(output.starts_with(temp_dir.path().join("out")));
        assert_eq!(output.extension().and_then(|e| e.to_str()), Some("jpg"));
    }

    #[tokio::test]
    async fn test_image_options_bound_and_convert() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let photo = write_photo(temp_dir.path(), 1600, 1200);

        let options = ImageOptions {
            quality: Some(80),
            max_width: Some(800),
            max_height: Some(600),
            format: Some("webp".to_string()),
        };
        let result = assert_ok!(controller.compress_image_with_options(&photo, options).await);

        assert!(result.width <= 800);
        assert!(result.height <= 600);
        assert_eq!(result.output_path.extension().and_then(|e| e.to_str()), Some("webp"));
        assert!(result.compressed_size > 0);
    }

    #[tokio::test]
    async fn test_missing_image_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());

        let err = assert_err!(controller.compress_image(temp_dir.path().join("gone.jpg"), 80).await);
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.code(), "COMPRESSION_ERROR");
    }

    #[tokio::test]
    async fn test_video_reports_progress_to_listener() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let clip = write_clip(temp_dir.path());

        let mut subscription = controller.listen().await.unwrap();
        let output = assert_ok!(controller.compress_video(&clip, "low").await);
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 100);

        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), subscription.recv()).await
        {
            events.push(event);
        }

        assert!(!events.is_empty());
        assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(events.last().map(|e| e.percentage), Some(100));
        assert!(events[..events.len() - 1].iter().all(|e| e.progress <= 0.95));
        assert_eq!(controller.active_job().await, None);
    }

    #[tokio::test]
    async fn test_video_options_resolution_tier() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let clip = write_clip(temp_dir.path());

        let options = VideoOptions {
            resolution: Some(ResolutionTier::Low),
            ..Default::default()
        };
        let result = assert_ok!(controller.compress_video_with_options(&clip, options).await);
        assert_eq!(result.height, 480);
        assert_eq!(result.width % 16, 0);
    }

    #[tokio::test]
    async fn test_cancel_compression_stops_tracked_job() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::new(Script::Hang));
        let clip = write_clip(temp_dir.path());

        let handle = controller
            .start_video(&clip, VideoRequest::Tier(QualityTier::Medium))
            .await
            .unwrap();
        assert_eq!(controller.active_job().await, Some(handle.id()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.cancel_compression().await);

        let err = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(output_files(temp_dir.path()), 0);
        assert_eq!(controller.active_job().await, None);
    }

    #[tokio::test]
    async fn test_cancel_without_job_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());

        assert!(!controller.cancel_compression().await);
        assert!(!controller.cancel_compression().await);
    }

    #[tokio::test]
    async fn test_new_job_replaces_tracking_without_cancelling() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::new(Script::Hang));
        let clip = write_clip(temp_dir.path());

        let first = controller
            .start_video(&clip, VideoRequest::Tier(QualityTier::Low))
            .await
            .unwrap();
        let second = controller
            .start_video(&clip, VideoRequest::Tier(QualityTier::Low))
            .await
            .unwrap();
        assert_eq!(controller.active_job().await, Some(second.id()));

        assert!(controller.cancel_compression().await);
        let err = tokio::time::timeout(Duration::from_secs(2), second.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!first.is_finished());

        first.cancel();
        let err = tokio::time::timeout(Duration::from_secs(2), first.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_dispose_cancels_work_and_rejects_calls() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::new(Script::Hang));
        let clip = write_clip(temp_dir.path());
        let photo = write_photo(temp_dir.path(), 16, 16);

        let mut subscription = controller.listen().await.unwrap();
        let handle = controller
            .start_video(&clip, VideoRequest::Tier(QualityTier::High))
            .await
            .unwrap();

        controller.dispose().await;
        controller.dispose().await;

        let err = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(subscription.recv().await, None);

        let err = assert_err!(controller.compress_image(&photo, 80).await);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(controller.listen().await.is_err());
    }

    #[tokio::test]
    async fn test_unlisten_keeps_job_running() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());
        let clip = write_clip(temp_dir.path());

        let mut subscription = controller.listen().await.unwrap();
        controller.unlisten().await;
        assert_eq!(subscription.recv().await, None);

        let output = assert_ok!(controller.compress_video(&clip, "high").await);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_video_without_encoder_fails() {
        let temp_dir = TempDir::new().unwrap();
        let controller = CompressionController::build(test_config(temp_dir.path()), None).unwrap();
        let clip = write_clip(temp_dir.path());

        assert!(!controller.video_available());
        let err = assert_err!(controller.compress_video(&clip, "medium").await);
        assert_eq!(err.kind, ErrorKind::Encode);
        assert_eq!(controller.active_job().await, None);
    }

    #[tokio::test]
    async fn test_supported_formats() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(temp_dir.path(), MockEncoder::succeeding());

        assert_eq!(controller.supported_image_formats(), vec!["jpeg", "png", "webp"]);
        assert!(controller.supported_video_formats().contains(&"mp4"));
        assert!(controller.supported_video_formats().contains(&"mov"));
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = Config {
            default_image_quality: 0,
            ..Default::default()
        };
        let err = CompressionController::with_encoder(config, Arc::new(MockEncoder::succeeding()))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
