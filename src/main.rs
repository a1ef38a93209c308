//! # Media Compressor - Main Entry Point
//!
//! Questo è il punto di ingresso della CLI.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento della configurazione e creazione del `CompressionController`
//! - Visualizzazione del progresso (progress bar o messaggi JSON)
//! - Cancellazione del job video con Ctrl+C
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` ha la precedenza)
//! 3. Carica la configurazione e applica gli override della CLI
//! 4. Esegue il sottocomando e riporta il risultato
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-compressor image photo.jpg --quality 70 --max-width 1280 --format webp
//! media-compressor video clip.mov --tier low --json
//! media-compressor video clip.mov --resolution high --fps 24
//! ```

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_compressor::file_manager::FileManager;
use media_compressor::json_output::{JsonMessage, MediaKind};
use media_compressor::progress::ProgressManager;
use media_compressor::{
    CompressionController, CompressionError, CompressionResult, Config, ImageOptions,
    QualityTier, ResolutionTier, VideoOptions, VideoRequest,
};

#[derive(Parser)]
#[command(name = "media-compressor")]
#[command(about = "Compress images and videos into a local output directory")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for compressed files (default: user cache directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Emit JSON lines instead of a progress bar
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a single image
    Image(ImageArgs),
    /// Compress a single video
    Video(VideoArgs),
    /// List the supported formats
    Formats,
}

#[derive(ClapArgs)]
struct ImageArgs {
    path: PathBuf,

    /// Quality (0-100, default from configuration)
    #[arg(short, long, allow_negative_numbers = true)]
    quality: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    max_width: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    max_height: Option<i64>,

    /// Output format: jpeg, png or webp
    #[arg(short, long)]
    format: Option<String>,
}

#[derive(ClapArgs)]
struct VideoArgs {
    path: PathBuf,

    /// Quality tier: veryLow, low, medium, high, veryHigh
    #[arg(short, long, default_value = "medium")]
    tier: String,

    /// Resolution tier: low, medium, high (switches to explicit options)
    #[arg(long)]
    resolution: Option<String>,

    /// Target bitrate in bits per second
    #[arg(long)]
    bitrate: Option<u64>,

    /// Target height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Output frame rate
    #[arg(long)]
    fps: Option<u32>,
}

impl VideoArgs {
    fn request(&self) -> std::result::Result<VideoRequest, CompressionError> {
        let explicit = self.resolution.is_some()
            || self.bitrate.is_some()
            || self.height.is_some()
            || self.fps.is_some();
        if explicit {
            return Ok(VideoRequest::Options(VideoOptions {
                resolution: self.resolution.as_deref().map(ResolutionTier::parse),
                bitrate: self.bitrate,
                target_height: self.height,
                frame_rate: self.fps,
            }));
        }
        if self.tier.trim().is_empty() {
            return Err(CompressionError::validation("Quality tier is required"));
        }
        Ok(VideoRequest::Tier(QualityTier::parse(&self.tier)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    if let Some(ref output_dir) = args.output {
        config.output_dir = Some(output_dir.clone());
    }
    config.json_output = config.json_output || args.json;
    let json = config.json_output;
    let output_dir = config.resolve_output_dir();

    let controller = CompressionController::create(config)?;

    let outcome = match args.command {
        Command::Formats => {
            print_formats(&controller, json);
            return Ok(());
        }
        Command::Image(ref image) => {
            if json {
                JsonMessage::start(MediaKind::Image, image.path.clone(), output_dir).emit();
            }
            run_image(&controller, image, json).await
        }
        Command::Video(ref video) => {
            if json {
                JsonMessage::start(MediaKind::Video, video.path.clone(), output_dir).emit();
            }
            run_video(&controller, video, json).await
        }
    };

    controller.dispose().await;

    match outcome {
        Ok(result) => {
            report(&result, json);
            Ok(())
        }
        Err(e) => {
            if json {
                JsonMessage::error(&e).emit();
            }
            Err(anyhow::anyhow!("[{}] {}", e.code(), e))
        }
    }
}

async fn run_image(
    controller: &CompressionController,
    args: &ImageArgs,
    json: bool,
) -> std::result::Result<CompressionResult, CompressionError> {
    let options = ImageOptions {
        quality: args.quality,
        max_width: args.max_width,
        max_height: args.max_height,
        format: args.format.clone(),
    };

    let spinner = (!json).then(|| ProgressManager::spinner(&display_name(&args.path)));
    let result = controller.compress_image_with_options(&args.path, options).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result
}

async fn run_video(
    controller: &CompressionController,
    args: &VideoArgs,
    json: bool,
) -> std::result::Result<CompressionResult, CompressionError> {
    let request = args.request()?;
    let mut subscription = controller.listen().await?;
    let handle = controller.start_video(&args.path, request).await?;
    info!("Video job {} started", handle.id());

    let bar = (!json).then(|| ProgressManager::new(&display_name(&args.path)));
    let forward_bar = bar.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match forward_bar {
                Some(ref bar) => bar.update(&event),
                None => JsonMessage::progress(&event).emit(),
            }
        }
    });

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling video job");
            controller.cancel_compression().await;
            wait.await
        }
    };

    if let Err(e) = forwarder.await {
        warn!("Progress forwarding stopped: {}", e);
    }

    if let Some(bar) = bar {
        match result {
            Ok(_) => bar.finish("done"),
            Err(ref e) if e.is_cancelled() => bar.abandon("cancelled"),
            Err(_) => bar.abandon("failed"),
        }
    }
    result
}

fn print_formats(controller: &CompressionController, json: bool) {
    let images = controller.supported_image_formats();
    let videos = controller.supported_video_formats();
    if json {
        let value = serde_json::json!({ "type": "formats", "image": images, "video": videos });
        println!("{}", value);
    } else {
        println!("Image formats: {}", images.join(", "));
        println!("Video formats: {}", videos.join(", "));
        if !controller.video_available() {
            println!("(ffmpeg not found: video compression unavailable)");
        }
    }
}

fn report(result: &CompressionResult, json: bool) {
    if json {
        JsonMessage::complete(result.clone()).emit();
        return;
    }

    println!("Output:    {}", result.output_path.display());
    println!(
        "Size:      {} -> {} ({:.1}% smaller)",
        FileManager::format_size(result.original_size),
        FileManager::format_size(result.compressed_size),
        result.reduction_percent
    );
    println!("Geometry:  {}x{}", result.width, result.height);
    if let Some(source) = result.source_duration_secs {
        println!("Clip:      {:.1}s", source);
    }
    if let Some(elapsed) = result.elapsed_ms {
        println!("Elapsed:   {} ms", elapsed);
    }
    for note in &result.notes {
        println!("Note:      {}", note);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
