//! # Image Processing Module
//!
//! Questo modulo gestisce la compressione delle immagini interamente in memoria:
//! decodifica, correzione dell'orientamento EXIF, ridimensionamento e
//! ri-codifica alla qualità richiesta.
//!
//! ## Formati Supportati
//!
//! | Formato | Input | Output | Encoder |
//! |---------|-------|--------|---------|
//! | JPEG    | ✅    | ✅     | `image::codecs::jpeg` (qualità 1-100) |
//! | PNG     | ✅    | ✅     | `image::codecs::png` (lossless, qualità ignorata) |
//! | WebP    | ✅    | ✅     | `webp` (libwebp, qualità 0-100) |
//! | HEIC    | ❌    | ❌     | Fallback a JPEG |
//!
//! ## Pipeline di Compressione
//!
//! 1. **Validazione sorgente**: `NotFound` se il file non esiste
//! 2. **Lettura bounds**: solo header, nessuna decodifica dei pixel
//! 3. **Orientamento**: lettura del tag EXIF e calcolo delle dimensioni visualizzate
//! 4. **Downsample factor**: potenza di due calcolata sui bounds completi; per
//!    JPEG il decoder emette direttamente un buffer ridotto
//! 5. **Budget memoria**: `ResourceExhausted` se il buffer decodificato supera
//!    `max_buffer_bytes`
//! 6. **Trasformazioni**: rotazione/flip e resize finale; se il buffer di
//!    destinazione non rientra nel budget si mantiene la bitmap precedente
//! 7. **Encode**: in memoria, errore `Encode` se l'output è vuoto
//! 8. **Scrittura**: path univoco, dimensioni lette dal file scritto
//!
//! ## Gestione Memoria
//!
//! Ogni buffer intermedio vive nello scope della singola trasformazione e viene
//! rilasciato appena sostituito, anche sui percorsi di errore.
//!
//! ## Cancellazione
//!
//! Il job gira su un thread bloccante (`spawn_blocking`) e controlla il
//! `CancelToken` prima della decodifica, dopo la decodifica e prima della
//! scrittura del file.
//!
//! ## Esempio
//!
//! ```rust,ignore
//! let processor = ImageProcessor::new(&config, PathResolver::new(output_dir));
//! let request = ImageRequest::new("photo.jpg", 60)
//!     .with_bounds(Some(800), Some(600))
//!     .with_format(OutputFormat::parse("png"));
//! let result = processor.compress_in_background(request, CancelToken::new()).await?;
//! ```

use crate::cancel::CancelToken;
use crate::compression_result::CompressionResult;
use crate::config::Config;
use crate::error::{CompressionError, Result};
use crate::file_manager::FileManager;
use crate::orientation::{self, Orientation};
use crate::path_resolver::PathResolver;
use crate::resize;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output formats the image engine can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// Formats accepted as explicit output
    pub const SUPPORTED: &'static [&'static str] = &["jpeg", "png", "webp"];

    /// Parse a requested format; anything unsupported falls back to JPEG
    pub fn parse(format: &str) -> Self {
        match format.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => OutputFormat::Jpeg,
            "png" => OutputFormat::Png,
            "webp" => OutputFormat::Webp,
            "heic" | "heif" => {
                debug!("HEIC output is not available, encoding JPEG");
                OutputFormat::Jpeg
            }
            other => {
                warn!("Unsupported output format '{}', falling back to JPEG", other);
                OutputFormat::Jpeg
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }
}

/// A single image compression request, validated by the controller
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub source: PathBuf,
    /// 0-100, PNG output ignores it
    pub quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub format: OutputFormat,
}

impl ImageRequest {
    pub fn new(source: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            source: source.into(),
            quality,
            max_width: None,
            max_height: None,
            format: OutputFormat::Jpeg,
        }
    }

    pub fn with_bounds(mut self, max_width: Option<u32>, max_height: Option<u32>) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

/// In-memory image compression engine
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_buffer_bytes: u64,
    paths: PathResolver,
}

impl ImageProcessor {
    pub fn new(config: &Config, paths: PathResolver) -> Self {
        Self {
            max_buffer_bytes: config.max_buffer_bytes,
            paths,
        }
    }

    /// Run [`ImageProcessor::compress`] on the blocking thread pool
    pub async fn compress_in_background(
        &self,
        request: ImageRequest,
        cancel: CancelToken,
    ) -> Result<CompressionResult> {
        let processor = self.clone();
        tokio::task::spawn_blocking(move || processor.compress(&request, &cancel))
            .await
            .map_err(|e| CompressionError::encode(format!("Image job aborted: {}", e)))?
    }

    /// Compresses one image synchronously.
    ///
    /// # Errors
    /// - `NotFound` if the source does not exist
    /// - `Decode` if the source is not a readable image
    /// - `ResourceExhausted` if even the downsampled buffer exceeds the budget
    /// - `Encode` if the encoder fails or produces no output
    /// - `Cancelled` if the token fires at a checkpoint
    pub fn compress(&self, request: &ImageRequest, cancel: &CancelToken) -> Result<CompressionResult> {
        let start = Instant::now();
        let source = request.source.as_path();

        cancel.check()?;
        FileManager::ensure_source(source)?;
        let original_size = FileManager::file_size_blocking(source)?;

        let (format, (width, height)) = read_bounds(source)?;
        let orientation = orientation::read_orientation(source);

        // Fit in display orientation, then map the target back to stored pixels
        let (display_w, display_h) = orientation.display_dimensions(width, height);
        let (target_w, target_h) =
            resize::fit_within(display_w, display_h, request.max_width, request.max_height);
        let (stored_target_w, stored_target_h) = orientation.display_dimensions(target_w, target_h);
        let factor = resize::downsample_factor(width, height, stored_target_w, stored_target_h);

        debug!(
            "Image {}: {}x{} {:?}, orientation {:?}, target {}x{}, downsample 1/{}",
            source.display(),
            width,
            height,
            format,
            orientation,
            target_w,
            target_h,
            factor
        );

        let img = self.decode(source, format, (width, height), factor)?;
        cancel.check()?;

        let mut notes = Vec::new();
        let img = self.correct_orientation(img, orientation, &mut notes);
        let img = self.resize_to_fit(img, request.max_width, request.max_height, &mut notes);
        let dimensions = (img.width(), img.height());

        let encoded = encode(img, request.format, request.quality)?;
        if encoded.is_empty() {
            return Err(CompressionError::encode("Encoder produced no output")
                .with_details(request.format.as_str()));
        }

        cancel.check()?;

        self.paths.ensure_output_dir()?;
        let output_path = self.paths.unique_output_path(request.format.extension());
        if let Err(e) = std::fs::write(&output_path, &encoded) {
            FileManager::remove_partial_blocking(&output_path);
            return Err(e.into());
        }
        drop(encoded);

        let compressed_size = FileManager::file_size_blocking(&output_path)?;
        let result = CompressionResult::new(
            output_path,
            original_size,
            compressed_size,
            dimensions,
            start.elapsed(),
        )
        .with_notes(notes);

        info!(
            "Compressed image {} -> {} ({} -> {}, {:.1}% reduction) in {:?}",
            source.display(),
            result.output_path.display(),
            FileManager::format_size(original_size),
            FileManager::format_size(compressed_size),
            result.reduction_percent,
            start.elapsed()
        );

        Ok(result)
    }

    /// Decode the source, letting the JPEG decoder shrink by `factor`
    fn decode(
        &self,
        source: &Path,
        format: ImageFormat,
        (width, height): (u32, u32),
        factor: u32,
    ) -> Result<DynamicImage> {
        let scaled_decode = format == ImageFormat::Jpeg && factor > 1;
        let (decoded_w, decoded_h) = if scaled_decode {
            (width.div_ceil(factor), height.div_ceil(factor))
        } else {
            (width, height)
        };

        let needed = resize::buffer_bytes(decoded_w, decoded_h);
        if needed > self.max_buffer_bytes {
            return Err(CompressionError::resource_exhausted(format!(
                "Decoding {}x{} needs {} but the budget is {}",
                decoded_w,
                decoded_h,
                FileManager::format_size(needed),
                FileManager::format_size(self.max_buffer_bytes)
            )));
        }

        if scaled_decode {
            let reader = BufReader::new(File::open(source).map_err(source_error)?);
            let mut decoder = JpegDecoder::new(reader).map_err(decode_error)?;
            decoder
                .scale(clamp_u16(decoded_w), clamp_u16(decoded_h))
                .map_err(decode_error)?;
            return DynamicImage::from_decoder(decoder).map_err(decode_error);
        }

        image::io::Reader::open(source)
            .map_err(source_error)?
            .with_guessed_format()
            .map_err(source_error)?
            .decode()
            .map_err(decode_error)
    }

    fn correct_orientation(
        &self,
        img: DynamicImage,
        orientation: Orientation,
        notes: &mut Vec<String>,
    ) -> DynamicImage {
        if orientation == Orientation::Normal {
            return img;
        }

        let needed = resize::buffer_bytes(img.width(), img.height()) * 2;
        if needed > self.max_buffer_bytes {
            let note = format!(
                "orientation {:?} not applied: {} exceeds the buffer budget",
                orientation,
                FileManager::format_size(needed)
            );
            warn!("Skipping {}", note);
            notes.push(note);
            return img;
        }

        orientation.apply(&img).unwrap_or(img)
    }

    fn resize_to_fit(
        &self,
        img: DynamicImage,
        max_width: Option<u32>,
        max_height: Option<u32>,
        notes: &mut Vec<String>,
    ) -> DynamicImage {
        let (width, height) = (img.width(), img.height());
        let (new_width, new_height) = resize::fit_within(width, height, max_width, max_height);
        if (new_width, new_height) == (width, height) {
            return img;
        }

        let needed = resize::buffer_bytes(width, height) + resize::buffer_bytes(new_width, new_height);
        if needed > self.max_buffer_bytes {
            let note = format!(
                "resize {}x{} -> {}x{} not applied: exceeds the buffer budget",
                width, height, new_width, new_height
            );
            warn!("Skipping {}", note);
            notes.push(note);
            return img;
        }

        img.resize_exact(new_width, new_height, resize::RESIZE_FILTER)
    }
}

/// Format and dimensions from the header only
fn read_bounds(source: &Path) -> Result<(ImageFormat, (u32, u32))> {
    let reader = image::io::Reader::open(source)
        .map_err(source_error)?
        .with_guessed_format()
        .map_err(source_error)?;
    let format = reader.format().ok_or_else(|| {
        CompressionError::decode(format!("Unrecognized image format: {}", source.display()))
    })?;
    let dimensions = reader.into_dimensions().map_err(decode_error)?;
    Ok((format, dimensions))
}

/// An unreadable source is a decode failure; missing files and memory keep their kind
fn source_error(err: io::Error) -> CompressionError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::OutOfMemory => err.into(),
        _ => CompressionError::decode(format!("Cannot read image: {}", err)),
    }
}

/// Errors from reading the source are decode failures, except memory limits
fn decode_error(err: image::ImageError) -> CompressionError {
    match err {
        image::ImageError::Limits(_) => err.into(),
        other => CompressionError::decode(format!("Failed to decode image: {}", other)),
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Encode into memory; the image is consumed so its buffer is released here
fn encode(img: DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = (img.width(), img.height());
    let has_alpha = img.color().has_alpha();
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let rgb = img.into_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
                .encode(rgb.as_raw(), width, height, ColorType::Rgb8)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            if has_alpha {
                let rgba = img.into_rgba8();
                encoder.write_image(rgba.as_raw(), width, height, ColorType::Rgba8)?;
            } else {
                let rgb = img.into_rgb8();
                encoder.write_image(rgb.as_raw(), width, height, ColorType::Rgb8)?;
            }
        }
        OutputFormat::Webp => {
            let quality = quality.min(100) as f32;
            let memory = if has_alpha {
                let rgba = img.into_rgba8();
                webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(quality)
            } else {
                let rgb = img.into_rgb8();
                webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode(quality)
            };
            buffer.extend_from_slice(&memory);
        }
    }

    Ok(buffer)
}
