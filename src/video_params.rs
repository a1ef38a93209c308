//! # Video Parameter Selection
//!
//! Questo modulo traduce una richiesta video (quality tier oppure opzioni
//! esplicite) in un unico set di parametri concreti e immutabili.
//!
//! ## Quality tier (`compress_video`)
//!
//! | tier     | altezza  | bitrate (bps) |
//! |----------|----------|---------------|
//! | veryLow  | 360      | 500,000       |
//! | low      | 480      | 500,000       |
//! | medium   | 720      | 1,500,000     |
//! | high     | 1080     | 3,000,000     |
//! | veryHigh | sorgente | 8,000,000     |
//!
//! `low`, `medium` e `high` coincidono con i resolution tier omonimi.
//! L'altezza target non supera mai quella sorgente.
//!
//! ## Resolution tier (`compress_video_with_options`)
//!
//! | tier   | altezza | bitrate (bps) |
//! |--------|---------|---------------|
//! | low    | 480     | 500,000       |
//! | medium | 720     | 1,500,000     |
//! | high   | 1080    | 3,000,000     |
//!
//! Un bitrate esplicito sostituisce quello del tier.
//!
//! ## Geometria
//!
//! - `scale = target < originale ? target / originale : 1.0` (mai upscaling)
//! - Larghezza scalata arrotondata per difetto, altezza uguale al target
//! - Allineamento al multiplo di 16 inferiore (minimo 16)

use crate::error::{CompressionError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hardware encoders work on 16x16 macroblocks
pub const ALIGNMENT: u32 = 16;

/// Named height/bitrate presets for `compress_video`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl QualityTier {
    /// Parse a tier name; unknown names resolve to `Medium`
    pub fn parse(tier: &str) -> Self {
        match tier.trim() {
            "veryLow" => QualityTier::VeryLow,
            "low" => QualityTier::Low,
            "medium" => QualityTier::Medium,
            "high" => QualityTier::High,
            "veryHigh" => QualityTier::VeryHigh,
            other => {
                warn!("Unknown quality tier '{}', using medium", other);
                QualityTier::Medium
            }
        }
    }

    /// Target height, `None` keeps the source height
    pub fn target_height(self) -> Option<u32> {
        match self {
            QualityTier::VeryLow => Some(360),
            QualityTier::Low => Some(ResolutionTier::Low.height()),
            QualityTier::Medium => Some(ResolutionTier::Medium.height()),
            QualityTier::High => Some(ResolutionTier::High.height()),
            QualityTier::VeryHigh => None,
        }
    }

    pub fn bitrate(self) -> u64 {
        match self {
            QualityTier::VeryLow => 500_000,
            QualityTier::Low => ResolutionTier::Low.bitrate(),
            QualityTier::Medium => ResolutionTier::Medium.bitrate(),
            QualityTier::High => ResolutionTier::High.bitrate(),
            QualityTier::VeryHigh => 8_000_000,
        }
    }
}

/// Height/bitrate presets for option-based requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionTier {
    Low,
    #[default]
    Medium,
    High,
}

impl ResolutionTier {
    pub fn parse(tier: &str) -> Self {
        match tier.trim() {
            "low" => ResolutionTier::Low,
            "medium" => ResolutionTier::Medium,
            "high" => ResolutionTier::High,
            other => {
                warn!("Unknown resolution tier '{}', using medium", other);
                ResolutionTier::Medium
            }
        }
    }

    pub fn height(self) -> u32 {
        match self {
            ResolutionTier::Low => 480,
            ResolutionTier::Medium => 720,
            ResolutionTier::High => 1080,
        }
    }

    pub fn bitrate(self) -> u64 {
        match self {
            ResolutionTier::Low => 500_000,
            ResolutionTier::Medium => 1_500_000,
            ResolutionTier::High => 3_000_000,
        }
    }
}

/// Explicit options for `compress_video_with_options`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    pub resolution: Option<ResolutionTier>,
    pub bitrate: Option<u64>,
    pub target_height: Option<u32>,
    pub frame_rate: Option<u32>,
}

/// How the caller asked for the video to be compressed
#[derive(Debug, Clone)]
pub enum VideoRequest {
    Tier(QualityTier),
    Options(VideoOptions),
}

/// Concrete encode parameters, created once per job
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVideoParameters {
    pub target_height: u32,
    pub target_bitrate: u64,
    pub frame_rate: u32,
    /// Always in `(0, 1]`
    pub scale_factor: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub aligned_width: u32,
    pub aligned_height: u32,
}

/// Maps requests to [`ResolvedVideoParameters`]
#[derive(Debug, Clone, Copy)]
pub struct VideoParameterSelector {
    default_frame_rate: u32,
}

impl VideoParameterSelector {
    pub fn new(default_frame_rate: u32) -> Self {
        Self { default_frame_rate }
    }

    /// Resolve a request against the source geometry
    pub fn resolve(
        &self,
        request: &VideoRequest,
        source_width: u32,
        source_height: u32,
    ) -> Result<ResolvedVideoParameters> {
        if source_width == 0 || source_height == 0 {
            return Err(CompressionError::validation(format!(
                "Invalid source dimensions {}x{}",
                source_width, source_height
            )));
        }

        let (target_height, target_bitrate, frame_rate) = match request {
            VideoRequest::Tier(tier) => (
                tier.target_height().unwrap_or(source_height),
                tier.bitrate(),
                self.default_frame_rate,
            ),
            VideoRequest::Options(options) => {
                let tier = options.resolution.unwrap_or_default();
                (
                    options.target_height.unwrap_or_else(|| tier.height()),
                    options.bitrate.unwrap_or_else(|| tier.bitrate()),
                    options.frame_rate.unwrap_or(self.default_frame_rate),
                )
            }
        };

        if target_height == 0 || target_bitrate == 0 || frame_rate == 0 {
            return Err(CompressionError::validation(
                "Target height, bitrate and frame rate must be positive",
            ));
        }

        let scale_factor = scale_factor(target_height, source_height);
        let (scaled_width, scaled_height) = if scale_factor < 1.0 {
            // Integer math keeps the height exact and floors the width
            let width = source_width as u64 * target_height as u64 / source_height as u64;
            ((width as u32).max(1), target_height)
        } else {
            (source_width, source_height)
        };

        let params = ResolvedVideoParameters {
            target_height,
            target_bitrate,
            frame_rate,
            scale_factor,
            scaled_width,
            scaled_height,
            aligned_width: align_down(scaled_width),
            aligned_height: align_down(scaled_height),
        };

        debug!("Resolved video parameters: {:?}", params);
        Ok(params)
    }
}

impl Default for VideoParameterSelector {
    fn default() -> Self {
        Self::new(30)
    }
}

/// Downscale-only factor
pub fn scale_factor(target_height: u32, source_height: u32) -> f64 {
    if target_height < source_height {
        target_height as f64 / source_height as f64
    } else {
        1.0
    }
}

/// Round down to a multiple of [`ALIGNMENT`], never below one block
pub fn align_down(value: u32) -> u32 {
    ((value / ALIGNMENT) * ALIGNMENT).max(ALIGNMENT)
}
