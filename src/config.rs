//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del compressore.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di compressione
//! - Fornisce validazione robusta dei parametri
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Risolve la directory di output process-scoped
//!
//! ## Parametri di configurazione:
//! - `output_dir`: Directory dei file compressi (default: cache dir utente)
//! - `default_image_quality`: Qualità immagine quando non specificata (1-100, default: 80)
//! - `progress_interval_ms`: Intervallo minimo tra eventi di progresso (default: 500)
//! - `max_buffer_bytes`: Budget di memoria per i buffer dei pixel (default: 512 MiB)
//! - `video_frame_rate`: Frame rate di output (default: 30)
//! - `keyframe_interval_secs`: Intervallo keyframe in secondi (default: 1)
//! - `audio_bitrate`: Bitrate audio AAC (default: "128k")
//! - `encoder_timeout_secs`: Timeout massimo di una transcodifica (default: 600)
//! - `ffmpeg_path` / `ffprobe_path`: Path espliciti dell'encoder (default: auto)
//! - `json_output`: Output JSON per uso programmatico (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     default_image_quality: 70,
//!     progress_interval_ms: 250,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the compression controller and its engines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output directory for compressed files (None = per-user cache directory)
    pub output_dir: Option<PathBuf>,
    /// Image quality used when a request omits it (1-100)
    pub default_image_quality: u8,
    /// Minimum interval between two progress events
    pub progress_interval_ms: u64,
    /// Upper bound for a single decoded or transformed pixel buffer
    pub max_buffer_bytes: u64,
    /// Output video frame rate
    pub video_frame_rate: u32,
    /// Keyframe interval in seconds
    pub keyframe_interval_secs: u32,
    /// Audio bitrate for the re-encoded audio track
    pub audio_bitrate: String,
    /// Hard ceiling for a single transcode
    pub encoder_timeout_secs: u64,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary
    pub ffprobe_path: Option<PathBuf>,
    /// Output progress and results as JSON lines
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            default_image_quality: 80,
            progress_interval_ms: 500,
            max_buffer_bytes: 512 * 1024 * 1024,
            video_frame_rate: 30,
            keyframe_interval_secs: 1,
            audio_bitrate: "128k".to_string(),
            encoder_timeout_secs: 600,
            ffmpeg_path: None,
            ffprobe_path: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.default_image_quality == 0 || self.default_image_quality > 100 {
            return Err(anyhow::anyhow!("Default image quality must be between 1 and 100"));
        }

        if self.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("Progress interval must be greater than 0"));
        }

        if self.max_buffer_bytes == 0 {
            return Err(anyhow::anyhow!("Pixel buffer budget must be greater than 0"));
        }

        if self.video_frame_rate == 0 || self.video_frame_rate > 120 {
            return Err(anyhow::anyhow!("Video frame rate must be between 1 and 120"));
        }

        if self.keyframe_interval_secs == 0 {
            return Err(anyhow::anyhow!("Keyframe interval must be at least 1 second"));
        }

        if self.encoder_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Encoder timeout must be greater than 0"));
        }

        if self.audio_bitrate.trim().is_empty() {
            return Err(anyhow::anyhow!("Audio bitrate must not be empty"));
        }

        if let Some(ref output_dir) = self.output_dir {
            if output_dir.exists() && !output_dir.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_dir.display()));
            }
        }

        Ok(())
    }

    /// Directory where compressed files are written
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.output_dir {
            return dir.clone();
        }

        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("media_compressor")
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_timeout_secs)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.default_image_quality = 0;
        assert!(config.validate().is_err());

        config.default_image_quality = 80;
        config.video_frame_rate = 0;
        assert!(config.validate().is_err());

        config.video_frame_rate = 30;
        config.progress_interval_ms = 0;
        assert!(config.validate().is_err());

        config.progress_interval_ms = 500;
        config.keyframe_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_dir_must_be_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("not_a_dir");
        std::fs::write(&file_path, b"x").unwrap();

        let config = Config {
            output_dir: Some(file_path),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_image_quality, 80);
        assert_eq!(config.progress_interval_ms, 500);
        assert_eq!(config.video_frame_rate, 30);
        assert_eq!(config.keyframe_interval_secs, 1);
        assert_eq!(config.audio_bitrate, "128k");
        assert!(!config.json_output);
        assert!(config.resolve_output_dir().ends_with("media_compressor"));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            output_dir: Some(temp_dir.path().to_path_buf()),
            default_image_quality: 65,
            progress_interval_ms: 250,
            audio_bitrate: "96k".to_string(),
            json_output: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.default_image_quality, 65);
        assert_eq!(loaded_config.progress_interval_ms, 250);
        assert_eq!(loaded_config.audio_bitrate, "96k");
        assert_eq!(loaded_config.output_dir.as_deref(), Some(temp_dir.path()));
        assert!(loaded_config.json_output);
    }

    #[tokio::test]
    async fn test_missing_file_yields_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.default_image_quality, 80);
    }
}
