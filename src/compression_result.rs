//! # Compression Result
//!
//! Risultato di un job completato con successo. Le dimensioni sono sempre
//! lette dai file realmente scritti su disco, mai stimate.
//!
//! Per i job video `duration` è il tempo di esecuzione in millisecondi (come
//! nella risposta di `compressVideoWithOptions`), mentre la durata della clip
//! sorgente è in `source_duration_secs`. `notes` elenca i passi saltati per
//! rispettare il budget di memoria.

use crate::file_manager::FileManager;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    pub output_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    /// `compressed_size / original_size`
    pub compression_ratio: f64,
    pub reduction_percent: f64,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: Option<u64>,
    /// Job wall time in milliseconds, video jobs only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Length of the source clip in seconds, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_duration_secs: Option<f64>,
    /// Requested steps that were not applied
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl CompressionResult {
    pub fn new(
        output_path: PathBuf,
        original_size: u64,
        compressed_size: u64,
        (width, height): (u32, u32),
        elapsed: Duration,
    ) -> Self {
        Self {
            output_path,
            original_size,
            compressed_size,
            compression_ratio: FileManager::compression_ratio(original_size, compressed_size),
            reduction_percent: FileManager::calculate_reduction(original_size, compressed_size),
            width,
            height,
            elapsed_ms: Some(elapsed.as_millis() as u64),
            duration: None,
            source_duration_secs: None,
            notes: Vec::new(),
        }
    }

    /// Mark as a video result: `duration` mirrors the elapsed time
    pub fn with_video_timing(mut self, source_duration_secs: Option<f64>) -> Self {
        self.duration = self.elapsed_ms;
        self.source_duration_secs = source_duration_secs;
        self
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_from_sizes() {
        let result = CompressionResult::new(
            PathBuf::from("/tmp/out.jpg"),
            2000,
            500,
            (800, 600),
            Duration::from_millis(42),
        );

        assert_eq!(result.compression_ratio, 0.25);
        assert_eq!(result.reduction_percent, 75.0);
        assert_eq!(result.elapsed_ms, Some(42));
        assert_eq!(result.duration, None);
        assert!(result.notes.is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let result = CompressionResult::new(
            PathBuf::from("out.mp4"),
            10,
            5,
            (16, 16),
            Duration::from_millis(1500),
        )
        .with_video_timing(Some(3.5));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outputPath"], "out.mp4");
        assert_eq!(json["originalSize"], 10);
        assert_eq!(json["compressedSize"], 5);
        assert_eq!(json["compressionRatio"], 0.5);
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["sourceDurationSecs"], 3.5);
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_notes_are_serialized_when_present() {
        let result = CompressionResult::new(PathBuf::from("out.jpg"), 10, 5, (16, 16), Duration::ZERO)
            .with_notes(vec!["resize skipped".to_string()]);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["notes"][0], "resize skipped");
        assert!(json.get("duration").is_none());
    }
}
