//! # FFmpeg Backend
//!
//! Transcodifica H.264 + AAC in MP4 tramite `ffmpeg`, analisi sorgente con
//! `ffprobe`.
//!
//! ## Pipeline di encode:
//! - `scale` alla dimensione risolta, poi `crop`/`pad` alla dimensione allineata a 16
//! - Frame rate fisso (`-r`) e keyframe ogni `keyframe_interval_secs` (`-g`)
//! - Bitrate target con tetto (`-b:v`, `-maxrate`, `-bufsize`)
//! - `yuv420p` per la massima compatibilità dei player
//! - Audio ricodificato AAC, mai scartato
//! - `+faststart`: moov atom in testa, output ottimizzato per la rete
//!
//! ## Progresso nativo:
//! `-progress pipe:1` scrive coppie `chiave=valore` su stdout; `out_time_us`
//! diviso la durata sorgente dà la frazione completata.
//!
//! ## Cancellazione:
//! Il processo figlio viene terminato con `kill()` appena il token scatta.

use super::{EncodeJob, EncodeOutcome, SourceMetadata, VideoEncoder};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{CompressionError, Result};
use crate::tool_resolver::ToolPathResolver;
use crate::video_params::ResolvedVideoParameters;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// ffmpeg / ffprobe backed encoder
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe,
        }
    }

    /// Find the binaries: configured paths first, then the resolver chain.
    /// Without ffprobe every probe falls back to the default geometry.
    pub fn locate(config: &Config, resolver: &ToolPathResolver) -> Option<Self> {
        let ffmpeg = resolver.resolve_with_override("ffmpeg", config.ffmpeg_path.as_deref())?;
        let ffprobe = resolver.resolve_with_override("ffprobe", config.ffprobe_path.as_deref());
        if ffprobe.is_none() {
            warn!("ffprobe not found, source metadata will use defaults");
        }
        Some(Self::new(ffmpeg, ffprobe))
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }
}

/// Filter graph taking the source to the aligned output size
pub fn filter_chain(params: &ResolvedVideoParameters) -> String {
    let (sw, sh) = (params.scaled_width, params.scaled_height);
    let (aw, ah) = (params.aligned_width, params.aligned_height);
    let (cw, ch) = (sw.min(aw), sh.min(ah));

    let mut filters = vec![format!("scale={}:{}:flags=lanczos", sw, sh)];
    if (cw, ch) != (sw, sh) {
        filters.push(format!("crop={}:{}", cw, ch));
    }
    if (aw, ah) != (cw, ch) {
        filters.push(format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", aw, ah));
    }
    filters.push("setsar=1".to_string());
    filters.join(",")
}

/// Full ffmpeg argument list for one job
pub fn build_args(job: &EncodeJob) -> Vec<OsString> {
    let params = &job.params;
    let bitrate = params.target_bitrate.to_string();
    let bufsize = (params.target_bitrate * 2).to_string();
    let gop = (params.frame_rate * job.keyframe_interval_secs.max(1)).to_string();

    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(job.source.clone().into_os_string());

    let rest = [
        "-vf".to_string(),
        filter_chain(params),
        "-r".to_string(),
        params.frame_rate.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-b:v".to_string(),
        bitrate.clone(),
        "-maxrate".to_string(),
        bitrate,
        "-bufsize".to_string(),
        bufsize,
        "-g".to_string(),
        gop.clone(),
        "-keyint_min".to_string(),
        gop,
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        job.audio_bitrate.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    args.extend(rest.into_iter().map(OsString::from));
    args.push(job.output.clone().into_os_string());
    args
}

/// One meaningful line of `-progress` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    Time(Duration),
    End,
}

pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is reported in microseconds as well
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|us| ProgressLine::Time(Duration::from_micros(us))),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Extract display geometry and duration from `ffprobe -print_format json`
pub fn parse_probe_output(json: &str) -> Result<SourceMetadata> {
    let info: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CompressionError::decode(format!("Invalid ffprobe output: {}", e)))?;

    let video_stream = info["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| CompressionError::decode("No video stream found"))?;

    let width = video_stream["width"].as_u64().unwrap_or(0) as u32;
    let height = video_stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(CompressionError::decode("Video stream has no dimensions"));
    }

    let rotation = video_stream["tags"]["rotate"]
        .as_str()
        .and_then(|r| r.parse::<i64>().ok())
        .or_else(|| {
            video_stream["side_data_list"]
                .as_array()?
                .iter()
                .find_map(|side| side["rotation"].as_i64())
        })
        .unwrap_or(0);
    let (width, height) = if rotation.rem_euclid(180) == 90 {
        (height, width)
    } else {
        (width, height)
    };

    let duration = info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);

    Ok(SourceMetadata {
        width,
        height,
        duration,
    })
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    /// `out_time` becomes a fraction only against a known source duration
    fn reports_progress(&self, job: &EncodeJob) -> bool {
        job.source_duration.is_some()
    }

    async fn probe(&self, source: &Path) -> Result<SourceMetadata> {
        let ffprobe = self
            .ffprobe
            .as_ref()
            .ok_or_else(|| CompressionError::decode("ffprobe is not available"))?;

        let output = Command::new(ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CompressionError::decode(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(CompressionError::decode(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: mpsc::UnboundedSender<f64>,
        cancel: CancelToken,
    ) -> EncodeOutcome {
        let args = build_args(job);
        debug!("Running {} {:?}", self.ffmpeg.display(), args);

        let mut child = match Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return EncodeOutcome::Failed(format!("Failed to execute ffmpeg: {}", e)),
        };

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return EncodeOutcome::Failed("ffmpeg pipes unavailable".to_string());
        };

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill ffmpeg: {}", e);
                    }
                    return EncodeOutcome::Cancelled;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let (Some(ProgressLine::Time(done)), Some(total)) =
                            (parse_progress_line(&line), job.source_duration)
                        {
                            if !total.is_zero() {
                                let _ = progress.send(done.as_secs_f64() / total.as_secs_f64());
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg: {}", e);
                }
                return EncodeOutcome::Cancelled;
            }
            status = child.wait() => status,
        };

        let stderr_text = stderr_task.await.unwrap_or_default();
        match status {
            Ok(status) if status.success() => EncodeOutcome::Completed,
            Ok(status) => {
                let message = stderr_text.trim();
                if message.is_empty() {
                    EncodeOutcome::Failed(format!("ffmpeg exited with {}", status))
                } else {
                    EncodeOutcome::Failed(message.to_string())
                }
            }
            Err(e) => EncodeOutcome::Failed(format!("Failed to wait for ffmpeg: {}", e)),
        }
    }
}
