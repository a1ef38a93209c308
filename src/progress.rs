//! # Progress Reporting Module
//!
//! Questo modulo gestisce la consegna del progresso dei job al listener e la
//! progress bar della CLI.
//!
//! ## Responsabilità:
//! - `ProgressReporter`: slot singolo per il listener (last-registration-wins)
//! - `JobProgress`: vista per-job che applica throttling, monotonia e clamp
//! - `ProgressSubscription`: stream finito di `ProgressEvent`
//! - `estimate_progress()`: stima euristica tempo trascorso / durata sorgente
//! - `ProgressManager`: progress bar `indicatif` per la CLI
//!
//! ## Regole di consegna:
//! - Un solo listener alla volta: una nuova `subscribe()` chiude lo stream
//!   precedente
//! - Prima del completamento il valore è limitato a `0.95`
//! - I valori emessi non decrescono mai
//! - Al massimo un evento ogni `progress_interval_ms`
//! - `complete()` forza `1.0`, poi lo stream termina; nessun evento dopo la
//!   fine del job
//! - La presenza del listener è verificata prima di ogni emissione
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 61% clip.mp4
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut subscription = reporter.subscribe().await;
//! while let Some(event) = subscription.recv().await {
//!     println!("{}%", event.percentage);
//! }
//! ```

use futures::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Highest value reported before the encoder signals completion
pub const MAX_PENDING_PROGRESS: f64 = 0.95;

/// One progress update delivered to the listener
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Fraction in `[0, 1]`
    pub progress: f64,
    /// Same value as an integer in `[0, 100]`
    pub percentage: u8,
}

impl ProgressEvent {
    pub fn new(progress: f64) -> Self {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            progress,
            percentage: (progress * 100.0).round() as u8,
        }
    }
}

#[derive(Default)]
struct Slot {
    listener: Option<mpsc::UnboundedSender<ProgressEvent>>,
    /// Job that most recently started reporting
    owner: Option<u64>,
}

/// Single-slot progress channel owned by one controller
#[derive(Clone, Default)]
pub struct ProgressReporter {
    slot: Arc<Mutex<Slot>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener, replacing (and ending) any previous one
    pub async fn subscribe(&self) -> ProgressSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.slot.lock().await;
        if slot.listener.replace(tx).is_some() {
            debug!("Progress listener replaced");
        }
        ProgressSubscription { rx }
    }

    /// Drop the current listener; running jobs keep going silently
    pub async fn unsubscribe(&self) {
        self.slot.lock().await.listener = None;
    }

    /// Start reporting for `job_id`
    pub async fn begin(&self, job_id: u64, interval: Duration) -> JobProgress {
        self.slot.lock().await.owner = Some(job_id);
        JobProgress {
            reporter: self.clone(),
            job_id,
            interval,
            last_emit: None,
            last_value: 0.0,
            finished: false,
        }
    }

    /// Close the listener slot for good
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        slot.listener = None;
        slot.owner = None;
    }

    /// Deliver `event` if `job_id` still owns the slot
    async fn emit(&self, job_id: u64, event: ProgressEvent) {
        let mut slot = self.slot.lock().await;
        if slot.owner != Some(job_id) {
            return;
        }
        let Some(listener) = slot.listener.as_ref() else {
            return;
        };
        if listener.send(event).is_err() {
            debug!("Progress listener went away");
            slot.listener = None;
        }
    }

    /// End the stream if `job_id` is still the reporting job
    async fn finish(&self, job_id: u64) {
        let mut slot = self.slot.lock().await;
        if slot.owner == Some(job_id) {
            slot.owner = None;
            slot.listener = None;
        }
    }
}

/// Per-job handle enforcing throttling, monotonicity and the pre-completion clamp
pub struct JobProgress {
    reporter: ProgressReporter,
    job_id: u64,
    interval: Duration,
    last_emit: Option<Instant>,
    last_value: f64,
    finished: bool,
}

impl JobProgress {
    /// Report a fraction in `[0, 1]`; values are clamped to
    /// [`MAX_PENDING_PROGRESS`] and throttled
    pub async fn report(&mut self, fraction: f64) {
        if self.finished || !fraction.is_finite() {
            return;
        }

        let value = fraction.clamp(0.0, MAX_PENDING_PROGRESS);
        if value <= self.last_value && self.last_emit.is_some() {
            return;
        }
        if let Some(last) = self.last_emit {
            if last.elapsed() < self.interval {
                return;
            }
        }

        self.last_emit = Some(Instant::now());
        self.last_value = value;
        self.reporter.emit(self.job_id, ProgressEvent::new(value)).await;
    }

    /// Force `1.0` and end the stream
    pub async fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.last_value = 1.0;
        self.reporter.emit(self.job_id, ProgressEvent::new(1.0)).await;
        self.finish().await;
    }

    /// End the stream without a final event (failure or cancellation)
    pub async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.reporter.finish(self.job_id).await;
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }
}

/// Finite stream of progress events for the current listener
pub struct ProgressSubscription {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscription {
    /// Next event, `None` once the job ended or the listener was replaced
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl Stream for ProgressSubscription {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Elapsed time over source duration, `None` without a usable duration
pub fn estimate_progress(elapsed: Duration, total: Option<Duration>) -> Option<f64> {
    let total = total.filter(|t| !t.is_zero())?;
    Some((elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, MAX_PENDING_PROGRESS))
}

/// Manages the CLI progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Percentage bar for a video job
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    pub fn update(&self, event: &ProgressEvent) {
        self.bar.set_position(event.percentage as u64);
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}
