//! # Controller Module
//!
//! Facciata pubblica del compressore: validazione, avvio dei job, tracking
//! del job video attivo, cancellazione e listener di progresso.
//!
//! ## Struttura:
//! - `compression_controller`: `CompressionController` e `ImageOptions`
//! - `job`: handle dei job video e bookkeeping del job tracciato

pub mod compression_controller;
pub mod job;

pub use compression_controller::{CompressionController, ImageOptions};
pub use job::{JobId, VideoJobHandle};
