//! # Media Compressor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della libreria
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `controller`: Facciata pubblica, validazione, job tracking e cancellazione
//! - `image_processor`: Pipeline immagini (decode, orientamento, resize, encode)
//! - `video_processor`: Pipeline video (probe, parametri, transcodifica)
//! - `video_params`: Tier di qualità e risoluzione, allineamento delle dimensioni
//! - `encoder`: Backend di transcodifica (`VideoEncoder`, ffmpeg)
//! - `progress`: Consegna del progresso e progress bar CLI
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Errore strutturato con codici per il chiamante
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_compressor::{CompressionController, Config};
//!
//! let controller = CompressionController::create(Config::default())?;
//! let output = controller.compress_image("photo.jpg", 75).await?;
//! controller.dispose().await;
//! ```

pub mod cancel;
pub mod compression_result;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod orientation;
pub mod path_resolver;
pub mod progress;
pub mod resize;
pub mod tool_resolver;
pub mod video_params;
pub mod video_processor;

pub use cancel::CancelToken;
pub use compression_result::CompressionResult;
pub use config::Config;
pub use controller::{CompressionController, ImageOptions, JobId, VideoJobHandle};
pub use error::{CompressionError, ErrorKind, Result};
pub use image_processor::OutputFormat;
pub use progress::{ProgressEvent, ProgressSubscription};
pub use video_params::{QualityTier, ResolutionTier, VideoOptions, VideoRequest};
