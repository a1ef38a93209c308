//! # Cancellation Token
//!
//! Token di cancellazione cooperativa condiviso tra controller e job.
//!
//! ## Responsabilità:
//! - `cancel()` imposta il flag una sola volta, le chiamate successive sono no-op
//! - `is_cancelled()` è il checkpoint sincrono usato dai job bloccanti
//! - `cancelled()` è la future usata nei `tokio::select!` dei job asincroni
//!
//! Basato su `tokio::sync::watch`: ogni clone osserva lo stesso valore e un
//! receiver creato dopo la cancellazione la vede subito.

use crate::error::{CompressionError, Result};
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation flag shared by every clone
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Checkpoint: `Cancelled` error once the token has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CompressionError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // `self` keeps the sender alive
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
