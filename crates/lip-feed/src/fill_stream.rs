//! Fill stream worker.
//!
//! Maintains the account-wide fill subscription and forwards events into
//! the scheduler's queue. The scheduler drains the queue at the start of
//! each tick and applies fills to inventory in per-order fill-index order.
//! Reconnect semantics are identical to the book stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lip_exchange::{ExchangeClient, FillEvent};

use crate::{BACKOFF_BASE_MS, BACKOFF_MAX_MS};

/// Long-lived fill stream task.
pub struct FillStreamWorker {
    client: Arc<dyn ExchangeClient>,
    fill_tx: mpsc::Sender<FillEvent>,
    shutdown: CancellationToken,
}

impl FillStreamWorker {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        fill_tx: mpsc::Sender<FillEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            fill_tx,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        let mut backoff = Duration::from_millis(BACKOFF_BASE_MS);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Account-wide subscription: covers every tracked market.
            match self.client.subscribe_fills(&[]).await {
                Ok(mut rx) => {
                    info!("Fill stream subscribed");
                    backoff = Duration::from_millis(BACKOFF_BASE_MS);

                    loop {
                        tokio::select! {
                            () = self.shutdown.cancelled() => return,
                            event = rx.recv() => match event {
                                Some(event) => {
                                    if self.fill_tx.send(event).await.is_err() {
                                        // Scheduler is gone; nothing left to do.
                                        return;
                                    }
                                }
                                None => {
                                    warn!("Fill stream disconnected");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Fill subscribe failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = self.shutdown.cancelled() => break,
            }
            backoff = (backoff * 2).min(Duration::from_millis(BACKOFF_MAX_MS));
        }

        info!("Fill stream worker stopped");
    }
}
