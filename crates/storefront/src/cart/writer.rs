//! Background writer that mirrors cart mutations to the row store.
//!
//! Mutations are queued in the order they were applied locally and a single
//! task applies them one at a time, so a slow write can never land after a
//! newer one. Failures are logged and the queue moves on.

use std::sync::Arc;

use aurora_core::{LineItem, LineKey, UserId};
use tokio::sync::{mpsc, oneshot};

use crate::remote::{CartStore, NewCartRow, StoreError};

/// A remote cart write.
#[derive(Debug)]
pub enum CartWrite {
    /// Delete every row of the user, then insert `items` in order.
    Replace { user_id: UserId, items: Vec<LineItem> },
    SetQuantity {
        user_id: UserId,
        key: LineKey,
        quantity: u32,
    },
    Delete { user_id: UserId, key: LineKey },
    Clear { user_id: UserId },
    /// Resolves once every earlier write has been attempted.
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task. Dropping it lets the task drain and exit.
#[derive(Debug)]
pub struct CartWriter {
    sender: mpsc::UnboundedSender<CartWrite>,
}

impl CartWriter {
    /// Spawn the writer on the current tokio runtime.
    pub fn spawn(store: Arc<dyn CartStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(store, receiver));
        Self { sender }
    }

    /// Queue a write without waiting for it.
    pub fn enqueue(&self, write: CartWrite) {
        if self.sender.send(write).is_err() {
            tracing::warn!("Cart writer stopped, dropping remote write");
        }
    }

    /// Wait until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.enqueue(CartWrite::Flush(done));
        // Err only if the task is gone, in which case nothing is pending.
        let _ = wait.await;
    }
}

async fn run(store: Arc<dyn CartStore>, mut receiver: mpsc::UnboundedReceiver<CartWrite>) {
    while let Some(write) = receiver.recv().await {
        match write {
            CartWrite::Flush(done) => {
                let _ = done.send(());
            }
            CartWrite::Replace { user_id, items } => {
                if let Err(e) = replace(store.as_ref(), &user_id, &items).await {
                    tracing::warn!(
                        error = %e,
                        user_id = %user_id,
                        "Failed to sync cart to remote store"
                    );
                }
            }
            CartWrite::SetQuantity {
                user_id,
                key,
                quantity,
            } => {
                if let Err(e) = store.update_quantity(&user_id, &key, quantity).await {
                    tracing::warn!(
                        error = %e,
                        user_id = %user_id,
                        product_id = %key.product_id,
                        "Failed to update remote cart row"
                    );
                }
            }
            CartWrite::Delete { user_id, key } => {
                if let Err(e) = store.delete(&user_id, &key).await {
                    tracing::warn!(
                        error = %e,
                        user_id = %user_id,
                        product_id = %key.product_id,
                        "Failed to delete remote cart row"
                    );
                }
            }
            CartWrite::Clear { user_id } => {
                if let Err(e) = store.clear(&user_id).await {
                    tracing::warn!(error = %e, user_id = %user_id, "Failed to clear remote cart");
                }
            }
        }
    }
    tracing::debug!("Cart writer stopped");
}

/// Delete-then-reinsert. Not atomic: an interruption leaves a partial cart.
async fn replace(
    store: &dyn CartStore,
    user_id: &UserId,
    items: &[LineItem],
) -> Result<(), StoreError> {
    store.clear(user_id).await?;
    for item in items {
        store.insert(&NewCartRow::from_line_item(user_id, item)).await?;
    }
    tracing::debug!(user_id = %user_id, rows = items.len(), "Synced cart to remote store");
    Ok(())
}
