//! Order history.

use std::sync::Arc;

use aurora_core::checkout::{OrderDescription, OrderSummary};
use aurora_core::{OrderStatus, UserId};
use tokio::sync::watch;
use tracing::instrument;

use crate::error::AppError;
use crate::remote::{NewOrder, Order, OrderStore, StoreError};
use crate::session::Session;

/// Reads and records the signed-in user's orders.
pub struct OrderService {
    store: Option<Arc<dyn OrderStore>>,
    session: watch::Receiver<Option<Session>>,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("remote", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl OrderService {
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn OrderStore>>,
        session: watch::Receiver<Option<Session>>,
    ) -> Self {
        Self { store, session }
    }

    fn store(&self) -> Result<&dyn OrderStore, StoreError> {
        self.store
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("row store not configured".to_string()))
    }

    /// The signed-in user's orders, newest first.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `Store` if the fetch fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Order>, AppError> {
        let user_id = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.user_id.clone())
            .ok_or(AppError::NotAuthenticated)?;
        let orders = self.store()?.list(&user_id).await?;
        tracing::debug!(user_id = %user_id, orders = orders.len(), "Loaded orders");
        Ok(orders)
    }

    /// Record a pending order for a checkout that was just started.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or rejects the insert.
    #[instrument(skip(self, description, summary), fields(user_id = %user_id))]
    pub async fn record(
        &self,
        user_id: &UserId,
        description: &OrderDescription,
        summary: &OrderSummary,
    ) -> Result<Order, StoreError> {
        let order = self
            .store()?
            .insert(&NewOrder {
                user_id: user_id.clone(),
                items: description.items.clone(),
                total_amount: summary.total,
                status: OrderStatus::Pending,
                shipping_address: None,
            })
            .await?;
        tracing::info!(order_id = %order.id, total = %order.total_amount, "Recorded pending order");
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aurora_core::checkout::ShippingMethod;
    use aurora_core::{LineItem, LineItemId, Price, ProductId};

    use super::*;
    use crate::remote::MemoryStore;

    fn signed_in(user: &str) -> watch::Receiver<Option<Session>> {
        let (_tx, rx) = watch::channel(Some(Session {
            user_id: UserId::new(user),
            email: None,
            display_name: None,
            avatar_url: None,
            id_token: String::new(),
        }));
        rx
    }

    #[tokio::test]
    async fn test_record_then_list() {
        let store = Arc::new(MemoryStore::new());
        let remote: Arc<dyn OrderStore> = store.clone();
        let orders = OrderService::new(Some(remote), signed_in("uid-1"));

        let items = vec![LineItem {
            id: LineItemId::mint(),
            product_id: ProductId::new(1),
            name: "Linen Shirt".to_string(),
            unit_price: Price::from_cents(2000),
            image_ref: String::new(),
            size: "M".to_string(),
            color: "white".to_string(),
            quantity: 2,
        }];
        let summary = OrderSummary::compute(&items, ShippingMethod::Standard, None);
        let description = OrderDescription::from_cart(
            &items,
            &summary,
            ShippingMethod::Standard,
            None,
            "ana@example.com",
            None,
        );

        let order = orders
            .record(&UserId::new("uid-1"), &description, &summary)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Price::from_cents(4599));

        let listed = orders.list().await.unwrap();
        assert_eq!(listed, vec![order]);
    }

    #[tokio::test]
    async fn test_list_requires_session() {
        let (_tx, rx) = watch::channel(None);
        let orders = OrderService::new(None, rx);
        assert!(matches!(
            orders.list().await,
            Err(AppError::NotAuthenticated)
        ));
    }
}
