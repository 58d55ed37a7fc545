//! Checkout.
//!
//! Turns the cart into an order description, hands it to the hosted payment
//! provider and returns the URL the user must visit to pay. Nothing here moves
//! money: once the URL is returned the provider owns the rest of the flow.

use std::sync::Arc;

use async_trait::async_trait;
use aurora_core::checkout::{
    Coupon, OrderDescription, OrderSummary, PaymentProvider, PricingError, ShippingMethod,
};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;
use url::Url;

use crate::cart::CartSynchronizer;
use crate::config::VexorConfig;
use crate::error::add_breadcrumb;
use crate::notice::Notices;
use crate::orders::OrderService;
use crate::remote::Order;
use crate::session::Session;

/// Errors that stop a checkout from starting.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("customer email is required")]
    MissingEmail,

    /// No payment provider credentials are configured.
    #[error("payment provider not configured")]
    NotConfigured,

    /// The provider exists but is not offered yet.
    #[error("payment provider {0} is not available")]
    ProviderUnavailable(PaymentProvider),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl CheckoutError {
    /// Whether the provider, rather than the request, is at fault.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. } | Self::Parse(_))
    }

    /// Text safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::MissingEmail => "Please enter your email address".to_string(),
            Self::NotConfigured => "The payment system is not configured".to_string(),
            Self::ProviderUnavailable(provider) => {
                format!("{} is not available yet", provider.display_name())
            }
            Self::Pricing(err) => err.to_string(),
            Self::Http(_) | Self::Api { .. } | Self::Parse(_) => {
                "Could not prepare the payment, please try again".to_string()
            }
        }
    }
}

/// A checkout created at the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Where the user goes to pay.
    pub payment_url: Url,
    pub provider: PaymentProvider,
}

/// Hosted payment checkout.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Create a checkout for an order and return its payment URL.
    async fn create_checkout(
        &self,
        provider: PaymentProvider,
        description: &OrderDescription,
    ) -> Result<CheckoutSession, CheckoutError>;
}

// =============================================================================
// Vexor
// =============================================================================

/// Vexor payments API client.
#[derive(Clone)]
pub struct VexorClient {
    client: reqwest::Client,
    api_url: Url,
}

impl std::fmt::Debug for VexorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VexorClient")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PayItem<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    unit_price: Decimal,
    quantity: u32,
}

#[derive(Serialize)]
struct PayRequest<'a> {
    items: Vec<PayItem<'a>>,
}

#[derive(Deserialize)]
struct PayResponse {
    payment_url: String,
}

impl VexorClient {
    /// Create a new Vexor client.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if either identifier is blank; otherwise errors from
    /// building the HTTP client.
    pub fn new(config: &VexorConfig) -> Result<Self, CheckoutError> {
        if !config.is_complete() {
            return Err(CheckoutError::NotConfigured);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-vexor-project-id",
            HeaderValue::from_str(&config.project_id)
                .map_err(|e| CheckoutError::Parse(format!("Invalid project id: {e}")))?,
        );
        headers.insert(
            "x-vexor-key",
            HeaderValue::from_str(config.publishable_key.expose_secret())
                .map_err(|e| CheckoutError::Parse(format!("Invalid publishable key: {e}")))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    fn pay_url(&self, provider: PaymentProvider) -> Result<Url, CheckoutError> {
        self.api_url
            .join(&format!("v1/pay/{}", provider.as_str()))
            .map_err(|e| CheckoutError::Parse(format!("Invalid API URL: {e}")))
    }
}

#[async_trait]
impl CheckoutProvider for VexorClient {
    #[instrument(skip(self, description), fields(items = description.items.len()))]
    async fn create_checkout(
        &self,
        provider: PaymentProvider,
        description: &OrderDescription,
    ) -> Result<CheckoutSession, CheckoutError> {
        let body = PayRequest {
            items: description
                .items
                .iter()
                .map(|line| PayItem {
                    id: &line.id,
                    title: &line.title,
                    description: &line.description,
                    unit_price: line.unit_price.amount(),
                    quantity: line.quantity,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.pay_url(provider)?)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CheckoutError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let paid: PayResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::Parse(e.to_string()))?;
        let payment_url = Url::parse(&paid.payment_url)
            .map_err(|e| CheckoutError::Parse(format!("Invalid payment URL: {e}")))?;

        Ok(CheckoutSession {
            payment_url,
            provider,
        })
    }
}

// =============================================================================
// CheckoutService
// =============================================================================

/// What the user chose on the checkout form.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub shipping: ShippingMethod,
    pub coupon: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub provider: PaymentProvider,
}

/// A started checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub session: CheckoutSession,
    pub summary: OrderSummary,
    /// Pending order row, when signed in and the store accepted it.
    pub order: Option<Order>,
}

/// Starts checkouts for the current cart.
pub struct CheckoutService {
    cart: Arc<CartSynchronizer>,
    orders: Arc<OrderService>,
    provider: Option<Arc<dyn CheckoutProvider>>,
    session: watch::Receiver<Option<Session>>,
    notices: Notices,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("configured", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        cart: Arc<CartSynchronizer>,
        orders: Arc<OrderService>,
        provider: Option<Arc<dyn CheckoutProvider>>,
        session: watch::Receiver<Option<Session>>,
        notices: Notices,
    ) -> Self {
        Self {
            cart,
            orders,
            provider,
            session,
            notices,
        }
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    fn fail(&self, err: CheckoutError) -> CheckoutError {
        if err.is_internal() {
            tracing::error!(error = %err, "Checkout failed");
        } else {
            tracing::warn!(error = %err, "Checkout rejected");
        }
        self.notices.error(err.user_message());
        err
    }

    /// Price the cart and create a checkout at the payment provider.
    ///
    /// The cart is left untouched; clearing it after payment is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns a `CheckoutError` (also published as a notice) when the cart
    /// is empty, the email is blank, the coupon is unknown, the provider is
    /// missing or unavailable, or the provider call fails.
    #[instrument(
        skip(self, request),
        fields(provider = %request.provider, shipping = ?request.shipping)
    )]
    pub async fn start(&self, request: &CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let items = self.cart.items();
        if items.is_empty() {
            return Err(self.fail(CheckoutError::EmptyCart));
        }
        let email = request.email.trim();
        if email.is_empty() {
            return Err(self.fail(CheckoutError::MissingEmail));
        }
        let Some(provider) = &self.provider else {
            return Err(self.fail(CheckoutError::NotConfigured));
        };
        if !PaymentProvider::available().contains(&request.provider) {
            return Err(self.fail(CheckoutError::ProviderUnavailable(request.provider)));
        }
        let coupon = request
            .coupon
            .as_deref()
            .filter(|code| !code.trim().is_empty())
            .map(Coupon::parse)
            .transpose()
            .map_err(|e| self.fail(e.into()))?;

        let summary = OrderSummary::compute(&items, request.shipping, coupon.as_ref());
        let description = OrderDescription::from_cart(
            &items,
            &summary,
            request.shipping,
            coupon.as_ref(),
            email,
            request.name.as_deref(),
        );

        add_breadcrumb(
            "checkout",
            "Started checkout",
            Some(&[("provider", request.provider.as_str())]),
        );
        self.notices.info("Preparing your payment...");

        let session = provider
            .create_checkout(request.provider, &description)
            .await
            .map_err(|e| self.fail(e))?;

        let user_id = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.user_id.clone());
        let order = match user_id {
            Some(user_id) => match self.orders.record(&user_id, &description, &summary).await {
                Ok(order) => Some(order),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to record pending order");
                    None
                }
            },
            None => None,
        };

        tracing::info!(total = %summary.total, "Checkout created");
        self.notices.success("Ready! Continue to the payment page.");
        Ok(CheckoutOutcome {
            session,
            summary,
            order,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use aurora_core::{Price, Product, ProductId, UserId};
    use secrecy::SecretString;

    use super::*;
    use crate::local::MemoryStorage;
    use crate::notice::NoticeLevel;
    use crate::remote::{MemoryStore, OrderStore};

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<OrderDescription>>,
    }

    #[async_trait]
    impl CheckoutProvider for RecordingProvider {
        async fn create_checkout(
            &self,
            provider: PaymentProvider,
            description: &OrderDescription,
        ) -> Result<CheckoutSession, CheckoutError> {
            self.seen.lock().unwrap().push(description.clone());
            Ok(CheckoutSession {
                payment_url: Url::parse("https://pay.example.com/checkout/abc").unwrap(),
                provider,
            })
        }
    }

    fn product() -> Product {
        Product {
            id: ProductId::new(1),
            name: "Linen Shirt".to_string(),
            description: String::new(),
            price: Price::from_cents(2000),
            image: String::new(),
            category: "Casual".to_string(),
            gender: "Hombre".to_string(),
            kind: "Camisa".to_string(),
            sizes: Vec::new(),
            colors: Vec::new(),
            in_stock: true,
        }
    }

    struct Fixture {
        service: CheckoutService,
        cart: Arc<CartSynchronizer>,
        provider: Arc<RecordingProvider>,
        store: Arc<MemoryStore>,
        notices: Notices,
    }

    fn fixture(signed_in: bool, configured: bool) -> Fixture {
        let session = signed_in.then(|| Session {
            user_id: UserId::new("uid-1"),
            email: Some("ana@example.com".to_string()),
            display_name: None,
            avatar_url: None,
            id_token: String::new(),
        });
        let (_tx, rx) = watch::channel(session);
        let notices = Notices::new();
        let store = Arc::new(MemoryStore::new());
        let cart = Arc::new(CartSynchronizer::new(
            Arc::new(MemoryStorage::new()),
            None,
            rx.clone(),
        ));
        let order_store: Arc<dyn OrderStore> = store.clone();
        let orders = Arc::new(OrderService::new(Some(order_store), rx.clone()));
        let provider = Arc::new(RecordingProvider::default());
        let checkout: Option<Arc<dyn CheckoutProvider>> = if configured {
            Some(provider.clone() as Arc<dyn CheckoutProvider>)
        } else {
            None
        };
        Fixture {
            service: CheckoutService::new(cart.clone(), orders, checkout, rx, notices.clone()),
            cart,
            provider,
            store,
            notices,
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            shipping: ShippingMethod::Express,
            coupon: Some("verano15".to_string()),
            email: "ana@example.com".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_builds_description_and_records_order() {
        let f = fixture(true, true);
        let item = f.cart.add_item(&product(), "M", "white");
        f.cart.update_quantity(item.id, 2);

        let outcome = f.service.start(&request()).await.unwrap();

        // 40.00 + 12.99 - 6.00
        assert_eq!(outcome.summary.total, Price::from_cents(4699));
        assert_eq!(outcome.session.provider, PaymentProvider::MercadoPago);
        let seen = f.provider.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().unwrap().items.len(), 2);
        assert!(outcome.order.is_some());
        assert_eq!(
            f.store.list(&UserId::new("uid-1")).await.unwrap().len(),
            1
        );
        // Cart is not cleared by checkout
        assert_eq!(f.cart.total_items(), 2);
    }

    #[tokio::test]
    async fn test_guest_checkout_records_no_order() {
        let f = fixture(false, true);
        f.cart.add_item(&product(), "M", "white");

        let outcome = f.service.start(&request()).await.unwrap();
        assert!(outcome.order.is_none());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let f = fixture(true, true);
        let mut notices = f.notices.subscribe();

        assert!(matches!(
            f.service.start(&request()).await,
            Err(CheckoutError::EmptyCart)
        ));
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);

        f.cart.add_item(&product(), "M", "white");
        let blank_email = CheckoutRequest {
            email: "  ".to_string(),
            ..request()
        };
        assert!(matches!(
            f.service.start(&blank_email).await,
            Err(CheckoutError::MissingEmail)
        ));

        let bad_coupon = CheckoutRequest {
            coupon: Some("FREE100".to_string()),
            ..request()
        };
        assert!(matches!(
            f.service.start(&bad_coupon).await,
            Err(CheckoutError::Pricing(PricingError::InvalidCoupon(_)))
        ));

        let stripe = CheckoutRequest {
            provider: PaymentProvider::Stripe,
            ..request()
        };
        assert!(matches!(
            f.service.start(&stripe).await,
            Err(CheckoutError::ProviderUnavailable(PaymentProvider::Stripe))
        ));
        assert!(f.provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let f = fixture(true, false);
        f.cart.add_item(&product(), "M", "white");
        assert!(!f.service.is_configured());
        assert!(matches!(
            f.service.start(&request()).await,
            Err(CheckoutError::NotConfigured)
        ));
    }

    #[test]
    fn test_vexor_requires_complete_config() {
        let config = VexorConfig {
            project_id: "proj_1".to_string(),
            publishable_key: SecretString::from("  "),
            api_url: Url::parse("https://api.vexor.io").unwrap(),
        };
        assert!(matches!(
            VexorClient::new(&config),
            Err(CheckoutError::NotConfigured)
        ));
    }

    #[test]
    fn test_pay_url_per_provider() {
        let client = VexorClient::new(&VexorConfig {
            project_id: "proj_1".to_string(),
            publishable_key: SecretString::from("pk_live_1"),
            api_url: Url::parse("https://api.vexor.io").unwrap(),
        })
        .unwrap();
        assert_eq!(
            client.pay_url(PaymentProvider::MercadoPago).unwrap().as_str(),
            "https://api.vexor.io/v1/pay/mercadopago"
        );
    }

    #[test]
    fn test_pay_item_sends_numeric_price() {
        let item = PayItem {
            id: "1",
            title: "Linen Shirt",
            description: "Size: M | Color: white",
            unit_price: Decimal::new(1999, 2),
            quantity: 1,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["unit_price"], serde_json::json!(19.99));
    }
}
